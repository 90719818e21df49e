//! Bug-site checker and verdict engine.
//!
//! Each observation `(site, context) ↦ index range R` is compared against the
//! valid range `[0, capacity)` of the accessed array:
//!
//! | Condition                                   | Verdict                              |
//! |---------------------------------------------|--------------------------------------|
//! | budget ran out                              | `Unknown` / `BudgetExhausted`        |
//! | activation called an unresolved function    | `Unknown` / `MalformedCallee`        |
//! | no feasible state reaches the site          | `UnreachableSafe` / `InfeasiblePath` |
//! | `R ⊆ [0, capacity)`                         | `UnreachableSafe` / `InBounds`       |
//! | `R ∩ [0, capacity) = ∅`                     | `ReachableUnsafe` / `OutOfBounds`    |
//! | straddles, offending part finite (promoted) | `ReachableUnsafe` / `MayExceedBounds`|
//! | straddles otherwise                         | `Unknown` / `ImpreciseIndex`         |
//!
//! Sites in functions that were never analysed get a single
//! `UnreachableSafe` / `NotCalled` verdict without a context.

use std::fmt;

use crate::cfg::{AccessSite, Program};
use crate::domain::Lattice;
use crate::driver::{DriverOutput, Observation};
use crate::interval::{BoundsCheck, Interval};
use crate::types::{BlockId, CallSiteId, ContextId, Location, SiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VerdictKind {
    ReachableUnsafe,
    UnreachableSafe,
    Unknown,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictKind::ReachableUnsafe => write!(f, "reachable-unsafe"),
            VerdictKind::UnreachableSafe => write!(f, "unreachable-safe"),
            VerdictKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// Every feasible index is outside the array.
    OutOfBounds,
    /// Some feasible indices are outside the array, and they are bounded.
    MayExceedBounds,
    InBounds,
    /// The site is only reached under a bottom state.
    InfeasiblePath,
    /// The enclosing function is never called from the entry.
    NotCalled,
    /// The index straddles the bound with an unbounded offending side.
    ImpreciseIndex,
    MalformedCallee,
    BudgetExhausted,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::OutOfBounds => "index always out of bounds",
            Reason::MayExceedBounds => "index may exceed bounds",
            Reason::InBounds => "index within bounds",
            Reason::InfeasiblePath => "path infeasible",
            Reason::NotCalled => "function not called",
            Reason::ImpreciseIndex => "index range too imprecise",
            Reason::MalformedCallee => "depends on unresolved callee",
            Reason::BudgetExhausted => "budget exhausted",
        };
        write!(f, "{}", s)
    }
}

/// One step of a witness path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessStep {
    pub function: String,
    pub block: BlockId,
    /// The call made at this step; `None` for the final access step.
    pub call_site: Option<CallSiteId>,
    pub location: Location,
}

impl fmt::Display for WitnessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.call_site {
            Some(cs) => write!(f, "{} {} {} @ {}", self.function, self.block, cs, self.location),
            None => write!(f, "{} {} access @ {}", self.function, self.block, self.location),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub site: SiteId,
    pub context: Option<ContextId>,
    pub kind: VerdictKind,
    pub reason: Reason,
    /// Observed index range (bottom when unreached).
    pub index: Interval,
    pub capacity: u64,
    /// Non-empty for [`VerdictKind::ReachableUnsafe`]; the last step is the access.
    pub witness: Vec<WitnessStep>,
    /// A concrete index in `index` outside `[0, capacity)`.
    pub violating_index: Option<i64>,
}

impl Verdict {
    pub fn is_unsafe(&self) -> bool {
        self.kind == VerdictKind::ReachableUnsafe
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.site)?;
        if let Some(ctx) = self.context {
            write!(f, " [{}]", ctx)?;
        }
        write!(
            f,
            ": {} ({}), index {} in [0, {})",
            self.kind, self.reason, self.index, self.capacity
        )?;
        if let Some(v) = self.violating_index {
            write!(f, ", e.g. {}", v)?;
        }
        Ok(())
    }
}

pub struct VerdictEngine<'a> {
    program: &'a Program,
    promote_bounded_violations: bool,
}

impl<'a> VerdictEngine<'a> {
    pub fn new(program: &'a Program, promote_bounded_violations: bool) -> Self {
        Self {
            program,
            promote_bounded_violations,
        }
    }

    /// Verdicts for every access site, ordered by site, then context.
    pub fn verdicts(&self, output: &DriverOutput) -> Vec<Verdict> {
        let mut verdicts = Vec::new();
        for site in self.program.sites() {
            let mut observed = output
                .observations
                .range((site.id, ContextId::ROOT)..)
                .take_while(|((s, _), _)| *s == site.id)
                .peekable();

            if observed.peek().is_none() {
                let reason = if output.exhausted {
                    Reason::BudgetExhausted
                } else if output.analysed.contains(&site.function) {
                    Reason::InfeasiblePath
                } else {
                    Reason::NotCalled
                };
                let kind = if output.exhausted {
                    VerdictKind::Unknown
                } else {
                    VerdictKind::UnreachableSafe
                };
                verdicts.push(Verdict {
                    site: site.id,
                    context: None,
                    kind,
                    reason,
                    index: Interval::bottom(),
                    capacity: site.capacity,
                    witness: Vec::new(),
                    violating_index: None,
                });
                continue;
            }

            for (&(_, context), obs) in observed {
                let degraded = output.degraded.contains(&(site.function, context));
                verdicts.push(self.classify(site, context, obs, degraded, output.exhausted));
            }
        }
        verdicts
    }

    pub fn classify(
        &self,
        site: &AccessSite,
        context: ContextId,
        obs: &Observation,
        degraded: bool,
        exhausted: bool,
    ) -> Verdict {
        let mut verdict = Verdict {
            site: site.id,
            context: Some(context),
            kind: VerdictKind::Unknown,
            reason: Reason::BudgetExhausted,
            index: obs.index,
            capacity: site.capacity,
            witness: Vec::new(),
            violating_index: None,
        };

        if exhausted || obs.interrupted {
            return verdict;
        }
        if degraded {
            verdict.reason = Reason::MalformedCallee;
            return verdict;
        }
        if !obs.feasible {
            verdict.kind = VerdictKind::UnreachableSafe;
            verdict.reason = Reason::InfeasiblePath;
            return verdict;
        }

        let (kind, reason) = match obs.index.check_index(site.capacity) {
            BoundsCheck::InRange => (VerdictKind::UnreachableSafe, Reason::InBounds),
            BoundsCheck::OutOfRange => (VerdictKind::ReachableUnsafe, Reason::OutOfBounds),
            BoundsCheck::PossiblyOutOfRange
                if self.promote_bounded_violations && obs.index.violation_is_bounded(site.capacity) =>
            {
                (VerdictKind::ReachableUnsafe, Reason::MayExceedBounds)
            }
            BoundsCheck::PossiblyOutOfRange => (VerdictKind::Unknown, Reason::ImpreciseIndex),
        };
        verdict.kind = kind;
        verdict.reason = reason;
        verdict.violating_index = obs.index.violation_witness(site.capacity);

        if kind == VerdictKind::ReachableUnsafe {
            verdict.witness = self.witness(site, &obs.chain);
        }
        verdict
    }

    /// Call steps of `chain`, then the access itself.
    fn witness(&self, site: &AccessSite, chain: &[CallSiteId]) -> Vec<WitnessStep> {
        let mut steps: Vec<WitnessStep> = chain
            .iter()
            .map(|&cs| {
                let call = self.program.call_site(cs);
                WitnessStep {
                    function: self.program.function(call.caller).name.clone(),
                    block: call.block,
                    call_site: Some(cs),
                    location: call.location,
                }
            })
            .collect();
        steps.push(WitnessStep {
            function: self.program.function(site.function).name.clone(),
            block: site.block,
            call_site: None,
            location: site.location,
        });
        steps
    }
}
