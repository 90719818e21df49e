//! Interprocedural driver.
//!
//! The driver is demand-driven: it starts at an entry function and, whenever
//! the intraprocedural analysis reaches a call, binds the arguments to the
//! callee parameters, picks the callee context and produces a [`Summary`].
//! Callees are therefore finished before their callers.
//!
//! Summaries are cached per `(callee, context, parameter buckets)`. A request
//! for an activation that is already on the stack is a recursive call: it is
//! answered with the current approximation, and the activation is re-run
//! until its summary and entry state stop growing, widening after
//! `max_widen_iterations` rounds. Activations that consumed such an
//! approximation are not cached.
//!
//! A call to an unresolved function degrades its caller. Values that may
//! carry its result are tracked through assignments and arguments, and any
//! callee receiving one is degraded in its context as well.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, trace, warn};

use crate::budget::BudgetTracker;
use crate::cache::{Lookup, Summary, SummaryCache, SummaryKey};
use crate::callgraph::{CallGraph, Callee};
use crate::cfg::{CallSite, Function, Program, Statement};
use crate::config::AnalysisConfig;
use crate::context::ContextTable;
use crate::coverage::Coverage;
use crate::domain::Lattice;
use crate::error::Diagnostic;
use crate::fixpoint::{CallHandler, FunctionResult, IntraAnalyzer};
use crate::expr::{Expr, Var};
use crate::interval::Interval;
use crate::state::AbstractState;
use crate::types::{CallSiteId, ContextId, FunctionId, SiteId};

/// What is known about an access site in one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Join of the index ranges over all feasible reaching states.
    pub index: Interval,
    /// Whether some feasible state reaches the site.
    pub feasible: bool,
    /// Call sites from the entry down to the site's function.
    pub chain: Vec<CallSiteId>,
    /// Some activation contributing here was cut short by the budget.
    pub interrupted: bool,
}

/// Counters describing a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub steps: u64,
    pub transfers: usize,
    pub widenings: usize,
    pub activations: usize,
    pub recursion_rounds: usize,
    pub functions_analysed: usize,
    pub contexts_created: usize,
    pub contexts_collected: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_invalidations: usize,
}

/// Everything the verdict engine needs from a run.
#[derive(Debug)]
pub struct DriverOutput {
    pub observations: BTreeMap<(SiteId, ContextId), Observation>,
    pub degraded: BTreeSet<(FunctionId, ContextId)>,
    pub analysed: BTreeSet<FunctionId>,
    pub diagnostics: Vec<Diagnostic>,
    pub coverage: Coverage,
    pub exhausted: bool,
    pub stats: AnalysisStats,
    pub contexts: ContextTable,
}

struct Frame {
    function: FunctionId,
    context: ContextId,
    call_site: Option<CallSiteId>,
    /// Depends on the approximation of an unfinished recursive activation.
    tainted: bool,
    /// Parameters bound to values derived from an unresolved call.
    unknown_params: BTreeSet<Var>,
}

struct Pending {
    entry: AbstractState,
    summary: Summary,
    rounds: usize,
    recursive_hit: bool,
    entry_grew: bool,
}

pub struct Driver<'a> {
    program: &'a Program,
    callgraph: &'a CallGraph,
    config: &'a AnalysisConfig,
    contexts: ContextTable,
    cache: SummaryCache,
    budget: BudgetTracker,
    stack: Vec<Frame>,
    pending: HashMap<(FunctionId, ContextId), Pending>,
    /// Calls made by each activation: call site, callee and callee context.
    children: BTreeMap<(FunctionId, ContextId), BTreeSet<(CallSiteId, FunctionId, ContextId)>>,
    observations: BTreeMap<(SiteId, ContextId), Observation>,
    degraded: BTreeSet<(FunctionId, ContextId)>,
    analysed: BTreeSet<FunctionId>,
    diagnostics: Vec<Diagnostic>,
    coverage: Coverage,
    stats: AnalysisStats,
}

impl<'a> Driver<'a> {
    pub fn new(program: &'a Program, callgraph: &'a CallGraph, config: &'a AnalysisConfig) -> Self {
        Self {
            program,
            callgraph,
            config,
            contexts: ContextTable::new(config.max_context_depth),
            cache: SummaryCache::new(config.cache_bits),
            budget: BudgetTracker::new(config.budget),
            stack: Vec::new(),
            pending: HashMap::new(),
            children: BTreeMap::new(),
            observations: BTreeMap::new(),
            degraded: BTreeSet::new(),
            analysed: BTreeSet::new(),
            diagnostics: Vec::new(),
            coverage: Coverage::new(),
            stats: AnalysisStats::default(),
        }
    }

    /// Analyse `entry` from an unconstrained state in the root context.
    pub fn run_entry(&mut self, entry: FunctionId) -> Summary {
        debug!("analysing from entry `{}`", self.program.function(entry).name);
        let (summary, _) = self.activate(entry, ContextId::ROOT, AbstractState::new(), None, BTreeSet::new());
        summary
    }

    pub fn finish(mut self) -> DriverOutput {
        let exhausted = self.budget.is_exhausted();
        if exhausted {
            self.diagnostics.push(Diagnostic::BudgetExhausted {
                steps: self.budget.steps(),
            });
        }

        let live: BTreeSet<ContextId> = self
            .observations
            .keys()
            .map(|&(_, ctx)| ctx)
            .chain(self.degraded.iter().map(|&(_, ctx)| ctx))
            .collect();
        self.contexts.collect_garbage(&live);

        let mut stats = self.stats;
        stats.steps = self.budget.steps();
        stats.functions_analysed = self.analysed.len();
        stats.contexts_created = self.contexts.created();
        stats.contexts_collected = self.contexts.collected();
        stats.cache_hits = self.cache.hits();
        stats.cache_misses = self.cache.misses();
        stats.cache_invalidations = self.cache.invalidations();
        debug!("driver finished: {:?}", stats);

        DriverOutput {
            observations: self.observations,
            degraded: self.degraded,
            analysed: self.analysed,
            diagnostics: self.diagnostics,
            coverage: self.coverage,
            exhausted,
            stats,
            contexts: self.contexts,
        }
    }

    /// Entry state of `callee` for `call` executed from `state`.
    ///
    /// Parameters whose arguments differ by a constant are related, so
    /// `foo(a, a + 2)` yields `b = a + 2` inside `foo`.
    pub fn bind(&self, callee: &Function, call: &CallSite, state: &AbstractState) -> AbstractState {
        let mut entry = AbstractState::new();
        for (param, arg) in callee.params.iter().zip(&call.args) {
            entry.havoc(param, state.eval(arg));
        }

        let forms: Vec<_> = call
            .args
            .iter()
            .map(|arg| arg.linearize().and_then(|l| state.substitute(&l)))
            .collect();
        for j in 1..forms.len().min(callee.params.len()) {
            let Some(lj) = &forms[j] else { continue };
            for i in 0..j {
                let Some(li) = &forms[i] else { continue };
                let diff = li.clone().scale(-1).and_then(|neg| lj.clone().plus(&neg));
                if let Some(k) = diff.and_then(|d| d.as_constant()) {
                    if callee.params[i] != callee.params[j] {
                        entry.relate(&callee.params[j], &callee.params[i], k);
                    }
                    break;
                }
            }
        }
        entry
    }

    /// Run `function` in `context`, iterating if it turns out to be recursive.
    /// Returns the summary and whether it depends on an unfinished approximation.
    fn activate(
        &mut self,
        function: FunctionId,
        context: ContextId,
        entry: AbstractState,
        call_site: Option<CallSiteId>,
        unknown_params: BTreeSet<Var>,
    ) -> (Summary, bool) {
        let key = (function, context);
        let f = self.program.function(function);
        let analyzer = IntraAnalyzer::new(
            self.program,
            self.config.max_widen_iterations,
            self.config.narrowing_iterations,
        );
        self.analysed.insert(function);

        if !self.callgraph.is_recursive(function) {
            self.stats.activations += 1;
            self.stack.push(Frame {
                function,
                context,
                call_site,
                tainted: false,
                unknown_params,
            });
            let result = analyzer.analyze(f, &entry, self);
            self.record(function, context, &result);
            let tainted = self.stack.pop().is_some_and(|fr| fr.tainted);
            return (result.summary, tainted);
        }

        if let Some(pending) = self.pending.get_mut(&key) {
            trace!("recursive request for `{}` in {}", f.name, context);
            pending.recursive_hit = true;
            if !entry.leq(&pending.entry) {
                let joined = pending.entry.join(&entry);
                pending.entry = if pending.rounds >= self.config.max_widen_iterations {
                    pending.entry.widen(&joined)
                } else {
                    joined
                };
                pending.entry_grew = true;
            }
            let summary = pending.summary.clone();
            if let Some(pos) = self.stack.iter().position(|fr| fr.function == function && fr.context == context) {
                for frame in &mut self.stack[pos + 1..] {
                    frame.tainted = true;
                }
            }
            return (summary, true);
        }

        self.pending.insert(
            key,
            Pending {
                entry,
                summary: Summary::bottom(),
                rounds: 0,
                recursive_hit: false,
                entry_grew: false,
            },
        );

        let mut tainted = false;
        let summary = loop {
            let Some(pending) = self.pending.get_mut(&key) else {
                break Summary::top();
            };
            pending.rounds += 1;
            pending.recursive_hit = false;
            pending.entry_grew = false;
            let round_entry = pending.entry.clone();

            self.stats.activations += 1;
            self.stack.push(Frame {
                function,
                context,
                call_site,
                tainted: false,
                unknown_params: unknown_params.clone(),
            });
            let result = analyzer.analyze(f, &round_entry, self);
            self.record(function, context, &result);
            let frame_tainted = self.stack.pop().is_some_and(|fr| fr.tainted);

            let Some(pending) = self.pending.get_mut(&key) else {
                break result.summary;
            };
            if !pending.recursive_hit || result.interrupted {
                tainted = frame_tainted;
                break result.summary;
            }

            // Recursive: iterate until the approximation covers the result.
            self.stats.recursion_rounds += 1;
            if result.summary.leq(&pending.summary) && !pending.entry_grew {
                tainted = frame_tainted;
                break result.summary;
            }
            let joined = pending.summary.join(&result.summary);
            pending.summary = if pending.rounds >= self.config.max_widen_iterations {
                self.stats.widenings += 1;
                debug!("widening summary of recursive `{}` in {}", f.name, context);
                pending.summary.widen(&joined)
            } else {
                joined
            };
        };

        self.pending.remove(&key);
        (summary, tainted)
    }

    /// Fold an activation's candidates into the observations.
    fn record(&mut self, function: FunctionId, context: ContextId, result: &FunctionResult) {
        self.stats.transfers += result.transfers;
        self.stats.widenings += result.widenings;
        self.coverage.record(function, result.reached_blocks());

        let chain = self.chain();
        for candidate in &result.candidates {
            let obs = self
                .observations
                .entry((candidate.site, context))
                .or_insert_with(|| Observation {
                    index: Interval::bottom(),
                    feasible: false,
                    chain: chain.clone(),
                    interrupted: false,
                });
            obs.interrupted |= result.interrupted;
            if !candidate.feasible {
                continue;
            }
            obs.index = obs.index.join(&candidate.index);
            if !obs.feasible || chain < obs.chain {
                obs.chain = chain.clone();
            }
            obs.feasible = true;
        }
    }

    fn current(&self) -> (FunctionId, ContextId) {
        self.stack
            .last()
            .map_or((FunctionId::new(0), ContextId::ROOT), |fr| (fr.function, fr.context))
    }

    fn chain(&self) -> Vec<CallSiteId> {
        self.stack.iter().filter_map(|fr| fr.call_site).collect()
    }

    /// Variables of `function` that may hold a value derived from an
    /// unresolved call, given the parameters already known to.
    fn unknown_vars(&self, function: FunctionId, params: &BTreeSet<Var>) -> BTreeSet<Var> {
        let depends = |expr: &Expr, unknown: &BTreeSet<Var>| expr.vars().into_iter().any(|v| unknown.contains(v));
        let statements: Vec<&Statement> = self
            .program
            .function(function)
            .blocks
            .iter()
            .flat_map(|b| &b.statements)
            .collect();

        let mut unknown = params.clone();
        loop {
            let before = unknown.len();
            for statement in &statements {
                match statement {
                    Statement::Assign { var, expr } if depends(expr, &unknown) => {
                        unknown.insert(var.clone());
                    }
                    Statement::Call { dest: Some(dest), site } => {
                        let unresolved = matches!(self.callgraph.resolve(*site), Callee::Unresolved(_));
                        let call = self.program.call_site(*site);
                        if unresolved || call.args.iter().any(|a| depends(a, &unknown)) {
                            unknown.insert(dest.clone());
                        }
                    }
                    _ => {}
                }
            }
            if unknown.len() == before {
                return unknown;
            }
        }
    }

    /// Whether `chain` into `function` in `context` is smaller than the
    /// witness chain of some feasible site at or below that activation.
    fn improves_witness(&self, function: FunctionId, context: ContextId, chain: Vec<CallSiteId>) -> bool {
        let mut seen = BTreeSet::new();
        let mut todo = vec![(function, context, chain)];
        while let Some((f, ctx, chain)) = todo.pop() {
            if !seen.insert((f, ctx)) {
                continue;
            }
            let improves = self.program.function(f).access_sites().any(|site| {
                self.observations
                    .get(&(site, ctx))
                    .is_some_and(|obs| obs.feasible && chain < obs.chain)
            });
            if improves {
                return true;
            }
            for &(call, g, g_ctx) in self.children.get(&(f, ctx)).into_iter().flatten() {
                let mut next = chain.clone();
                next.push(call);
                todo.push((g, g_ctx, next));
            }
        }
        false
    }
}

impl CallHandler for Driver<'_> {
    fn call(&mut self, call: &CallSite, state: &AbstractState) -> Summary {
        let (caller, caller_ctx) = self.current();
        let callee = match self.callgraph.resolve(call.id) {
            Callee::External(_) => return Summary::top(),
            Callee::Unresolved(name) => {
                self.degraded.insert((caller, caller_ctx));
                let diagnostic = Diagnostic::UnresolvedCallee {
                    caller,
                    context: caller_ctx,
                    call_site: call.id,
                    callee: name.clone(),
                    location: call.location,
                };
                if !self.diagnostics.contains(&diagnostic) {
                    warn!("unresolved callee `{}` at {} in {}", name, call.location, caller_ctx);
                    self.diagnostics.push(diagnostic);
                }
                return Summary::top();
            }
            Callee::Function(id) => *id,
        };
        if self.budget.is_exhausted() {
            return Summary::top();
        }

        let function = self.program.function(callee);
        let context = self.contexts.extend(caller_ctx, call.id);
        let mut entry = self.bind(function, call, state);
        self.children
            .entry((caller, caller_ctx))
            .or_default()
            .insert((call.id, callee, context));

        let caller_unknown = match self.stack.last() {
            Some(frame) if self.degraded.contains(&(caller, caller_ctx)) => {
                self.unknown_vars(caller, &frame.unknown_params)
            }
            _ => BTreeSet::new(),
        };
        let unknown_params: BTreeSet<Var> = function
            .params
            .iter()
            .zip(&call.args)
            .filter(|(_, arg)| arg.vars().into_iter().any(|v| caller_unknown.contains(v)))
            .map(|(param, _)| param.clone())
            .collect();
        let unknown = !unknown_params.is_empty();
        if unknown && self.degraded.insert((callee, context)) {
            debug!("`{}` in {} receives an unknown value at {}", function.name, context, call.location);
        }

        if self.pending.contains_key(&(callee, context)) {
            return self.activate(callee, context, entry, Some(call.id), unknown_params).0;
        }

        let params: Vec<Interval> = function.params.iter().map(|p| entry.get(p)).collect();
        let key = SummaryKey::new(callee, context, &params);
        if !unknown {
            match self.cache.lookup(&key, &entry) {
                Lookup::Hit(summary) => {
                    let mut chain = self.chain();
                    chain.push(call.id);
                    if !self.improves_witness(callee, context, chain) {
                        trace!("cache hit for `{}` in {}", function.name, context);
                        return summary;
                    }
                    trace!("re-running `{}` in {} for a smaller witness", function.name, context);
                }
                Lookup::Wider(stale) => entry = stale.join(&entry),
                Lookup::Miss => {}
            }
        }

        let (summary, tainted) = self.activate(callee, context, entry.clone(), Some(call.id), unknown_params);
        if tainted {
            if let Some(frame) = self.stack.last_mut() {
                frame.tainted = true;
            }
        } else if !unknown {
            self.cache.insert(key, entry, summary.clone());
        }
        summary
    }

    fn tick(&mut self) -> bool {
        self.budget.tick()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfg::ProgramBuilder;
    use crate::expr::{Expr, Var};
    use crate::types::Location;

    #[test]
    fn test_bind_relates_parameters() {
        let mut builder = ProgramBuilder::new();
        builder.function("foo", &["a", "b"]);
        let caller = builder.function("baz", &["a"]);
        let entry = caller.entry();
        caller.call(entry, None, "foo", vec![Expr::var("a"), Expr::offset("a", 2)], Location::new(21, 11));
        let program = builder.build().unwrap();
        let callgraph = CallGraph::build(&program);
        let config = AnalysisConfig::default();
        let driver = Driver::new(&program, &callgraph, &config);

        let mut state = AbstractState::new();
        state.set(&Var::new("a"), Interval::from_bounds(0, 255));
        let foo = program.function_by_name("foo").unwrap();
        let bound = driver.bind(foo, &program.call_sites()[0], &state);

        assert_eq!(bound.get(&Var::new("a")), Interval::from_bounds(0, 255));
        assert_eq!(bound.get(&Var::new("b")), Interval::from_bounds(2, 257));
        assert!(bound.assume(&Expr::var("a").gt(Expr::var("b"))).is_unreachable());
    }

    #[test]
    fn test_cache_reuse_across_call_sites() {
        // Depth 0 merges every context, so the second identical call hits the cache.
        let mut builder = ProgramBuilder::new();
        let id = builder.function("id", &["x"]);
        let e = id.entry();
        id.ret(e, Some(Expr::var("x")));
        let main = builder.function("main", &[]);
        let e = main.entry();
        main.call(e, Some("r1"), "id", vec![Expr::constant(3)], Location::new(1, 1))
            .call(e, Some("r2"), "id", vec![Expr::constant(3)], Location::new(2, 1))
            .ret(e, Some(Expr::var("r1").add(Expr::var("r2"))));
        let program = builder.build().unwrap();
        let callgraph = CallGraph::build(&program);
        let config = AnalysisConfig::default().with_max_context_depth(0);

        let mut driver = Driver::new(&program, &callgraph, &config);
        let main = program.function_by_name("main").unwrap().id;
        let summary = driver.run_entry(main);
        let out = driver.finish();

        assert_eq!(summary, Summary::new(Interval::constant(6), true));
        assert!(out.stats.cache_hits >= 1);
        assert_eq!(out.analysed.len(), 2);
    }

    #[test]
    fn test_non_recursive_callee_skips_pending() {
        let mut builder = ProgramBuilder::new();
        let inc = builder.function("inc", &["x"]);
        let e = inc.entry();
        inc.ret(e, Some(Expr::offset("x", 1)));
        let main = builder.function("main", &[]);
        let e = main.entry();
        main.call(e, Some("r"), "inc", vec![Expr::constant(1)], Location::new(1, 1))
            .ret(e, Some(Expr::var("r")));
        let program = builder.build().unwrap();
        let callgraph = CallGraph::build(&program);
        let config = AnalysisConfig::default();

        let mut driver = Driver::new(&program, &callgraph, &config);
        let summary = driver.run_entry(program.function_by_name("main").unwrap().id);
        assert!(driver.pending.is_empty());
        let out = driver.finish();

        assert_eq!(summary, Summary::new(Interval::constant(2), true));
        assert_eq!(out.stats.recursion_rounds, 0);
        assert!(out.stats.activations >= 2);
    }

    #[test]
    fn test_recursive_summary_stabilises() {
        // int down(n) { if (n > 0) return down(n - 1); return 0; }
        let mut builder = ProgramBuilder::new();
        let down = builder.function("down", &["n"]);
        let e = down.entry();
        let rec = down.new_block("rec");
        let base = down.new_block("base");
        down.branch(e, Expr::var("n").gt(Expr::constant(0)), rec, base)
            .call(rec, Some("r"), "down", vec![Expr::offset("n", -1)], Location::new(2, 30))
            .ret(rec, Some(Expr::var("r")))
            .ret(base, Some(Expr::constant(0)));
        let main = builder.function("main", &[]);
        let e = main.entry();
        main.input(e, "k", Interval::from_bounds(0, 1000))
            .call(e, Some("v"), "down", vec![Expr::var("k")], Location::new(5, 5))
            .ret(e, Some(Expr::var("v")));
        let program = builder.build().unwrap();
        let callgraph = CallGraph::build(&program);
        let config = AnalysisConfig::default();

        let mut driver = Driver::new(&program, &callgraph, &config);
        let summary = driver.run_entry(program.function_by_name("main").unwrap().id);
        let out = driver.finish();

        assert!(summary.returns);
        assert!(summary.ret.contains(0));
        assert!(!out.exhausted);
        assert!(out.stats.recursion_rounds > 0);
    }
}
