//! Top-level entry point: run the whole analysis on a program.

use log::{debug, info};

use crate::callgraph::CallGraph;
use crate::cfg::Program;
use crate::config::AnalysisConfig;
use crate::coverage::Coverage;
use crate::driver::Driver;
pub use crate::driver::AnalysisStats;
use crate::error::{Diagnostic, Error, Result};
use crate::types::SiteId;
use crate::verdict::{Verdict, VerdictEngine, VerdictKind};

/// Result of a run.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Ordered by site, then context.
    pub verdicts: Vec<Verdict>,
    /// The budget ran out; every verdict is `Unknown`.
    pub partial: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub coverage: Coverage,
    pub stats: AnalysisStats,
}

impl AnalysisReport {
    pub fn verdicts_for(&self, site: SiteId) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(move |v| v.site == site)
    }

    pub fn count(&self, kind: VerdictKind) -> usize {
        self.verdicts.iter().filter(|v| v.kind == kind).count()
    }

    pub fn unsafe_verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| v.is_unsafe())
    }
}

/// Bug-reachability analysis of one program.
///
/// ```rust
/// use reach_rs::analysis::Analyzer;
/// use reach_rs::cfg::ProgramBuilder;
/// use reach_rs::config::AnalysisConfig;
/// use reach_rs::expr::Expr;
/// use reach_rs::types::Location;
/// use reach_rs::verdict::VerdictKind;
///
/// let mut builder = ProgramBuilder::new();
/// let main = builder.function("main", &[]);
/// let entry = main.entry();
/// main.declare_array("buf", 4)
///     .write(entry, "buf", Expr::constant(4), Location::new(2, 5));
/// let program = builder.build().unwrap();
///
/// let report = Analyzer::new(&program, AnalysisConfig::default()).run().unwrap();
/// assert_eq!(report.verdicts[0].kind, VerdictKind::ReachableUnsafe);
/// ```
pub struct Analyzer<'a> {
    program: &'a Program,
    config: AnalysisConfig,
    callgraph: CallGraph,
}

impl<'a> Analyzer<'a> {
    pub fn new(program: &'a Program, config: AnalysisConfig) -> Self {
        Self {
            program,
            config,
            callgraph: CallGraph::build(program),
        }
    }

    pub fn callgraph(&self) -> &CallGraph {
        &self.callgraph
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self) -> Result<AnalysisReport> {
        let entries = match &self.config.entry {
            Some(name) => {
                let f = self
                    .program
                    .function_by_name(name)
                    .ok_or_else(|| Error::UnknownEntry(name.clone()))?;
                vec![f.id]
            }
            None => self.callgraph.roots(),
        };
        debug!("entries: {:?}", entries);

        let mut driver = Driver::new(self.program, &self.callgraph, &self.config);
        for entry in entries {
            driver.run_entry(entry);
        }
        let output = driver.finish();

        let engine = VerdictEngine::new(self.program, self.config.promote_bounded_violations);
        let verdicts = engine.verdicts(&output);

        let report = AnalysisReport {
            verdicts,
            partial: output.exhausted,
            diagnostics: output.diagnostics,
            coverage: output.coverage,
            stats: output.stats,
        };
        info!(
            "analysis done: {} verdicts ({} unsafe, {} unknown){}",
            report.verdicts.len(),
            report.count(VerdictKind::ReachableUnsafe),
            report.count(VerdictKind::Unknown),
            if report.partial { ", partial" } else { "" }
        );
        Ok(report)
    }
}
