//! Static reachability coverage: which blocks some feasible state reaches.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::cfg::Program;
use crate::types::{BlockId, FunctionId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    reached: BTreeMap<FunctionId, BTreeSet<BlockId>>,
}

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the blocks reached by one activation of `function`.
    pub fn record<I: IntoIterator<Item = BlockId>>(&mut self, function: FunctionId, blocks: I) {
        self.reached.entry(function).or_default().extend(blocks);
    }

    pub fn is_reached(&self, function: FunctionId, block: BlockId) -> bool {
        self.reached.get(&function).is_some_and(|b| b.contains(&block))
    }

    pub fn reached_blocks(&self, function: FunctionId) -> impl Iterator<Item = BlockId> + '_ {
        self.reached.get(&function).into_iter().flatten().copied()
    }

    /// Per-function `(reached, total)` block counts, for every function of the program.
    pub fn summary(&self, program: &Program) -> Vec<FunctionCoverage> {
        program
            .functions()
            .iter()
            .map(|f| FunctionCoverage {
                function: f.name.clone(),
                reached: self.reached.get(&f.id).map_or(0, BTreeSet::len),
                total: f.num_blocks(),
            })
            .collect()
    }

    /// Fraction of all blocks in the program that are reached.
    pub fn ratio(&self, program: &Program) -> f64 {
        let total: usize = program.functions().iter().map(|f| f.num_blocks()).sum();
        if total == 0 {
            return 1.0;
        }
        let reached: usize = self.reached.values().map(BTreeSet::len).sum();
        reached as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCoverage {
    pub function: String,
    pub reached: usize,
    pub total: usize,
}

impl fmt::Display for FunctionCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}/{} blocks", self.function, self.reached, self.total)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfg::ProgramBuilder;

    #[test]
    fn test_coverage() {
        let mut builder = ProgramBuilder::new();
        let f = builder.function("f", &[]);
        f.new_block("dead");
        builder.function("g", &[]);
        let program = builder.build().unwrap();

        let f = FunctionId::new(0);
        let mut coverage = Coverage::new();
        coverage.record(f, [BlockId::new(0)]);
        coverage.record(f, [BlockId::new(0)]);

        assert!(coverage.is_reached(f, BlockId::new(0)));
        assert!(!coverage.is_reached(f, BlockId::new(1)));
        assert_eq!(coverage.summary(&program)[0].to_string(), "f: 1/2 blocks");
        assert_eq!(coverage.summary(&program)[1].reached, 0);
        assert!((coverage.ratio(&program) - 1.0 / 3.0).abs() < 1e-9);
    }
}
