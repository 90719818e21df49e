//! Analysis configuration.

use crate::budget::Budget;

/// Knobs of an analysis run.
///
/// ```rust
/// use reach_rs::budget::Budget;
/// use reach_rs::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default()
///     .with_max_context_depth(1)
///     .with_budget(Budget::steps(10_000));
/// assert_eq!(config.entry.as_deref(), Some("main"));
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Entry function. `None` analyses every call-graph root.
    pub entry: Option<String>,
    /// Call-string length kept in a context.
    pub max_context_depth: usize,
    /// Visits of a block (or rounds of a recursive activation) before widening.
    pub max_widen_iterations: usize,
    /// Descending rounds after the widened fixpoint.
    pub narrowing_iterations: usize,
    pub budget: Budget,
    /// The summary cache has `2^cache_bits` slots.
    pub cache_bits: usize,
    /// Report a straddling index as unsafe when its offending part is finite.
    pub promote_bounded_violations: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            entry: Some("main".to_string()),
            max_context_depth: 2,
            max_widen_iterations: 3,
            narrowing_iterations: 2,
            budget: Budget::unlimited(),
            cache_bits: 10,
            promote_bounded_violations: true,
        }
    }
}

impl AnalysisConfig {
    pub fn with_entry(mut self, entry: Option<&str>) -> Self {
        self.entry = entry.map(str::to_string);
        self
    }

    pub fn with_max_context_depth(mut self, depth: usize) -> Self {
        self.max_context_depth = depth;
        self
    }

    pub fn with_max_widen_iterations(mut self, iterations: usize) -> Self {
        self.max_widen_iterations = iterations;
        self
    }

    pub fn with_narrowing_iterations(mut self, iterations: usize) -> Self {
        self.narrowing_iterations = iterations;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_cache_bits(mut self, bits: usize) -> Self {
        self.cache_bits = bits;
        self
    }

    pub fn with_promote_bounded_violations(mut self, promote: bool) -> Self {
        self.promote_bounded_violations = promote;
        self
    }
}
