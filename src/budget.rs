//! Step and wall-clock limits for a run.

use std::time::{Duration, Instant};

use log::warn;

/// Limits on a single run. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Budget {
    /// Maximum number of block transfers.
    pub max_steps: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn steps(max_steps: u64) -> Self {
        Self {
            max_steps: Some(max_steps),
            time_limit: None,
        }
    }

    pub fn time(limit: Duration) -> Self {
        Self {
            max_steps: None,
            time_limit: Some(limit),
        }
    }
}

/// Counts steps against a [`Budget`]. Once exhausted, stays exhausted.
#[derive(Debug)]
pub struct BudgetTracker {
    budget: Budget,
    steps: u64,
    start: Instant,
    exhausted: bool,
}

impl BudgetTracker {
    const CLOCK_PERIOD: u64 = 64;

    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            steps: 0,
            start: Instant::now(),
            exhausted: false,
        }
    }

    /// Consume one step. Returns `false` once the budget is exhausted.
    pub fn tick(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        self.steps += 1;
        if let Some(max) = self.budget.max_steps {
            if self.steps > max {
                self.exhaust();
                return false;
            }
        }
        if let Some(limit) = self.budget.time_limit {
            if self.steps % Self::CLOCK_PERIOD == 0 && self.start.elapsed() > limit {
                self.exhaust();
                return false;
            }
        }
        true
    }

    fn exhaust(&mut self) {
        warn!("analysis budget exhausted after {} steps ({:?})", self.steps, self.start.elapsed());
        self.exhausted = true;
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
