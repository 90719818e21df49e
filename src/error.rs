//! Errors and non-fatal diagnostics.

use std::fmt;

use thiserror::Error;

use crate::types::{BlockId, CallSiteId, ContextId, FunctionId, Location};

/// Rejected program or run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("function `{0}` is defined more than once")]
    DuplicateFunction(String),

    #[error("block {block} of `{function}` refers to missing block {target}")]
    DanglingTarget {
        function: String,
        block: BlockId,
        target: BlockId,
    },

    #[error("`{function}` has no block {block}")]
    UnknownBlock { function: String, block: BlockId },

    #[error("array `{array}` is not declared in `{function}`")]
    UndeclaredArray { function: String, array: String },

    #[error("call to `{callee}` at {location} passes {found} arguments, expected {expected}")]
    ArityMismatch {
        callee: String,
        location: Location,
        expected: usize,
        found: usize,
    },

    #[error("`{0}` is declared both as a function and as external")]
    ConflictingExternal(String),

    #[error("entry function `{0}` not found")]
    UnknownEntry(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Problem recovered from during a run and reflected in the verdicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A call to a function that is neither defined nor declared external.
    UnresolvedCallee {
        caller: FunctionId,
        context: ContextId,
        call_site: CallSiteId,
        callee: String,
        location: Location,
    },
    /// The step or time budget ran out before the fixpoint was reached.
    BudgetExhausted { steps: u64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvedCallee {
                callee, location, context, ..
            } => write!(f, "unresolved callee `{}` at {} in {}", callee, location, context),
            Diagnostic::BudgetExhausted { steps } => write!(f, "analysis budget exhausted after {} steps", steps),
        }
    }
}
