//! Type-safe identifiers for program entities.
//!
//! Functions, blocks, call sites, access sites and contexts are all addressed
//! by small integer handles. The newtypes keep them from being mixed up.
//! Block ids are local to their function; every other id is program-wide.

use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from a raw index.
            ///
            /// # Panics
            ///
            /// Panics if `index` does not fit in `u32`.
            pub fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect(concat!(stringify!($name), " overflow")))
            }

            /// Returns the raw index.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> Self {
                id.index()
            }
        }
    };
}

id_type!(
    /// A function of the analysed program.
    FunctionId,
    "F"
);

id_type!(
    /// A basic block, local to its function.
    BlockId,
    "B"
);

id_type!(
    /// A call site.
    CallSiteId,
    "C"
);

id_type!(
    /// An array-access site: a bug-site candidate.
    SiteId,
    "S"
);

id_type!(
    /// An interned calling context. `ContextId(0)` is always the empty call string.
    ContextId,
    "ctx"
);

impl ContextId {
    /// The empty call string, used for entry functions.
    pub const ROOT: ContextId = ContextId(0);
}

/// Source position reported back to the user.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let b0 = BlockId::new(0);
        let b1 = BlockId::new(1);
        assert_eq!(b1.index(), 1);
        assert!(b0 < b1);
        assert_eq!(b1.to_string(), "B1");
        assert_eq!(CallSiteId::new(7).to_string(), "C7");
        assert_eq!(ContextId::ROOT.index(), 0);
    }

    #[test]
    fn test_location_order() {
        assert!(Location::new(3, 9) < Location::new(4, 1));
        assert_eq!(Location::new(31, 7).to_string(), "31:7");
    }
}
