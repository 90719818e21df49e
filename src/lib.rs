//! # reach-rs: bug reachability through interval analysis
//!
//! **`reach-rs`** decides, for every array access of a program, whether some
//! call path and combination of branch conditions can drive the index outside
//! `[0, capacity)`. It is an interprocedural, path-sensitive and
//! context-sensitive abstract interpreter over the interval domain.
//!
//! ## How it works
//!
//! - **Intervals with equalities**: every variable carries an [`Interval`][crate::interval::Interval];
//!   copies such as `b = a + 2` are also remembered as affine equalities, so a guard like `a > b`
//!   is recognised as infeasible.
//! - **Fixpoint per function**: a worklist over the CFG joins states at merges, widens at loop
//!   heads after a few visits, and narrows afterwards. Branches refine states with their predicate.
//! - **Demand-driven calls**: at a call, argument ranges are bound to the callee parameters and the
//!   callee is analysed in a bounded call-string context. Summaries are cached; recursion is
//!   iterated to a fixpoint with widening.
//! - **Verdicts**: each access site observed in a context becomes reachable-unsafe,
//!   unreachable-safe or unknown, with a witness path for unsafe ones.
//!
//! ## Basic Usage
//!
//! ```rust
//! use reach_rs::analysis::Analyzer;
//! use reach_rs::cfg::ProgramBuilder;
//! use reach_rs::config::AnalysisConfig;
//! use reach_rs::expr::Expr;
//! use reach_rs::interval::Interval;
//! use reach_rs::types::Location;
//! use reach_rs::verdict::{Reason, VerdictKind};
//!
//! let mut builder = ProgramBuilder::new();
//!
//! // int get(int i) { int arr[10]; if (i < 10) return arr[i]; return 0; }
//! let get = builder.function("get", &["i"]);
//! let entry = get.entry();
//! let then = get.new_block("then");
//! let exit = get.new_block("exit");
//! get.declare_array("arr", 10)
//!     .branch(entry, Expr::var("i").lt(Expr::constant(10)), then, exit)
//!     .read(then, "arr", Expr::var("i"), Location::new(1, 45))
//!     .ret(then, Some(Expr::constant(0)))
//!     .ret(exit, Some(Expr::constant(0)));
//!
//! // int main() { return get(input in [0, 20]); }
//! let main = builder.function("main", &[]);
//! let entry = main.entry();
//! main.input(entry, "n", Interval::from_bounds(0, 20))
//!     .call(entry, Some("r"), "get", vec![Expr::var("n")], Location::new(2, 21))
//!     .ret(entry, Some(Expr::var("r")));
//!
//! let program = builder.build().unwrap();
//! let report = Analyzer::new(&program, AnalysisConfig::default()).run().unwrap();
//!
//! assert_eq!(report.verdicts.len(), 1);
//! assert_eq!(report.verdicts[0].kind, VerdictKind::UnreachableSafe);
//! assert_eq!(report.verdicts[0].reason, Reason::InBounds);
//! ```
//!
//! ## Core Components
//!
//! - **[`interval`]**, **[`state`]**: the abstract domain.
//! - **[`cfg`]**, **[`callgraph`]**, **[`context`]**: the program model.
//! - **[`fixpoint`]**, **[`driver`]**: intra- and interprocedural analysis.
//! - **[`verdict`]**, **[`analysis`]**: classification and the top-level entry point.
//! - **[`dot`]**: Graphviz export of annotated CFGs.

pub mod analysis;
pub mod bound;
pub mod budget;
pub mod cache;
pub mod callgraph;
pub mod cfg;
pub mod config;
pub mod context;
pub mod coverage;
pub mod domain;
pub mod dot;
pub mod driver;
pub mod error;
pub mod expr;
pub mod fixpoint;
pub mod interval;
pub mod state;
pub mod types;
pub mod utils;
pub mod verdict;
