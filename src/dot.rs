//! CFG to DOT (Graphviz) conversion.
//!
//! The generated DOT output follows these conventions:
//! - **Blocks** are boxes labelled with the block id, label and statements
//! - **Reached blocks** (per [`Coverage`]) are filled, unreached ones are grey
//! - **Edges**: solid for jumps and true branches, dashed for false branches
//! - **Access sites** flagged unsafe by a verdict are highlighted
//!
//! # Examples
//!
//! ```
//! use reach_rs::cfg::ProgramBuilder;
//! use reach_rs::dot::function_to_dot;
//! use reach_rs::expr::Expr;
//!
//! let mut builder = ProgramBuilder::new();
//! let f = builder.function("f", &["x"]);
//! let entry = f.entry();
//! let exit = f.new_block("exit");
//! f.branch(entry, Expr::var("x").gt(Expr::constant(0)), exit, exit);
//! let program = builder.build().unwrap();
//!
//! let dot = function_to_dot(&program, &program.functions()[0], None, &[]).unwrap();
//! // Render with: dot -Tpng f.dot -o f.png
//! assert!(dot.contains("x > 0"));
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::cfg::{Function, Program, Statement, Terminator};
use crate::coverage::Coverage;
use crate::types::SiteId;
use crate::verdict::Verdict;

/// Configuration options for DOT output generation.
///
/// ```
/// use reach_rs::dot::DotConfig;
///
/// let config = DotConfig {
///     show_statements: false,
///     ..DotConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for blocks (default: "box")
    pub block_shape: &'static str,
    /// Fill colour for reached blocks (default: "palegreen")
    pub reached_color: &'static str,
    /// Fill colour for unreached blocks (default: "lightgrey")
    pub unreached_color: &'static str,
    /// Font colour for statements at unsafe sites (default: "red")
    pub unsafe_color: &'static str,
    /// Style for jumps and true edges (default: "solid")
    pub true_edge_style: &'static str,
    /// Style for false edges (default: "dashed")
    pub false_edge_style: &'static str,
    /// Whether to list statements inside blocks (default: true)
    pub show_statements: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            block_shape: "box",
            reached_color: "palegreen",
            unreached_color: "lightgrey",
            unsafe_color: "red",
            true_edge_style: "solid",
            false_edge_style: "dashed",
            show_statements: true,
        }
    }
}

/// Renders `function` with the default [`DotConfig`].
pub fn function_to_dot(
    program: &Program,
    function: &Function,
    coverage: Option<&Coverage>,
    verdicts: &[Verdict],
) -> Result<String, std::fmt::Error> {
    function_to_dot_with_config(program, function, coverage, verdicts, &DotConfig::default())
}

/// Renders `function` as a directed graph.
///
/// Without `coverage`, blocks are not filled. Sites with a
/// reachable-unsafe verdict in `verdicts` are highlighted.
pub fn function_to_dot_with_config(
    program: &Program,
    function: &Function,
    coverage: Option<&Coverage>,
    verdicts: &[Verdict],
    config: &DotConfig,
) -> Result<String, std::fmt::Error> {
    let unsafe_sites: BTreeSet<SiteId> = verdicts.iter().filter(|v| v.is_unsafe()).map(|v| v.site).collect();

    let mut dot = String::new();
    writeln!(dot, "digraph \"{}\" {{", escape(&function.name))?;
    writeln!(dot, "node [shape={}, fontname=monospace];", config.block_shape)?;

    for block in &function.blocks {
        let mut label = format!("{}: {}\\l", block.id, escape(&block.label));
        let mut flagged = false;
        if config.show_statements {
            for statement in &block.statements {
                let line = match statement {
                    Statement::Assign { var, expr } => format!("{} = {}", var, expr),
                    Statement::Input { var, range } => format!("{} = input {}", var, range),
                    Statement::Access { site } => {
                        let access = program.site(*site);
                        flagged |= unsafe_sites.contains(site);
                        format!(
                            "{} {}[{}] (cap {})",
                            access.kind, access.array, access.index, access.capacity
                        )
                    }
                    Statement::Call { dest, site } => {
                        let call = program.call_site(*site);
                        let args: Vec<String> = call.args.iter().map(|a| a.to_string()).collect();
                        match dest {
                            Some(d) => format!("{} = {}({})", d, call.callee, args.join(", ")),
                            None => format!("{}({})", call.callee, args.join(", ")),
                        }
                    }
                };
                write!(label, "{}\\l", escape(&line))?;
            }
        }
        match &block.terminator {
            Terminator::Return(Some(e)) => write!(label, "return {}\\l", escape(&e.to_string()))?,
            Terminator::Return(None) => write!(label, "return\\l")?,
            Terminator::Unreachable => write!(label, "unreachable\\l")?,
            Terminator::Jump(_) | Terminator::Branch { .. } => {}
        }

        let mut attrs = format!("label=\"{}\"", label);
        if let Some(coverage) = coverage {
            let color = if coverage.is_reached(function.id, block.id) {
                config.reached_color
            } else {
                config.unreached_color
            };
            write!(attrs, ", style=filled, fillcolor={}", color)?;
        }
        if flagged {
            write!(attrs, ", color={}, fontcolor={}", config.unsafe_color, config.unsafe_color)?;
        }
        writeln!(dot, "{} [{}];", block.id, attrs)?;
    }

    for block in &function.blocks {
        match &block.terminator {
            Terminator::Jump(target) => {
                writeln!(dot, "{} -> {} [style={}];", block.id, target, config.true_edge_style)?;
            }
            Terminator::Branch {
                condition,
                if_true,
                if_false,
            } => {
                let cond = escape(&condition.to_string());
                writeln!(
                    dot,
                    "{} -> {} [style={}, label=\"{}\"];",
                    block.id, if_true, config.true_edge_style, cond
                )?;
                writeln!(
                    dot,
                    "{} -> {} [style={}, label=\"!({})\"];",
                    block.id, if_false, config.false_edge_style, cond
                )?;
            }
            Terminator::Return(_) | Terminator::Unreachable => {}
        }
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
