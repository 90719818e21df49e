//! Control-flow graph model and the builder used to construct programs.
//!
//! A [`Program`] owns every [`Function`], [`CallSite`] and [`AccessSite`].
//! It is immutable once [`ProgramBuilder::build`] has validated it.
//!
//! ```rust
//! use reach_rs::cfg::ProgramBuilder;
//! use reach_rs::expr::Expr;
//! use reach_rs::interval::Interval;
//! use reach_rs::types::Location;
//!
//! let mut builder = ProgramBuilder::new();
//! let main = builder.function("main", &[]);
//! let entry = main.entry();
//! main.declare_array("buf", 4)
//!     .input(entry, "i", Interval::from_bounds(0, 9))
//!     .write(entry, "buf", Expr::var("i"), Location::new(3, 5))
//!     .ret(entry, None);
//!
//! let program = builder.build().unwrap();
//! assert_eq!(program.sites().len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::error::{Error, Result};
use crate::expr::{Expr, Predicate, Var};
use crate::interval::Interval;
use crate::types::{BlockId, CallSiteId, FunctionId, Location, SiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign { var: Var, expr: Expr },
    /// Value from the outside world, such as a byte of `argv` or a `scanf` result.
    Input { var: Var, range: Interval },
    /// Array access; the index and capacity live in the [`AccessSite`].
    Access { site: SiteId },
    Call { dest: Option<Var>, site: CallSiteId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        condition: Predicate,
        if_true: BlockId,
        if_false: BlockId,
    },
    Return(Option<Expr>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch { if_true, if_false, .. } => vec![*if_true, *if_false],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub label: String,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Var>,
    pub entry: BlockId,
    pub blocks: Vec<Block>,
    /// Declared arrays and their capacities.
    pub arrays: BTreeMap<String, u64>,
}

impl Function {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Call sites made from this function, in block order.
    pub fn call_sites(&self) -> impl Iterator<Item = CallSiteId> + '_ {
        self.blocks.iter().flat_map(|b| {
            b.statements.iter().filter_map(|s| match s {
                Statement::Call { site, .. } => Some(*site),
                _ => None,
            })
        })
    }

    /// Access sites inside this function, in block order.
    pub fn access_sites(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.blocks.iter().flat_map(|b| {
            b.statements.iter().filter_map(|s| match s {
                Statement::Access { site } => Some(*site),
                _ => None,
            })
        })
    }
}

#[derive(Debug, Clone)]
pub struct CallSite {
    pub id: CallSiteId,
    pub caller: FunctionId,
    pub block: BlockId,
    /// Callee name, resolved by [`CallGraph`](crate::callgraph::CallGraph).
    pub callee: String,
    pub args: Vec<Expr>,
    pub dest: Option<Var>,
    pub location: Location,
}

/// An array access: a bug-site candidate.
#[derive(Debug, Clone)]
pub struct AccessSite {
    pub id: SiteId,
    pub function: FunctionId,
    pub block: BlockId,
    pub array: String,
    pub capacity: u64,
    pub index: Expr,
    pub kind: AccessKind,
    pub location: Location,
}

/// Whole program: the immutable input of an analysis run.
#[derive(Debug, Clone)]
pub struct Program {
    functions: Vec<Function>,
    externals: BTreeSet<String>,
    call_sites: Vec<CallSite>,
    sites: Vec<AccessSite>,
    by_name: HashMap<String, FunctionId>,
}

impl Program {
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.by_name.get(name).map(|&id| self.function(id))
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.externals.contains(name)
    }

    pub fn externals(&self) -> impl Iterator<Item = &str> {
        self.externals.iter().map(String::as_str)
    }

    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    pub fn call_site(&self, id: CallSiteId) -> &CallSite {
        &self.call_sites[id.index()]
    }

    pub fn sites(&self) -> &[AccessSite] {
        &self.sites
    }

    pub fn site(&self, id: SiteId) -> &AccessSite {
        &self.sites[id.index()]
    }
}

struct CallDraft {
    block: BlockId,
    callee: String,
    args: Vec<Expr>,
    dest: Option<Var>,
    location: Location,
}

struct AccessDraft {
    block: BlockId,
    array: String,
    index: Expr,
    kind: AccessKind,
    location: Location,
}

struct BlockDraft {
    label: String,
    statements: Vec<Statement>,
    terminator: Option<Terminator>,
}

/// Builds one function. Obtained from [`ProgramBuilder::function`].
///
/// Call and access ids handed out here are local to the function; they are
/// renumbered program-wide by [`ProgramBuilder::build`]. A `block` not
/// created by this builder is reported by `build` as [`Error::UnknownBlock`].
pub struct FunctionBuilder {
    name: String,
    params: Vec<Var>,
    blocks: Vec<BlockDraft>,
    arrays: BTreeMap<String, u64>,
    calls: Vec<CallDraft>,
    accesses: Vec<AccessDraft>,
    unknown_blocks: Vec<BlockId>,
}

impl FunctionBuilder {
    fn new(name: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| Var::new(*p)).collect(),
            blocks: vec![BlockDraft {
                label: "entry".to_string(),
                statements: Vec::new(),
                terminator: None,
            }],
            arrays: BTreeMap::new(),
            calls: Vec::new(),
            accesses: Vec::new(),
            unknown_blocks: Vec::new(),
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    pub fn new_block(&mut self, label: &str) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BlockDraft {
            label: label.to_string(),
            statements: Vec::new(),
            terminator: None,
        });
        id
    }

    pub fn declare_array(&mut self, name: &str, capacity: u64) -> &mut Self {
        self.arrays.insert(name.to_string(), capacity);
        self
    }

    fn push(&mut self, block: BlockId, statement: Statement) -> &mut Self {
        match self.blocks.get_mut(block.index()) {
            Some(draft) => draft.statements.push(statement),
            None => self.unknown_blocks.push(block),
        }
        self
    }

    pub fn assign(&mut self, block: BlockId, var: &str, expr: Expr) -> &mut Self {
        self.push(block, Statement::Assign { var: Var::new(var), expr })
    }

    pub fn input(&mut self, block: BlockId, var: &str, range: Interval) -> &mut Self {
        self.push(block, Statement::Input { var: Var::new(var), range })
    }

    pub fn access(&mut self, block: BlockId, array: &str, index: Expr, kind: AccessKind, location: Location) -> &mut Self {
        let site = SiteId::new(self.accesses.len());
        self.accesses.push(AccessDraft {
            block,
            array: array.to_string(),
            index,
            kind,
            location,
        });
        self.push(block, Statement::Access { site })
    }

    pub fn read(&mut self, block: BlockId, array: &str, index: Expr, location: Location) -> &mut Self {
        self.access(block, array, index, AccessKind::Read, location)
    }

    pub fn write(&mut self, block: BlockId, array: &str, index: Expr, location: Location) -> &mut Self {
        self.access(block, array, index, AccessKind::Write, location)
    }

    pub fn call(&mut self, block: BlockId, dest: Option<&str>, callee: &str, args: Vec<Expr>, location: Location) -> &mut Self {
        let site = CallSiteId::new(self.calls.len());
        let dest = dest.map(Var::new);
        self.calls.push(CallDraft {
            block,
            callee: callee.to_string(),
            args,
            dest: dest.clone(),
            location,
        });
        self.push(block, Statement::Call { dest, site })
    }

    fn terminate(&mut self, block: BlockId, terminator: Terminator) -> &mut Self {
        match self.blocks.get_mut(block.index()) {
            Some(draft) => draft.terminator = Some(terminator),
            None => self.unknown_blocks.push(block),
        }
        self
    }

    pub fn jump(&mut self, block: BlockId, target: BlockId) -> &mut Self {
        self.terminate(block, Terminator::Jump(target))
    }

    pub fn branch(&mut self, block: BlockId, condition: Predicate, if_true: BlockId, if_false: BlockId) -> &mut Self {
        self.terminate(
            block,
            Terminator::Branch {
                condition,
                if_true,
                if_false,
            },
        )
    }

    pub fn ret(&mut self, block: BlockId, value: Option<Expr>) -> &mut Self {
        self.terminate(block, Terminator::Return(value))
    }

    pub fn unreachable(&mut self, block: BlockId) -> &mut Self {
        self.terminate(block, Terminator::Unreachable)
    }
}

/// Stand-in for a front end: assembles and validates a [`Program`].
#[derive(Default)]
pub struct ProgramBuilder {
    functions: Vec<FunctionBuilder>,
    externals: BTreeSet<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a library function such as `printf`, modelled as returning `⊤`.
    pub fn declare_external(&mut self, name: &str) -> &mut Self {
        self.externals.insert(name.to_string());
        self
    }

    pub fn function(&mut self, name: &str, params: &[&str]) -> &mut FunctionBuilder {
        let index = self.functions.len();
        self.functions.push(FunctionBuilder::new(name, params));
        &mut self.functions[index]
    }

    pub fn build(self) -> Result<Program> {
        let mut by_name = HashMap::new();
        for (i, f) in self.functions.iter().enumerate() {
            if by_name.insert(f.name.clone(), FunctionId::new(i)).is_some() {
                return Err(Error::DuplicateFunction(f.name.clone()));
            }
            if self.externals.contains(&f.name) {
                return Err(Error::ConflictingExternal(f.name.clone()));
            }
        }

        let mut functions = Vec::with_capacity(self.functions.len());
        let mut call_sites = Vec::new();
        let mut sites = Vec::new();

        for (i, draft) in self.functions.into_iter().enumerate() {
            let id = FunctionId::new(i);
            let call_base = call_sites.len();
            let site_base = sites.len();
            let num_blocks = draft.blocks.len();
            if let Some(&block) = draft.unknown_blocks.first() {
                return Err(Error::UnknownBlock {
                    function: draft.name,
                    block,
                });
            }

            for call in draft.calls {
                call_sites.push(CallSite {
                    id: CallSiteId::new(call_sites.len()),
                    caller: id,
                    block: call.block,
                    callee: call.callee,
                    args: call.args,
                    dest: call.dest,
                    location: call.location,
                });
            }

            for access in draft.accesses {
                let Some(&capacity) = draft.arrays.get(&access.array) else {
                    return Err(Error::UndeclaredArray {
                        function: draft.name.clone(),
                        array: access.array,
                    });
                };
                sites.push(AccessSite {
                    id: SiteId::new(sites.len()),
                    function: id,
                    block: access.block,
                    array: access.array,
                    capacity,
                    index: access.index,
                    kind: access.kind,
                    location: access.location,
                });
            }

            let mut blocks = Vec::with_capacity(num_blocks);
            for (b, block) in draft.blocks.into_iter().enumerate() {
                let block_id = BlockId::new(b);
                let terminator = block.terminator.unwrap_or(Terminator::Return(None));
                if let Some(target) = terminator.successors().into_iter().find(|t| t.index() >= num_blocks) {
                    return Err(Error::DanglingTarget {
                        function: draft.name.clone(),
                        block: block_id,
                        target,
                    });
                }
                let statements = block
                    .statements
                    .into_iter()
                    .map(|s| match s {
                        Statement::Access { site } => Statement::Access {
                            site: SiteId::new(site_base + site.index()),
                        },
                        Statement::Call { dest, site } => Statement::Call {
                            dest,
                            site: CallSiteId::new(call_base + site.index()),
                        },
                        other => other,
                    })
                    .collect();
                blocks.push(Block {
                    id: block_id,
                    label: block.label,
                    statements,
                    terminator,
                });
            }

            functions.push(Function {
                id,
                name: draft.name,
                params: draft.params,
                entry: BlockId::new(0),
                blocks,
                arrays: draft.arrays,
            });
        }

        for call in &call_sites {
            if let Some(&callee) = by_name.get(&call.callee) {
                let expected = functions[callee.index()].params.len();
                if expected != call.args.len() {
                    return Err(Error::ArityMismatch {
                        callee: call.callee.clone(),
                        location: call.location,
                        expected,
                        found: call.args.len(),
                    });
                }
            }
        }

        Ok(Program {
            functions,
            externals: self.externals,
            call_sites,
            sites,
            by_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_build_renumbers_sites() {
        let mut builder = ProgramBuilder::new();
        builder.declare_external("printf");

        let foo = builder.function("foo", &["x"]);
        let entry = foo.entry();
        foo.declare_array("arr", 10)
            .write(entry, "arr", Expr::var("x"), Location::new(5, 3))
            .ret(entry, None);

        let main = builder.function("main", &[]);
        let entry = main.entry();
        let exit = main.new_block("exit");
        main.declare_array("buf", 2)
            .call(entry, None, "foo", vec![Expr::constant(1)], Location::new(9, 3))
            .call(entry, None, "printf", vec![], Location::new(10, 3))
            .read(entry, "buf", Expr::constant(0), Location::new(11, 3))
            .jump(entry, exit);

        let program = builder.build().unwrap();
        assert_eq!(program.functions().len(), 2);
        assert_eq!(program.sites().len(), 2);
        assert_eq!(program.call_sites().len(), 2);

        let main = program.function_by_name("main").unwrap();
        assert_eq!(main.access_sites().collect::<Vec<_>>(), vec![SiteId::new(1)]);
        assert_eq!(main.call_sites().count(), 2);
        assert_eq!(program.site(SiteId::new(1)).capacity, 2);
        assert_eq!(main.block(exit).terminator, Terminator::Return(None));
        assert!(program.is_external("printf"));
    }

    #[test]
    fn test_duplicate_function() {
        let mut builder = ProgramBuilder::new();
        builder.function("f", &[]);
        builder.function("f", &[]);
        assert_eq!(builder.build().unwrap_err(), Error::DuplicateFunction("f".into()));
    }

    #[test]
    fn test_undeclared_array() {
        let mut builder = ProgramBuilder::new();
        let f = builder.function("f", &[]);
        let entry = f.entry();
        f.read(entry, "missing", Expr::constant(0), Location::default());
        assert!(matches!(builder.build(), Err(Error::UndeclaredArray { .. })));
    }

    #[test]
    fn test_dangling_target() {
        let mut builder = ProgramBuilder::new();
        let f = builder.function("f", &[]);
        let entry = f.entry();
        f.jump(entry, BlockId::new(7));
        assert!(matches!(builder.build(), Err(Error::DanglingTarget { .. })));
    }

    #[test]
    fn test_block_from_another_builder() {
        let mut builder = ProgramBuilder::new();
        let f = builder.function("f", &[]);
        let foreign = f.new_block("only_in_f");
        let g = builder.function("g", &[]);
        g.declare_array("buf", 2)
            .write(foreign, "buf", Expr::constant(0), Location::new(4, 3))
            .ret(foreign, None);
        assert_eq!(
            builder.build().unwrap_err(),
            Error::UnknownBlock {
                function: "g".into(),
                block: foreign,
            }
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let mut builder = ProgramBuilder::new();
        builder.function("callee", &["a", "b"]);
        let f = builder.function("caller", &[]);
        let entry = f.entry();
        f.call(entry, None, "callee", vec![Expr::constant(1)], Location::new(2, 1));
        let err = builder.build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "call to `callee` at 2:1 passes 1 arguments, expected 2"
        );
    }

    #[test]
    fn test_conflicting_external() {
        let mut builder = ProgramBuilder::new();
        builder.declare_external("f");
        builder.function("f", &[]);
        assert_eq!(builder.build().unwrap_err(), Error::ConflictingExternal("f".into()));
    }
}
