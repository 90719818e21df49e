//! Call graph: callee resolution, recursion flags and roots.

use std::collections::BTreeSet;

use crate::cfg::Program;
use crate::types::{CallSiteId, FunctionId};

/// What a call site resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Function(FunctionId),
    /// A declared library function: returns `⊤`.
    External(String),
    /// Neither defined nor declared.
    Unresolved(String),
}

#[derive(Debug, Clone)]
pub struct CallGraph {
    targets: Vec<Callee>,
    callers: Vec<BTreeSet<FunctionId>>,
    sccs: Vec<Vec<FunctionId>>,
    scc_of: Vec<usize>,
    recursive: Vec<bool>,
}

impl CallGraph {
    pub fn build(program: &Program) -> Self {
        let n = program.functions().len();
        let mut targets = Vec::with_capacity(program.call_sites().len());
        let mut callees = vec![BTreeSet::new(); n];
        let mut callers = vec![BTreeSet::new(); n];

        for call in program.call_sites() {
            let target = match program.function_by_name(&call.callee) {
                Some(f) => {
                    callees[call.caller.index()].insert(f.id);
                    callers[f.id.index()].insert(call.caller);
                    Callee::Function(f.id)
                }
                None if program.is_external(&call.callee) => Callee::External(call.callee.clone()),
                None => Callee::Unresolved(call.callee.clone()),
            };
            targets.push(target);
        }

        let sccs = Tarjan::new(&callees).run();
        let mut scc_of = vec![0; n];
        for (i, scc) in sccs.iter().enumerate() {
            for f in scc {
                scc_of[f.index()] = i;
            }
        }
        let recursive = (0..n)
            .map(|f| sccs[scc_of[f]].len() > 1 || callees[f].contains(&FunctionId::new(f)))
            .collect();

        Self {
            targets,
            callers,
            sccs,
            scc_of,
            recursive,
        }
    }

    pub fn resolve(&self, call_site: CallSiteId) -> &Callee {
        &self.targets[call_site.index()]
    }

    fn same_scc(&self, a: FunctionId, b: FunctionId) -> bool {
        self.scc_of[a.index()] == self.scc_of[b.index()]
    }

    /// Whether `f` can (transitively) call itself.
    pub fn is_recursive(&self, f: FunctionId) -> bool {
        self.recursive[f.index()]
    }

    /// Functions that no other function calls, callees first.
    ///
    /// A root SCC that is only entered through recursion has no caller outside
    /// itself; its smallest member stands for it.
    pub fn roots(&self) -> Vec<FunctionId> {
        let mut roots = Vec::new();
        for scc in &self.sccs {
            let called_from_outside = scc
                .iter()
                .any(|f| self.callers[f.index()].iter().any(|c| !self.same_scc(*c, *f)));
            if !called_from_outside {
                if let Some(&first) = scc.iter().min() {
                    roots.push(first);
                }
            }
        }
        roots
    }
}

/// Tarjan's algorithm. Emits components in reverse topological order.
struct Tarjan<'a> {
    edges: &'a [BTreeSet<FunctionId>],
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    out: Vec<Vec<FunctionId>>,
}

impl<'a> Tarjan<'a> {
    fn new(edges: &'a [BTreeSet<FunctionId>]) -> Self {
        let n = edges.len();
        Self {
            edges,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<FunctionId>> {
        for v in 0..self.edges.len() {
            if self.index[v].is_none() {
                self.visit(v);
            }
        }
        self.out
    }

    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.lowlink[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let edges = self.edges;
        for w in &edges[v] {
            let w = w.index();
            match self.index[w] {
                None => {
                    self.visit(w);
                    self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                }
                Some(iw) if self.on_stack[w] => {
                    self.lowlink[v] = self.lowlink[v].min(iw);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlink[v]) == self.index[v] {
            let mut scc = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                scc.push(FunctionId::new(w));
                if w == v {
                    break;
                }
            }
            scc.sort();
            self.out.push(scc);
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfg::ProgramBuilder;
    use crate::expr::Expr;
    use crate::types::Location;

    fn id(program: &Program, name: &str) -> FunctionId {
        program.function_by_name(name).unwrap().id
    }

    #[test]
    fn test_resolution_and_order() {
        let mut builder = ProgramBuilder::new();
        builder.declare_external("printf");
        let main = builder.function("main", &[]);
        let e = main.entry();
        main.call(e, None, "bar", vec![Expr::constant(1)], Location::new(1, 1))
            .call(e, None, "printf", vec![], Location::new(2, 1))
            .call(e, None, "mystery", vec![], Location::new(3, 1));
        let bar = builder.function("bar", &["a"]);
        let e = bar.entry();
        bar.call(e, None, "foo", vec![Expr::var("a")], Location::new(4, 1));
        builder.function("foo", &["x"]);

        let program = builder.build().unwrap();
        let cg = CallGraph::build(&program);

        assert_eq!(cg.resolve(CallSiteId::new(0)), &Callee::Function(id(&program, "bar")));
        assert_eq!(cg.resolve(CallSiteId::new(1)), &Callee::External("printf".into()));
        assert_eq!(cg.resolve(CallSiteId::new(2)), &Callee::Unresolved("mystery".into()));

        assert_eq!(cg.roots(), vec![id(&program, "main")]);
        assert!(!cg.is_recursive(id(&program, "main")));
        assert!(!cg.is_recursive(id(&program, "foo")));
    }

    #[test]
    fn test_recursion() {
        let mut builder = ProgramBuilder::new();
        let f = builder.function("even", &["n"]);
        let e = f.entry();
        f.call(e, None, "odd", vec![Expr::var("n")], Location::default());
        let g = builder.function("odd", &["n"]);
        let e = g.entry();
        g.call(e, None, "even", vec![Expr::var("n")], Location::default());
        let h = builder.function("self", &["n"]);
        let e = h.entry();
        h.call(e, None, "self", vec![Expr::var("n")], Location::default());

        let program = builder.build().unwrap();
        let cg = CallGraph::build(&program);

        let even = id(&program, "even");
        let odd = id(&program, "odd");
        assert!(cg.is_recursive(even));
        assert!(cg.is_recursive(odd));
        assert!(cg.same_scc(even, odd));
        assert!(!cg.same_scc(even, id(&program, "self")));
        assert!(cg.is_recursive(id(&program, "self")));
        assert_eq!(cg.roots(), vec![even, id(&program, "self")]);
    }
}
