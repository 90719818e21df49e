//! Intraprocedural fixpoint over one function's CFG.
//!
//! The analysis runs in three phases:
//!
//! 1. **Ascending**: a worklist of blocks, ordered by id. The incoming state
//!    of a successor is `old ⊔ new`; at loop heads, once the head has been
//!    visited `max_widen_iterations` times, it becomes `old ∇ (old ⊔ new)`.
//! 2. **Descending**: `narrowing_iterations` rounds recompute every incoming
//!    state from its predecessors and narrow the stable state with it.
//! 3. **Collection**: every block is walked once from its final state,
//!    recording a [`BugSiteCandidate`] per array access and the return value.
//!
//! Calls are delegated to a [`CallHandler`], which is how the interprocedural
//! driver plugs in.

use std::collections::BTreeSet;

use log::{debug, trace};

use crate::cache::Summary;
use crate::cfg::{CallSite, Function, Program, Statement, Terminator};
use crate::domain::Lattice;
use crate::interval::Interval;
use crate::state::AbstractState;
use crate::types::{BlockId, SiteId};

/// Callback for call statements.
pub trait CallHandler {
    /// Effect of executing `call` from the (feasible) `state`.
    fn call(&mut self, call: &CallSite, state: &AbstractState) -> Summary;

    /// Consume one step of the run budget. Returns `false` once exhausted.
    fn tick(&mut self) -> bool;
}

/// Index range observed at an access site under the reaching state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugSiteCandidate {
    pub site: SiteId,
    pub index: Interval,
    /// Whether the reaching state is non-bottom.
    pub feasible: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionResult {
    /// Incoming state of every block.
    pub states: Vec<AbstractState>,
    pub summary: Summary,
    pub candidates: Vec<BugSiteCandidate>,
    /// The budget ran out before the fixpoint was reached.
    pub interrupted: bool,
    pub widenings: usize,
    pub transfers: usize,
}

impl FunctionResult {
    /// Blocks reached by a feasible state.
    pub fn reached_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_unreachable())
            .map(|(i, _)| BlockId::new(i))
    }
}

/// Outgoing facts of one block.
#[derive(Debug, Default)]
pub struct BlockOutcome {
    pub successors: Vec<(BlockId, AbstractState)>,
    /// Returned value, if the block returns from a feasible state.
    pub ret: Option<Interval>,
}

pub struct IntraAnalyzer<'a> {
    program: &'a Program,
    pub max_widen_iterations: usize,
    pub narrowing_iterations: usize,
}

impl<'a> IntraAnalyzer<'a> {
    pub fn new(program: &'a Program, max_widen_iterations: usize, narrowing_iterations: usize) -> Self {
        Self {
            program,
            max_widen_iterations,
            narrowing_iterations,
        }
    }

    pub fn analyze(&self, function: &Function, entry: &AbstractState, handler: &mut dyn CallHandler) -> FunctionResult {
        let n = function.num_blocks();
        let mut states = vec![AbstractState::unreachable(); n];
        let mut visits = vec![0usize; n];
        let mut widenings = 0;
        let mut transfers = 0;
        let mut interrupted = false;

        let heads = loop_heads(function);

        states[function.entry.index()] = entry.clone();
        let mut worklist = BTreeSet::from([function.entry]);

        while let Some(block) = worklist.pop_first() {
            if !handler.tick() {
                interrupted = true;
                break;
            }
            transfers += 1;
            visits[block.index()] += 1;

            let outcome = self.transfer(function, block, &states[block.index()], handler, true, None);
            for (succ, out) in outcome.successors {
                let old = &states[succ.index()];
                let joined = old.join(&out);
                if joined.leq(old) {
                    continue;
                }
                let new = if heads[succ.index()] && visits[succ.index()] >= self.max_widen_iterations {
                    widenings += 1;
                    trace!("{}: widening at {}", function.name, succ);
                    old.widen(&joined)
                } else {
                    joined
                };
                states[succ.index()] = new;
                worklist.insert(succ);
            }
        }

        if !interrupted {
            debug!(
                "{}: ascending phase stable after {} transfers, {} widenings",
                function.name, transfers, widenings
            );
            for round in 0..self.narrowing_iterations {
                match self.narrow_round(function, entry, &mut states, handler) {
                    Some(count) => transfers += count,
                    None => {
                        interrupted = true;
                        break;
                    }
                }
                trace!("{}: narrowing round {} done", function.name, round + 1);
            }
        }

        // Collection. Once interrupted, calls are no longer evaluated.
        let mut candidates = Vec::new();
        let mut summary = Summary::bottom();
        for i in 0..n {
            let block = BlockId::new(i);
            let outcome = self.transfer(function, block, &states[i], handler, !interrupted, Some(&mut candidates));
            if let Some(ret) = outcome.ret {
                summary = summary.join(&Summary::new(ret, true));
            }
        }

        FunctionResult {
            states,
            summary,
            candidates,
            interrupted,
            widenings,
            transfers,
        }
    }

    /// One descending round. Returns the number of transfers, or `None` if
    /// the budget ran out.
    fn narrow_round(
        &self,
        function: &Function,
        entry: &AbstractState,
        states: &mut [AbstractState],
        handler: &mut dyn CallHandler,
    ) -> Option<usize> {
        let mut incoming = vec![AbstractState::unreachable(); states.len()];
        incoming[function.entry.index()] = entry.clone();
        let mut count = 0;
        for i in 0..states.len() {
            if states[i].is_unreachable() {
                continue;
            }
            if !handler.tick() {
                return None;
            }
            count += 1;
            let outcome = self.transfer(function, BlockId::new(i), &states[i], handler, true, None);
            for (succ, out) in outcome.successors {
                incoming[succ.index()] = incoming[succ.index()].join(&out);
            }
        }
        for (state, new) in states.iter_mut().zip(incoming) {
            *state = state.narrow(&new);
        }
        Some(count)
    }

    /// Abstract execution of one block from `state`.
    ///
    /// With `calls` unset, calls are not evaluated and their destination becomes `⊤`.
    /// With a sink, a candidate is recorded for every access, including under
    /// an unreachable state.
    pub fn transfer(
        &self,
        function: &Function,
        block: BlockId,
        state: &AbstractState,
        handler: &mut dyn CallHandler,
        calls: bool,
        mut sink: Option<&mut Vec<BugSiteCandidate>>,
    ) -> BlockOutcome {
        let block = function.block(block);
        let mut state = state.clone();

        for statement in &block.statements {
            match statement {
                Statement::Assign { var, expr } => state.assign(var, expr),
                Statement::Input { var, range } => state.havoc(var, *range),
                Statement::Access { site } => {
                    if let Some(sink) = sink.as_deref_mut() {
                        let access = self.program.site(*site);
                        sink.push(BugSiteCandidate {
                            site: *site,
                            index: state.eval(&access.index),
                            feasible: !state.is_unreachable(),
                        });
                    }
                }
                Statement::Call { dest, site } => {
                    if state.is_unreachable() {
                        continue;
                    }
                    let summary = if calls {
                        handler.call(self.program.call_site(*site), &state)
                    } else {
                        Summary::top()
                    };
                    if !summary.returns {
                        state = AbstractState::unreachable();
                        continue;
                    }
                    if let Some(dest) = dest {
                        state.havoc(dest, summary.ret);
                    }
                }
            }
        }

        let mut outcome = BlockOutcome::default();
        if state.is_unreachable() {
            return outcome;
        }
        match &block.terminator {
            Terminator::Jump(target) => outcome.successors.push((*target, state)),
            Terminator::Branch {
                condition,
                if_true,
                if_false,
            } => {
                let taken = state.assume_branch(condition, true);
                let fallthrough = state.assume_branch(condition, false);
                if !taken.is_unreachable() {
                    outcome.successors.push((*if_true, taken));
                }
                if !fallthrough.is_unreachable() {
                    outcome.successors.push((*if_false, fallthrough));
                }
            }
            Terminator::Return(value) => {
                outcome.ret = Some(value.as_ref().map_or_else(Interval::top, |e| state.eval(e)));
            }
            Terminator::Unreachable => {}
        }
        outcome
    }
}

/// Targets of DFS back edges from the entry: the blocks where widening applies.
fn loop_heads(function: &Function) -> Vec<bool> {
    let n = function.num_blocks();
    let mut heads = vec![false; n];
    let mut visited = vec![false; n];
    let mut on_stack = vec![false; n];
    let mut stack = vec![(function.entry, 0usize)];
    visited[function.entry.index()] = true;
    on_stack[function.entry.index()] = true;

    while let Some((block, next)) = stack.pop() {
        let succs = function.block(block).terminator.successors();
        match succs.get(next) {
            Some(&succ) => {
                stack.push((block, next + 1));
                if on_stack[succ.index()] {
                    heads[succ.index()] = true;
                } else if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    on_stack[succ.index()] = true;
                    stack.push((succ, 0));
                }
            }
            None => on_stack[block.index()] = false,
        }
    }
    heads
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfg::ProgramBuilder;
    use crate::expr::{Expr, Var};
    use crate::types::Location;

    /// Calls return a fixed summary.
    struct Stub {
        summary: Summary,
        steps: usize,
        limit: usize,
    }

    impl Stub {
        fn new(summary: Summary) -> Self {
            Self {
                summary,
                steps: 0,
                limit: usize::MAX,
            }
        }
    }

    impl CallHandler for Stub {
        fn call(&mut self, _call: &CallSite, _state: &AbstractState) -> Summary {
            self.summary.clone()
        }

        fn tick(&mut self) -> bool {
            self.steps += 1;
            self.steps <= self.limit
        }
    }

    /// `i = 0; while (i < 100) { arr[i] = 0; i = i + 1; } return i;`
    fn counting_loop() -> Program {
        let mut builder = ProgramBuilder::new();
        let f = builder.function("f", &[]);
        let entry = f.entry();
        let head = f.new_block("head");
        let body = f.new_block("body");
        let exit = f.new_block("exit");
        f.declare_array("arr", 100)
            .assign(entry, "i", Expr::constant(0))
            .jump(entry, head)
            .branch(head, Expr::var("i").lt(Expr::constant(100)), body, exit)
            .write(body, "arr", Expr::var("i"), Location::new(3, 9))
            .assign(body, "i", Expr::offset("i", 1))
            .jump(body, head)
            .ret(exit, Some(Expr::var("i")));
        builder.build().unwrap()
    }

    #[test]
    fn test_loop_terminates_and_narrows() {
        let program = counting_loop();
        let f = &program.functions()[0];
        let analyzer = IntraAnalyzer::new(&program, 3, 2);
        let result = analyzer.analyze(f, &AbstractState::new(), &mut Stub::new(Summary::top()));

        assert!(!result.interrupted);
        assert!(result.widenings > 0);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].index, Interval::from_bounds(0, 99));
        assert!(result.candidates[0].feasible);
        assert_eq!(result.summary, Summary::new(Interval::constant(100), true));
    }

    #[test]
    fn test_without_narrowing_loses_exit_bound() {
        let program = counting_loop();
        let f = &program.functions()[0];
        let analyzer = IntraAnalyzer::new(&program, 3, 0);
        let result = analyzer.analyze(f, &AbstractState::new(), &mut Stub::new(Summary::top()));

        // The guard still bounds the body; only the head keeps +∞.
        assert_eq!(result.candidates[0].index, Interval::from_bounds(0, 99));
        assert_eq!(result.states[1].get(&Var::new("i")), Interval::at_least(0));
    }

    #[test]
    fn test_infeasible_branch_records_bottom() {
        let mut builder = ProgramBuilder::new();
        let f = builder.function("f", &["a", "b"]);
        let entry = f.entry();
        let then = f.new_block("then");
        let exit = f.new_block("exit");
        f.declare_array("arr", 10)
            .branch(entry, Expr::var("a").gt(Expr::var("b")), then, exit)
            .write(then, "arr", Expr::var("b"), Location::new(29, 7))
            .jump(then, exit)
            .ret(exit, Some(Expr::constant(0)));
        let program = builder.build().unwrap();
        let f = &program.functions()[0];

        let mut entry_state = AbstractState::new();
        entry_state.set(&Var::new("a"), Interval::from_bounds(0, 255));
        entry_state.relate(&Var::new("b"), &Var::new("a"), 2);

        let analyzer = IntraAnalyzer::new(&program, 3, 1);
        let result = analyzer.analyze(f, &entry_state, &mut Stub::new(Summary::top()));
        assert_eq!(result.candidates.len(), 1);
        assert!(!result.candidates[0].feasible);
        assert_eq!(result.reached_blocks().collect::<Vec<_>>(), vec![BlockId::new(0), BlockId::new(2)]);
    }

    #[test]
    fn test_non_returning_call() {
        let mut builder = ProgramBuilder::new();
        builder.declare_external("abort");
        let f = builder.function("f", &[]);
        let entry = f.entry();
        f.call(entry, None, "abort", vec![], Location::default())
            .ret(entry, Some(Expr::constant(1)));
        let program = builder.build().unwrap();

        let analyzer = IntraAnalyzer::new(&program, 3, 1);
        let result = analyzer.analyze(&program.functions()[0], &AbstractState::new(), &mut Stub::new(Summary::bottom()));
        assert_eq!(result.summary, Summary::bottom());
    }

    #[test]
    fn test_interrupted() {
        let program = counting_loop();
        let analyzer = IntraAnalyzer::new(&program, 3, 1);
        let mut stub = Stub::new(Summary::top());
        stub.limit = 2;
        let result = analyzer.analyze(&program.functions()[0], &AbstractState::new(), &mut stub);
        assert!(result.interrupted);
        assert_eq!(result.transfers, 2);
    }

    #[test]
    fn test_loop_heads() {
        let program = counting_loop();
        assert_eq!(loop_heads(&program.functions()[0]), vec![false, true, false, false]);
    }

    #[test]
    fn test_transfer_monotone() {
        let program = counting_loop();
        let f = &program.functions()[0];
        let analyzer = IntraAnalyzer::new(&program, 3, 1);
        let i = Var::new("i");
        let mut stub = Stub::new(Summary::top());

        let mut small = AbstractState::new();
        small.set(&i, Interval::from_bounds(3, 5));
        let mut large = AbstractState::new();
        large.set(&i, Interval::from_bounds(0, 200));

        for block in 0..f.num_blocks() {
            let block = BlockId::new(block);
            let a = analyzer.transfer(f, block, &small, &mut stub, true, None);
            let b = analyzer.transfer(f, block, &large, &mut stub, true, None);
            for (succ, out) in &a.successors {
                let other = b.successors.iter().find(|(s, _)| s == succ).map(|(_, s)| s.clone());
                assert!(out.leq(&other.unwrap_or_else(AbstractState::unreachable)));
            }
            if let Some(ret) = a.ret {
                assert!(ret.leq(&b.ret.unwrap_or_else(Interval::bottom)));
            }
        }
    }
}
