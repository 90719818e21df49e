//! Abstract state at a program point.
//!
//! An [`AbstractState`] maps variables to [`Interval`]s and additionally keeps
//! affine equalities `v = base + k` between variables. The equalities are
//! what lets the analysis decide a guard such as `a > b` once it knows
//! `b = a + 2`, which the interval domain alone cannot do.
//!
//! Equalities are kept in a union-find shape: every related variable points
//! directly at the root of its class, and roots carry no relation of their
//! own. Absent variables are `⊤`.

use std::collections::BTreeMap;
use std::fmt;

use crate::bound::Bound;
use crate::domain::Lattice;
use crate::expr::{CompareOp, Expr, Linear, Predicate, Var};
use crate::interval::Interval;

/// Affine equality `var = base + offset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    pub base: Var,
    pub offset: i64,
}

/// Variable intervals plus affine equalities, or bottom (unreachable).
///
/// ```rust
/// use reach_rs::expr::{Expr, Var};
/// use reach_rs::interval::Interval;
/// use reach_rs::state::AbstractState;
///
/// let mut state = AbstractState::new();
/// state.havoc(&Var::new("a"), Interval::from_bounds(0, 255));
/// state.assign(&Var::new("b"), &Expr::offset("a", 2));
///
/// assert_eq!(state.get(&Var::new("b")), Interval::from_bounds(2, 257));
/// assert!(state.assume(&Expr::var("a").gt(Expr::var("b"))).is_unreachable());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct AbstractState {
    values: BTreeMap<Var, Interval>,
    relations: BTreeMap<Var, Relation>,
    unreachable: bool,
}

impl AbstractState {
    /// The state with no information (`⊤`).
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            unreachable: false,
        }
    }

    /// The unreachable state (`⊥`).
    pub fn unreachable() -> Self {
        Self {
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            unreachable: true,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    /// Interval of a variable: `⊤` if unconstrained, `⊥` if the state is unreachable.
    pub fn get(&self, var: &Var) -> Interval {
        if self.unreachable {
            return Interval::bottom();
        }
        self.values.get(var).copied().unwrap_or_else(Interval::top)
    }

    /// Constrain `var` to exactly `interval`, keeping its equalities.
    pub fn set(&mut self, var: &Var, interval: Interval) {
        self.set_raw(var, interval);
        self.reduce();
    }

    /// The equality attached to `var`, if it is not the root of its class.
    pub fn relation(&self, var: &Var) -> Option<&Relation> {
        self.relations.get(var)
    }

    /// Variables with a non-top interval.
    pub fn bounded_vars(&self) -> impl Iterator<Item = (&Var, &Interval)> {
        self.values.iter()
    }

    /// Root of the class of `var` and the offset of `var` from it.
    pub fn resolve(&self, var: &Var) -> (Var, i64) {
        match self.relations.get(var) {
            Some(rel) => (rel.base.clone(), rel.offset),
            None => (var.clone(), 0),
        }
    }

    /// Evaluate an expression.
    ///
    /// Linear expressions are first rewritten over class roots, so that
    /// `b - a` with `b = a + 2` evaluates to exactly `[2, 2]`.
    pub fn eval(&self, expr: &Expr) -> Interval {
        if self.unreachable {
            return Interval::bottom();
        }
        if let Some(lin) = expr.linearize().and_then(|l| self.substitute(&l)) {
            return self.eval_linear(&lin);
        }
        match expr {
            Expr::Const(c) => Interval::constant(*c),
            Expr::Var(v) => self.get(v),
            Expr::Add(a, b) => self.eval(a).add(&self.eval(b)),
            Expr::Sub(a, b) => self.eval(a).sub(&self.eval(b)),
            Expr::Mul(a, b) => self.eval(a).mul(&self.eval(b)),
            Expr::Neg(a) => self.eval(a).neg(),
        }
    }

    /// Rewrite a linear form over class roots.
    pub fn substitute(&self, lin: &Linear) -> Option<Linear> {
        let mut out = Linear::constant(lin.constant);
        for (var, coef) in &lin.terms {
            let (root, offset) = self.resolve(var);
            out.add_term(root, *coef)?;
            out.constant = out.constant.checked_add(coef.checked_mul(offset)?)?;
        }
        Some(out)
    }

    fn eval_linear(&self, lin: &Linear) -> Interval {
        lin.terms.iter().fold(Interval::constant(lin.constant), |acc, (var, coef)| {
            acc.add(&self.get(var).mul(&Interval::constant(*coef)))
        })
    }

    /// Transfer for `var := expr`.
    pub fn assign(&mut self, var: &Var, expr: &Expr) {
        if self.unreachable {
            return;
        }
        let value = self.eval(expr);
        let lin = expr.linearize().and_then(|l| self.substitute(&l));
        match lin.as_ref().and_then(|l| l.as_offset()) {
            Some((root, k)) if root == var => {
                // `x := x + k` where `x` is a root: shift the class.
                let mut overflowed = Vec::new();
                for (member, rel) in self.relations.iter_mut() {
                    if &rel.base == var {
                        match rel.offset.checked_sub(k) {
                            Some(o) => rel.offset = o,
                            None => overflowed.push(member.clone()),
                        }
                    }
                }
                for member in &overflowed {
                    self.relations.remove(member);
                }
                if k == i64::MIN || k == i64::MAX {
                    self.detach(var);
                }
            }
            Some((root, k)) => {
                let root = root.clone();
                self.detach(var);
                self.relations.insert(var.clone(), Relation { base: root, offset: k });
            }
            None => self.detach(var),
        }
        self.set_raw(var, value);
        self.reduce();
    }

    /// Transfer for `var := <input in range>`: forget everything about `var`.
    pub fn havoc(&mut self, var: &Var, range: Interval) {
        if self.unreachable {
            return;
        }
        self.detach(var);
        self.set_raw(var, range);
    }

    /// Record `var = base + offset`.
    pub fn relate(&mut self, var: &Var, base: &Var, offset: i64) {
        if self.unreachable {
            return;
        }
        self.unify(var, base, offset);
        self.reduce();
    }

    /// Refine the state by assuming `pred` holds.
    pub fn assume(&self, pred: &Predicate) -> AbstractState {
        if self.unreachable {
            return self.clone();
        }

        let diff = pred.lhs.clone().sub(pred.rhs.clone());
        let lin = match diff.linearize().and_then(|l| self.substitute(&l)) {
            Some(lin) => lin,
            None => {
                // Non-linear guard: only decide feasibility.
                return if may_hold(pred.op, &self.eval(&pred.lhs).sub(&self.eval(&pred.rhs))) {
                    self.clone()
                } else {
                    Self::unreachable()
                };
            }
        };

        if !may_hold(pred.op, &self.eval_linear(&lin)) {
            return Self::unreachable();
        }

        let mut out = self.clone();
        for (var, coef) in &lin.terms {
            if *coef != 1 && *coef != -1 {
                continue;
            }
            let mut rest = lin.clone();
            rest.terms.remove(var);
            // coef·var op -rest
            let target = constraint(pred.op, &out.eval_linear(&rest).neg());
            let target = if *coef == 1 { target } else { target.neg() };
            let refined = match target {
                Refinement::Within(iv) => out.get(var).meet(&iv),
                Refinement::Except(n) => out.get(var).exclude(n),
                Refinement::Nothing => continue,
            };
            out.set_raw(var, refined);
            if out.unreachable {
                return out;
            }
        }
        out.reduce();
        out
    }

    /// Assume `pred` (`positive`) or its negation.
    pub fn assume_branch(&self, pred: &Predicate, positive: bool) -> AbstractState {
        if positive {
            self.assume(pred)
        } else {
            self.assume(&pred.negate())
        }
    }

    fn set_raw(&mut self, var: &Var, interval: Interval) {
        if self.unreachable {
            return;
        }
        if interval.is_bottom() {
            self.make_unreachable();
        } else if interval.is_top() {
            self.values.remove(var);
        } else {
            self.values.insert(var.clone(), interval);
        }
    }

    fn make_unreachable(&mut self) {
        self.values.clear();
        self.relations.clear();
        self.unreachable = true;
    }

    /// Remove `var` from its class, promoting a dependent to root if needed.
    fn detach(&mut self, var: &Var) {
        self.relations.remove(var);
        let dependents: Vec<(Var, i64)> = self
            .relations
            .iter()
            .filter(|(_, rel)| &rel.base == var)
            .map(|(v, rel)| (v.clone(), rel.offset))
            .collect();
        let Some(((new_root, root_offset), rest)) = dependents.split_first() else {
            return;
        };
        self.relations.remove(new_root);
        for (v, offset) in rest {
            // v = var + offset = new_root - root_offset + offset
            match offset.checked_sub(*root_offset) {
                Some(o) => {
                    self.relations.insert(
                        v.clone(),
                        Relation {
                            base: new_root.clone(),
                            offset: o,
                        },
                    );
                }
                None => {
                    self.relations.remove(v);
                }
            }
        }
    }

    /// Merge the classes of `var` and `base` under `var = base + offset`.
    fn unify(&mut self, var: &Var, base: &Var, offset: i64) {
        let (rv, kv) = self.resolve(var);
        let (rb, kb) = self.resolve(base);
        // rv + kv = rb + kb + offset
        let Some(delta) = kb.checked_add(offset).and_then(|d| d.checked_sub(kv)) else {
            return;
        };
        if rv == rb {
            if delta != 0 {
                self.make_unreachable();
            }
            return;
        }
        let moved: Vec<(Var, i64)> = self
            .relations
            .iter()
            .filter(|(_, rel)| rel.base == rv)
            .map(|(v, rel)| (v.clone(), rel.offset))
            .collect();
        for (v, o) in moved {
            match o.checked_add(delta) {
                Some(o) => {
                    self.relations.insert(
                        v,
                        Relation {
                            base: rb.clone(),
                            offset: o,
                        },
                    );
                }
                None => {
                    self.relations.remove(&v);
                }
            }
        }
        self.relations.insert(rv, Relation { base: rb, offset: delta });
    }

    /// Does the state entail `var = base + offset`?
    fn implies(&self, var: &Var, rel: &Relation) -> bool {
        let (rv, kv) = self.resolve(var);
        let (rb, kb) = self.resolve(&rel.base);
        rv == rb && kb.checked_add(rel.offset) == Some(kv)
    }

    /// Tighten the intervals of related variables against each other.
    fn reduce(&mut self) {
        if self.unreachable {
            return;
        }
        let relations: Vec<(Var, Relation)> = self.relations.iter().map(|(v, r)| (v.clone(), r.clone())).collect();
        for _ in 0..2 {
            for (var, rel) in &relations {
                let shift = Interval::constant(rel.offset);
                let v = self.get(var).meet(&self.get(&rel.base).add(&shift));
                let b = self.get(&rel.base).meet(&v.sub(&shift));
                self.set_raw(&rel.base, b);
                self.set_raw(var, v);
                if self.unreachable {
                    return;
                }
            }
        }
    }

    fn relations_in_both(&self, other: &Self) -> BTreeMap<Var, Relation> {
        self.relations
            .iter()
            .filter(|(v, rel)| other.relations.get(*v) == Some(*rel))
            .map(|(v, rel)| (v.clone(), rel.clone()))
            .collect()
    }

    fn combine_values<F>(&self, other: &Self, f: F) -> BTreeMap<Var, Interval>
    where
        F: Fn(&Interval, &Interval) -> Interval,
    {
        let mut out = BTreeMap::new();
        for var in self.values.keys().chain(other.values.keys()) {
            let iv = f(&self.get(var), &other.get(var));
            if !iv.is_top() {
                out.insert(var.clone(), iv);
            }
        }
        out
    }
}

/// What `x op n` says about `x`, for `n` ranging over an interval.
enum Refinement {
    Within(Interval),
    Except(i64),
    Nothing,
}

impl Refinement {
    fn neg(self) -> Self {
        match self {
            Refinement::Within(iv) => Refinement::Within(iv.neg()),
            Refinement::Except(n) => Refinement::Except(n.saturating_neg()),
            Refinement::Nothing => Refinement::Nothing,
        }
    }
}

/// Values `t` such that `t op n` holds for some `n` in `rhs`.
fn constraint(op: CompareOp, rhs: &Interval) -> Refinement {
    if rhs.is_bottom() {
        return Refinement::Within(Interval::bottom());
    }
    let one = Bound::Finite(1);
    match op {
        CompareOp::Lt => Refinement::Within(Interval::new(Bound::NegInf, rhs.high().sub(one))),
        CompareOp::Le => Refinement::Within(Interval::new(Bound::NegInf, rhs.high())),
        CompareOp::Gt => Refinement::Within(Interval::new(rhs.low().add(one), Bound::PosInf)),
        CompareOp::Ge => Refinement::Within(Interval::new(rhs.low(), Bound::PosInf)),
        CompareOp::Eq => Refinement::Within(*rhs),
        CompareOp::Ne => match rhs.as_constant() {
            Some(n) => Refinement::Except(n),
            None => Refinement::Nothing,
        },
    }
}

/// Whether `d op 0` can hold for some `d` in the interval.
fn may_hold(op: CompareOp, d: &Interval) -> bool {
    if d.is_bottom() {
        return false;
    }
    let zero = Bound::Finite(0);
    match op {
        CompareOp::Lt => d.low() < zero,
        CompareOp::Le => d.low() <= zero,
        CompareOp::Gt => d.high() > zero,
        CompareOp::Ge => d.high() >= zero,
        CompareOp::Eq => d.contains(0),
        CompareOp::Ne => d.as_constant() != Some(0),
    }
}

impl Default for AbstractState {
    fn default() -> Self {
        Self::new()
    }
}

impl Lattice for AbstractState {
    fn bottom() -> Self {
        Self::unreachable()
    }

    fn top() -> Self {
        Self::new()
    }

    fn is_bottom(&self) -> bool {
        self.unreachable
    }

    fn is_top(&self) -> bool {
        !self.unreachable && self.values.is_empty() && self.relations.is_empty()
    }

    fn join(&self, other: &Self) -> Self {
        if self.unreachable {
            return other.clone();
        }
        if other.unreachable {
            return self.clone();
        }
        Self {
            values: self.combine_values(other, Interval::join),
            relations: self.relations_in_both(other),
            unreachable: false,
        }
    }

    fn meet(&self, other: &Self) -> Self {
        if self.unreachable || other.unreachable {
            return Self::unreachable();
        }
        let mut out = self.clone();
        for (var, iv) in &other.values {
            let met = out.get(var).meet(iv);
            out.set_raw(var, met);
        }
        for (var, rel) in &other.relations {
            if out.unreachable {
                break;
            }
            out.unify(var, &rel.base, rel.offset);
        }
        out.reduce();
        out
    }

    fn widen(&self, other: &Self) -> Self {
        if self.unreachable {
            return other.clone();
        }
        if other.unreachable {
            return self.clone();
        }
        Self {
            values: self.combine_values(other, Interval::widen),
            relations: self.relations_in_both(other),
            unreachable: false,
        }
    }

    fn narrow(&self, other: &Self) -> Self {
        if self.unreachable || other.unreachable {
            return Self::unreachable();
        }
        let mut out = Self {
            values: BTreeMap::new(),
            relations: self.relations.clone(),
            unreachable: false,
        };
        for var in self.values.keys().chain(other.values.keys()) {
            let iv = self.get(var).narrow(&other.get(var));
            out.set_raw(var, iv);
        }
        out.reduce();
        out
    }

    fn leq(&self, other: &Self) -> bool {
        if self.unreachable {
            return true;
        }
        if other.unreachable {
            return false;
        }
        other.values.iter().all(|(var, iv)| self.get(var).leq(iv))
            && other.relations.iter().all(|(var, rel)| self.implies(var, rel))
    }
}

impl fmt::Debug for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unreachable {
            return write!(f, "⊥");
        }
        write!(f, "{{")?;
        let mut first = true;
        for (var, iv) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}: {}", var, iv)?;
        }
        for (var, rel) in &self.relations {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match rel.offset {
                0 => write!(f, "{} = {}", var, rel.base)?,
                k if k > 0 => write!(f, "{} = {} + {}", var, rel.base, k)?,
                k => write!(f, "{} = {} - {}", var, rel.base, k.unsigned_abs())?,
            }
        }
        write!(f, "}}")
    }
}

impl fmt::Display for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::domain::tests::check_lattice_axioms;

    fn v(name: &str) -> Var {
        Var::new(name)
    }

    fn with(vars: &[(&str, i64, i64)]) -> AbstractState {
        let mut s = AbstractState::new();
        for (name, lo, hi) in vars {
            s.set(&v(name), Interval::from_bounds(*lo, *hi));
        }
        s
    }

    #[test]
    fn test_assign_tracks_offset() {
        let mut s = with(&[("a", 0, 255)]);
        s.assign(&v("b"), &Expr::offset("a", -2));

        assert_eq!(s.get(&v("b")), Interval::from_bounds(-2, 253));
        assert_eq!(s.relation(&v("b")), Some(&Relation { base: v("a"), offset: -2 }));
        assert_eq!(s.eval(&Expr::var("a").sub(Expr::var("b"))), Interval::constant(2));
    }

    #[test]
    fn test_relational_guard() {
        let mut s = with(&[("a", 0, 255)]);
        s.assign(&v("b"), &Expr::offset("a", -2));

        let taken = s.assume(&Expr::var("a").gt(Expr::var("b")));
        assert_eq!(taken, s);
        assert!(s.assume_branch(&Expr::var("a").gt(Expr::var("b")), false).is_unreachable());

        let mut t = with(&[("a", 0, 255)]);
        t.assign(&v("b"), &Expr::offset("a", 2));
        assert!(t.assume(&Expr::var("a").gt(Expr::var("b"))).is_unreachable());
    }

    #[test]
    fn test_guard_propagates_to_class() {
        let mut s = with(&[("a", 0, 255)]);
        s.assign(&v("b"), &Expr::offset("a", -2));

        let refined = s.assume(&Expr::var("a").gt(Expr::constant(5)));
        assert_eq!(refined.get(&v("a")), Interval::from_bounds(6, 255));
        assert_eq!(refined.get(&v("b")), Interval::from_bounds(4, 253));

        let refined = s.assume(&Expr::var("b").lt(Expr::constant(0)));
        assert_eq!(refined.get(&v("a")), Interval::from_bounds(0, 1));
    }

    #[test]
    fn test_non_relational_guard() {
        let s = with(&[("x", 0, 100), ("y", 50, 60)]);
        let refined = s.assume(&Expr::var("x").lt(Expr::var("y")));
        assert_eq!(refined.get(&v("x")), Interval::from_bounds(0, 59));
        assert_eq!(refined.get(&v("y")), Interval::from_bounds(50, 60));

        let refined = s.assume(&Expr::var("x").gt(Expr::var("y")));
        assert_eq!(refined.get(&v("x")), Interval::from_bounds(51, 100));
    }

    #[test]
    fn test_equality_guards() {
        let s = with(&[("x", 0, 10)]);
        assert_eq!(s.assume(&Expr::var("x").eq(Expr::constant(3))).get(&v("x")), Interval::constant(3));
        assert_eq!(s.assume(&Expr::var("x").ne(Expr::constant(0))).get(&v("x")), Interval::from_bounds(1, 10));
        assert!(s.assume(&Expr::var("x").eq(Expr::constant(11))).is_unreachable());

        let zero = with(&[("x", 0, 0)]);
        assert!(zero.assume(&Expr::var("x").ne(Expr::constant(0))).is_unreachable());
    }

    #[test]
    fn test_increment_shifts_class() {
        let mut s = with(&[("i", 0, 0)]);
        s.assign(&v("j"), &Expr::offset("i", 3));
        s.assign(&v("i"), &Expr::offset("i", 1));

        assert_eq!(s.get(&v("i")), Interval::constant(1));
        assert_eq!(s.relation(&v("j")), Some(&Relation { base: v("i"), offset: 2 }));
    }

    #[test]
    fn test_increment_drops_overflowing_relation() {
        let mut s = with(&[("i", 0, 0)]);
        s.assign(&v("j"), &Expr::offset("i", -10));
        s.assign(&v("i"), &Expr::offset("i", i64::MAX - 1));

        assert_eq!(s.relation(&v("j")), None);
        assert_eq!(s.get(&v("i")), Interval::constant(i64::MAX - 1));
        assert_eq!(s.get(&v("j")), Interval::constant(-10));
    }

    #[test]
    fn test_reassign_root_promotes_dependent() {
        let mut s = with(&[("a", 0, 10)]);
        s.assign(&v("b"), &Expr::offset("a", 1));
        s.assign(&v("c"), &Expr::offset("a", 2));
        s.assign(&v("a"), &Expr::constant(100));

        assert_eq!(s.relation(&v("a")), None);
        assert_eq!(s.relation(&v("b")), None);
        assert_eq!(s.relation(&v("c")), Some(&Relation { base: v("b"), offset: 1 }));
        assert_eq!(s.get(&v("a")), Interval::constant(100));
    }

    #[test]
    fn test_join_keeps_common_relations() {
        let mut s1 = with(&[("a", 0, 5)]);
        s1.assign(&v("b"), &Expr::offset("a", 2));
        let mut s2 = with(&[("a", 10, 20)]);
        s2.assign(&v("b"), &Expr::offset("a", 2));
        let mut s3 = with(&[("a", 10, 20)]);
        s3.assign(&v("b"), &Expr::offset("a", 3));

        let j = s1.join(&s2);
        assert_eq!(j.get(&v("a")), Interval::from_bounds(0, 20));
        assert!(j.relation(&v("b")).is_some());

        let j = s1.join(&s3);
        assert!(j.relation(&v("b")).is_none());
        assert_eq!(j.get(&v("b")), Interval::from_bounds(2, 23));
    }

    #[test]
    fn test_meet_conflicting_relations() {
        let mut s1 = AbstractState::new();
        s1.relate(&v("b"), &v("a"), 1);
        let mut s2 = AbstractState::new();
        s2.relate(&v("b"), &v("a"), 2);
        assert!(s1.meet(&s2).is_unreachable());

        let mut s3 = AbstractState::new();
        s3.relate(&v("a"), &v("b"), -1);
        assert!(s1.meet(&s3).equivalent(&s1));
    }

    #[test]
    fn test_widen_stabilises() {
        let s1 = with(&[("i", 0, 0)]);
        let s2 = with(&[("i", 0, 1)]);
        let w = s1.widen(&s2);
        assert_eq!(w.get(&v("i")), Interval::at_least(0));
        assert!(w.widen(&with(&[("i", 0, 1000)])).equivalent(&w));
    }

    #[test]
    fn test_state_lattice_axioms() {
        let mut related = with(&[("a", 0, 10)]);
        related.assign(&v("b"), &Expr::offset("a", 1));

        let samples = [
            AbstractState::unreachable(),
            AbstractState::new(),
            with(&[("x", 0, 10)]),
            with(&[("x", 5, 20), ("y", -1, 1)]),
            with(&[("y", 3, 3)]),
            related,
        ];
        check_lattice_axioms(&samples);
    }
}
