//! Core lattice trait shared by intervals, abstract states and summaries.

use std::fmt::Debug;

/// Lattice operations of an abstract domain.
///
/// - Order (`⊑`, [`leq`](Self::leq)): `a ⊑ b` means every concrete value of `a` is in `b`.
/// - Join (`⊔`): least upper bound, used at control-flow merges.
/// - Meet (`⊓`): greatest lower bound, used to apply constraints.
/// - Widening (`∇`): must satisfy `a ⊔ b ⊑ a ∇ b` and stabilise every ascending chain.
/// - Narrowing (`△`): must satisfy `a ⊓ b ⊑ a △ b ⊑ a`.
pub trait Lattice: Clone + Debug {
    /// Bottom (`⊥`): the empty set of states.
    fn bottom() -> Self;

    /// Top (`⊤`): all states.
    fn top() -> Self;

    fn is_bottom(&self) -> bool;

    fn is_top(&self) -> bool;

    fn join(&self, other: &Self) -> Self;

    fn meet(&self, other: &Self) -> Self;

    fn widen(&self, other: &Self) -> Self;

    fn narrow(&self, other: &Self) -> Self;

    fn leq(&self, other: &Self) -> bool;

    /// Semantic equality: `a ⊑ b ∧ b ⊑ a`.
    fn equivalent(&self, other: &Self) -> bool {
        self.leq(other) && other.leq(self)
    }

    /// Join an arbitrary number of elements, starting from bottom.
    fn join_all<'a, I>(elems: I) -> Self
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        elems.into_iter().fold(Self::bottom(), |acc, e| acc.join(e))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Check the basic lattice axioms on a set of sample elements.
    pub fn check_lattice_axioms<L: Lattice>(samples: &[L]) {
        for a in samples {
            assert!(a.leq(a), "reflexivity failed for {:?}", a);
            assert!(a.join(&L::bottom()).equivalent(a), "a ⊔ ⊥ ≠ a for {:?}", a);
            assert!(a.meet(&L::top()).equivalent(a), "a ⊓ ⊤ ≠ a for {:?}", a);
            assert!(L::bottom().leq(a));
            assert!(a.leq(&L::top()));
        }

        for a in samples {
            for b in samples {
                let ab = a.join(b);
                assert!(ab.equivalent(&b.join(a)), "join not commutative: {:?}, {:?}", a, b);
                assert!(a.leq(&ab) && b.leq(&ab), "join not an upper bound: {:?}, {:?}", a, b);

                let m = a.meet(b);
                assert!(m.equivalent(&b.meet(a)), "meet not commutative: {:?}, {:?}", a, b);
                assert!(m.leq(a) && m.leq(b), "meet not a lower bound: {:?}, {:?}", a, b);

                let w = a.widen(b);
                assert!(ab.leq(&w), "widening below join: {:?} ∇ {:?} = {:?}", a, b, w);

                let n = a.narrow(b);
                assert!(n.leq(a), "narrowing not below left operand: {:?} △ {:?}", a, b);
            }
        }
    }
}
