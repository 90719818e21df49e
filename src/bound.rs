//! Interval endpoints.
//!
//! A [`Bound`] is either finite or one of the two infinities. Arithmetic on
//! bounds saturates: a finite overflow clamps to `i64::MIN`/`i64::MAX`, and
//! infinities absorb finite operands.

use std::cmp::Ordering;
use std::fmt;

/// Endpoint of an [`Interval`](crate::interval::Interval).
///
/// The total order is `-∞ < finite values < +∞`.
///
/// ```rust
/// use reach_rs::bound::Bound;
///
/// assert!(Bound::NegInf < Bound::Finite(i64::MIN));
/// assert_eq!(Bound::Finite(40).add(Bound::Finite(2)), Bound::Finite(42));
/// assert_eq!(Bound::PosInf.add(Bound::Finite(-7)), Bound::PosInf);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    /// Negative infinity (`-∞`).
    NegInf,
    /// Finite integer value.
    Finite(i64),
    /// Positive infinity (`+∞`).
    PosInf,
}

impl Bound {
    /// Extract the finite value, if any.
    pub fn as_finite(self) -> Option<i64> {
        match self {
            Bound::Finite(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_finite(self) -> bool {
        matches!(self, Bound::Finite(_))
    }

    /// Addition of bounds.
    ///
    /// `+∞ + -∞` is undefined; we return `+∞`, which is the caller's
    /// responsibility to pair with a `-∞` on the other end.
    pub fn add(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.saturating_add(b)),
            (Bound::NegInf, Bound::PosInf) | (Bound::PosInf, Bound::NegInf) => Bound::PosInf,
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
        }
    }

    /// Subtraction of bounds.
    pub fn sub(self, other: Bound) -> Bound {
        self.add(other.neg())
    }

    /// Multiplication of bounds. `0 * ∞` is `0`.
    pub fn mul(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.saturating_mul(b)),
            (Bound::Finite(0), _) | (_, Bound::Finite(0)) => Bound::Finite(0),
            (a, b) => {
                if a.is_negative() == b.is_negative() {
                    Bound::PosInf
                } else {
                    Bound::NegInf
                }
            }
        }
    }

    /// Negation of bound.
    pub fn neg(self) -> Bound {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::Finite(n) => Bound::Finite(n.saturating_neg()),
            Bound::PosInf => Bound::NegInf,
        }
    }

    fn is_negative(self) -> bool {
        match self {
            Bound::NegInf => true,
            Bound::Finite(n) => n < 0,
            Bound::PosInf => false,
        }
    }
}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bound {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Bound::NegInf, Bound::NegInf) => Ordering::Equal,
            (Bound::NegInf, _) => Ordering::Less,
            (_, Bound::NegInf) => Ordering::Greater,
            (Bound::PosInf, Bound::PosInf) => Ordering::Equal,
            (Bound::PosInf, _) => Ordering::Greater,
            (_, Bound::PosInf) => Ordering::Less,
            (Bound::Finite(a), Bound::Finite(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-∞"),
            Bound::Finite(n) => write!(f, "{}", n),
            Bound::PosInf => write!(f, "+∞"),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_bound_arithmetic() {
        use Bound::*;

        assert_eq!(Finite(5).add(Finite(3)), Finite(8));
        assert_eq!(NegInf.add(Finite(5)), NegInf);
        assert_eq!(PosInf.add(Finite(-5)), PosInf);

        assert_eq!(Finite(5).sub(Finite(3)), Finite(2));
        assert_eq!(PosInf.sub(Finite(5)), PosInf);
        assert_eq!(Finite(5).sub(PosInf), NegInf);
        assert_eq!(Finite(5).sub(NegInf), PosInf);

        assert_eq!(Finite(5).neg(), Finite(-5));
        assert_eq!(NegInf.neg(), PosInf);
        assert_eq!(Finite(i64::MIN).neg(), Finite(i64::MAX));
    }

    #[test]
    fn test_bound_saturation() {
        use Bound::*;

        assert_eq!(Finite(i64::MAX).add(Finite(1)), Finite(i64::MAX));
        assert_eq!(Finite(i64::MIN).sub(Finite(1)), Finite(i64::MIN));
        assert_eq!(Finite(-3).mul(PosInf), NegInf);
        assert_eq!(NegInf.mul(NegInf), PosInf);
        assert_eq!(Finite(0).mul(NegInf), Finite(0));
    }

    #[test]
    fn test_bound_order() {
        use Bound::*;

        assert!(NegInf < Finite(0));
        assert!(Finite(0) < PosInf);
        assert!(Finite(-100) < Finite(100));
        assert_eq!(Finite(3).max(PosInf), PosInf);
    }
}
