//! Interval abstract domain.
//!
//! An [`Interval`] over-approximates the values an integer variable may take
//! as `[low, high]`, where either bound may be infinite. The domain is
//! non-relational; relations between variables live in
//! [`AbstractState`](crate::state::AbstractState).
//!
//! # Lattice Structure
//!
//! - **Order** (`⊑`): `[l₁, h₁] ⊑ [l₂, h₂]` iff `l₂ ≤ l₁ ∧ h₁ ≤ h₂`
//! - **Join** (`⊔`): convex hull
//! - **Meet** (`⊓`): intersection, bottom if disjoint
//! - **Bottom** (`⊥`): the empty interval, stored as `[+∞, -∞]`
//! - **Top** (`⊤`): `[-∞, +∞]`

use std::cmp;
use std::fmt;

use crate::bound::Bound;
use crate::domain::Lattice;

/// Integer interval `[low, high]`.
///
/// ```rust
/// use reach_rs::domain::Lattice;
/// use reach_rs::interval::{BoundsCheck, Interval};
///
/// let b = Interval::from_bounds(0, 255).sub(&Interval::constant(2));
/// assert_eq!(b, Interval::from_bounds(-2, 253));
/// assert_eq!(b.check_index(10), BoundsCheck::PossiblyOutOfRange);
/// assert_eq!(Interval::from_bounds(2, 7).check_index(10), BoundsCheck::InRange);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    low: Bound,
    high: Bound,
}

/// Result of comparing an index interval against `[0, capacity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundsCheck {
    /// Every value lies in `[0, capacity)`.
    InRange,
    /// No value lies in `[0, capacity)`.
    OutOfRange,
    /// Some values lie inside, some outside.
    PossiblyOutOfRange,
}

impl Interval {
    /// Create `[low, high]`; returns bottom when the bounds are inverted or
    /// both sit on the same infinity.
    pub fn new(low: Bound, high: Bound) -> Self {
        if low > high || low == Bound::PosInf || high == Bound::NegInf {
            Self::bottom()
        } else {
            Self { low, high }
        }
    }

    pub fn from_bounds(min: i64, max: i64) -> Self {
        Self::new(Bound::Finite(min), Bound::Finite(max))
    }

    pub fn constant(c: i64) -> Self {
        Self::from_bounds(c, c)
    }

    /// `[low, +∞]`
    pub fn at_least(low: i64) -> Self {
        Self::new(Bound::Finite(low), Bound::PosInf)
    }

    /// `[-∞, high]`
    pub fn at_most(high: i64) -> Self {
        Self::new(Bound::NegInf, Bound::Finite(high))
    }

    pub fn low(&self) -> Bound {
        self.low
    }

    pub fn high(&self) -> Bound {
        self.high
    }

    /// The single value of a singleton interval.
    pub fn as_constant(&self) -> Option<i64> {
        match (self.low, self.high) {
            (Bound::Finite(l), Bound::Finite(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        if self.is_bottom() {
            return false;
        }
        let v = Bound::Finite(value);
        self.low <= v && v <= self.high
    }

    /// Number of values, if finite.
    pub fn width(&self) -> Option<u128> {
        match (self.low, self.high) {
            (Bound::Finite(l), Bound::Finite(h)) if l <= h => Some((h as i128 - l as i128) as u128 + 1),
            _ => None,
        }
    }

    /// Both bounds are finite.
    pub fn is_bounded(&self) -> bool {
        !self.is_bottom() && self.low.is_finite() && self.high.is_finite()
    }

    /// `[a, b] + [c, d] = [a+c, b+d]`
    pub fn add(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        Self::new(self.low.add(other.low), self.high.add(other.high))
    }

    /// `[a, b] - [c, d] = [a-d, b-c]`
    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    /// `-[a, b] = [-b, -a]`
    pub fn neg(&self) -> Self {
        if self.is_bottom() {
            return Self::bottom();
        }
        Self::new(self.high.neg(), self.low.neg())
    }

    /// Convex hull of the four corner products.
    pub fn mul(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        let corners = [
            self.low.mul(other.low),
            self.low.mul(other.high),
            self.high.mul(other.low),
            self.high.mul(other.high),
        ];
        let low = corners.iter().copied().min().unwrap_or(Bound::NegInf);
        let high = corners.iter().copied().max().unwrap_or(Bound::PosInf);
        Self::new(low, high)
    }

    /// Remove a single value, which is only representable at an endpoint.
    pub fn exclude(&self, value: i64) -> Self {
        if !self.contains(value) {
            return *self;
        }
        let v = Bound::Finite(value);
        if self.low == v && self.high == v {
            Self::bottom()
        } else if self.low == v {
            Self::new(Bound::Finite(value.saturating_add(1)), self.high)
        } else if self.high == v {
            Self::new(self.low, Bound::Finite(value.saturating_sub(1)))
        } else {
            *self
        }
    }

    /// Compare against the valid index range `[0, capacity)`.
    ///
    /// Bottom is reported as [`BoundsCheck::InRange`]: no value can violate.
    pub fn check_index(&self, capacity: u64) -> BoundsCheck {
        if self.is_bottom() {
            return BoundsCheck::InRange;
        }
        let valid = Self::valid_indices(capacity);
        if self.leq(&valid) {
            BoundsCheck::InRange
        } else if self.meet(&valid).is_bottom() {
            BoundsCheck::OutOfRange
        } else {
            BoundsCheck::PossiblyOutOfRange
        }
    }

    /// The offending value closest to `[0, capacity)`, if one is finite.
    ///
    /// Values above the range are preferred over negative ones.
    pub fn violation_witness(&self, capacity: u64) -> Option<i64> {
        if self.is_bottom() {
            return None;
        }
        let cap = i64::try_from(capacity).unwrap_or(i64::MAX);
        let above = self.meet(&Self::at_least(cap));
        if !above.is_bottom() {
            if let Some(v) = above.low.as_finite() {
                return Some(v);
            }
        }
        let below = self.meet(&Self::at_most(-1));
        if !below.is_bottom() {
            return below.high.as_finite();
        }
        None
    }

    /// Whether the part of the interval outside `[0, capacity)` has finite extent.
    pub fn violation_is_bounded(&self, capacity: u64) -> bool {
        let cap = i64::try_from(capacity).unwrap_or(i64::MAX);
        let above = self.meet(&Self::at_least(cap));
        let below = self.meet(&Self::at_most(-1));
        (above.is_bottom() || above.is_bounded()) && (below.is_bottom() || below.is_bounded())
    }

    /// Coarse magnitude classes of both bounds, for cache keying.
    ///
    /// Finite bounds map to `±(bit length of |b| + 1)`; infinities map to
    /// `±66`; bottom maps to `(0, 0)`.
    pub fn bucket(&self) -> (i8, i8) {
        if self.is_bottom() {
            return (0, 0);
        }
        (bucket_of(self.low), bucket_of(self.high))
    }

    fn valid_indices(capacity: u64) -> Self {
        if capacity == 0 {
            return Self::bottom();
        }
        let last = i64::try_from(capacity - 1).unwrap_or(i64::MAX);
        Self::from_bounds(0, last)
    }
}

fn bucket_of(b: Bound) -> i8 {
    match b {
        Bound::NegInf => -66,
        Bound::PosInf => 66,
        Bound::Finite(n) => {
            let bits = (64 - n.unsigned_abs().leading_zeros()) as i8 + 1;
            if n < 0 {
                -bits
            } else {
                bits
            }
        }
    }
}

impl Lattice for Interval {
    fn bottom() -> Self {
        Self {
            low: Bound::PosInf,
            high: Bound::NegInf,
        }
    }

    fn top() -> Self {
        Self {
            low: Bound::NegInf,
            high: Bound::PosInf,
        }
    }

    fn is_bottom(&self) -> bool {
        self.low > self.high
    }

    fn is_top(&self) -> bool {
        self.low == Bound::NegInf && self.high == Bound::PosInf
    }

    fn join(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return *other;
        }
        if other.is_bottom() {
            return *self;
        }
        Self {
            low: cmp::min(self.low, other.low),
            high: cmp::max(self.high, other.high),
        }
    }

    fn meet(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        Self::new(cmp::max(self.low, other.low), cmp::min(self.high, other.high))
    }

    fn widen(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return *other;
        }
        if other.is_bottom() {
            return *self;
        }
        Self {
            low: if other.low < self.low { Bound::NegInf } else { self.low },
            high: if other.high > self.high { Bound::PosInf } else { self.high },
        }
    }

    fn narrow(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        Self::new(
            if self.low == Bound::NegInf { other.low } else { self.low },
            if self.high == Bound::PosInf { other.high } else { self.high },
        )
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        other.low <= self.low && self.high <= other.high
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::top()
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            write!(f, "⊥")
        } else if self.is_top() {
            write!(f, "⊤")
        } else {
            write!(f, "[{}, {}]", self.low, self.high)
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
