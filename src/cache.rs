//! Direct-mapped cache of function summaries.
//!
//! Each slot holds at most one entry; a colliding insert evicts the previous
//! one. Entries keep their full key and the entry state they were computed
//! from, so a lookup can tell a true hit from a wider request.

use log::debug;

use crate::domain::Lattice;
use crate::interval::Interval;
use crate::state::AbstractState;
use crate::types::{ContextId, FunctionId};
use crate::utils::{pairing3, pairing_seq, MyHash};

/// Effect of a call as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Join of the returned values.
    pub ret: Interval,
    /// Whether some feasible path reaches a return.
    pub returns: bool,
}

impl Summary {
    pub fn new(ret: Interval, returns: bool) -> Self {
        Self { ret, returns }
    }
}

impl Lattice for Summary {
    fn bottom() -> Self {
        Self::new(Interval::bottom(), false)
    }

    fn top() -> Self {
        Self::new(Interval::top(), true)
    }

    fn is_bottom(&self) -> bool {
        !self.returns && self.ret.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.returns && self.ret.is_top()
    }

    fn join(&self, other: &Self) -> Self {
        Self::new(self.ret.join(&other.ret), self.returns || other.returns)
    }

    fn meet(&self, other: &Self) -> Self {
        Self::new(self.ret.meet(&other.ret), self.returns && other.returns)
    }

    fn widen(&self, other: &Self) -> Self {
        Self::new(self.ret.widen(&other.ret), self.returns || other.returns)
    }

    fn narrow(&self, other: &Self) -> Self {
        Self::new(self.ret.narrow(&other.ret), self.returns && other.returns)
    }

    fn leq(&self, other: &Self) -> bool {
        self.ret.leq(&other.ret) && (!self.returns || other.returns)
    }
}

/// Cache key: callee, context and the magnitude class of every parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    pub function: FunctionId,
    pub context: ContextId,
    pub buckets: Vec<(i8, i8)>,
}

impl SummaryKey {
    pub fn new(function: FunctionId, context: ContextId, params: &[Interval]) -> Self {
        Self {
            function,
            context,
            buckets: params.iter().map(Interval::bucket).collect(),
        }
    }
}

impl MyHash for SummaryKey {
    fn hash(&self) -> u64 {
        let buckets = pairing_seq(
            self.buckets
                .iter()
                .map(|&(lo, hi)| ((lo as u8 as u64) << 8) | hi as u8 as u64),
        );
        pairing3(self.function.index() as u64, self.context.index() as u64, buckets)
    }
}

struct Entry {
    key: SummaryKey,
    entry: AbstractState,
    summary: Summary,
}

/// Result of a cache lookup.
#[derive(Debug)]
pub enum Lookup {
    Hit(Summary),
    /// Same key, but the request is not covered by the cached entry state.
    /// The stale entry has been dropped; its entry state is returned so the
    /// caller can recompute from the join.
    Wider(AbstractState),
    Miss,
}

pub struct SummaryCache {
    data: Vec<Option<Entry>>,
    bitmask: u64,
    hits: usize,
    misses: usize,
    invalidations: usize,
}

impl SummaryCache {
    /// Create a new cache of size `2^bits`. `bits` is clamped to `0..=24`.
    pub fn new(bits: usize) -> Self {
        let size = 1usize << bits.min(24);
        let bitmask = (size - 1) as u64;

        Self {
            data: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask,
            hits: 0,
            misses: 0,
            invalidations: 0,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.data.fill_with(|| None);
    }

    fn index(&self, key: &SummaryKey) -> usize {
        (key.hash() & self.bitmask) as usize
    }

    pub fn lookup(&mut self, key: &SummaryKey, entry: &AbstractState) -> Lookup {
        let index = self.index(key);
        match &self.data[index] {
            Some(cached) if &cached.key == key => {
                if entry.leq(&cached.entry) {
                    self.hits += 1;
                    Lookup::Hit(cached.summary.clone())
                } else {
                    self.invalidations += 1;
                    debug!("cache: wider entry for {}/{}, invalidating", key.function, key.context);
                    let stale = self.data[index].take().map(|e| e.entry).unwrap_or_default();
                    Lookup::Wider(stale)
                }
            }
            _ => {
                self.misses += 1;
                Lookup::Miss
            }
        }
    }

    pub fn insert(&mut self, key: SummaryKey, entry: AbstractState, summary: Summary) {
        let index = self.index(&key);
        self.data[index] = Some(Entry { key, entry, summary });
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::domain::tests::check_lattice_axioms;
    use crate::expr::Var;

    fn entry(lo: i64, hi: i64) -> AbstractState {
        let mut s = AbstractState::new();
        s.set(&Var::new("x"), Interval::from_bounds(lo, hi));
        s
    }

    fn key(f: usize, iv: Interval) -> SummaryKey {
        SummaryKey::new(FunctionId::new(f), ContextId::ROOT, &[iv])
    }

    #[test]
    fn test_cache() {
        let mut cache = SummaryCache::new(3);
        let k = key(1, Interval::from_bounds(0, 10));
        assert!(matches!(cache.lookup(&k, &entry(0, 10)), Lookup::Miss));

        let summary = Summary::new(Interval::constant(1), true);
        cache.insert(k.clone(), entry(0, 10), summary.clone());

        match cache.lookup(&k, &entry(2, 8)) {
            Lookup::Hit(s) => assert_eq!(s, summary),
            other => panic!("expected hit, got {:?}", other),
        }
        assert!(matches!(cache.lookup(&key(2, Interval::from_bounds(0, 10)), &entry(0, 10)), Lookup::Miss));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_wider_entry_invalidates() {
        let mut cache = SummaryCache::new(4);
        let k = key(0, Interval::from_bounds(0, 10));
        cache.insert(k.clone(), entry(0, 10), Summary::new(Interval::constant(0), true));

        // Same bucket, wider interval.
        let wider = entry(0, 12);
        assert_eq!(k, key(0, Interval::from_bounds(0, 12)));
        match cache.lookup(&k, &wider) {
            Lookup::Wider(stale) => assert_eq!(stale, entry(0, 10)),
            other => panic!("expected wider, got {:?}", other),
        }
        assert_eq!(cache.invalidations(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_buckets_separate_magnitudes() {
        assert_ne!(key(0, Interval::from_bounds(0, 10)), key(0, Interval::from_bounds(0, 1000)));
        assert_ne!(key(0, Interval::from_bounds(0, 10)), key(0, Interval::at_least(0)));
    }

    #[test]
    fn test_summary_lattice_axioms() {
        let samples = [
            Summary::bottom(),
            Summary::top(),
            Summary::new(Interval::constant(3), true),
            Summary::new(Interval::from_bounds(-1, 8), true),
            Summary::new(Interval::bottom(), true),
        ];
        check_lattice_axioms(&samples);
    }
}
