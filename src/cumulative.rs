//! Per-node cumulative counters: two of these live on every internal node
//! (`sizes` and `sums`), each recording, for child index `i`, the sum of
//! that quantity over children `[0, i]`. Locating the child responsible
//! for a position/rank target is one monotone search over the array, and
//! every structural edit (split, merge, transfer) is expressed as an
//! operation on this array that keeps the prefix-sum invariant.
//!
//! Child lookup is a comparison-based binary search
//! (`slice::partition_point`); the sentinel value marks unused trailing
//! slots so a legal query can never match one.

use crate::policy::{Index, Policy};
use core::marker::PhantomData;

#[derive(Debug, Clone)]
pub(crate) struct CumulativeArray<P: Policy> {
    values: Vec<P::Index>,
    _policy: PhantomData<P>,
}

impl<P: Policy> CumulativeArray<P> {
    pub fn new() -> Self {
        CumulativeArray {
            values: vec![P::Index::SENTINEL; P::BRANCHING],
            _policy: PhantomData,
        }
    }

    /// Cumulative value at slot `i`: sum of the tracked quantity over
    /// children `[0, i]`.
    #[inline]
    pub fn value_at(&self, i: usize) -> usize {
        self.values[i].to_usize()
    }

    /// The quantity owned by child `i` alone (the array stores prefix
    /// sums, so this is a one-slot difference).
    #[inline]
    pub fn delta_at(&self, i: usize) -> usize {
        if i == 0 {
            self.values[0].to_usize()
        } else {
            self.values[i].to_usize() - self.values[i - 1].to_usize()
        }
    }

    /// Smallest index `i` in `[0, valid_len)` with `value_at(i) >= q`.
    pub fn find(&self, q: usize, valid_len: usize) -> usize {
        self.values[..valid_len].partition_point(|v| v.to_usize() < q)
    }

    /// Overwrite slot `i` with an absolute prefix-sum value, bypassing the
    /// usual shift/increment bookkeeping. Used when a node reassigns which
    /// child a range of prefix sums belongs to (e.g. after a merge).
    pub fn set_raw(&mut self, i: usize, value: usize) {
        self.values[i] = P::Index::from_usize(value);
    }

    /// Total of the tracked quantity over all `valid_len` children.
    pub fn total(&self, valid_len: usize) -> usize {
        if valid_len == 0 {
            0
        } else {
            self.values[valid_len - 1].to_usize()
        }
    }

    /// Add `delta` to every prefix sum in `[from, valid_len)`.
    pub fn increment_suffix(&mut self, from: usize, valid_len: usize, delta: i64) {
        for v in &mut self.values[from..valid_len] {
            let updated = v.to_usize() as i64 + delta;
            *v = P::Index::from_usize(updated as usize);
        }
    }

    /// Insert a new child of quantity `child_value` at `idx`, shifting
    /// children `[idx, valid_len)` up by one slot.
    pub fn insert_at(&mut self, idx: usize, valid_len: usize, child_value: usize) {
        debug_assert!(valid_len < P::BRANCHING);
        let base = if idx == 0 {
            0
        } else {
            self.values[idx - 1].to_usize()
        };
        for j in (idx..valid_len).rev() {
            self.values[j + 1] = self.values[j];
        }
        self.values[idx] = P::Index::from_usize(base + child_value);
        self.increment_suffix(idx + 1, valid_len + 1, child_value as i64);
    }

    /// Remove the child at `idx`, shifting `[idx+1, valid_len)` down by
    /// one slot and marking the freed trailing slot unused.
    pub fn remove_at(&mut self, idx: usize, valid_len: usize) {
        let removed = self.delta_at(idx);
        for j in idx..(valid_len - 1) {
            self.values[j] = self.values[j + 1];
        }
        self.increment_suffix(idx, valid_len - 1, -(removed as i64));
        self.values[valid_len - 1] = P::Index::SENTINEL;
    }

    /// Drop the first `k` children, shifting the remaining `valid_len - k`
    /// down and rebasing their prefix sums to start from zero.
    pub fn clear_first(&mut self, k: usize, valid_len: usize) {
        if k == 0 {
            return;
        }
        let base = self.values[k - 1].to_usize();
        for j in k..valid_len {
            let rebased = self.values[j].to_usize() - base;
            self.values[j - k] = P::Index::from_usize(rebased);
        }
        for j in (valid_len - k)..valid_len {
            self.values[j] = P::Index::SENTINEL;
        }
    }

    /// Truncate from `old_valid_len` down to `new_valid_len`, marking the
    /// dropped slots unused. Prefix sums of the surviving prefix are
    /// already correct and untouched.
    pub fn clear_last(&mut self, new_valid_len: usize, old_valid_len: usize) {
        for j in new_valid_len..old_valid_len {
            self.values[j] = P::Index::SENTINEL;
        }
    }

    /// Append one child of quantity `child_value` at the end.
    pub fn append(&mut self, valid_len: usize, child_value: usize) {
        debug_assert!(valid_len < P::BRANCHING);
        let base = if valid_len == 0 {
            0
        } else {
            self.values[valid_len - 1].to_usize()
        };
        self.values[valid_len] = P::Index::from_usize(base + child_value);
    }

    /// Append `other`'s first `other_valid_len` children after this
    /// array's existing `valid_len` children.
    pub fn append_other(
        &mut self,
        valid_len: usize,
        other: &CumulativeArray<P>,
        other_valid_len: usize,
    ) {
        debug_assert!(valid_len + other_valid_len <= P::BRANCHING);
        let base = if valid_len == 0 {
            0
        } else {
            self.values[valid_len - 1].to_usize()
        };
        let mut running = base;
        for j in 0..other_valid_len {
            running += other.delta_at(j);
            self.values[valid_len + j] = P::Index::from_usize(running);
        }
    }

    /// Prepend `other`'s first `other_valid_len` children before this
    /// array's existing `valid_len` children.
    pub fn prepend_other(
        &mut self,
        valid_len: usize,
        other: &CumulativeArray<P>,
        other_valid_len: usize,
    ) {
        debug_assert!(valid_len + other_valid_len <= P::BRANCHING);
        let offset = other.total(other_valid_len);
        for j in (0..valid_len).rev() {
            let shifted = self.values[j].to_usize() + offset;
            self.values[j + other_valid_len] = P::Index::from_usize(shifted);
        }
        let mut running = 0usize;
        for j in 0..other_valid_len {
            running += other.delta_at(j);
            self.values[j] = P::Index::from_usize(running);
        }
    }
}

impl<P: Policy> Default for CumulativeArray<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::TinyPolicy;

    type C = CumulativeArray<TinyPolicy>;

    #[test]
    fn append_and_find() {
        let mut c = C::new();
        c.append(0, 10);
        c.append(1, 5);
        c.append(2, 7);
        assert_eq!(c.value_at(0), 10);
        assert_eq!(c.value_at(1), 15);
        assert_eq!(c.value_at(2), 22);
        assert_eq!(c.find(1, 3), 0);
        assert_eq!(c.find(10, 3), 0);
        assert_eq!(c.find(11, 3), 1);
        assert_eq!(c.find(22, 3), 2);
    }

    #[test]
    fn insert_at_shifts_and_recomputes() {
        let mut c = C::new();
        c.append(0, 10);
        c.append(1, 20);
        c.insert_at(1, 2, 5);
        assert_eq!(c.delta_at(0), 10);
        assert_eq!(c.delta_at(1), 5);
        assert_eq!(c.delta_at(2), 20);
        assert_eq!(c.value_at(2), 35);
    }

    #[test]
    fn remove_at_shifts_and_recomputes() {
        let mut c = C::new();
        c.append(0, 10);
        c.append(1, 5);
        c.append(2, 20);
        c.remove_at(1, 3);
        assert_eq!(c.delta_at(0), 10);
        assert_eq!(c.delta_at(1), 20);
        assert_eq!(c.value_at(1), 30);
    }

    #[test]
    fn clear_first_rebases_suffix() {
        let mut c = C::new();
        c.append(0, 10);
        c.append(1, 5);
        c.append(2, 20);
        c.clear_first(1, 3);
        assert_eq!(c.delta_at(0), 5);
        assert_eq!(c.delta_at(1), 20);
        assert_eq!(c.value_at(1), 25);
    }

    #[test]
    fn append_other_merges_quantities() {
        let mut a = C::new();
        a.append(0, 10);
        a.append(1, 5);
        let mut b = C::new();
        b.append(0, 3);
        b.append(1, 4);
        a.append_other(2, &b, 2);
        assert_eq!(a.delta_at(2), 3);
        assert_eq!(a.delta_at(3), 4);
        assert_eq!(a.value_at(3), 22);
    }

    #[test]
    fn prepend_other_shifts_and_rebases() {
        let mut a = C::new();
        a.append(0, 10);
        a.append(1, 5);
        let mut b = C::new();
        b.append(0, 3);
        b.append(1, 4);
        a.prepend_other(2, &b, 2);
        assert_eq!(a.delta_at(0), 3);
        assert_eq!(a.delta_at(1), 4);
        assert_eq!(a.delta_at(2), 10);
        assert_eq!(a.delta_at(3), 5);
        assert_eq!(a.value_at(3), 22);
    }
}
