//! Packed-bit leaf storage with an amortizing edit buffer.
//!
//! Bits are packed little-endian within each 64-bit word (bit `j` of word
//! `w` stores logical bit `w*64+j`). Small edits accumulate in an
//! [`EditBuffer`] and are replayed onto the packed array by [`commit`]
//! once the buffer fills.

use crate::editbuffer::{EditBuffer, EntryKind};
use crate::error::BitVecError;
use crate::policy::Policy;
use crate::util::{get_bit, popcount_prefix, select_in_word, set_bit, words_for_bits};
use core::marker::PhantomData;

fn popcount_prefix_words(words: &[u64], bits: usize) -> u32 {
    let full_words = bits / 64;
    let mut total = 0u32;
    for w in &words[..full_words] {
        total += w.count_ones();
    }
    let rem = bits % 64;
    if rem > 0 {
        total += popcount_prefix(words[full_words], rem as u32);
    }
    total
}

#[derive(Debug, Clone)]
pub(crate) struct Leaf<P: Policy> {
    words: Vec<u64>,
    size: u32,
    p_sum: u32,
    buffer: EditBuffer<P>,
    _policy: PhantomData<P>,
}

impl<P: Policy> Leaf<P> {
    pub fn new() -> Self {
        Leaf {
            words: vec![0u64; 1],
            size: 0,
            p_sum: 0,
            buffer: EditBuffer::new(),
            _policy: PhantomData,
        }
    }

    pub fn with_capacity_words(cap_words: usize) -> Self {
        Leaf {
            words: vec![0u64; cap_words.max(1)],
            size: 0,
            p_sum: 0,
            buffer: EditBuffer::new(),
            _policy: PhantomData,
        }
    }

    /// A leaf of `size` bits all set to `value`, built in one pass. A
    /// compressed leaf could represent this in `O(1)` space; this packed
    /// leaf still needs `O(size/64)` words since it must materialize them.
    pub fn filled(size: u32, value: bool) -> Self {
        let cap_words = words_for_bits(size as usize).max(1);
        let fill_word = if value { u64::MAX } else { 0 };
        let mut words = vec![fill_word; cap_words];
        let rem = (size as usize) % 64;
        if rem != 0 {
            let last = words.len() - 1;
            words[last] &= (1u64 << rem) - 1;
        }
        Leaf {
            words,
            size,
            p_sum: if value { size } else { 0 },
            buffer: EditBuffer::new(),
            _policy: PhantomData,
        }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn p_sum(&self) -> u32 {
        self.p_sum
    }

    #[inline]
    pub fn capacity_words(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn capacity_bits(&self) -> u32 {
        self.words.len() as u32 * 64
    }

    #[inline]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn need_realloc(&self) -> bool {
        self.size >= self.capacity_bits()
    }

    /// Smallest word count covering `size + 1` bits.
    pub fn desired_capacity_words(size: u32) -> usize {
        let min_words = words_for_bits(size as usize + 1);
        if P::AGGRESSIVE_REALLOC {
            min_words + 2
        } else {
            min_words.next_power_of_two().max(1)
        }
    }

    /// Resize the packed payload to exactly `new_cap_words`, zero-filling
    /// any newly added words.
    pub fn reallocate(&mut self, new_cap_words: usize) -> Result<(), BitVecError> {
        debug_assert!(new_cap_words as u64 * 64 >= self.size as u64);
        if new_cap_words > self.words.len() {
            self.words
                .try_reserve(new_cap_words - self.words.len())
                .map_err(|_| BitVecError::OutOfMemory)?;
        }
        self.words.resize(new_cap_words, 0);
        Ok(())
    }

    #[inline]
    pub fn at(&self, i: u32) -> bool {
        debug_assert!(i < self.size, "leaf access out of range");
        if self.buffer.is_empty() {
            return get_bit(&self.words, i as usize);
        }
        let (base, hit) = self.buffer.locate_access(i);
        hit.unwrap_or_else(|| get_bit(&self.words, base as usize))
    }

    #[inline]
    pub fn rank(&self, i: u32) -> u32 {
        debug_assert!(i <= self.size, "leaf rank out of range");
        if self.buffer.is_empty() {
            return popcount_prefix_words(&self.words, i as usize);
        }
        let (base, delta) = self.buffer.locate_rank(i);
        let base_rank = popcount_prefix_words(&self.words, base as usize) as i64;
        (base_rank + delta) as u32
    }

    /// Position of the `k`-th (1-indexed) set bit.
    pub fn select(&self, k: u32) -> u32 {
        debug_assert!(k >= 1 && k <= self.p_sum, "select target out of range");
        if self.buffer.is_empty() {
            self.select_fast(k)
        } else {
            self.select_via_rank(k)
        }
    }

    fn select_fast(&self, k: u32) -> u32 {
        let mut remaining = k;
        let mut word_idx = 0usize;
        loop {
            let pop = self.words[word_idx].count_ones();
            if pop >= remaining {
                let local = select_in_word(self.words[word_idx], true, remaining - 1);
                return word_idx as u32 * 64 + local;
            }
            remaining -= pop;
            word_idx += 1;
        }
    }

    /// Binary search over `rank`, the fallback used whenever the buffer
    /// is non-empty: this sidesteps a PDEP-based select correction loop
    /// entirely by using the already buffer-aware `rank`, at the cost of
    /// `O(log size)` buffer walks instead of one.
    fn select_via_rank(&self, k: u32) -> u32 {
        let mut lo = 0u32;
        let mut hi = self.size - 1;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.rank(mid + 1) >= k {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Returns the signed change in `p_sum` (`-1`, `0`, or `+1`).
    pub fn set(&mut self, i: u32, v: bool) -> i8 {
        debug_assert!(i < self.size, "leaf set out of range");
        let (base, hit) = self.buffer.locate_access(i);
        let old = hit.unwrap_or_else(|| get_bit(&self.words, base as usize));
        if old == v {
            return 0;
        }
        if hit.is_some() {
            let handled = self.buffer.record_set(i, v);
            debug_assert!(handled);
        } else {
            set_bit(&mut self.words, base as usize, v);
        }
        let delta: i8 = if v { 1 } else { -1 };
        self.p_sum = (self.p_sum as i64 + delta as i64) as u32;
        delta
    }

    /// Insert `v` at logical index `i`. `i == size` takes the append fast
    /// path and bypasses the buffer entirely.
    pub fn insert(&mut self, i: u32, v: bool) {
        debug_assert!(i <= self.size, "leaf insert out of range");
        debug_assert!(
            self.size < self.capacity_bits(),
            "leaf insert requires spare capacity; caller must reallocate/split first"
        );
        if i == self.size {
            set_bit(&mut self.words, self.size as usize, v);
            self.size += 1;
            if v {
                self.p_sum += 1;
            }
            return;
        }
        self.size += 1;
        if v {
            self.p_sum += 1;
        }
        self.buffer.record_insert(i, v);
        if self.buffer.is_full() {
            self.commit();
        }
    }

    /// Remove and return the bit at logical index `i`.
    pub fn remove(&mut self, i: u32) -> bool {
        debug_assert!(i < self.size, "leaf remove out of range");
        let value = self.at(i);
        self.size -= 1;
        if value {
            self.p_sum -= 1;
        }
        self.buffer.record_remove(i, value);
        if self.buffer.is_full() {
            self.commit();
        }
        value
    }

    /// Replay all buffered edits onto the packed array in one pass.
    pub fn commit(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut new_words = vec![0u64; self.words.len()];
        let mut out_idx = 0u32;
        let mut base_idx = 0u32;
        let mut logical = 0u32;
        for e in self.buffer.entries() {
            while logical < e.index {
                let bit = get_bit(&self.words, base_idx as usize);
                set_bit(&mut new_words, out_idx as usize, bit);
                base_idx += 1;
                out_idx += 1;
                logical += 1;
            }
            match e.kind {
                EntryKind::Insert => {
                    set_bit(&mut new_words, out_idx as usize, e.value);
                    out_idx += 1;
                    logical += 1;
                }
                EntryKind::Remove => {
                    base_idx += 1;
                }
            }
        }
        while out_idx < self.size {
            let bit = get_bit(&self.words, base_idx as usize);
            set_bit(&mut new_words, out_idx as usize, bit);
            base_idx += 1;
            out_idx += 1;
        }
        self.words = new_words;
        self.buffer.clear();
        debug_assert_eq!(
            popcount_prefix_words(&self.words, self.size as usize),
            self.p_sum
        );
    }

    #[inline]
    pub fn flush(&mut self) {
        self.commit();
    }

    /// Move the first `k` bits of `sibling` onto the end of `self`.
    pub fn transfer_append(&mut self, sibling: &mut Leaf<P>, k: u32) {
        self.flush();
        sibling.flush();
        debug_assert!(k <= sibling.size);
        debug_assert!(self.capacity_bits() >= self.size + k);
        for idx in 0..k {
            let bit = get_bit(&sibling.words, idx as usize);
            set_bit(&mut self.words, (self.size + idx) as usize, bit);
            if bit {
                self.p_sum += 1;
            }
        }
        self.size += k;
        sibling.clear_first(k);
    }

    /// Move the last `k` bits of `sibling` onto the start of `self`.
    pub fn transfer_prepend(&mut self, sibling: &mut Leaf<P>, k: u32) {
        self.flush();
        sibling.flush();
        debug_assert!(k <= sibling.size);
        debug_assert!(self.capacity_bits() >= self.size + k);
        for idx in (0..self.size).rev() {
            let bit = get_bit(&self.words, idx as usize);
            set_bit(&mut self.words, (idx + k) as usize, bit);
        }
        let start = sibling.size - k;
        for idx in 0..k {
            let bit = get_bit(&sibling.words, (start + idx) as usize);
            set_bit(&mut self.words, idx as usize, bit);
            if bit {
                self.p_sum += 1;
            }
        }
        self.size += k;
        sibling.clear_last(k);
    }

    /// Move every bit of `sibling` onto the end of `self`.
    pub fn append_all(&mut self, sibling: &mut Leaf<P>) {
        let k = sibling.size;
        self.transfer_append(sibling, k);
    }

    /// Drop the first `k` bits, zeroing the freed tail.
    pub fn clear_first(&mut self, k: u32) {
        debug_assert!(k <= self.size);
        self.flush();
        let removed_sum = popcount_prefix_words(&self.words, k as usize);
        let remaining = self.size - k;
        for idx in 0..remaining {
            let bit = get_bit(&self.words, (idx + k) as usize);
            set_bit(&mut self.words, idx as usize, bit);
        }
        for idx in remaining..self.size {
            set_bit(&mut self.words, idx as usize, false);
        }
        self.size = remaining;
        self.p_sum -= removed_sum;
    }

    /// Drop the last `k` bits, zeroing the freed tail.
    pub fn clear_last(&mut self, k: u32) {
        debug_assert!(k <= self.size);
        self.flush();
        let remaining = self.size - k;
        let removed_sum = self.p_sum - popcount_prefix_words(&self.words, remaining as usize);
        for idx in remaining..self.size {
            set_bit(&mut self.words, idx as usize, false);
        }
        self.size = remaining;
        self.p_sum -= removed_sum;
    }

    /// Write this leaf's `size` bits into `out`, starting at bit `offset`.
    pub fn dump(&self, out: &mut [u64], offset: usize) {
        for idx in 0..self.size {
            let bit = self.at(idx);
            set_bit(out, offset + idx as usize, bit);
        }
    }

    /// Developer-facing self-check: `p_sum` agrees with the packed array
    /// once the buffer is accounted for.
    pub fn validate(&self) -> bool {
        self.size <= self.capacity_bits() && self.rank(self.size) == self.p_sum
    }
}

impl<P: Policy> Default for Leaf<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DefaultPolicy;

    type L = Leaf<DefaultPolicy>;

    #[test]
    fn append_fast_path_bypasses_buffer() {
        let mut leaf = L::new();
        for i in 0..10u32 {
            leaf.insert(i, i % 2 == 0);
        }
        assert_eq!(leaf.buffer_len(), 0);
        assert_eq!(leaf.size(), 10);
        assert_eq!(leaf.p_sum(), 5);
    }

    #[test]
    fn buffer_hit_set_scenario() {
        let mut leaf = L::new();
        for _ in 0..128 {
            leaf.insert(leaf.size(), true);
        }
        leaf.flush();
        assert_eq!(leaf.set(20, true), 0);

        leaf.insert(37, false);
        assert_eq!(leaf.size(), 129);
        assert_eq!(leaf.p_sum(), 128);
        assert!(!leaf.at(37));
        for i in 0..129 {
            if i != 37 {
                assert!(leaf.at(i), "bit {i} should still be 1");
            }
        }

        leaf.set(37, true);
        assert_eq!(leaf.size(), 129);
        assert_eq!(leaf.p_sum(), 129);
        for i in 0..129 {
            assert!(leaf.at(i));
        }
    }

    #[test]
    fn insert_remove_roundtrip_matches_rank_select() {
        let mut leaf = L::with_capacity_words(4);
        let pattern = [true, false, true, true, false, false, true, false];
        for (i, &b) in pattern.iter().enumerate() {
            leaf.insert(i as u32, b);
        }
        assert_eq!(leaf.p_sum(), pattern.iter().filter(|&&b| b).count() as u32);
        for i in 0..pattern.len() as u32 {
            assert_eq!(leaf.at(i), pattern[i as usize]);
        }
        let removed = leaf.remove(2);
        assert!(removed);
        assert_eq!(leaf.size(), pattern.len() as u32 - 1);
        assert!(leaf.validate());
    }

    #[test]
    fn select_matches_naive_count_with_pending_buffer() {
        let mut leaf = L::with_capacity_words(4);
        for i in 0..50u32 {
            leaf.insert(i, i % 3 == 0);
        }
        // insert into the middle without flushing, to exercise the
        // buffer-aware select fallback.
        leaf.insert(10, true);
        let total = leaf.p_sum();
        let mut seen = 0u32;
        for i in 0..leaf.size() {
            if leaf.at(i) {
                seen += 1;
                assert_eq!(leaf.select(seen), i);
            }
        }
        assert_eq!(seen, total);
    }

    #[test]
    fn transfer_append_moves_bits_and_sum() {
        let mut a = L::with_capacity_words(4);
        let mut b = L::with_capacity_words(4);
        for i in 0..20u32 {
            a.insert(i, i % 2 == 0);
        }
        for i in 0..20u32 {
            b.insert(i, i % 3 == 0);
        }
        let moved = 5;
        let b_first: Vec<bool> = (0..moved).map(|i| b.at(i)).collect();
        let expected_sum = a.p_sum() + b_first.iter().filter(|&&v| v).count() as u32;
        a.transfer_append(&mut b, moved);
        assert_eq!(a.size(), 25);
        assert_eq!(b.size(), 15);
        assert_eq!(a.p_sum(), expected_sum);
        for (i, &v) in b_first.iter().enumerate() {
            assert_eq!(a.at(20 + i as u32), v);
        }
    }

    #[test]
    fn filled_leaf_has_expected_sum() {
        let ones = L::filled(100, true);
        assert_eq!(ones.p_sum(), 100);
        let zeros = L::filled(100, false);
        assert_eq!(zeros.p_sum(), 0);
        for i in 0..100 {
            assert!(ones.at(i));
            assert!(!zeros.at(i));
        }
    }
}
