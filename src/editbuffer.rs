//! Ordered edit buffer attached to a leaf.
//!
//! Entries are kept in non-decreasing *post-application* index order at
//! all times (the "sorted" buffer flavor; `Policy::SORTED_BUFFERS` is
//! asserted `true` whenever `Policy::COMPRESSED` is, and this crate only
//! implements the sorted flavor — an unsorted append-then-sort-before-
//! commit flavor is a pure performance variant, not implemented here).
//!
//! Locating a logical index against the buffer is done with a single
//! linear merge of buffer entries against the packed array (`locate_*`
//! below): both run in `O(buffer length)`, and the merge is
//! straightforward to get right for a tombstone ("remove at an index
//! that maps to another pending edit's slot") stacking case that an
//! incremental carried-index formulation leaves ambiguous.

use crate::policy::Policy;
use core::marker::PhantomData;

/// Operation kind of a pending edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    /// A bit inserted ahead of the packed payload; `value` is the bit.
    Insert,
    /// A tombstone over a packed-payload bit; `value` is that bit's
    /// original value, kept so rank corrections don't need to re-read it.
    Remove,
}

/// A single pending edit: `(index, value, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub index: u32,
    pub value: bool,
    pub kind: EntryKind,
}

/// Bounded, always-sorted list of pending leaf edits.
#[derive(Debug, Clone)]
pub(crate) struct EditBuffer<P: Policy> {
    entries: Vec<Entry>,
    _policy: PhantomData<P>,
}

impl<P: Policy> Default for EditBuffer<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Policy> EditBuffer<P> {
    pub fn new() -> Self {
        EditBuffer {
            entries: Vec::with_capacity(P::BUFFER_SIZE),
            _policy: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        P::BUFFER_SIZE == 0 || self.entries.len() >= P::BUFFER_SIZE
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Record an insertion of `value` at post-application logical index
    /// `i`. Later entries targeting `>= i` shift up by one to keep the
    /// sorted invariant.
    pub fn record_insert(&mut self, i: u32, value: bool) {
        let at = self.entries.partition_point(|e| e.index < i);
        for e in self.entries[at..].iter_mut() {
            e.index += 1;
        }
        self.entries.insert(
            at,
            Entry {
                index: i,
                value,
                kind: EntryKind::Insert,
            },
        );
    }

    /// Record a removal of the logical bit at `i`, whose packed-array
    /// value (if it was not itself a pending insertion) is `base_value`.
    /// If a pending insertion sits exactly at `i`, it is annihilated in
    /// place instead of producing a tombstone.
    pub fn record_remove(&mut self, i: u32, base_value: bool) {
        let at = self.entries.partition_point(|e| e.index < i);
        if let Some(e) = self.entries.get(at) {
            if e.index == i && e.kind == EntryKind::Insert {
                self.entries.remove(at);
                for e in self.entries[at..].iter_mut() {
                    e.index -= 1;
                }
                return;
            }
        }
        self.entries.insert(
            at,
            Entry {
                index: i,
                value: base_value,
                kind: EntryKind::Remove,
            },
        );
        for e in self.entries[(at + 1)..].iter_mut() {
            e.index -= 1;
        }
    }

    /// Rewrite the value of a pending insertion at `i`, if one exists.
    /// Returns `true` if handled; otherwise the caller must flip the bit
    /// directly in the packed payload.
    pub fn record_set(&mut self, i: u32, value: bool) -> bool {
        let at = self.entries.partition_point(|e| e.index < i);
        if let Some(e) = self.entries.get_mut(at) {
            if e.index == i && e.kind == EntryKind::Insert {
                e.value = value;
                return true;
            }
        }
        false
    }

    /// Locate logical index `i` against the buffer for an `access`/`at`
    /// call: either a pending insertion exactly at `i` (returned as the
    /// hit value) or the packed-array index holding bit `i`.
    pub fn locate_access(&self, i: u32) -> (u32, Option<bool>) {
        let mut base = 0u32;
        let mut logical = 0u32;
        for e in &self.entries {
            if e.index > i {
                break;
            }
            let gap = e.index - logical;
            base += gap;
            logical += gap;
            match e.kind {
                EntryKind::Insert => {
                    if e.index == i {
                        return (base, Some(e.value));
                    }
                    logical += 1;
                }
                EntryKind::Remove => {
                    base += 1;
                }
            }
        }
        base += i - logical;
        (base, None)
    }

    /// Locate logical index `i` against the buffer for a `rank` call:
    /// the packed-array index to rank up to, plus the net value
    /// contribution of pending edits strictly before `i`.
    pub fn locate_rank(&self, i: u32) -> (u32, i64) {
        let mut base = 0u32;
        let mut logical = 0u32;
        let mut delta: i64 = 0;
        for e in &self.entries {
            if e.index >= i {
                break;
            }
            let gap = e.index - logical;
            base += gap;
            logical += gap;
            match e.kind {
                EntryKind::Insert => {
                    if e.value {
                        delta += 1;
                    }
                    logical += 1;
                }
                EntryKind::Remove => {
                    base += 1;
                    if e.value {
                        delta -= 1;
                    }
                }
            }
        }
        base += i - logical;
        (base, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DefaultPolicy;

    #[test]
    fn insert_shifts_later_entries() {
        let mut buf: EditBuffer<DefaultPolicy> = EditBuffer::new();
        buf.record_insert(5, true);
        buf.record_insert(3, false);
        let indices: Vec<u32> = buf.entries().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![3, 6]);
    }

    #[test]
    fn remove_annihilates_pending_insert() {
        let mut buf: EditBuffer<DefaultPolicy> = EditBuffer::new();
        buf.record_insert(4, true);
        buf.record_remove(4, false);
        assert!(buf.is_empty());
    }

    #[test]
    fn remove_without_pending_insert_tombstones() {
        let mut buf: EditBuffer<DefaultPolicy> = EditBuffer::new();
        buf.record_insert(10, true);
        buf.record_remove(2, true);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn set_rewrites_pending_insertion() {
        let mut buf: EditBuffer<DefaultPolicy> = EditBuffer::new();
        buf.record_insert(1, false);
        assert!(buf.record_set(1, true));
        assert!(buf.entries()[0].value);
        assert!(!buf.record_set(99, true));
    }

    #[test]
    fn locate_access_hits_pending_insert() {
        let mut buf: EditBuffer<DefaultPolicy> = EditBuffer::new();
        buf.record_insert(37, false);
        assert_eq!(buf.locate_access(37), (37, Some(false)));
        assert_eq!(buf.locate_access(0), (0, None));
        assert_eq!(buf.locate_access(38), (37, None));
    }

    #[test]
    fn locate_rank_accounts_for_removed_value() {
        let mut buf: EditBuffer<DefaultPolicy> = EditBuffer::new();
        // Remove a `1`-bit at logical index 2; logical index 5 now maps
        // to base index 6 (one base slot skipped) with rank reduced by 1.
        buf.record_remove(2, true);
        let (base, delta) = buf.locate_rank(5);
        assert_eq!(base, 6);
        assert_eq!(delta, -1);
    }
}
