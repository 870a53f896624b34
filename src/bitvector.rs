//! Public bit-vector root, tying the allocator, leaf, and node layers
//! together behind a single type-parametric API.
//!
//! A bit-vector owns exactly one of a leaf or a node as its root, growing
//! from a bare leaf into a tree as the first leaf split fires, and
//! shrinking back down as removes collapse a single-child node root onto
//! its surviving child.

use crate::alloc::{AllocRef, Allocator, LeafId, NodeId};
use crate::error::BitVecError;
use crate::node::{leaf_overflow_kind, ChildId, LeafOverflow, Node};
use crate::policy::Policy;
use crate::snapshot::Snapshot;
use core::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
enum Root {
    Leaf(LeafId),
    Node(NodeId),
}

#[derive(Debug)]
pub struct BitVector<P: Policy> {
    alloc: AllocRef<P>,
    root: Root,
}

impl<P: Policy> BitVector<P> {
    /// A fresh, empty bit-vector with its own owned allocator.
    pub fn new() -> Self {
        let alloc = AllocRef::new_owned();
        let leaf_id = alloc.with_mut(|a| {
            a.allocate_leaf(1)
                .expect("allocating the first leaf of a fresh bit-vector")
        });
        BitVector {
            alloc,
            root: Root::Leaf(leaf_id),
        }
    }

    /// A fresh, empty bit-vector sharing an allocator with other
    /// bit-vector instances.
    pub fn new_with_allocator(shared: Rc<RefCell<Allocator<P>>>) -> Self {
        let alloc = AllocRef::new_shared(shared);
        let leaf_id = alloc.with_mut(|a| {
            a.allocate_leaf(1)
                .expect("allocating the first leaf of a fresh bit-vector")
        });
        BitVector { alloc, root: Root::Leaf(leaf_id) }
    }

    /// A bit-vector of `size` bits all set to `value`, built by chunking
    /// into leaf-sized runs rather than one insert at a time. Packed
    /// leaves still need `O(size / N)` leaves since each must materialize
    /// its own words; a compressed leaf could do this in `O(1)` space.
    pub fn new_filled(size: u32, value: bool) -> Result<Self, BitVecError> {
        let alloc = AllocRef::new_owned();
        let root = alloc.with_mut(|a| Self::build_filled(a, size, value))?;
        Ok(BitVector { alloc, root })
    }

    fn build_filled(alloc: &mut Allocator<P>, size: u32, value: bool) -> Result<Root, BitVecError> {
        if size == 0 {
            let leaf_id = alloc.allocate_leaf(1)?;
            return Ok(Root::Leaf(leaf_id));
        }
        let chunk_bits = P::LEAF_BITS as u32;
        let mut remaining = size;
        let mut level: Vec<(ChildId, u32, u32)> = Vec::new();
        while remaining > 0 {
            let chunk = remaining.min(chunk_bits);
            let leaf_id = alloc.allocate_leaf_filled(chunk, value);
            let sum = if value { chunk } else { 0 };
            level.push((ChildId::Leaf(leaf_id), chunk, sum));
            remaining -= chunk;
        }
        if level.len() == 1 {
            let (child, _, _) = level[0];
            let ChildId::Leaf(id) = child else { unreachable!() };
            return Ok(Root::Leaf(id));
        }
        let mut is_leaf_level = true;
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(P::BRANCHING));
            for group in level.chunks(P::BRANCHING) {
                let node_id = alloc.allocate_node(is_leaf_level);
                {
                    let node = alloc.node_mut(node_id);
                    for &(child, sz, sm) in group {
                        node.append_child(child, sz as usize, sm as usize);
                    }
                }
                let node = alloc.node(node_id);
                next.push((ChildId::Node(node_id), node.total_size(), node.total_sum()));
            }
            level = next;
            is_leaf_level = false;
        }
        let (child, _, _) = level[0];
        Ok(match child {
            ChildId::Leaf(id) => Root::Leaf(id),
            ChildId::Node(id) => Root::Node(id),
        })
    }

    pub fn size(&self) -> u32 {
        let root = self.root;
        self.alloc.with(|alloc| match root {
            Root::Leaf(id) => alloc.leaf(id).size(),
            Root::Node(id) => alloc.node(id).total_size(),
        })
    }

    pub fn sum(&self) -> u32 {
        let root = self.root;
        self.alloc.with(|alloc| match root {
            Root::Leaf(id) => alloc.leaf(id).p_sum(),
            Root::Node(id) => alloc.node(id).total_sum(),
        })
    }

    pub fn at(&self, i: u32) -> bool {
        debug_assert!(i < self.size(), "bit-vector access out of range");
        let root = self.root;
        self.alloc.with(|alloc| match root {
            Root::Leaf(id) => alloc.leaf(id).at(i),
            Root::Node(id) => alloc.node(id).at(alloc, i),
        })
    }

    pub fn rank(&self, i: u32) -> u32 {
        debug_assert!(i <= self.size(), "bit-vector rank out of range");
        let root = self.root;
        self.alloc.with(|alloc| match root {
            Root::Leaf(id) => alloc.leaf(id).rank(i),
            Root::Node(id) => alloc.node(id).rank(alloc, i),
        })
    }

    /// Count of zero-bits in `[0, i)`.
    pub fn rank0(&self, i: u32) -> u32 {
        i - self.rank(i)
    }

    /// `rank(i)` if `v`, else `rank0(i)`.
    pub fn rank_value(&self, v: bool, i: u32) -> u32 {
        if v {
            self.rank(i)
        } else {
            self.rank0(i)
        }
    }

    /// Position of the `k`-th (1-indexed) set bit.
    pub fn select(&self, k: u32) -> u32 {
        debug_assert!(k >= 1 && k <= self.sum(), "select target out of range");
        let root = self.root;
        self.alloc.with(|alloc| match root {
            Root::Leaf(id) => alloc.leaf(id).select(k),
            Root::Node(id) => alloc.node(id).select(alloc, k),
        })
    }

    /// Position of the `k`-th (1-indexed) zero-bit, found by binary
    /// search over the monotone key `rank0`.
    pub fn select0(&self, k: u32) -> u32 {
        let n = self.size();
        debug_assert!(k >= 1 && k <= self.rank0(n), "select0 target out of range");
        let mut lo = 0u32;
        let mut hi = n - 1;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.rank0(mid + 1) >= k {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// `select(k)` if `v`, else `select0(k)`.
    pub fn select_value(&self, v: bool, k: u32) -> u32 {
        if v {
            self.select(k)
        } else {
            self.select0(k)
        }
    }

    /// Total physical leaf capacity in bits, summed across the tree —
    /// a diagnostic figure distinct from the logical `size()`.
    pub fn bit_size(&self) -> u64 {
        let root = self.root;
        self.alloc.with(|alloc| Self::capacity_and_size(alloc, root_to_child(root)).0)
    }

    /// Fraction of total leaf capacity actually occupied by live bits.
    pub fn leaf_usage(&self) -> f64 {
        let root = self.root;
        let (cap, size) = self.alloc.with(|alloc| Self::capacity_and_size(alloc, root_to_child(root)));
        if cap == 0 {
            0.0
        } else {
            size as f64 / cap as f64
        }
    }

    fn capacity_and_size(alloc: &Allocator<P>, child: ChildId) -> (u64, u64) {
        match child {
            ChildId::Leaf(id) => {
                let leaf = alloc.leaf(id);
                (leaf.capacity_bits() as u64, leaf.size() as u64)
            }
            ChildId::Node(id) => {
                let node = alloc.node(id);
                let mut cap = 0u64;
                let mut size = 0u64;
                for i in 0..node.child_count() {
                    let c = if node.is_leaf_parent() {
                        ChildId::Leaf(node.leaf_id(i))
                    } else {
                        ChildId::Node(node.node_id(i))
                    };
                    let (cc, ss) = Self::capacity_and_size(alloc, c);
                    cap += cc;
                    size += ss;
                }
                (cap, size)
            }
        }
    }

    /// Write this bit-vector's `size()` bits into `out`, little-endian
    /// within each word, matching the leaf packing convention.
    pub fn dump(&self, out: &mut [u64]) {
        debug_assert!((out.len() as u64) * 64 >= self.size() as u64);
        let root = self.root;
        self.alloc.with(|alloc| {
            let mut offset = 0usize;
            Self::dump_recursive(alloc, root_to_child(root), out, &mut offset);
        });
    }

    fn dump_recursive(alloc: &Allocator<P>, child: ChildId, out: &mut [u64], offset: &mut usize) {
        match child {
            ChildId::Leaf(id) => {
                let leaf = alloc.leaf(id);
                leaf.dump(out, *offset);
                *offset += leaf.size() as usize;
            }
            ChildId::Node(id) => {
                let node = alloc.node(id);
                for i in 0..node.child_count() {
                    let c = if node.is_leaf_parent() {
                        ChildId::Leaf(node.leaf_id(i))
                    } else {
                        ChildId::Node(node.node_id(i))
                    };
                    Self::dump_recursive(alloc, c, out, offset);
                }
            }
        }
    }

    /// Commit every leaf's pending edit buffer. Idempotent: calling this
    /// twice in a row leaves the tree bit-identical after the first call.
    pub fn flush(&mut self) {
        let root = self.root;
        self.alloc.with_mut(|alloc| Self::flush_recursive(alloc, root_to_child(root)));
    }

    fn flush_recursive(alloc: &mut Allocator<P>, child: ChildId) {
        match child {
            ChildId::Leaf(id) => alloc.leaf_mut(id).flush(),
            ChildId::Node(id) => {
                let count = alloc.node(id).child_count();
                let is_leaf_parent = alloc.node(id).is_leaf_parent();
                for i in 0..count {
                    let c = if is_leaf_parent {
                        ChildId::Leaf(alloc.node(id).leaf_id(i))
                    } else {
                        ChildId::Node(alloc.node(id).node_id(i))
                    };
                    Self::flush_recursive(alloc, c);
                }
            }
        }
    }

    pub fn insert(&mut self, pos: u32, v: bool) -> Result<(), BitVecError> {
        debug_assert!(pos <= self.size(), "insert position past end of bit-vector");
        match self.root {
            Root::Leaf(leaf_id) => {
                let overflow = self.alloc.with_mut(|alloc| {
                    alloc.leaf_mut(leaf_id).insert(pos, v);
                    leaf_overflow_kind(alloc.leaf(leaf_id))
                });
                match overflow {
                    LeafOverflow::Split => self.split_leaf_root(leaf_id)?,
                    LeafOverflow::Reallocate => self.reallocate_leaf_root(leaf_id)?,
                    LeafOverflow::None => {}
                }
                Ok(())
            }
            Root::Node(node_id) => {
                let grew = self.alloc.with_mut(|alloc| {
                    let mut root = alloc.take_node(node_id);
                    let grew = root.insert(alloc, pos, v);
                    alloc.put_node(node_id, root);
                    grew
                })?;
                if grew {
                    self.split_node_root(node_id)?;
                }
                Ok(())
            }
        }
    }

    /// Remove and return the bit at logical position `pos`.
    pub fn remove(&mut self, pos: u32) -> Result<bool, BitVecError> {
        debug_assert!(pos < self.size(), "remove position out of range");
        match self.root {
            Root::Leaf(leaf_id) => Ok(self.alloc.with_mut(|alloc| alloc.leaf_mut(leaf_id).remove(pos))),
            Root::Node(node_id) => {
                let (v, _root_needs_rebalance) = self.alloc.with_mut(|alloc| {
                    let mut root = alloc.take_node(node_id);
                    let result = root.remove(alloc, pos);
                    alloc.put_node(node_id, root);
                    result
                })?;
                // The `B/3` lower bound on child_count doesn't apply to the
                // root itself; only the single-child collapse does.
                self.maybe_collapse_node_root(node_id);
                Ok(v)
            }
        }
    }

    pub fn set(&mut self, pos: u32, v: bool) {
        debug_assert!(pos < self.size(), "set position out of range");
        let root = self.root;
        self.alloc.with_mut(|alloc| match root {
            Root::Leaf(id) => {
                alloc.leaf_mut(id).set(pos, v);
            }
            Root::Node(id) => {
                let mut node = alloc.take_node(id);
                node.set(alloc, pos, v);
                alloc.put_node(id, node);
            }
        });
    }

    /// Developer-facing self-check: walks the whole tree asserting the
    /// invariants of every leaf and node; never mutates.
    pub fn validate(&self) -> bool {
        let root = self.root;
        self.alloc.with(|alloc| match root {
            Root::Leaf(id) => alloc.leaf(id).validate(),
            Root::Node(id) => alloc.node(id).validate(alloc, true),
        })
    }

    /// Builds a read-only accelerator over the tree as it stands now.
    /// The tree must not be mutated while the snapshot is alive.
    pub fn generate_query_structure(&self) -> Snapshot<P> {
        let root = self.root;
        Snapshot::build(self.alloc.handle(), root_to_child(root))
    }

    fn split_leaf_root(&mut self, leaf_id: LeafId) -> Result<(), BitVecError> {
        let new_root = self.alloc.with_mut(|alloc| -> Result<Root, BitVecError> {
            let sibling_cap_words = (P::LEAF_BITS / 128).max(1);
            let sibling_id = alloc.allocate_leaf(sibling_cap_words)?;
            let half = P::LEAF_BITS as u32 / 2;
            {
                let (src, sibling) = alloc.leaf_pair_mut(leaf_id, sibling_id);
                sibling.transfer_prepend(src, half);
            }
            if P::AGGRESSIVE_REALLOC {
                let new_cap = crate::leaf::Leaf::<P>::desired_capacity_words(alloc.leaf(leaf_id).size());
                let _ = alloc.leaf_mut(leaf_id).reallocate(new_cap);
            }
            let (l_size, l_sum) = {
                let l = alloc.leaf(leaf_id);
                (l.size() as usize, l.p_sum() as usize)
            };
            let (r_size, r_sum) = {
                let r = alloc.leaf(sibling_id);
                (r.size() as usize, r.p_sum() as usize)
            };
            let node_id = alloc.allocate_node(true);
            {
                let node = alloc.node_mut(node_id);
                node.append_child(ChildId::Leaf(leaf_id), l_size, l_sum);
                node.append_child(ChildId::Leaf(sibling_id), r_size, r_sum);
            }
            Ok(Root::Node(node_id))
        })?;
        self.root = new_root;
        Ok(())
    }

    fn reallocate_leaf_root(&mut self, leaf_id: LeafId) -> Result<(), BitVecError> {
        self.alloc.with_mut(|alloc| {
            let cur_cap = alloc.leaf(leaf_id).capacity_words();
            let max_cap = (P::LEAF_BITS / 64).max(1);
            let new_cap = (cur_cap * 2).clamp(cur_cap + 1, max_cap);
            alloc.leaf_mut(leaf_id).reallocate(new_cap)
        })
    }

    fn split_node_root(&mut self, old_root_id: NodeId) -> Result<(), BitVecError> {
        let new_root = self.alloc.with_mut(|alloc| {
            let is_leaf_parent = alloc.node(old_root_id).is_leaf_parent();
            let sibling_id = alloc.allocate_node(is_leaf_parent);
            let half = P::BRANCHING / 2;
            {
                let (src, sibling) = alloc.node_pair_mut(old_root_id, sibling_id);
                sibling.absorb_suffix_from(src, half);
            }
            let (l_size, l_sum) = {
                let l = alloc.node(old_root_id);
                (l.total_size() as usize, l.total_sum() as usize)
            };
            let (r_size, r_sum) = {
                let r = alloc.node(sibling_id);
                (r.total_size() as usize, r.total_sum() as usize)
            };
            let node_id = alloc.allocate_node(false);
            {
                let node = alloc.node_mut(node_id);
                node.append_child(ChildId::Node(old_root_id), l_size, l_sum);
                node.append_child(ChildId::Node(sibling_id), r_size, r_sum);
            }
            Root::Node(node_id)
        });
        self.root = new_root;
        Ok(())
    }

    fn maybe_collapse_node_root(&mut self, node_id: NodeId) {
        let child_count = self.alloc.with(|alloc| alloc.node(node_id).child_count());
        if child_count != 1 {
            return;
        }
        let only = self.alloc.with_mut(|alloc| {
            let only = if alloc.node(node_id).is_leaf_parent() {
                ChildId::Leaf(alloc.node(node_id).leaf_id(0))
            } else {
                ChildId::Node(alloc.node(node_id).node_id(0))
            };
            alloc.deallocate_node(node_id);
            only
        });
        self.root = match only {
            ChildId::Leaf(id) => Root::Leaf(id),
            ChildId::Node(id) => Root::Node(id),
        };
    }
}

fn root_to_child(root: Root) -> ChildId {
    match root {
        Root::Leaf(id) => ChildId::Leaf(id),
        Root::Node(id) => ChildId::Node(id),
    }
}

impl<P: Policy> Default for BitVector<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Policy> BitVector<P> {
    fn deallocate_recursive(alloc: &mut Allocator<P>, child: ChildId) {
        match child {
            ChildId::Leaf(id) => alloc.deallocate_leaf(id),
            ChildId::Node(id) => {
                let count = alloc.node(id).child_count();
                let is_leaf_parent = alloc.node(id).is_leaf_parent();
                let children: Vec<ChildId> = (0..count)
                    .map(|i| {
                        if is_leaf_parent {
                            ChildId::Leaf(alloc.node(id).leaf_id(i))
                        } else {
                            ChildId::Node(alloc.node(id).node_id(i))
                        }
                    })
                    .collect();
                alloc.deallocate_node(id);
                for c in children {
                    Self::deallocate_recursive(alloc, c);
                }
            }
        }
    }
}

/// Releases every leaf and node owned by this bit-vector via a post-order
/// traversal; a shared allocator's other bit-vectors are untouched.
impl<P: Policy> Drop for BitVector<P> {
    fn drop(&mut self) {
        let root = self.root;
        self.alloc
            .with_mut(|alloc| Self::deallocate_recursive(alloc, root_to_child(root)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DefaultPolicy, TinyPolicy};

    #[test]
    fn ten_alternating_inserts_at_zero() {
        let mut bv: BitVector<DefaultPolicy> = BitVector::new();
        for i in 0..10u32 {
            bv.insert(0, i % 2 == 0).unwrap();
        }
        assert_eq!(bv.size(), 10);
        assert_eq!(bv.sum(), 5);
        let expected = [true, false, true, false, true, false, true, false, true, false];
        for (i, &e) in expected.iter().enumerate() {
            assert_eq!(bv.at(i as u32), e);
        }
        assert_eq!(bv.rank(10), 5);
        assert_eq!(bv.select(3), 4);
        assert_eq!(bv.select0(3), 5);
    }

    #[test]
    fn sequential_zeros_then_ones() {
        let mut bv: BitVector<DefaultPolicy> = BitVector::new();
        for i in 0..100u32 {
            bv.insert(i, false).unwrap();
        }
        for i in 0..100u32 {
            bv.insert(100 + i, true).unwrap();
        }
        assert_eq!(bv.size(), 200);
        assert_eq!(bv.sum(), 100);
        assert_eq!(bv.rank(100), 0);
        assert_eq!(bv.rank(200), 100);
        assert_eq!(bv.select(1), 100);
        assert_eq!(bv.select0(1), 0);
        assert_eq!(bv.select0(100), 99);
    }

    #[test]
    fn root_split_dynamics() {
        let n = TinyPolicy::LEAF_BITS as u32;
        let mut bv: BitVector<TinyPolicy> = BitVector::new();
        for i in 0..(n + 6) {
            bv.insert(i, i % 2 == 0).unwrap();
        }
        assert_eq!(bv.size(), n + 6);
        assert_eq!(bv.sum(), (n + 6) / 2);
        for i in 0..(n + 6) {
            assert_eq!(bv.at(i), i % 2 == 0);
        }
        assert!(bv.validate());
    }

    #[test]
    fn remove_shrinks_and_root_collapses() {
        let mut bv: BitVector<TinyPolicy> = BitVector::new();
        for i in 0..200u32 {
            bv.insert(i, i % 5 == 0).unwrap();
        }
        while bv.size() > 1 {
            bv.remove(bv.size() - 1).unwrap();
            assert!(bv.validate());
        }
        assert_eq!(bv.size(), 1);
    }

    #[test]
    fn new_filled_reports_expected_sum() {
        let bv: BitVector<TinyPolicy> = BitVector::new_filled(500, true).unwrap();
        assert_eq!(bv.size(), 500);
        assert_eq!(bv.sum(), 500);
        for i in 0..500 {
            assert!(bv.at(i));
        }
        assert!(bv.validate());
    }

    #[test]
    fn allocator_balance_after_drop() {
        let handle = Rc::new(RefCell::new(Allocator::<TinyPolicy>::new()));
        {
            let mut bv = BitVector::new_with_allocator(Rc::clone(&handle));
            for i in 0..50u32 {
                bv.insert(i, i % 2 == 0).unwrap();
            }
            for _ in 0..50 {
                bv.remove(0).unwrap();
            }
        }
        assert_eq!(handle.borrow().live_allocations(), 0);
    }

    #[test]
    fn dump_matches_at() {
        let mut bv: BitVector<DefaultPolicy> = BitVector::new();
        for i in 0..300u32 {
            bv.insert(i, i % 7 == 0).unwrap();
        }
        bv.flush();
        let mut out = vec![0u64; 300usize.div_ceil(64)];
        bv.dump(&mut out);
        for i in 0..300u32 {
            let word = out[(i / 64) as usize];
            let bit = (word >> (i % 64)) & 1 == 1;
            assert_eq!(bit, bv.at(i));
        }
    }
}
