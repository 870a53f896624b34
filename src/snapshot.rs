//! Read-only query-support directory over a quiescent tree.
//!
//! Built by one traversal that collects every leaf together with its
//! cumulative prefix size and prefix sum, blocked by `Policy::SNAPSHOT_BLOCK`
//! so `at`/`rank` can jump straight to the right directory slot instead of
//! walking the tree. `select` binary-searches the directory on prefix sum,
//! then calls into the located leaf. Grounded on the append/at/rank/select
//! algorithm of a directory-of-leaves accelerator that blocks entries by a
//! fixed position stride and advances across a block boundary when a leaf
//! straddles it.

use crate::alloc::{Allocator, LeafId};
use crate::node::ChildId;
use crate::policy::Policy;
use core::cell::RefCell;
use core::marker::PhantomData;
use std::rc::Rc;

struct Elem {
    p_size: u32,
    p_sum: u32,
    leaf: LeafId,
}

/// Non-owning accelerator: holds the same allocator handle as the
/// bit-vector it was built from, so its leaves are never separately
/// freed, but it must not be used after the tree is mutated.
pub struct Snapshot<P: Policy> {
    alloc: Rc<RefCell<Allocator<P>>>,
    elems: Vec<Elem>,
    size: u32,
    sum: u32,
    _policy: PhantomData<P>,
}

impl<P: Policy> Snapshot<P> {
    pub(crate) fn build(alloc: Rc<RefCell<Allocator<P>>>, root: ChildId) -> Self {
        let mut leaves = Vec::new();
        {
            let a = alloc.borrow();
            collect_leaves(&a, root, &mut leaves);
        }
        let block = P::SNAPSHOT_BLOCK as u32;
        let mut elems = Vec::new();
        let mut size = 0u32;
        let mut sum = 0u32;
        {
            let a = alloc.borrow();
            for leaf_id in leaves {
                let leaf = a.leaf(leaf_id);
                let a_size = leaf.size();
                let mut i = elems.len() as u32;
                while size + a_size > i * block {
                    elems.push(Elem {
                        p_size: size,
                        p_sum: sum,
                        leaf: leaf_id,
                    });
                    i += 1;
                }
                size += a_size;
                sum += leaf.p_sum();
            }
        }
        Snapshot {
            alloc,
            elems,
            size,
            sum,
            _policy: PhantomData,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sum(&self) -> u32 {
        self.sum
    }

    pub fn at(&self, i: u32) -> bool {
        debug_assert!(i < self.size, "snapshot access out of range");
        let a = self.alloc.borrow();
        let mut idx = (i / P::SNAPSHOT_BLOCK as u32) as usize;
        let mut e = &self.elems[idx];
        if e.p_size + a.leaf(e.leaf).size() <= i {
            idx += 1;
            e = &self.elems[idx];
        }
        a.leaf(e.leaf).at(i - e.p_size)
    }

    pub fn rank(&self, i: u32) -> u32 {
        debug_assert!(i <= self.size, "snapshot rank out of range");
        if i == self.size {
            return self.sum;
        }
        let a = self.alloc.borrow();
        let mut idx = (i / P::SNAPSHOT_BLOCK as u32) as usize;
        let mut e = &self.elems[idx];
        if e.p_size + a.leaf(e.leaf).size() <= i {
            idx += 1;
            e = &self.elems[idx];
        }
        e.p_sum + a.leaf(e.leaf).rank(i - e.p_size)
    }

    /// Position of the `k`-th (1-indexed) set bit.
    pub fn select(&self, k: u32) -> u32 {
        debug_assert!(k >= 1 && k <= self.sum, "snapshot select out of range");
        let a = self.alloc.borrow();
        let mut lo = 0usize;
        let mut hi = self.elems.len() - 1;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.elems[mid].p_sum >= k {
                hi = mid - 1;
            } else {
                lo = mid;
            }
        }
        let mut idx = lo;
        while self.elems[idx].p_sum + a.leaf(self.elems[idx].leaf).p_sum() < k {
            idx += 1;
        }
        let e = &self.elems[idx];
        e.p_size + a.leaf(e.leaf).select(k - e.p_sum)
    }
}

fn collect_leaves<P: Policy>(alloc: &Allocator<P>, child: ChildId, out: &mut Vec<LeafId>) {
    match child {
        ChildId::Leaf(id) => out.push(id),
        ChildId::Node(id) => {
            let node = alloc.node(id);
            for i in 0..node.child_count() {
                let c = if node.is_leaf_parent() {
                    ChildId::Leaf(node.leaf_id(i))
                } else {
                    ChildId::Node(node.node_id(i))
                };
                collect_leaves(alloc, c, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvector::BitVector;
    use crate::policy::TinyPolicy;

    #[test]
    fn snapshot_agrees_with_live_tree() {
        let mut bv: BitVector<TinyPolicy> = BitVector::new();
        for i in 0..300u32 {
            bv.insert(i, i % 3 == 0).unwrap();
        }
        bv.flush();
        let snap = bv.generate_query_structure();
        assert_eq!(snap.size(), bv.size());
        assert_eq!(snap.sum(), bv.sum());
        for i in [0u32, 1, 2, 150, 299] {
            assert_eq!(snap.at(i), bv.at(i));
            assert_eq!(snap.rank(i), bv.rank(i));
        }
        for k in 1..=snap.sum().min(20) {
            assert_eq!(snap.select(k), bv.select(k));
        }
    }

    #[test]
    fn snapshot_over_root_split_tree() {
        let n = TinyPolicy::LEAF_BITS as u32;
        let mut bv: BitVector<TinyPolicy> = BitVector::new();
        for i in 0..(n + 5) {
            bv.insert(i, i % 2 == 0).unwrap();
        }
        bv.flush();
        let snap = bv.generate_query_structure();
        let mid = snap.sum() / 2 + 1;
        assert_eq!(snap.select(mid), bv.select(mid));
        for i in [0u32, 1, n - 1, n, n + 4] {
            assert_eq!(snap.rank(i), bv.rank(i));
            assert_eq!(snap.at(i), bv.at(i));
        }
    }
}
