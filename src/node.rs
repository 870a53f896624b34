//! Fixed-fanout B-tree internal node.
//!
//! Each node carries two parallel [`CumulativeArray`]s (`sizes`, `sums`)
//! and one children array. `Children<P>` is a tagged union: either a
//! leaf-id array or a node-id array, so there is no hidden cast and the
//! compiler enforces that a node's children are all the same kind.
//!
//! Recursive descent into a child node borrows the allocator by value
//! (`take_node`/`put_node`) rather than holding two live `&mut Allocator`
//! borrows at once — the safe-Rust analogue of following a raw child
//! pointer, since `Node<P>` itself holds only arena handles, never a
//! reference into the arena.

use crate::alloc::{Allocator, LeafId, NodeId};
use crate::cumulative::CumulativeArray;
use crate::error::BitVecError;
use crate::leaf::Leaf;
use crate::policy::Policy;

#[derive(Debug, Clone)]
pub(crate) enum Children<P: Policy> {
    Leaves(Vec<Option<LeafId>>),
    Nodes(Vec<Option<NodeId>>),
}

impl<P: Policy> Children<P> {
    fn new_leaves() -> Self {
        Children::Leaves(vec![None; P::BRANCHING])
    }
    fn new_nodes() -> Self {
        Children::Nodes(vec![None; P::BRANCHING])
    }
}

/// A child handle of either kind, used when a structural event hands a
/// freshly built or freshly split child up to its parent.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ChildId {
    Leaf(LeafId),
    Node(NodeId),
}

pub(crate) enum LeafOverflow {
    None,
    Reallocate,
    Split,
}

pub(crate) fn leaf_overflow_kind<P: Policy>(leaf: &Leaf<P>) -> LeafOverflow {
    let n = P::LEAF_BITS as u32;
    if leaf.size() >= n {
        LeafOverflow::Split
    } else if leaf.need_realloc() {
        if leaf.capacity_bits() >= n {
            LeafOverflow::Split
        } else {
            LeafOverflow::Reallocate
        }
    } else {
        LeafOverflow::None
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node<P: Policy> {
    children: Children<P>,
    sizes: CumulativeArray<P>,
    sums: CumulativeArray<P>,
    child_count: usize,
}

impl<P: Policy> Node<P> {
    pub fn empty_leaf_parent() -> Self {
        Node {
            children: Children::new_leaves(),
            sizes: CumulativeArray::new(),
            sums: CumulativeArray::new(),
            child_count: 0,
        }
    }

    pub fn empty_node_parent() -> Self {
        Node {
            children: Children::new_nodes(),
            sizes: CumulativeArray::new(),
            sums: CumulativeArray::new(),
            child_count: 0,
        }
    }

    pub fn empty_like(is_leaf_parent: bool) -> Self {
        if is_leaf_parent {
            Self::empty_leaf_parent()
        } else {
            Self::empty_node_parent()
        }
    }

    #[inline]
    pub fn is_leaf_parent(&self) -> bool {
        matches!(self.children, Children::Leaves(_))
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.child_count
    }

    pub fn total_size(&self) -> u32 {
        self.sizes.total(self.child_count) as u32
    }

    pub fn total_sum(&self) -> u32 {
        self.sums.total(self.child_count) as u32
    }

    pub(crate) fn leaf_id(&self, idx: usize) -> LeafId {
        match &self.children {
            Children::Leaves(ids) => ids[idx].expect("child slot unexpectedly empty"),
            Children::Nodes(_) => panic!("node is not a leaf parent"),
        }
    }

    pub(crate) fn node_id(&self, idx: usize) -> NodeId {
        match &self.children {
            Children::Nodes(ids) => ids[idx].expect("child slot unexpectedly empty"),
            Children::Leaves(_) => panic!("node is not a node parent"),
        }
    }

    /// Append one already-built child at the end. Used while assembling a
    /// brand-new node (root promotion, node split).
    pub fn append_child(&mut self, id: ChildId, size: usize, sum: usize) {
        let idx = self.child_count;
        self.sizes.append(idx, size);
        self.sums.append(idx, sum);
        match (&mut self.children, id) {
            (Children::Leaves(ids), ChildId::Leaf(l)) => ids[idx] = Some(l),
            (Children::Nodes(ids), ChildId::Node(n)) => ids[idx] = Some(n),
            _ => unreachable!("child kind must match node kind"),
        }
        self.child_count += 1;
    }

    fn insert_child(&mut self, idx: usize, size: usize, sum: usize, id: ChildId) {
        let old_count = self.child_count;
        self.sizes.insert_at(idx, old_count, size);
        self.sums.insert_at(idx, old_count, sum);
        match (&mut self.children, id) {
            (Children::Leaves(ids), ChildId::Leaf(l)) => {
                for j in (idx..old_count).rev() {
                    ids[j + 1] = ids[j];
                }
                ids[idx] = Some(l);
            }
            (Children::Nodes(ids), ChildId::Node(n)) => {
                for j in (idx..old_count).rev() {
                    ids[j + 1] = ids[j];
                }
                ids[idx] = Some(n);
            }
            _ => unreachable!("child kind must match node kind"),
        }
        self.child_count += 1;
    }

    fn remove_child(&mut self, idx: usize) -> ChildId {
        let old_count = self.child_count;
        let removed = match &mut self.children {
            Children::Leaves(ids) => {
                let r = ids[idx].take().expect("removing empty child slot");
                for j in idx..(old_count - 1) {
                    ids[j] = ids[j + 1];
                }
                ids[old_count - 1] = None;
                ChildId::Leaf(r)
            }
            Children::Nodes(ids) => {
                let r = ids[idx].take().expect("removing empty child slot");
                for j in idx..(old_count - 1) {
                    ids[j] = ids[j + 1];
                }
                ids[old_count - 1] = None;
                ChildId::Node(r)
            }
        };
        self.sizes.remove_at(idx, old_count);
        self.sums.remove_at(idx, old_count);
        self.child_count -= 1;
        removed
    }

    /// Routes `pos` (which may equal the total size, for an append) to a
    /// child index plus the position local to that child.
    fn route(&self, pos: u32) -> (usize, u32) {
        let mut idx = self.sizes.find(pos as usize + 1, self.child_count);
        if idx == self.child_count {
            idx = self.child_count - 1;
        }
        let prior = if idx == 0 {
            0
        } else {
            self.sizes.value_at(idx - 1)
        };
        (idx, pos - prior as u32)
    }

    pub fn at(&self, alloc: &Allocator<P>, pos: u32) -> bool {
        let (idx, local) = self.route(pos);
        match &self.children {
            Children::Leaves(ids) => alloc.leaf(ids[idx].unwrap()).at(local),
            Children::Nodes(ids) => alloc.node(ids[idx].unwrap()).at(alloc, local),
        }
    }

    pub fn rank(&self, alloc: &Allocator<P>, pos: u32) -> u32 {
        let (idx, local) = self.route(pos);
        let prior_sum = if idx == 0 { 0 } else { self.sums.value_at(idx - 1) };
        let child_rank = match &self.children {
            Children::Leaves(ids) => alloc.leaf(ids[idx].unwrap()).rank(local),
            Children::Nodes(ids) => alloc.node(ids[idx].unwrap()).rank(alloc, local),
        };
        prior_sum as u32 + child_rank
    }

    pub fn select(&self, alloc: &Allocator<P>, k: u32) -> u32 {
        let idx = self.sums.find(k as usize, self.child_count);
        let prior_size = if idx == 0 { 0 } else { self.sizes.value_at(idx - 1) };
        let prior_sum = if idx == 0 { 0 } else { self.sums.value_at(idx - 1) };
        let local_k = k - prior_sum as u32;
        let child_select = match &self.children {
            Children::Leaves(ids) => alloc.leaf(ids[idx].unwrap()).select(local_k),
            Children::Nodes(ids) => alloc.node(ids[idx].unwrap()).select(alloc, local_k),
        };
        prior_size as u32 + child_select
    }

    pub fn set(&mut self, alloc: &mut Allocator<P>, pos: u32, v: bool) -> i8 {
        let (idx, local) = self.route(pos);
        let delta = match &self.children {
            Children::Leaves(ids) => alloc.leaf_mut(ids[idx].unwrap()).set(local, v),
            Children::Nodes(ids) => {
                let id = ids[idx].unwrap();
                let mut child = alloc.take_node(id);
                let delta = child.set(alloc, local, v);
                alloc.put_node(id, child);
                delta
            }
        };
        if delta != 0 {
            self.sums.increment_suffix(idx, self.child_count, delta as i64);
        }
        delta
    }

    /// Returns `true` if, after the insert, `child_count == B` and this
    /// node itself now needs to be split by its caller.
    pub fn insert(&mut self, alloc: &mut Allocator<P>, pos: u32, v: bool) -> Result<bool, BitVecError> {
        let (idx, local) = self.route(pos);
        match &self.children {
            Children::Leaves(_) => {
                let leaf_id = self.leaf_id(idx);
                alloc.leaf_mut(leaf_id).insert(local, v);
                self.sizes.increment_suffix(idx, self.child_count, 1);
                if v {
                    self.sums.increment_suffix(idx, self.child_count, 1);
                }
                match leaf_overflow_kind(alloc.leaf(leaf_id)) {
                    LeafOverflow::Split => self.split_leaf_child(alloc, idx)?,
                    LeafOverflow::Reallocate => self.reallocate_leaf_child(alloc, idx)?,
                    LeafOverflow::None => {}
                }
            }
            Children::Nodes(_) => {
                let node_id = self.node_id(idx);
                let mut child = alloc.take_node(node_id);
                let grew = child.insert(alloc, local, v);
                alloc.put_node(node_id, child);
                let grew = grew?;
                self.sizes.increment_suffix(idx, self.child_count, 1);
                if v {
                    self.sums.increment_suffix(idx, self.child_count, 1);
                }
                if grew {
                    self.split_node_child(alloc, idx)?;
                }
            }
        }
        Ok(self.child_count == P::BRANCHING)
    }

    /// Returns `(removed_value, self_needs_rebalance)`; `self_needs_rebalance`
    /// is true once `child_count < B/3` (the root is exempt from this and
    /// the caller — [`crate::bitvector::BitVector`] — must check for that
    /// itself since a node doesn't know whether it is the root).
    pub fn remove(&mut self, alloc: &mut Allocator<P>, pos: u32) -> Result<(bool, bool), BitVecError> {
        let (idx, local) = self.route(pos);
        let value = match &self.children {
            Children::Leaves(_) => {
                let leaf_id = self.leaf_id(idx);
                let v = alloc.leaf_mut(leaf_id).remove(local);
                self.sizes.increment_suffix(idx, self.child_count, -1);
                if v {
                    self.sums.increment_suffix(idx, self.child_count, -1);
                }
                if (alloc.leaf(leaf_id).size() as usize) <= P::LEAF_BITS / 3 {
                    self.rebalance_leaf_child(alloc, idx)?;
                }
                v
            }
            Children::Nodes(_) => {
                let node_id = self.node_id(idx);
                let mut child = alloc.take_node(node_id);
                let result = child.remove(alloc, local);
                alloc.put_node(node_id, child);
                let (v, child_underflowed) = result?;
                self.sizes.increment_suffix(idx, self.child_count, -1);
                if v {
                    self.sums.increment_suffix(idx, self.child_count, -1);
                }
                if child_underflowed {
                    self.rebalance_node_child(alloc, idx)?;
                }
                v
            }
        };
        Ok((value, self.child_count < P::BRANCHING / 3))
    }

    fn split_leaf_child(&mut self, alloc: &mut Allocator<P>, idx: usize) -> Result<(), BitVecError> {
        let leaf_id = self.leaf_id(idx);
        let sibling_cap_words = (P::LEAF_BITS / 128).max(1);
        let sibling_id = alloc.allocate_leaf(sibling_cap_words)?;
        let half = P::LEAF_BITS as u32 / 2;

        let (old_size, old_sum) = {
            let src = alloc.leaf(leaf_id);
            (src.size() as i64, src.p_sum() as i64)
        };
        {
            let (src, sibling) = alloc.leaf_pair_mut(leaf_id, sibling_id);
            sibling.transfer_prepend(src, half);
        }
        let (new_size, new_sum, sib_size, sib_sum) = {
            let src = alloc.leaf(leaf_id);
            let sibling = alloc.leaf(sibling_id);
            (
                src.size() as i64,
                src.p_sum() as i64,
                sibling.size() as usize,
                sibling.p_sum() as usize,
            )
        };
        let old_count = self.child_count;
        self.sizes.increment_suffix(idx, old_count, new_size - old_size);
        self.sums.increment_suffix(idx, old_count, new_sum - old_sum);
        self.insert_child(idx + 1, sib_size, sib_sum, ChildId::Leaf(sibling_id));

        if P::AGGRESSIVE_REALLOC {
            let new_cap = Leaf::<P>::desired_capacity_words(new_size as u32);
            let _ = alloc.leaf_mut(leaf_id).reallocate(new_cap);
        }
        Ok(())
    }

    fn reallocate_leaf_child(&mut self, alloc: &mut Allocator<P>, idx: usize) -> Result<(), BitVecError> {
        let leaf_id = self.leaf_id(idx);
        let cur_cap = alloc.leaf(leaf_id).capacity_words();
        let max_cap = (P::LEAF_BITS / 64).max(1);
        let new_cap = (cur_cap * 2).clamp(cur_cap + 1, max_cap);
        alloc.leaf_mut(leaf_id).reallocate(new_cap)
    }

    fn split_node_child(&mut self, alloc: &mut Allocator<P>, idx: usize) -> Result<(), BitVecError> {
        let child_id = self.node_id(idx);
        let is_leaf_parent = alloc.node(child_id).is_leaf_parent();
        let sibling_id = alloc.allocate_node(is_leaf_parent);
        let half = P::BRANCHING / 2;

        let (old_size, old_sum) = {
            let c = alloc.node(child_id);
            (c.total_size() as i64, c.total_sum() as i64)
        };
        {
            let (src, sibling) = alloc.node_pair_mut(child_id, sibling_id);
            sibling.absorb_suffix_from(src, half);
        }
        let (new_size, new_sum, sib_size, sib_sum) = {
            let src = alloc.node(child_id);
            let sibling = alloc.node(sibling_id);
            (
                src.total_size() as i64,
                src.total_sum() as i64,
                sibling.total_size() as usize,
                sibling.total_sum() as usize,
            )
        };
        let old_count = self.child_count;
        self.sizes.increment_suffix(idx, old_count, new_size - old_size);
        self.sums.increment_suffix(idx, old_count, new_sum - old_sum);
        self.insert_child(idx + 1, sib_size, sib_sum, ChildId::Node(sibling_id));
        Ok(())
    }

    /// Move the last `take_count` children of `src` onto `self` (which
    /// must start empty), preserving order. Used by node split.
    pub(crate) fn absorb_suffix_from(&mut self, src: &mut Node<P>, take_count: usize) {
        let src_count = src.child_count;
        let start = src_count - take_count;
        let base_size = if start == 0 { 0 } else { src.sizes.value_at(start - 1) };
        let base_sum = if start == 0 { 0 } else { src.sums.value_at(start - 1) };
        for j in 0..take_count {
            let size_cum = src.sizes.value_at(start + j) - base_size;
            let sum_cum = src.sums.value_at(start + j) - base_sum;
            self.sizes.set_raw(j, size_cum);
            self.sums.set_raw(j, sum_cum);
        }
        match (&mut self.children, &mut src.children) {
            (Children::Leaves(dst), Children::Leaves(s)) => {
                for j in 0..take_count {
                    dst[j] = s[start + j].take();
                }
            }
            (Children::Nodes(dst), Children::Nodes(s)) => {
                for j in 0..take_count {
                    dst[j] = s[start + j].take();
                }
            }
            _ => unreachable!("split siblings must share child kind"),
        }
        src.sizes.clear_last(start, src_count);
        src.sums.clear_last(start, src_count);
        src.child_count = start;
        self.child_count = take_count;
    }

    fn rebalance_leaf_child(&mut self, alloc: &mut Allocator<P>, idx: usize) -> Result<(), BitVecError> {
        let (left_idx, right_idx) = if idx == 0 { (idx, idx + 1) } else { (idx - 1, idx) };
        let target_is_left = idx == left_idx;
        let left_id = self.leaf_id(left_idx);
        let right_id = self.leaf_id(right_idx);
        let (left_size, right_size) = {
            let l = alloc.leaf(left_id);
            let r = alloc.leaf(right_id);
            (l.size(), r.size())
        };
        let n = P::LEAF_BITS as u32;
        let sibling_size = if target_is_left { right_size } else { left_size };

        if (sibling_size as u64) * 9 > (5 * n as u64) {
            let k = (sibling_size - n / 3) / 2;
            let (l_old, r_old, l_sum_old, r_sum_old) = {
                let l = alloc.leaf(left_id);
                let r = alloc.leaf(right_id);
                (l.size() as i64, r.size() as i64, l.p_sum() as i64, r.p_sum() as i64)
            };
            {
                let (left, right) = alloc.leaf_pair_mut(left_id, right_id);
                if target_is_left {
                    left.transfer_append(right, k);
                } else {
                    right.transfer_prepend(left, k);
                }
            }
            let (l_new, r_new, l_sum_new, r_sum_new) = {
                let l = alloc.leaf(left_id);
                let r = alloc.leaf(right_id);
                (l.size() as i64, r.size() as i64, l.p_sum() as i64, r.p_sum() as i64)
            };
            let count = self.child_count;
            self.sizes.increment_suffix(left_idx, count, l_new - l_old);
            self.sizes.increment_suffix(right_idx, count, r_new - r_old);
            self.sums.increment_suffix(left_idx, count, l_sum_new - l_sum_old);
            self.sums.increment_suffix(right_idx, count, r_sum_new - r_sum_old);
            return Ok(());
        }

        let (smaller_idx, larger_idx) = if left_size <= right_size {
            (left_idx, right_idx)
        } else {
            (right_idx, left_idx)
        };
        let smaller_id = self.leaf_id(smaller_idx);
        let larger_id = self.leaf_id(larger_idx);
        let (sm_size, sm_sum) = {
            let s = alloc.leaf(smaller_id);
            (s.size() as i64, s.p_sum() as i64)
        };
        {
            let (a, b) = alloc.leaf_pair_mut(smaller_id, larger_id);
            if smaller_idx < larger_idx {
                b.transfer_prepend(a, sm_size as u32);
            } else {
                b.append_all(a);
            }
        }
        alloc.deallocate_leaf(smaller_id);
        self.remove_child(smaller_idx);
        let larger_idx_after = if larger_idx > smaller_idx {
            larger_idx - 1
        } else {
            larger_idx
        };
        let count = self.child_count;
        self.sizes.increment_suffix(larger_idx_after, count, sm_size);
        self.sums.increment_suffix(larger_idx_after, count, sm_sum);
        Ok(())
    }

    fn rebalance_node_child(&mut self, alloc: &mut Allocator<P>, idx: usize) -> Result<(), BitVecError> {
        let (left_idx, right_idx) = if idx == 0 { (idx, idx + 1) } else { (idx - 1, idx) };
        let target_is_left = idx == left_idx;
        let left_id = self.node_id(left_idx);
        let right_id = self.node_id(right_idx);
        let (left_count, right_count) = {
            let l = alloc.node(left_id);
            let r = alloc.node(right_id);
            (l.child_count(), r.child_count())
        };
        let b = P::BRANCHING;
        let sibling_count = if target_is_left { right_count } else { left_count };

        if sibling_count * 9 > 5 * b {
            let k = (sibling_count - b / 3) / 2;
            let (l_old, r_old, l_sum_old, r_sum_old) = {
                let l = alloc.node(left_id);
                let r = alloc.node(right_id);
                (l.total_size() as i64, r.total_size() as i64, l.total_sum() as i64, r.total_sum() as i64)
            };
            {
                let (left, right) = alloc.node_pair_mut(left_id, right_id);
                if target_is_left {
                    left.absorb_prefix_from(right, k);
                } else {
                    right.absorb_suffix_into_front(left, k);
                }
            }
            let (l_new, r_new, l_sum_new, r_sum_new) = {
                let l = alloc.node(left_id);
                let r = alloc.node(right_id);
                (l.total_size() as i64, r.total_size() as i64, l.total_sum() as i64, r.total_sum() as i64)
            };
            let count = self.child_count;
            self.sizes.increment_suffix(left_idx, count, l_new - l_old);
            self.sizes.increment_suffix(right_idx, count, r_new - r_old);
            self.sums.increment_suffix(left_idx, count, l_sum_new - l_sum_old);
            self.sums.increment_suffix(right_idx, count, r_sum_new - r_sum_old);
            return Ok(());
        }

        let (smaller_idx, larger_idx) = if left_count <= right_count {
            (left_idx, right_idx)
        } else {
            (right_idx, left_idx)
        };
        let smaller_id = self.node_id(smaller_idx);
        let larger_id = self.node_id(larger_idx);
        let (sm_size, sm_sum) = {
            let s = alloc.node(smaller_id);
            (s.total_size() as i64, s.total_sum() as i64)
        };
        {
            let smaller_count = alloc.node(smaller_id).child_count();
            let (a, b) = alloc.node_pair_mut(smaller_id, larger_id);
            if smaller_idx < larger_idx {
                b.prepend_all_from(a, smaller_count);
            } else {
                b.append_all_from(a);
            }
        }
        alloc.deallocate_node(smaller_id);
        self.remove_child(smaller_idx);
        let larger_idx_after = if larger_idx > smaller_idx {
            larger_idx - 1
        } else {
            larger_idx
        };
        let count = self.child_count;
        self.sizes.increment_suffix(larger_idx_after, count, sm_size);
        self.sums.increment_suffix(larger_idx_after, count, sm_sum);
        Ok(())
    }

    /// Move the first `k` children of `donor` onto the end of `self`.
    fn absorb_prefix_from(&mut self, donor: &mut Node<P>, k: usize) {
        let self_count = self.child_count;
        for j in 0..k {
            let qty_size = donor.sizes.delta_at(j);
            let qty_sum = donor.sums.delta_at(j);
            self.sizes.append(self_count + j, qty_size);
            self.sums.append(self_count + j, qty_sum);
        }
        match (&mut self.children, &mut donor.children) {
            (Children::Leaves(dst), Children::Leaves(s)) => {
                for j in 0..k {
                    dst[self_count + j] = s[j].take();
                }
                for j in k..donor.child_count {
                    s[j - k] = s[j].take();
                }
            }
            (Children::Nodes(dst), Children::Nodes(s)) => {
                for j in 0..k {
                    dst[self_count + j] = s[j].take();
                }
                for j in k..donor.child_count {
                    s[j - k] = s[j].take();
                }
            }
            _ => unreachable!("rebalance siblings must share child kind"),
        }
        self.child_count += k;
        donor.sizes.clear_first(k, donor.child_count);
        donor.sums.clear_first(k, donor.child_count);
        donor.child_count -= k;
    }

    /// Move the last `k` children of `donor` onto the front of `self`.
    fn absorb_suffix_into_front(&mut self, donor: &mut Node<P>, k: usize) {
        let donor_count = donor.child_count;
        let start = donor_count - k;
        let self_count = self.child_count;

        // Capture per-child quantities before either cumulative array is
        // touched, since the shift below invalidates index-based reads.
        let donor_deltas: Vec<(usize, usize)> = (0..k)
            .map(|j| (donor.sizes.delta_at(start + j), donor.sums.delta_at(start + j)))
            .collect();
        let self_deltas: Vec<(usize, usize)> = (0..self_count)
            .map(|j| (self.sizes.delta_at(j), self.sums.delta_at(j)))
            .collect();

        match (&mut self.children, &mut donor.children) {
            (Children::Leaves(dst), Children::Leaves(s)) => {
                for j in (0..self_count).rev() {
                    dst[j + k] = dst[j];
                }
                for j in 0..k {
                    dst[j] = s[start + j].take();
                }
            }
            (Children::Nodes(dst), Children::Nodes(s)) => {
                for j in (0..self_count).rev() {
                    dst[j + k] = dst[j];
                }
                for j in 0..k {
                    dst[j] = s[start + j].take();
                }
            }
            _ => unreachable!("rebalance siblings must share child kind"),
        }

        let mut running_size = 0usize;
        let mut running_sum = 0usize;
        for (j, (size_q, sum_q)) in donor_deltas.iter().chain(self_deltas.iter()).enumerate() {
            running_size += size_q;
            running_sum += sum_q;
            self.sizes.set_raw(j, running_size);
            self.sums.set_raw(j, running_sum);
        }
        self.child_count = self_count + k;

        donor.sizes.clear_last(start, donor_count);
        donor.sums.clear_last(start, donor_count);
        donor.child_count = start;
    }

    /// Move every child of `donor` (which must have `count` children) onto
    /// the front of `self`.
    fn prepend_all_from(&mut self, donor: &mut Node<P>, count: usize) {
        self.absorb_suffix_into_front(donor, count);
    }

    /// Move every child of `donor` onto the end of `self`, leaving
    /// `donor` empty. Unlike `absorb_suffix_from`, `self` need not be
    /// empty beforehand (used when merging the smaller neighbor, on the
    /// left, into a non-empty larger neighbor on the right).
    fn append_all_from(&mut self, donor: &mut Node<P>) {
        let self_count = self.child_count;
        let donor_count = donor.child_count;
        for j in 0..donor_count {
            let qty_size = donor.sizes.delta_at(j);
            let qty_sum = donor.sums.delta_at(j);
            self.sizes.append(self_count + j, qty_size);
            self.sums.append(self_count + j, qty_sum);
        }
        match (&mut self.children, &mut donor.children) {
            (Children::Leaves(dst), Children::Leaves(s)) => {
                for j in 0..donor_count {
                    dst[self_count + j] = s[j].take();
                }
            }
            (Children::Nodes(dst), Children::Nodes(s)) => {
                for j in 0..donor_count {
                    dst[self_count + j] = s[j].take();
                }
            }
            _ => unreachable!("merge siblings must share child kind"),
        }
        self.child_count += donor_count;
        donor.child_count = 0;
    }

    pub fn validate(&self, alloc: &Allocator<P>, is_root: bool) -> bool {
        if !is_root {
            let lo = P::BRANCHING / 3;
            if self.child_count < lo || self.child_count > P::BRANCHING {
                return false;
            }
        }
        let mut ok = true;
        for i in 0..self.child_count {
            let (size, sum) = match &self.children {
                Children::Leaves(ids) => {
                    let leaf = alloc.leaf(ids[i].unwrap());
                    ok &= leaf.validate();
                    (leaf.size() as usize, leaf.p_sum() as usize)
                }
                Children::Nodes(ids) => {
                    let node = alloc.node(ids[i].unwrap());
                    ok &= node.validate(alloc, false);
                    (node.total_size() as usize, node.total_sum() as usize)
                }
            };
            if self.sizes.delta_at(i) != size || self.sums.delta_at(i) != sum {
                ok = false;
            }
        }
        ok
    }
}
