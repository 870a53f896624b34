//! Dynamic succinct bit-vector: `insert`/`remove`/`set`/`at` plus
//! `rank`/`select` in `O(log n)`, backed by a B-tree of leaves with
//! per-node cumulative size/popcount arrays for branch selection.
//!
//! The tree shape, leaf/node split-merge-rebalance logic, and the
//! allocator that owns every leaf and node are internal; [`BitVector`] is
//! the only type most callers need. [`Snapshot`] is a read-only
//! accelerator produced by [`BitVector::generate_query_structure`] for
//! workloads that only query a quiescent tree.
//!
//! Configuration is compile-time, via a [`Policy`] marker type. Three
//! policies ship out of the box: [`DefaultPolicy`], [`CompressedPolicy`],
//! and [`TinyPolicy`] (small leaves/fanout, useful for tests). Declare a
//! custom one with the [`policy!`] macro.

mod alloc;
mod bitvector;
mod cumulative;
mod editbuffer;
mod error;
mod leaf;
mod leaf_gap;
mod leaf_rle;
mod node;
pub mod policy;
mod snapshot;
mod util;

pub use bitvector::BitVector;
pub use error::BitVecError;
pub use policy::{CompressedPolicy, DefaultPolicy, Index, Policy, TinyPolicy};
pub use snapshot::Snapshot;
