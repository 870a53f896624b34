//! Exercises `generate_query_structure` against randomly edited trees,
//! across both a plain leaf root and a root that has split into a tree.

use dynbitvec::{BitVector, DefaultPolicy, TinyPolicy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn build_random<P: dynbitvec::Policy>(seed: u64, len: u32) -> (BitVector<P>, Vec<bool>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bv: BitVector<P> = BitVector::new();
    let mut oracle: Vec<bool> = Vec::new();
    for _ in 0..len {
        let pos = rng.gen_range(0..=oracle.len() as u32);
        let v = rng.gen_bool(0.5);
        bv.insert(pos, v).unwrap();
        oracle.insert(pos as usize, v);
    }
    bv.flush();
    (bv, oracle)
}

#[test]
fn snapshot_matches_live_tree_over_default_policy() {
    let (bv, oracle) = build_random::<DefaultPolicy>(42, 5000);
    let snap = bv.generate_query_structure();
    assert_eq!(snap.size(), oracle.len() as u32);
    assert_eq!(snap.sum(), oracle.iter().filter(|&&b| b).count() as u32);
    for i in (0..oracle.len() as u32).step_by(37) {
        assert_eq!(snap.at(i), bv.at(i));
        assert_eq!(snap.rank(i), bv.rank(i));
    }
    for k in 1..=snap.sum().min(200) {
        assert_eq!(snap.select(k), bv.select(k));
    }
}

#[test]
fn snapshot_survives_many_node_splits_under_tiny_policy() {
    let (bv, oracle) = build_random::<TinyPolicy>(7, 3000);
    assert!(bv.validate());
    let snap = bv.generate_query_structure();
    for i in [0u32, 1, oracle.len() as u32 / 2, oracle.len() as u32 - 1] {
        assert_eq!(snap.at(i), bv.at(i));
        assert_eq!(snap.rank(i), bv.rank(i));
    }
}
