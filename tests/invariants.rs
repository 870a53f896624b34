//! Property tests over random insert/remove/set/rank/select sequences,
//! checked against a plain `Vec<bool>` oracle.

use dynbitvec::{BitVector, DefaultPolicy, TinyPolicy};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

#[derive(Debug, Clone, Copy)]
enum Op {
    Insert(u32, bool),
    Remove(u32),
    Set(u32, bool),
}

impl quickcheck::Arbitrary for Op {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let choice = u32::arbitrary(g) % 3;
        let pos = u32::arbitrary(g) % 500;
        let val = bool::arbitrary(g);
        match choice {
            0 => Op::Insert(pos, val),
            1 => Op::Remove(pos),
            _ => Op::Set(pos, val),
        }
    }
}

fn run_against_oracle(ops: &[Op]) -> bool {
    let mut bv: BitVector<TinyPolicy> = BitVector::new();
    let mut oracle: Vec<bool> = Vec::new();
    for op in ops {
        match *op {
            Op::Insert(pos, v) => {
                let pos = pos % (oracle.len() as u32 + 1);
                bv.insert(pos, v).unwrap();
                oracle.insert(pos as usize, v);
            }
            Op::Remove(pos) => {
                if oracle.is_empty() {
                    continue;
                }
                let pos = pos % oracle.len() as u32;
                let removed = bv.remove(pos).unwrap();
                let expected = oracle.remove(pos as usize);
                if removed != expected {
                    return false;
                }
            }
            Op::Set(pos, v) => {
                if oracle.is_empty() {
                    continue;
                }
                let pos = pos % oracle.len() as u32;
                bv.set(pos, v);
                oracle[pos as usize] = v;
            }
        }
        if bv.size() as usize != oracle.len() {
            return false;
        }
    }
    if !bv.validate() {
        return false;
    }
    for (i, &expected) in oracle.iter().enumerate() {
        if bv.at(i as u32) != expected {
            return false;
        }
    }
    let total_ones = oracle.iter().filter(|&&b| b).count() as u32;
    if bv.sum() != total_ones {
        return false;
    }
    let mut seen_ones = 0u32;
    for (i, &b) in oracle.iter().enumerate() {
        let expected_rank = oracle[..i].iter().filter(|&&b| b).count() as u32;
        if bv.rank(i as u32) != expected_rank {
            return false;
        }
        if b {
            seen_ones += 1;
            if bv.select(seen_ones) != i as u32 {
                return false;
            }
        }
    }
    true
}

#[quickcheck]
fn random_edit_sequences_match_vec_oracle(ops: Vec<Op>) -> TestResult {
    if ops.len() > 400 {
        return TestResult::discard();
    }
    TestResult::from_bool(run_against_oracle(&ops))
}

#[test]
fn flush_is_idempotent_under_mixed_edits() {
    let mut bv: BitVector<DefaultPolicy> = BitVector::new();
    for i in 0..600u32 {
        bv.insert(i, i % 5 == 0).unwrap();
    }
    for i in (0..600u32).step_by(13) {
        bv.set(i, true);
    }
    for i in (0..300u32).step_by(7) {
        bv.remove(i).unwrap();
    }
    bv.flush();
    let mut dump_a = vec![0u64; (bv.size() as usize).div_ceil(64)];
    bv.dump(&mut dump_a);
    bv.flush();
    let mut dump_b = vec![0u64; (bv.size() as usize).div_ceil(64)];
    bv.dump(&mut dump_b);
    assert_eq!(dump_a, dump_b);
}

#[test]
fn validate_holds_after_heavy_churn_across_root_transitions() {
    let mut bv: BitVector<TinyPolicy> = BitVector::new();
    for round in 0..20u32 {
        for i in 0..40u32 {
            bv.insert((i * round + 3) % (bv.size() + 1), i % 2 == 0)
                .unwrap();
            assert!(bv.validate());
        }
        while bv.size() > 10 {
            bv.remove(bv.size() / 2).unwrap();
            assert!(bv.validate());
        }
    }
}
