//! Statistical and determinism properties of the commitment engine.

use pramaan_crypto::{template_hash, CommitmentEngine, Salt};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;

const SAMPLES: usize = 2_000;

#[test]
fn test_commitment_is_reproducible_across_engines() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..50 {
        let mut template = [0u8; 64];
        rng.fill_bytes(&mut template);
        let hash = template_hash(&template);
        let salt = CommitmentEngine::default().generate_salt(&mut rng);

        let a = CommitmentEngine::default()
            .commit(&hash, salt.as_bytes())
            .unwrap();
        let b = CommitmentEngine::default()
            .commit(&hash, Salt::from_hex(&salt.to_hex()).unwrap().as_bytes())
            .unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn test_distinct_templates_do_not_collide() {
    let engine = CommitmentEngine::default();
    let mut rng = StdRng::seed_from_u64(2);
    let salt = engine.generate_salt(&mut rng);

    let mut seen = HashSet::with_capacity(SAMPLES);
    for _ in 0..SAMPLES {
        let mut hash = [0u8; 32];
        rng.fill_bytes(&mut hash);
        let commitment = engine.commit(&hash, salt.as_bytes()).unwrap();
        assert!(seen.insert(commitment), "commitment collision");
    }
}

#[test]
fn test_salt_separates_equal_templates() {
    let engine = CommitmentEngine::default();
    let mut rng = StdRng::seed_from_u64(3);
    let hash = template_hash(b"one face");

    let mut seen = HashSet::with_capacity(SAMPLES);
    for _ in 0..SAMPLES {
        let salt = engine.generate_salt(&mut rng);
        assert!(seen.insert(engine.commit(&hash, salt.as_bytes()).unwrap()));
    }
}

#[test]
fn test_nullifiers_are_scholar_scoped() {
    let engine = CommitmentEngine::default();
    let salt = [9u8; 32];
    let a = engine.derive_nullifier("s-1", &salt).unwrap();
    let b = engine.derive_nullifier("s-2", &salt).unwrap();
    assert_ne!(a, b);
    assert_eq!(a, engine.derive_nullifier("s-1", &salt).unwrap());
}
