//! Zero-knowledge attendance proofs.
//!
//! Groth16 over BN254 (arkworks) with Poseidon commitments. The circuit
//! proves knowledge of a commitment preimage and binds the proof to one
//! challenge and one attendance window.

pub mod circuit;
pub mod error;
pub mod inputs;
pub mod keys;
pub mod poseidon;
pub mod prover;
pub mod verifier;

pub use circuit::AttendanceCircuit;
pub use error::{ZkError, ZkResult};
pub use inputs::{AttendancePublicInputs, AttendanceWitness};
pub use keys::{setup, ProvingParameters, VerifyingParameters, PROVING_KEY_FILE, VERIFYING_KEY_FILE};
pub use prover::{AttendanceProof, AttendanceProver, CURVE_BN254, PROOF_LEN, PROTOCOL_GROTH16};
pub use verifier::AttendanceVerifier;
