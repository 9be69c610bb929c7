//! Cryptographic primitives for the Pramaan attendance-proof protocol.
//!
//! # Core Capabilities
//!
//! - **Commitment Engine**: Poseidon commitments, nullifiers and session nullifiers
//! - **Attendance proofs**: Groth16 over BN254 (arkworks) with an in-circuit Poseidon gadget
//! - **Salt sealing**: ChaCha20-Poly1305 encryption of enrollment salts at rest
//! - **Receipts**: Ed25519 signatures over verified attendance events
//!
//! # Security Principles
//!
//! - Template hashes, salts and witnesses are never logged
//! - Secret buffers are zeroized on drop
//! - Verifiers derive public inputs from server state, never from the client

pub mod commitment;
pub mod receipt;
pub mod sealing;
pub mod zk;

pub use commitment::{
    challenge_tag, template_hash, window_tag, Commitment, CommitmentEngine, Nullifier, Salt,
    SessionNullifier,
};
pub use receipt::{verify_receipt, AttendanceReceipt, ReceiptError, ReceiptSigner, SignedReceipt};
pub use sealing::{SaltSealer, SealingError, SealingResult};
pub use zk::{
    setup, AttendanceProof, AttendanceProver, AttendancePublicInputs, AttendanceVerifier,
    AttendanceWitness, ProvingParameters, VerifyingParameters, ZkError, ZkResult,
    PROVING_KEY_FILE, VERIFYING_KEY_FILE,
};
