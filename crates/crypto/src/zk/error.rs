//! Error types for commitment and zero-knowledge proof operations.

use pramaan_core::ErrorKind;
use thiserror::Error;

/// Result type for ZK operations
pub type ZkResult<T> = std::result::Result<T, ZkError>;

/// Error types for commitment and Zero-Knowledge proof operations
#[derive(Error, Debug, Clone)]
pub enum ZkError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Proof envelope is malformed or uses an unsupported system
    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    /// Witness does not reproduce the expected commitment
    #[error("Commitment mismatch: {0}")]
    CommitmentMismatch(String),

    /// Key material missing or unreadable
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Arkworks (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Constraint synthesis failed
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Proof generation failed
    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),

    /// Proof verification failed
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Hash computation error
    #[error("Hash error: {0}")]
    HashError(String),
}

impl ZkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZkError::InvalidInput(_) | ZkError::MalformedProof(_) => ErrorKind::InvalidInput,
            ZkError::CommitmentMismatch(_) => ErrorKind::CommitmentMismatch,
            ZkError::VerificationFailed(_) => ErrorKind::InvalidProof,
            ZkError::KeyNotFound(_)
            | ZkError::Serialization(_)
            | ZkError::Synthesis(_)
            | ZkError::ProofGenerationFailed(_)
            | ZkError::HashError(_) => ErrorKind::Internal,
        }
    }
}

impl From<ark_relations::r1cs::SynthesisError> for ZkError {
    fn from(err: ark_relations::r1cs::SynthesisError) -> Self {
        ZkError::Synthesis(err.to_string())
    }
}

impl From<ark_serialize::SerializationError> for ZkError {
    fn from(err: ark_serialize::SerializationError) -> Self {
        ZkError::Serialization(err.to_string())
    }
}
