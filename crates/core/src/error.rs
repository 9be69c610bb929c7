//! Core error types and the protocol-wide error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Core error type for Pramaan
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input supplied to a core type constructor
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A security sink could not record an event
    #[error("Security sink error: {0}")]
    Sink(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Protocol-level classification of every failure the attendance core can
/// report to a collaborator.
///
/// Every crate-local error maps onto exactly one kind. The kind decides retry
/// policy, whether a security event is emitted, and which message a scholar
/// is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed template hash, salt, proof shape or request field
    InvalidInput,
    /// The biometric commitment is already registered somewhere in the system
    DuplicateBiometric,
    /// The scholar already has an active enrollment for this biometric type
    AlreadyEnrolled,
    /// No active enrollment exists for the scholar and biometric type
    NotEnrolled,
    /// The challenge TTL elapsed before verification
    ChallengeExpired,
    /// The challenge was already consumed by an accepted proof
    ChallengeConsumed,
    /// Public commitment differs from the one on file
    CommitmentMismatch,
    /// Proof-system verification failed
    InvalidProof,
    /// Session nullifier already consumed for this attendance window
    ReplayDetected,
    /// Device location outside the geofence or spoofed
    LocationRejected,
    /// Persistence layer failure
    Storage,
    /// Unexpected internal failure
    Internal,
}

impl ErrorKind {
    /// Stable wire/storage identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::DuplicateBiometric => "duplicate_biometric",
            ErrorKind::AlreadyEnrolled => "already_enrolled",
            ErrorKind::NotEnrolled => "not_enrolled",
            ErrorKind::ChallengeExpired => "challenge_expired",
            ErrorKind::ChallengeConsumed => "challenge_consumed",
            ErrorKind::CommitmentMismatch => "commitment_mismatch",
            ErrorKind::InvalidProof => "invalid_proof",
            ErrorKind::ReplayDetected => "replay_detected",
            ErrorKind::LocationRejected => "location_rejected",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }

    /// Parse a stored identifier back into a kind.
    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "invalid_input" => ErrorKind::InvalidInput,
            "duplicate_biometric" => ErrorKind::DuplicateBiometric,
            "already_enrolled" => ErrorKind::AlreadyEnrolled,
            "not_enrolled" => ErrorKind::NotEnrolled,
            "challenge_expired" => ErrorKind::ChallengeExpired,
            "challenge_consumed" => ErrorKind::ChallengeConsumed,
            "commitment_mismatch" => ErrorKind::CommitmentMismatch,
            "invalid_proof" => ErrorKind::InvalidProof,
            "replay_detected" => ErrorKind::ReplayDetected,
            "location_rejected" => ErrorKind::LocationRejected,
            "storage" => ErrorKind::Storage,
            "internal" => ErrorKind::Internal,
            _ => return None,
        };
        Some(kind)
    }

    /// Only freshness failures are retryable, and only by requesting a new
    /// challenge.
    pub fn is_client_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ChallengeExpired | ErrorKind::ChallengeConsumed
        )
    }

    /// Outcomes that must reach the security audit sink.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            ErrorKind::DuplicateBiometric
                | ErrorKind::CommitmentMismatch
                | ErrorKind::InvalidProof
                | ErrorKind::ReplayDetected
        )
    }

    /// Message a scholar may see. Never identifies another scholar or
    /// organization and never distinguishes cryptographic failure modes.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "The request was malformed.",
            ErrorKind::DuplicateBiometric => "This biometric is already enrolled.",
            ErrorKind::AlreadyEnrolled => {
                "An enrollment for this biometric type already exists."
            }
            ErrorKind::NotEnrolled => "No biometric enrollment was found.",
            ErrorKind::ChallengeExpired => "The challenge expired. Request a new one.",
            ErrorKind::ChallengeConsumed => "The challenge was already used. Request a new one.",
            ErrorKind::CommitmentMismatch
            | ErrorKind::InvalidProof
            | ErrorKind::ReplayDetected => "Verification failed.",
            ErrorKind::LocationRejected => "Attendance location could not be verified.",
            ErrorKind::Storage | ErrorKind::Internal => "Internal error. Try again later.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
