//! Error types for enrollment and the global uniqueness registry.

use pramaan_core::ErrorKind;
use pramaan_crypto::{SealingError, ZkError};
use thiserror::Error;

/// Errors that can occur in identity operations.
///
/// Variants never carry the identity of another scholar or organization.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Malformed template hash, salt or identifier
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The commitment is already registered
    #[error("This biometric is already enrolled")]
    DuplicateBiometric,

    /// The scholar already holds an active enrollment of this type
    #[error("Active {biometric_type} enrollment already exists")]
    AlreadyEnrolled { biometric_type: String },

    /// No active enrollment for the scholar and type
    #[error("No active {biometric_type} enrollment")]
    NotEnrolled { biometric_type: String },

    /// The salt lineage was revoked; re-enrollment needs a fresh salt
    #[error("Enrollment lineage revoked")]
    RevokedLineage,

    /// Commitment engine errors
    #[error("Commitment error: {0}")]
    Commitment(#[from] ZkError),

    /// Salt sealing errors
    #[error("Sealing error: {0}")]
    Sealing(#[from] SealingError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::InvalidInput(_) | IdentityError::RevokedLineage => {
                ErrorKind::InvalidInput
            }
            IdentityError::DuplicateBiometric => ErrorKind::DuplicateBiometric,
            IdentityError::AlreadyEnrolled { .. } => ErrorKind::AlreadyEnrolled,
            IdentityError::NotEnrolled { .. } => ErrorKind::NotEnrolled,
            IdentityError::Commitment(e) => e.kind(),
            IdentityError::Sealing(_) | IdentityError::Internal(_) => ErrorKind::Internal,
            IdentityError::Database(_) => ErrorKind::Storage,
        }
    }
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;
