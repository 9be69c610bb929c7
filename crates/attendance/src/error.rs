//! Error types for the attendance pipeline.
//!
//! Verification failures are not errors: they end up on the record as a
//! retained [`ErrorKind`]. `AttendanceError` covers requests that cannot
//! produce a record at all and infrastructure failures.

use pramaan_core::{CoreError, ErrorKind};
use pramaan_crypto::{ReceiptError, ZkError};
use pramaan_identity::IdentityError;
use thiserror::Error;

use crate::state::AttendanceStatus;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown challenge: {0}")]
    UnknownChallenge(String),

    #[error("Attendance record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: AttendanceStatus,
        to: AttendanceStatus,
    },

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Proof system error: {0}")]
    Zk(#[from] ZkError),

    #[error("Receipt error: {0}")]
    Receipt(#[from] ReceiptError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AttendanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::InvalidInput(_)
            | AttendanceError::UnknownChallenge(_)
            | AttendanceError::RecordNotFound(_)
            | AttendanceError::InvalidTransition { .. } => ErrorKind::InvalidInput,
            AttendanceError::Identity(e) => e.kind(),
            AttendanceError::Zk(e) => e.kind(),
            AttendanceError::Core(CoreError::InvalidInput(_)) => ErrorKind::InvalidInput,
            AttendanceError::Database(_) => ErrorKind::Storage,
            AttendanceError::Core(_)
            | AttendanceError::Receipt(_)
            | AttendanceError::Serialization(_)
            | AttendanceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
