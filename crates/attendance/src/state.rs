//! Attendance session state machine.
//!
//! ```text
//! Pending
//!     ├─(proof verified, challenge and session nullifier consumed)─→ Verified
//!     ├─(any verification failure)──────────────────────────────→ Rejected
//!     └─(challenge TTL elapsed while pending)─────────────────────→ Expired
//! ```
//!
//! Verified, Rejected and Expired are terminal. Leaving a terminal state is
//! only possible through the audited admin override in the store.

use pramaan_core::{AttendanceType, BiometricType, Challenge, ErrorKind};
use pramaan_crypto::{AttendanceProof, AttendancePublicInputs, SignedReceipt};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AttendanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Pending,
    Verified,
    Rejected,
    Expired,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Verified => "verified",
            AttendanceStatus::Rejected => "rejected",
            AttendanceStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(AttendanceStatus::Pending),
            "verified" => Ok(AttendanceStatus::Verified),
            "rejected" => Ok(AttendanceStatus::Rejected),
            "expired" => Ok(AttendanceStatus::Expired),
            other => Err(AttendanceError::InvalidInput(format!(
                "unknown attendance status: {}",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttendanceStatus::Pending)
    }

    /// Ordinary lifecycle transitions. Overrides bypass this check.
    pub fn can_transition_to(&self, next: AttendanceStatus) -> bool {
        matches!(
            (self, next),
            (
                AttendanceStatus::Pending,
                AttendanceStatus::Verified | AttendanceStatus::Rejected | AttendanceStatus::Expired
            )
        )
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One check-in or check-out attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub proof_id: String,
    pub scholar_id: String,
    pub organization_id: String,
    pub biometric_type: BiometricType,
    pub attendance_type: AttendanceType,
    pub challenge_id: String,
    pub status: AttendanceStatus,
    /// Failure retained for audit once Rejected or Expired
    pub error_kind: Option<ErrorKind>,
    pub proof: AttendanceProof,
    /// Public inputs as submitted by the client
    pub public_inputs: AttendancePublicInputs,
    pub created_at_ms: u64,
    pub challenge_expires_at_ms: u64,
    pub verified_at_ms: Option<u64>,
    pub receipt: Option<SignedReceipt>,
}

impl AttendanceRecord {
    /// Fresh record for a submission answering `challenge`.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        proof_id: String,
        scholar_id: String,
        biometric_type: BiometricType,
        attendance_type: AttendanceType,
        challenge: &Challenge,
        proof: AttendanceProof,
        public_inputs: AttendancePublicInputs,
        created_at_ms: u64,
    ) -> Self {
        Self {
            proof_id,
            scholar_id,
            organization_id: challenge.organization_id.clone(),
            biometric_type,
            attendance_type,
            challenge_id: challenge.challenge_id.clone(),
            status: AttendanceStatus::Pending,
            error_kind: None,
            proof,
            public_inputs,
            created_at_ms,
            challenge_expires_at_ms: challenge.expires_at_ms(),
            verified_at_ms: None,
            receipt: None,
        }
    }
}
