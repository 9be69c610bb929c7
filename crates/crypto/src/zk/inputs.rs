//! Public and private inputs of the attendance circuit.

use super::error::{ZkError, ZkResult};
use super::poseidon::{fr_from_canonical_bytes, fr_to_bytes};
use crate::commitment::{challenge_tag, window_tag, Commitment, Salt, SessionNullifier};
use ark_bn254::Fr;
use pramaan_core::types::serde_hex32;
use pramaan_core::{AttendanceWindow, Challenge};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Public inputs in circuit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePublicInputs {
    /// Registered biometric commitment
    pub commitment: Commitment,
    /// Digest of the challenge the proof answers
    #[serde(with = "serde_hex32")]
    pub challenge_tag: [u8; 32],
    /// Digest of the attendance window
    #[serde(with = "serde_hex32")]
    pub window_tag: [u8; 32],
    /// Nullifier scoped to the window
    pub session_nullifier: SessionNullifier,
}

impl AttendancePublicInputs {
    /// Build the inputs for a challenge and window.
    pub fn bind(
        commitment: Commitment,
        challenge: &Challenge,
        window: &AttendanceWindow,
        session_nullifier: SessionNullifier,
    ) -> Self {
        Self {
            commitment,
            challenge_tag: fr_to_bytes(&challenge_tag(challenge)),
            window_tag: fr_to_bytes(&window_tag(window)),
            session_nullifier,
        }
    }

    /// Number of public field elements the circuit exposes.
    pub const LEN: usize = 4;

    pub fn to_field_elements(&self) -> ZkResult<Vec<Fr>> {
        Ok(vec![
            self.commitment.to_field()?,
            fr_from_canonical_bytes(&self.challenge_tag)?,
            fr_from_canonical_bytes(&self.window_tag)?,
            self.session_nullifier.to_field()?,
        ])
    }
}

/// Secret witness known only to the scholar's device.
#[derive(Clone)]
pub struct AttendanceWitness {
    pub template_hash: Zeroizing<[u8; 32]>,
    pub salt: Salt,
    pub scholar_id: String,
}

impl AttendanceWitness {
    pub fn new(template_hash: &[u8], salt: Salt, scholar_id: impl Into<String>) -> ZkResult<Self> {
        let template: [u8; 32] = template_hash.try_into().map_err(|_| {
            ZkError::InvalidInput(format!(
                "template hash must be 32 bytes, got {}",
                template_hash.len()
            ))
        })?;
        Ok(Self {
            template_hash: Zeroizing::new(template),
            salt,
            scholar_id: scholar_id.into(),
        })
    }
}

impl std::fmt::Debug for AttendanceWitness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceWitness")
            .field("scholar_id", &self.scholar_id)
            .finish_non_exhaustive()
    }
}
