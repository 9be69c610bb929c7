//! Ed25519-signed attendance receipts.
//!
//! A receipt lets a dashboard or auditor confirm offline that the server
//! accepted a given attendance event.

use crate::commitment::SessionNullifier;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use pramaan_core::AttendanceType;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

/// Canonical receipt content. Field order is fixed, so the JSON encoding is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceReceipt {
    pub proof_id: String,
    pub scholar_id: String,
    pub organization_id: String,
    pub attendance_type: AttendanceType,
    pub verified_at_ms: u64,
    pub session_nullifier: SessionNullifier,
}

impl AttendanceReceipt {
    pub fn serialize_for_signing(&self) -> Result<Vec<u8>, ReceiptError> {
        serde_json::to_vec(self).map_err(|e| ReceiptError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// Receipt plus detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedReceipt {
    pub receipt: AttendanceReceipt,
    /// Hex Ed25519 signature (64 bytes)
    pub signature: String,
    pub public_key_id: String,
}

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Invalid signature encoding")]
    InvalidEncoding,

    #[error("Signature does not match receipt")]
    BadSignature,
}

pub struct ReceiptSigner {
    signing_key: SigningKey,
    public_key_id: String,
}

impl ReceiptSigner {
    /// Build a signer from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut seed_copy = *seed;
        let signing_key = SigningKey::from_bytes(&seed_copy);
        seed_copy.zeroize();
        let public_key_id = key_id(&signing_key.verifying_key());
        Self {
            signing_key,
            public_key_id,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_id(&self) -> &str {
        &self.public_key_id
    }

    pub fn sign(&self, receipt: AttendanceReceipt) -> Result<SignedReceipt, ReceiptError> {
        let message = receipt.serialize_for_signing()?;
        let signature = self.signing_key.sign(&message);
        Ok(SignedReceipt {
            receipt,
            signature: hex::encode(signature.to_bytes()),
            public_key_id: self.public_key_id.clone(),
        })
    }
}

impl std::fmt::Debug for ReceiptSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptSigner")
            .field("public_key_id", &self.public_key_id)
            .finish_non_exhaustive()
    }
}

/// Check a receipt signature against a known public key.
pub fn verify_receipt(signed: &SignedReceipt, key: &VerifyingKey) -> Result<(), ReceiptError> {
    let raw = hex::decode(&signed.signature).map_err(|_| ReceiptError::InvalidEncoding)?;
    let bytes: [u8; 64] = raw.try_into().map_err(|_| ReceiptError::InvalidEncoding)?;
    let signature = Signature::from_bytes(&bytes);
    let message = signed.receipt.serialize_for_signing()?;
    key.verify(&message, &signature)
        .map_err(|_| ReceiptError::BadSignature)
}

/// Stable public key identifier: first 16 bytes of BLAKE3 over the key.
fn key_id(verifying_key: &VerifyingKey) -> String {
    let hash = blake3::hash(verifying_key.as_bytes());
    hex::encode(&hash.as_bytes()[..16])
}
