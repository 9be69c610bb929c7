//! Biometric commitment engine.
//!
//! Derives commitments, nullifiers and session nullifiers as Poseidon hashes
//! over BN254. Every hash absorbs a domain-separation tag first. 32-byte
//! values enter the field as two 128-bit limbs so the mapping is injective;
//! variable-length inputs (salt, scholar id) are first reduced with keyed
//! BLAKE3 derivation.
//!
//! Pure and deterministic: the client and the server compute identical
//! values from identical inputs.

use crate::zk::error::{ZkError, ZkResult};
use crate::zk::poseidon::{fr_from_canonical_bytes, fr_to_bytes, poseidon_hash};
use ark_bn254::Fr;
use ark_ff::PrimeField;
use pramaan_core::types::serde_hex32;
use pramaan_core::{AttendanceWindow, Challenge, ProtocolConfig, TEMPLATE_HASH_LEN};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

pub const TAG_COMMIT: &[u8] = b"PRAMAAN|COMMIT|v1";
pub const TAG_NULLIFIER: &[u8] = b"PRAMAAN|NULL|v1";
pub const TAG_SESSION: &[u8] = b"PRAMAAN|SESSION|v1";

const TEMPLATE_CONTEXT: &str = "pramaan biometric template v1";
const SALT_CONTEXT: &str = "pramaan salt v1";
const SCHOLAR_CONTEXT: &str = "pramaan scholar id v1";
const CHALLENGE_CONTEXT: &str = "pramaan challenge binding v1";
const WINDOW_CONTEXT: &str = "pramaan attendance window v1";

macro_rules! digest_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "serde_hex32")] pub [u8; 32]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(value: &str) -> ZkResult<Self> {
                let raw = hex::decode(value).map_err(|_| {
                    ZkError::InvalidInput(format!("{} is not valid hex", stringify!($name)))
                })?;
                let bytes: [u8; 32] = raw.try_into().map_err(|_| {
                    ZkError::InvalidInput(format!("{} must be 32 bytes", stringify!($name)))
                })?;
                Ok(Self(bytes))
            }

            /// Field element view. Fails for values no Poseidon output can take.
            pub fn to_field(&self) -> ZkResult<Fr> {
                fr_from_canonical_bytes(&self.0)
            }

            pub(crate) fn from_field(value: &Fr) -> Self {
                Self(fr_to_bytes(value))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

digest_newtype!(
    /// Binding of `(template hash, salt)`; unique per biometric system-wide.
    Commitment
);
digest_newtype!(
    /// Binding of `(scholar id, salt)`; one per committed biometric.
    Nullifier
);
digest_newtype!(
    /// Nullifier scoped to one attendance window.
    SessionNullifier
);

/// Per-enrollment random salt. Zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt(Zeroizing<Vec<u8>>);

impl Salt {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        Self(Zeroizing::new(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_hex(value: &str) -> ZkResult<Self> {
        let raw = hex::decode(value)
            .map_err(|_| ZkError::InvalidInput("salt is not valid hex".to_string()))?;
        Ok(Self::from_bytes(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt(<{} bytes>)", self.0.len())
    }
}

/// Client-side reduction of an opaque feature vector to the template hash.
pub fn template_hash(raw_template: &[u8]) -> [u8; TEMPLATE_HASH_LEN] {
    blake3::derive_key(TEMPLATE_CONTEXT, raw_template)
}

/// Split a 32-byte value into big-endian `(high, low)` 128-bit limbs.
pub fn split_limbs(bytes: &[u8; 32]) -> [Fr; 2] {
    [
        Fr::from_be_bytes_mod_order(&bytes[..16]),
        Fr::from_be_bytes_mod_order(&bytes[16..]),
    ]
}

pub fn domain_tag(label: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(label)
}

pub(crate) fn salt_limbs(salt: &[u8]) -> [Fr; 2] {
    split_limbs(&blake3::derive_key(SALT_CONTEXT, salt))
}

pub(crate) fn scholar_limbs(scholar_id: &str) -> [Fr; 2] {
    split_limbs(&blake3::derive_key(SCHOLAR_CONTEXT, scholar_id.as_bytes()))
}

/// 248-bit digest, always below the BN254 scalar modulus.
fn digest_to_field(context: &str, material: &[u8]) -> Fr {
    let digest = blake3::derive_key(context, material);
    Fr::from_be_bytes_mod_order(&digest[..31])
}

/// Field element binding every challenge field (id, organization, nonce,
/// issue time, TTL, geofence).
pub fn challenge_tag(challenge: &Challenge) -> Fr {
    digest_to_field(CHALLENGE_CONTEXT, &challenge.binding_bytes())
}

/// Field element identifying an attendance window.
pub fn window_tag(window: &AttendanceWindow) -> Fr {
    digest_to_field(WINDOW_CONTEXT, &window.binding_bytes())
}

/// Deterministic commitment/nullifier derivation with input validation.
#[derive(Debug, Clone)]
pub struct CommitmentEngine {
    min_salt_bytes: usize,
    window_utc_offset_minutes: i32,
}

impl CommitmentEngine {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            min_salt_bytes: config.min_salt_bytes(),
            window_utc_offset_minutes: config.window_utc_offset_minutes,
        }
    }

    pub fn min_salt_bytes(&self) -> usize {
        self.min_salt_bytes
    }

    /// Generate a salt of exactly the configured minimum length.
    pub fn generate_salt<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Salt {
        Salt::generate(rng, self.min_salt_bytes)
    }

    pub fn commit(&self, template_hash: &[u8], salt: &[u8]) -> ZkResult<Commitment> {
        let template = self.check_template(template_hash)?;
        self.check_salt(salt)?;
        let [t_hi, t_lo] = split_limbs(&template);
        let [s_hi, s_lo] = salt_limbs(salt);
        let value = poseidon_hash(&[domain_tag(TAG_COMMIT), t_hi, t_lo, s_hi, s_lo])?;
        Ok(Commitment::from_field(&value))
    }

    pub fn derive_nullifier(&self, scholar_id: &str, salt: &[u8]) -> ZkResult<Nullifier> {
        if scholar_id.is_empty() {
            return Err(ZkError::InvalidInput("scholar id must not be empty".to_string()));
        }
        self.check_salt(salt)?;
        let [id_hi, id_lo] = scholar_limbs(scholar_id);
        let [s_hi, s_lo] = salt_limbs(salt);
        let value = poseidon_hash(&[domain_tag(TAG_NULLIFIER), id_hi, id_lo, s_hi, s_lo])?;
        Ok(Nullifier::from_field(&value))
    }

    pub fn derive_session_nullifier(
        &self,
        nullifier: &Nullifier,
        window: &AttendanceWindow,
    ) -> ZkResult<SessionNullifier> {
        let value = poseidon_hash(&[
            domain_tag(TAG_SESSION),
            nullifier.to_field()?,
            window_tag(window),
        ])?;
        Ok(SessionNullifier::from_field(&value))
    }

    /// Window a submission for `challenge` falls into.
    pub fn window_for(
        &self,
        challenge: &Challenge,
        attendance_type: pramaan_core::AttendanceType,
    ) -> AttendanceWindow {
        AttendanceWindow::for_challenge(challenge, attendance_type, self.window_utc_offset_minutes)
    }

    fn check_template(&self, template_hash: &[u8]) -> ZkResult<[u8; 32]> {
        template_hash.try_into().map_err(|_| {
            ZkError::InvalidInput(format!(
                "template hash must be {} bytes, got {}",
                TEMPLATE_HASH_LEN,
                template_hash.len()
            ))
        })
    }

    fn check_salt(&self, salt: &[u8]) -> ZkResult<()> {
        if salt.len() < self.min_salt_bytes {
            return Err(ZkError::InvalidInput(format!(
                "salt must be at least {} bytes, got {}",
                self.min_salt_bytes,
                salt.len()
            )));
        }
        Ok(())
    }
}

impl Default for CommitmentEngine {
    fn default() -> Self {
        Self::new(&ProtocolConfig::default())
    }
}
