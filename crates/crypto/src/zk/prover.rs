//! Client-side attendance proof generation.
//!
//! Implements Groth16 proofs over BN254 using arkworks. Proving randomizes
//! `r`/`s` blinding from the supplied RNG, so two proofs of the same
//! statement differ.

use super::circuit::AttendanceCircuit;
use super::error::{ZkError, ZkResult};
use super::inputs::{AttendancePublicInputs, AttendanceWitness};
use super::keys::ProvingParameters;
use crate::commitment::{Commitment, CommitmentEngine};
use ark_bn254::{Bn254, Fr};
use ark_groth16::Groth16;
use ark_serialize::CanonicalSerialize;
use ark_snark::SNARK;
use pramaan_core::{AttendanceType, Challenge};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const PROTOCOL_GROTH16: &str = "groth16";
pub const CURVE_BN254: &str = "bn254";

/// Compressed BN254 Groth16 proof size: A (G1) + B (G2) + C (G1).
pub const PROOF_LEN: usize = 32 + 64 + 32;

/// Zero-Knowledge proof envelope sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceProof {
    /// Protocol identifier (e.g., "groth16")
    pub protocol: String,
    /// Elliptic curve identifier (e.g., "bn254")
    pub curve: String,
    /// Identifier of the verifying key the proof targets
    pub key_id: String,
    /// arkworks compressed proof
    #[serde(with = "hex_bytes")]
    pub proof_bytes: Vec<u8>,
}

impl AttendanceProof {
    /// Envelope checks that need no key material.
    pub fn validate_shape(&self) -> ZkResult<()> {
        if self.protocol != PROTOCOL_GROTH16 {
            return Err(ZkError::MalformedProof(format!(
                "unsupported protocol: {}",
                self.protocol
            )));
        }
        if self.curve != CURVE_BN254 {
            return Err(ZkError::MalformedProof(format!(
                "unsupported curve: {}",
                self.curve
            )));
        }
        if self.proof_bytes.len() != PROOF_LEN {
            return Err(ZkError::MalformedProof(format!(
                "proof must be {} bytes, got {}",
                PROOF_LEN,
                self.proof_bytes.len()
            )));
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(D::Error::custom)
    }
}

/// Stateless prover over loaded proving parameters.
#[derive(Clone)]
pub struct AttendanceProver {
    params: Arc<ProvingParameters>,
    engine: CommitmentEngine,
    key_id: String,
}

impl AttendanceProver {
    pub fn new(params: Arc<ProvingParameters>, engine: CommitmentEngine) -> ZkResult<Self> {
        let key_id = params.verifying_parameters()?.key_id().to_string();
        Ok(Self {
            params,
            engine,
            key_id,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Prove knowledge of a preimage of `commitment`, bound to `challenge`
    /// and to the attendance window of `attendance_type`.
    ///
    /// Fails with `CommitmentMismatch` before proving if the witness does not
    /// open `commitment`.
    pub fn generate_proof<R: RngCore + CryptoRng>(
        &self,
        witness: &AttendanceWitness,
        commitment: &Commitment,
        challenge: &Challenge,
        attendance_type: AttendanceType,
        rng: &mut R,
    ) -> ZkResult<(AttendanceProof, AttendancePublicInputs)> {
        let salt = witness.salt.as_bytes();
        let recomputed = self.engine.commit(&witness.template_hash[..], salt)?;
        if recomputed != *commitment {
            return Err(ZkError::CommitmentMismatch(
                "witness does not open the registered commitment".to_string(),
            ));
        }

        let nullifier = self.engine.derive_nullifier(&witness.scholar_id, salt)?;
        let window = self.engine.window_for(challenge, attendance_type);
        let session_nullifier = self.engine.derive_session_nullifier(&nullifier, &window)?;
        let public = AttendancePublicInputs::bind(*commitment, challenge, &window, session_nullifier);

        let circuit = AttendanceCircuit::new(witness, &public)?;
        let proof = <Groth16<Bn254> as SNARK<Fr>>::prove(self.params.key(), circuit, rng)
            .map_err(|e| ZkError::ProofGenerationFailed(e.to_string()))?;

        let mut proof_bytes = Vec::with_capacity(PROOF_LEN);
        proof.serialize_compressed(&mut proof_bytes)?;

        Ok((
            AttendanceProof {
                protocol: PROTOCOL_GROTH16.to_string(),
                curve: CURVE_BN254.to_string(),
                key_id: self.key_id.clone(),
                proof_bytes,
            },
            public,
        ))
    }
}
