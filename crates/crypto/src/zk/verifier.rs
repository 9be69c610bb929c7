//! Server-side Groth16 verification.
//!
//! The verifier never trusts client-declared public inputs: callers derive
//! them from server state and pass them in.

use super::error::{ZkError, ZkResult};
use super::inputs::AttendancePublicInputs;
use super::keys::VerifyingParameters;
use super::prover::AttendanceProof;
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct AttendanceVerifier {
    params: Arc<VerifyingParameters>,
}

impl AttendanceVerifier {
    pub fn new(params: Arc<VerifyingParameters>) -> Self {
        Self { params }
    }

    pub fn key_id(&self) -> &str {
        self.params.key_id()
    }

    /// Verify `proof` against `public_inputs`.
    ///
    /// Malformed envelopes and undecodable points are `MalformedProof`.
    /// A well-formed proof that does not verify, or that names another key,
    /// is `VerificationFailed`.
    pub fn verify(
        &self,
        proof: &AttendanceProof,
        public_inputs: &AttendancePublicInputs,
    ) -> ZkResult<()> {
        proof.validate_shape()?;
        if proof.key_id != self.params.key_id() {
            return Err(ZkError::VerificationFailed(
                "proof targets a different verifying key".to_string(),
            ));
        }

        let decoded = Proof::<Bn254>::deserialize_compressed(proof.proof_bytes.as_slice())
            .map_err(|e| ZkError::MalformedProof(e.to_string()))?;
        let inputs = public_inputs.to_field_elements()?;

        let valid = <Groth16<Bn254> as SNARK<Fr>>::verify_with_processed_vk(
            self.params.prepared(),
            &inputs,
            &decoded,
        )
        .map_err(|e| ZkError::VerificationFailed(e.to_string()))?;

        if !valid {
            return Err(ZkError::VerificationFailed(
                "pairing check failed".to_string(),
            ));
        }
        debug!(key_id = %self.params.key_id(), "Attendance proof verified");
        Ok(())
    }
}
