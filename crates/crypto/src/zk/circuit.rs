//! R1CS circuit for attendance proofs.
//!
//! Statement: "I know `(template_hash, salt, scholar_id)` such that
//! `commit(template_hash, salt) == commitment` and the session nullifier for
//! `window_tag` derived from `(scholar_id, salt)` equals `session_nullifier`",
//! with `challenge_tag` folded into the public inputs so a proof cannot be
//! moved to another challenge.

use super::error::ZkResult;
use super::inputs::{AttendancePublicInputs, AttendanceWitness};
use super::poseidon::{fr_from_canonical_bytes, poseidon_gadget};
use crate::commitment::{
    domain_tag, salt_limbs, scholar_limbs, split_limbs, TAG_COMMIT, TAG_NULLIFIER, TAG_SESSION,
};
use ark_bn254::Fr;
use ark_ff::Zero;
use ark_r1cs_std::prelude::*;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

#[derive(Clone, Debug)]
pub struct AttendanceCircuit {
    template_limbs: [Fr; 2],
    salt_limbs: [Fr; 2],
    scholar_limbs: [Fr; 2],
    commitment: Fr,
    challenge_tag: Fr,
    window_tag: Fr,
    session_nullifier: Fr,
}

impl AttendanceCircuit {
    /// Shape-only instance for key generation.
    pub fn blank() -> Self {
        Self {
            template_limbs: [Fr::zero(); 2],
            salt_limbs: [Fr::zero(); 2],
            scholar_limbs: [Fr::zero(); 2],
            commitment: Fr::zero(),
            challenge_tag: Fr::zero(),
            window_tag: Fr::zero(),
            session_nullifier: Fr::zero(),
        }
    }

    pub fn new(witness: &AttendanceWitness, public: &AttendancePublicInputs) -> ZkResult<Self> {
        Ok(Self {
            template_limbs: split_limbs(&witness.template_hash),
            salt_limbs: salt_limbs(witness.salt.as_bytes()),
            scholar_limbs: scholar_limbs(&witness.scholar_id),
            commitment: public.commitment.to_field()?,
            challenge_tag: fr_from_canonical_bytes(&public.challenge_tag)?,
            window_tag: fr_from_canonical_bytes(&public.window_tag)?,
            session_nullifier: public.session_nullifier.to_field()?,
        })
    }
}

fn witness_pair(cs: &ConstraintSystemRef<Fr>, limbs: [Fr; 2]) -> Result<[FpVar<Fr>; 2], SynthesisError> {
    Ok([
        FpVar::new_witness(cs.clone(), || Ok(limbs[0]))?,
        FpVar::new_witness(cs.clone(), || Ok(limbs[1]))?,
    ])
}

impl ConstraintSynthesizer<Fr> for AttendanceCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // Allocation order of inputs fixes the public input vector layout.
        let commitment = FpVar::new_input(cs.clone(), || Ok(self.commitment))?;
        // Bound by the verifier's input terms alone; no gate reads it.
        FpVar::new_input(cs.clone(), || Ok(self.challenge_tag))?;
        let window_tag = FpVar::new_input(cs.clone(), || Ok(self.window_tag))?;
        let session_nullifier = FpVar::new_input(cs.clone(), || Ok(self.session_nullifier))?;

        let [t_hi, t_lo] = witness_pair(&cs, self.template_limbs)?;
        let [s_hi, s_lo] = witness_pair(&cs, self.salt_limbs)?;
        let [id_hi, id_lo] = witness_pair(&cs, self.scholar_limbs)?;

        let computed_commitment = poseidon_gadget(&[
            FpVar::Constant(domain_tag(TAG_COMMIT)),
            t_hi,
            t_lo,
            s_hi.clone(),
            s_lo.clone(),
        ])?;
        computed_commitment.enforce_equal(&commitment)?;

        let nullifier = poseidon_gadget(&[
            FpVar::Constant(domain_tag(TAG_NULLIFIER)),
            id_hi,
            id_lo,
            s_hi,
            s_lo,
        ])?;
        let computed_session =
            poseidon_gadget(&[FpVar::Constant(domain_tag(TAG_SESSION)), nullifier, window_tag])?;
        computed_session.enforce_equal(&session_nullifier)?;

        Ok(())
    }
}
