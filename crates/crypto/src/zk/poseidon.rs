//! Poseidon hash over BN254 with circomlib parameters.
//!
//! The native hash delegates to `light-poseidon`. The R1CS gadget replays the
//! same permutation over `FpVar` using the parameter tables `light-poseidon`
//! ships, so a commitment computed off-circuit equals the one the circuit
//! constrains.

use super::error::{ZkError, ZkResult};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use ark_r1cs_std::fields::{fp::FpVar, FieldVar};
use ark_relations::r1cs::SynthesisError;
use light_poseidon::parameters::bn254_x5::get_poseidon_parameters;
use light_poseidon::{Poseidon, PoseidonHasher};

/// Hash field elements with the circom-compatible Poseidon instance of the
/// matching width.
pub fn poseidon_hash(inputs: &[Fr]) -> ZkResult<Fr> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|err| ZkError::HashError(err.to_string()))?;
    hasher
        .hash(inputs)
        .map_err(|err| ZkError::HashError(err.to_string()))
}

/// In-circuit Poseidon. State starts as `[0, inputs..]` and the first state
/// element is returned after the final round.
pub fn poseidon_gadget(inputs: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let width = inputs.len() + 1;
    let width_u8 = u8::try_from(width).map_err(|_| SynthesisError::Unsatisfiable)?;
    let params =
        get_poseidon_parameters::<Fr>(width_u8).map_err(|_| SynthesisError::Unsatisfiable)?;

    let mut state: Vec<FpVar<Fr>> = Vec::with_capacity(width);
    state.push(FpVar::Constant(Fr::zero()));
    state.extend(inputs.iter().cloned());

    let half_full = params.full_rounds / 2;
    let total_rounds = params.full_rounds + params.partial_rounds;

    for round in 0..total_rounds {
        for (i, element) in state.iter_mut().enumerate() {
            *element += params.ark[round * width + i];
        }

        let full_round = round < half_full || round >= half_full + params.partial_rounds;
        if full_round {
            for element in state.iter_mut() {
                *element = element.pow_by_constant([params.alpha])?;
            }
        } else {
            state[0] = state[0].pow_by_constant([params.alpha])?;
        }

        let mut mixed = Vec::with_capacity(width);
        for row in params.mds.iter().take(width) {
            let mut acc = FpVar::Constant(Fr::zero());
            for (element, coefficient) in state.iter().zip(row.iter()) {
                acc += element * *coefficient;
            }
            mixed.push(acc);
        }
        state = mixed;
    }

    Ok(state.swap_remove(0))
}

/// Big-endian 32-byte encoding of a field element.
pub fn fr_to_bytes(value: &Fr) -> [u8; 32] {
    let bytes = value.into_bigint().to_bytes_be();
    let mut output = [0u8; 32];
    let offset = 32usize.saturating_sub(bytes.len());
    output[offset..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
    output
}

/// Decode a field element, rejecting encodings at or above the modulus.
pub fn fr_from_canonical_bytes(bytes: &[u8; 32]) -> ZkResult<Fr> {
    let value = Fr::from_be_bytes_mod_order(bytes);
    if fr_to_bytes(&value) != *bytes {
        return Err(ZkError::InvalidInput(
            "value is not a canonical field element".to_string(),
        ));
    }
    Ok(value)
}
