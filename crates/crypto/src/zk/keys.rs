//! Groth16 key material for the attendance circuit.
//!
//! Keys are produced once by a circuit-specific setup and persisted with
//! arkworks' compressed encoding. Servers load only the verifying key.

use super::circuit::AttendanceCircuit;
use super::error::{ZkError, ZkResult};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use rand::{CryptoRng, RngCore};
use std::path::Path;
use tracing::info;

pub const PROVING_KEY_FILE: &str = "attendance.pk";
pub const VERIFYING_KEY_FILE: &str = "attendance.vk";

/// Proving key, held by clients.
#[derive(Clone)]
pub struct ProvingParameters {
    pk: ProvingKey<Bn254>,
}

/// Verifying key with its prepared form and a stable identifier.
#[derive(Clone)]
pub struct VerifyingParameters {
    vk: VerifyingKey<Bn254>,
    pvk: PreparedVerifyingKey<Bn254>,
    key_id: String,
}

/// Run the circuit-specific Groth16 setup.
pub fn setup<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> ZkResult<(ProvingParameters, VerifyingParameters)> {
    let (pk, vk) =
        <Groth16<Bn254> as SNARK<Fr>>::circuit_specific_setup(AttendanceCircuit::blank(), rng)?;
    let verifying = VerifyingParameters::from_key(vk)?;
    info!(key_id = %verifying.key_id(), "Generated attendance circuit keys");
    Ok((ProvingParameters { pk }, verifying))
}

impl ProvingParameters {
    pub(crate) fn key(&self) -> &ProvingKey<Bn254> {
        &self.pk
    }

    /// Verifying parameters embedded in the proving key.
    pub fn verifying_parameters(&self) -> ZkResult<VerifyingParameters> {
        VerifyingParameters::from_key(self.pk.vk.clone())
    }

    pub fn to_bytes(&self) -> ZkResult<Vec<u8>> {
        let mut out = Vec::new();
        self.pk.serialize_compressed(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> ZkResult<Self> {
        let pk = ProvingKey::<Bn254>::deserialize_compressed(bytes)?;
        Ok(Self { pk })
    }

    pub fn save(&self, path: &Path) -> ZkResult<()> {
        write_file(path, &self.to_bytes()?)
    }

    pub fn load(path: &Path) -> ZkResult<Self> {
        Self::from_bytes(&read_file(path)?)
    }
}

impl VerifyingParameters {
    pub fn from_key(vk: VerifyingKey<Bn254>) -> ZkResult<Self> {
        let mut encoded = Vec::new();
        vk.serialize_compressed(&mut encoded)?;
        let key_id = hex::encode(&blake3::hash(&encoded).as_bytes()[..8]);
        let pvk = <Groth16<Bn254> as SNARK<Fr>>::process_vk(&vk)?;
        Ok(Self { vk, pvk, key_id })
    }

    /// Hex identifier derived from the key bytes. Proofs name the key they
    /// were produced for.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) fn prepared(&self) -> &PreparedVerifyingKey<Bn254> {
        &self.pvk
    }

    pub fn to_bytes(&self) -> ZkResult<Vec<u8>> {
        let mut out = Vec::new();
        self.vk.serialize_compressed(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> ZkResult<Self> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(bytes)?;
        Self::from_key(vk)
    }

    pub fn save(&self, path: &Path) -> ZkResult<()> {
        write_file(path, &self.to_bytes()?)
    }

    pub fn load(path: &Path) -> ZkResult<Self> {
        let params = Self::from_bytes(&read_file(path)?)?;
        info!(path = %path.display(), key_id = %params.key_id, "Loaded verifying key");
        Ok(params)
    }
}

impl std::fmt::Debug for VerifyingParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingParameters")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ProvingParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvingParameters").finish_non_exhaustive()
    }
}

fn read_file(path: &Path) -> ZkResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ZkError::KeyNotFound(format!("{}: {}", path.display(), e)))
}

fn write_file(path: &Path, bytes: &[u8]) -> ZkResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ZkError::Serialization(format!("{}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, bytes)
        .map_err(|e| ZkError::Serialization(format!("{}: {}", path.display(), e)))
}
