//! Enrollment intake.
//!
//! Turns `(scholar, biometric type, template hash, salt)` into a registered
//! commitment/nullifier pair. The salt is sealed before it reaches the
//! registry; the template hash is dropped (and zeroized) once committed.

use crate::error::{IdentityError, Result};
use crate::registry::{
    BiometricRegistry, CommitmentDirectory, NewRegistration, RegistrationResult, RegistryEntry,
};
use pramaan_core::BiometricType;
use pramaan_crypto::{Commitment, CommitmentEngine, Salt, SaltSealer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

pub struct EnrollmentRequest {
    pub scholar_id: String,
    pub organization_id: String,
    pub biometric_type: BiometricType,
    pub template_hash: Zeroizing<Vec<u8>>,
    pub salt: Salt,
}

impl std::fmt::Debug for EnrollmentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentRequest")
            .field("scholar_id", &self.scholar_id)
            .field("organization_id", &self.organization_id)
            .field("biometric_type", &self.biometric_type)
            .finish_non_exhaustive()
    }
}

/// Result of a successful enrollment as returned to the intake caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentReceipt {
    pub scholar_id: String,
    pub biometric_type: BiometricType,
    #[serde(flatten)]
    pub registration: RegistrationResult,
}

pub struct EnrollmentService {
    engine: CommitmentEngine,
    registry: Arc<BiometricRegistry>,
    sealer: SaltSealer,
}

impl EnrollmentService {
    pub fn new(engine: CommitmentEngine, registry: Arc<BiometricRegistry>, sealer: SaltSealer) -> Self {
        Self {
            engine,
            registry,
            sealer,
        }
    }

    pub fn engine(&self) -> &CommitmentEngine {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<BiometricRegistry> {
        &self.registry
    }

    pub fn enroll(&self, request: EnrollmentRequest) -> Result<EnrollmentReceipt> {
        if request.scholar_id.trim().is_empty() || request.organization_id.trim().is_empty() {
            return Err(IdentityError::InvalidInput(
                "scholar and organization ids are required".to_string(),
            ));
        }

        let commitment = self
            .engine
            .commit(&request.template_hash, request.salt.as_bytes())?;
        let nullifier = self
            .engine
            .derive_nullifier(&request.scholar_id, request.salt.as_bytes())?;
        let sealed_salt = self.sealer.seal(&request.salt, commitment.as_bytes())?;

        debug!(
            scholar_id = %request.scholar_id,
            biometric_type = %request.biometric_type,
            "Commitment derived, registering"
        );

        let registration = self.registry.register(NewRegistration {
            biometric_type: request.biometric_type,
            commitment,
            nullifier,
            owner_scholar_id: request.scholar_id.clone(),
            organization_id: request.organization_id,
            sealed_salt,
        })?;

        Ok(EnrollmentReceipt {
            scholar_id: request.scholar_id,
            biometric_type: request.biometric_type,
            registration,
        })
    }

    /// Administrative biometric reset of the scholar's active enrollment.
    pub fn revoke(
        &self,
        scholar_id: &str,
        biometric_type: BiometricType,
        admin_id: &str,
        reason: &str,
    ) -> Result<RegistryEntry> {
        if admin_id.trim().is_empty() {
            return Err(IdentityError::InvalidInput("admin id is required".to_string()));
        }
        let entry = self
            .registry
            .active_enrollment(scholar_id, biometric_type)?
            .ok_or_else(|| IdentityError::NotEnrolled {
                biometric_type: biometric_type.to_string(),
            })?;
        self.registry.revoke(&entry.commitment, admin_id, reason)
    }

    /// Unseal the salt of the scholar's active enrollment, for proof
    /// generation on a reinstalled device.
    pub fn recover_salt(
        &self,
        scholar_id: &str,
        biometric_type: BiometricType,
    ) -> Result<(Commitment, Salt)> {
        let (commitment, sealed) = self
            .registry
            .sealed_salt(scholar_id, biometric_type)?
            .ok_or_else(|| IdentityError::NotEnrolled {
                biometric_type: biometric_type.to_string(),
            })?;
        let salt = self.sealer.open(&sealed, commitment.as_bytes())?;
        Ok((commitment, salt))
    }
}

impl std::fmt::Debug for EnrollmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentService")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
