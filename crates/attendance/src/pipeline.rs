//! Server-side verification stages.
//!
//! Stages run cheapest first and stop at the first failure:
//!
//! 1. envelope shape
//! 2. challenge freshness (consumed, expired) and device location
//! 3. commitment on file for the claimed scholar, enrolled in the
//!    challenge's organization
//! 4. public-input binding: challenge tag, window tag and session nullifier
//!    are recomputed from server state
//! 5. Groth16 verification
//!
//! Session nullifier consumption and the final commit live in the store.

use pramaan_core::{
    AttendanceType, AttendanceWindow, DeviceLocation, ErrorKind, SecurityEventType,
};
use pramaan_crypto::{
    AttendanceProof, AttendancePublicInputs, AttendanceVerifier, CommitmentEngine,
    SessionNullifier,
};
use pramaan_identity::RegistryEntry;

use crate::geofence::{LocationPolicy, LocationVerdict};
use crate::state::AttendanceStatus;
use crate::store::ChallengeState;

/// Why a submission did not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// `Rejected`, or `Expired` for TTL failures
    pub status: AttendanceStatus,
    pub kind: ErrorKind,
    /// Internal detail for logs and audit; never shown to the scholar
    pub reason: String,
    /// Security event to emit, if any
    pub event: Option<SecurityEventType>,
}

impl Rejection {
    pub fn rejected(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            status: AttendanceStatus::Rejected,
            kind,
            reason: reason.into(),
            event: SecurityEventType::for_kind(kind),
        }
    }

    pub fn expired() -> Self {
        Self {
            status: AttendanceStatus::Expired,
            kind: ErrorKind::ChallengeExpired,
            reason: "challenge TTL elapsed".to_string(),
            event: None,
        }
    }

    fn spoofed(reason: String) -> Self {
        Self {
            status: AttendanceStatus::Rejected,
            kind: ErrorKind::LocationRejected,
            reason,
            event: Some(SecurityEventType::LocationSpoofing),
        }
    }
}

/// Public inputs derived from server state for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundInputs {
    pub public_inputs: AttendancePublicInputs,
    pub window: AttendanceWindow,
}

/// Inputs to a complete synchronous verification.
#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub proof: &'a AttendanceProof,
    pub public_inputs: &'a AttendancePublicInputs,
    /// Active enrollment on file for the claimed scholar
    pub enrollment: Option<&'a RegistryEntry>,
    pub challenge: &'a ChallengeState,
    pub attendance_type: AttendanceType,
    pub location: Option<&'a DeviceLocation>,
    pub now_ms: u64,
}

pub struct VerificationPipeline {
    engine: CommitmentEngine,
    verifier: AttendanceVerifier,
    location: LocationPolicy,
}

impl VerificationPipeline {
    pub fn new(
        engine: CommitmentEngine,
        verifier: AttendanceVerifier,
        location: LocationPolicy,
    ) -> Self {
        Self {
            engine,
            verifier,
            location,
        }
    }

    pub fn engine(&self) -> &CommitmentEngine {
        &self.engine
    }

    /// Every stateless stage in order, including the proof check.
    pub fn verify(&self, request: &VerificationRequest<'_>) -> Result<BoundInputs, Rejection> {
        let bound = self.precheck(request)?;
        self.verify_proof(request.proof, &bound.public_inputs)?;
        Ok(bound)
    }

    /// Every stage before the proof check.
    pub fn precheck(&self, request: &VerificationRequest<'_>) -> Result<BoundInputs, Rejection> {
        check_shape(request.proof)?;
        check_freshness(
            request.challenge,
            &request.public_inputs.session_nullifier,
            request.now_ms,
        )?;
        self.check_location(request.challenge, request.location)?;
        let enrollment = check_commitment(request.enrollment, request.public_inputs)?;
        check_organization(enrollment, request.challenge)?;
        self.bind_public_inputs(
            enrollment,
            request.challenge,
            request.attendance_type,
            request.public_inputs,
        )
    }

    pub fn check_location(
        &self,
        challenge: &ChallengeState,
        location: Option<&DeviceLocation>,
    ) -> Result<(), Rejection> {
        match self
            .location
            .evaluate(challenge.challenge.geofence.as_ref(), location)
        {
            LocationVerdict::Accepted => Ok(()),
            LocationVerdict::Rejected(reason) => {
                Err(Rejection::rejected(ErrorKind::LocationRejected, reason))
            }
            LocationVerdict::Spoofed(reason) => Err(Rejection::spoofed(reason)),
        }
    }

    /// Recompute the public inputs the proof must verify against. The
    /// client's copy is only compared, never used.
    pub fn bind_public_inputs(
        &self,
        enrollment: &RegistryEntry,
        challenge: &ChallengeState,
        attendance_type: AttendanceType,
        claimed: &AttendancePublicInputs,
    ) -> Result<BoundInputs, Rejection> {
        let window = self.engine.window_for(&challenge.challenge, attendance_type);
        let session_nullifier = self
            .engine
            .derive_session_nullifier(&enrollment.nullifier, &window)
            .map_err(|e| Rejection::rejected(ErrorKind::Internal, e.to_string()))?;
        let expected = AttendancePublicInputs::bind(
            enrollment.commitment,
            &challenge.challenge,
            &window,
            session_nullifier,
        );

        if claimed.challenge_tag != expected.challenge_tag {
            return Err(Rejection::rejected(
                ErrorKind::InvalidProof,
                "proof is bound to a different challenge",
            ));
        }
        if claimed.window_tag != expected.window_tag {
            return Err(Rejection::rejected(
                ErrorKind::InvalidProof,
                "proof is bound to a different attendance window",
            ));
        }
        if claimed.session_nullifier != expected.session_nullifier {
            return Err(Rejection::rejected(
                ErrorKind::InvalidProof,
                "session nullifier does not match the enrollment",
            ));
        }
        Ok(BoundInputs {
            public_inputs: expected,
            window,
        })
    }

    /// Groth16 verification. CPU-bound; callers on an async runtime run
    /// this on the blocking pool.
    pub fn verify_proof(
        &self,
        proof: &AttendanceProof,
        expected: &AttendancePublicInputs,
    ) -> Result<(), Rejection> {
        self.verifier
            .verify(proof, expected)
            .map_err(|e| Rejection::rejected(ErrorKind::InvalidProof, e.to_string()))
    }
}

impl std::fmt::Debug for VerificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationPipeline")
            .field("key_id", &self.verifier.key_id())
            .finish_non_exhaustive()
    }
}

pub fn check_shape(proof: &AttendanceProof) -> Result<(), Rejection> {
    proof
        .validate_shape()
        .map_err(|e| Rejection::rejected(ErrorKind::InvalidInput, e.to_string()))
}

/// Consumed is checked before expired: a replay of an accepted proof is a
/// replay whatever the clock says.
pub fn check_freshness(
    challenge: &ChallengeState,
    claimed_session: &SessionNullifier,
    now_ms: u64,
) -> Result<(), Rejection> {
    if let Some(consumption) = &challenge.consumption {
        if consumption.session_nullifier == *claimed_session {
            return Err(Rejection::rejected(
                ErrorKind::ReplayDetected,
                format!("challenge already answered by {}", consumption.proof_id),
            ));
        }
        return Err(Rejection::rejected(
            ErrorKind::ChallengeConsumed,
            "challenge already consumed",
        ));
    }
    if challenge.challenge.is_expired_at(now_ms) {
        return Err(Rejection::expired());
    }
    Ok(())
}

pub fn check_commitment<'a>(
    enrollment: Option<&'a RegistryEntry>,
    claimed: &AttendancePublicInputs,
) -> Result<&'a RegistryEntry, Rejection> {
    let enrollment = enrollment.ok_or_else(|| {
        Rejection::rejected(ErrorKind::NotEnrolled, "no active enrollment on file")
    })?;
    if enrollment.commitment != claimed.commitment {
        return Err(Rejection::rejected(
            ErrorKind::CommitmentMismatch,
            "public commitment differs from the enrollment on file",
        ));
    }
    Ok(enrollment)
}

/// A scholar only answers challenges issued by the organization they
/// enrolled with.
pub fn check_organization(
    enrollment: &RegistryEntry,
    challenge: &ChallengeState,
) -> Result<(), Rejection> {
    if enrollment.organization_id != challenge.challenge.organization_id {
        return Err(Rejection::rejected(
            ErrorKind::CommitmentMismatch,
            format!(
                "enrollment belongs to {}, challenge issued by {}",
                enrollment.organization_id, challenge.challenge.organization_id
            ),
        ));
    }
    Ok(())
}
