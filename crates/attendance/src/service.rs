//! Async attendance service.
//!
//! Owns the challenge issuer, the verification pipeline and the store, and
//! drives one submission from `pending` to a terminal state. Groth16
//! verification runs on the blocking pool behind a semaphore; no lock is
//! held while it runs.

use pramaan_core::{
    now_ms, AttendanceType, BiometricType, Challenge, DeviceLocation, ErrorKind, Geofence,
    PramaanConfig, SecurityAuditor, SecurityEventBuilder, SecurityEventType,
};
use pramaan_crypto::{
    verify_receipt, AttendanceProof, AttendancePublicInputs, AttendanceReceipt,
    AttendanceVerifier, CommitmentEngine, ReceiptError, ReceiptSigner, SignedReceipt,
};
use pramaan_identity::{CommitmentDirectory, IdentityError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::challenge::ChallengeIssuer;
use crate::error::{AttendanceError, Result};
use crate::geofence::LocationPolicy;
use crate::pipeline::{
    check_commitment, check_freshness, check_organization, check_shape, Rejection,
    VerificationPipeline,
};
use crate::state::{AttendanceRecord, AttendanceStatus};
use crate::store::{AttendanceStore, ChallengeState, CommitOutcome, OverrideEntry, VerifiedCommit};

/// Proof submission from the scholar's device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub scholar_id: String,
    pub biometric_type: BiometricType,
    pub attendance_type: AttendanceType,
    pub challenge_id: String,
    pub proof: AttendanceProof,
    pub public_inputs: AttendancePublicInputs,
    #[serde(default)]
    pub location: Option<DeviceLocation>,
}

/// Resulting record status, plus the retained failure kind or the receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub proof_id: String,
    pub status: AttendanceStatus,
    pub error: Option<ErrorKind>,
    pub receipt: Option<SignedReceipt>,
}

enum Failure {
    Rejected(Rejection),
    Fatal(AttendanceError),
}

impl From<Rejection> for Failure {
    fn from(rejection: Rejection) -> Self {
        Failure::Rejected(rejection)
    }
}

impl From<AttendanceError> for Failure {
    fn from(err: AttendanceError) -> Self {
        Failure::Fatal(err)
    }
}

impl From<IdentityError> for Failure {
    fn from(err: IdentityError) -> Self {
        Failure::Fatal(err.into())
    }
}

impl From<ReceiptError> for Failure {
    fn from(err: ReceiptError) -> Self {
        Failure::Fatal(err.into())
    }
}

struct Inner {
    store: AttendanceStore,
    directory: Arc<dyn CommitmentDirectory>,
    pipeline: VerificationPipeline,
    issuer: ChallengeIssuer,
    signer: ReceiptSigner,
    auditor: SecurityAuditor,
    permits: Semaphore,
}

#[derive(Clone)]
pub struct AttendanceService {
    inner: Arc<Inner>,
}

impl AttendanceService {
    pub fn new(
        config: &PramaanConfig,
        store: AttendanceStore,
        directory: Arc<dyn CommitmentDirectory>,
        verifier: AttendanceVerifier,
        signer: ReceiptSigner,
        auditor: SecurityAuditor,
    ) -> Self {
        let pipeline = VerificationPipeline::new(
            CommitmentEngine::new(&config.protocol),
            verifier,
            LocationPolicy::new(&config.attendance),
        );
        Self {
            inner: Arc::new(Inner {
                store,
                directory,
                pipeline,
                issuer: ChallengeIssuer::new(&config.challenge),
                signer,
                auditor,
                permits: Semaphore::new(config.attendance.max_concurrent_verifications),
            }),
        }
    }

    pub fn store(&self) -> &AttendanceStore {
        &self.inner.store
    }

    pub fn receipt_key_id(&self) -> &str {
        self.inner.signer.public_key_id()
    }

    /// Check a receipt against this node's signing key.
    pub fn verify_receipt(&self, receipt: &SignedReceipt) -> Result<()> {
        verify_receipt(receipt, &self.inner.signer.verifying_key())?;
        Ok(())
    }

    pub fn issue_challenge(
        &self,
        organization_id: &str,
        geofence: Option<Geofence>,
    ) -> Result<Challenge> {
        let challenge = self.inner.issuer.issue(organization_id, geofence, now_ms())?;
        self.inner.store.insert_challenge(&challenge)?;
        Ok(challenge)
    }

    /// Verify a submission and record the outcome.
    ///
    /// Verification failures are reported in the outcome, not as `Err`.
    /// `Err` means no decision could be made: the request named no known
    /// challenge, or storage failed.
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionOutcome> {
        if submission.scholar_id.trim().is_empty() {
            return Err(AttendanceError::InvalidInput(
                "scholar id is required".to_string(),
            ));
        }
        let received_at = now_ms();
        let state = self
            .inner
            .store
            .challenge(&submission.challenge_id)?
            .ok_or_else(|| AttendanceError::UnknownChallenge(submission.challenge_id.clone()))?;

        let proof_id = uuid::Uuid::new_v4().to_string();
        let record = AttendanceRecord::pending(
            proof_id.clone(),
            submission.scholar_id.clone(),
            submission.biometric_type,
            submission.attendance_type,
            &state.challenge,
            submission.proof.clone(),
            submission.public_inputs,
            received_at,
        );
        self.inner.store.insert_record(&record)?;
        debug!(
            proof_id = %proof_id,
            scholar_id = %submission.scholar_id,
            challenge_id = %submission.challenge_id,
            "Attendance submission received"
        );

        match self.process(&proof_id, &submission, &state, received_at).await {
            Ok(receipt) => {
                info!(
                    proof_id = %proof_id,
                    scholar_id = %submission.scholar_id,
                    organization_id = %state.challenge.organization_id,
                    attendance_type = %submission.attendance_type,
                    "Attendance verified"
                );
                Ok(SubmissionOutcome {
                    proof_id,
                    status: AttendanceStatus::Verified,
                    error: None,
                    receipt: Some(receipt),
                })
            }
            Err(Failure::Rejected(rejection)) => {
                self.reject(&proof_id, &submission, &state, &rejection)?;
                Ok(SubmissionOutcome {
                    proof_id,
                    status: rejection.status,
                    error: Some(rejection.kind),
                    receipt: None,
                })
            }
            Err(Failure::Fatal(err)) => {
                warn!(proof_id = %proof_id, error = %err, "Attendance verification aborted");
                if let Err(e) = self.inner.store.finish_record(
                    &proof_id,
                    AttendanceStatus::Rejected,
                    err.kind(),
                    now_ms(),
                ) {
                    warn!(proof_id = %proof_id, error = %e, "Could not close aborted record");
                }
                Err(err)
            }
        }
    }

    async fn process(
        &self,
        proof_id: &str,
        submission: &Submission,
        state: &ChallengeState,
        received_at: u64,
    ) -> std::result::Result<SignedReceipt, Failure> {
        let inner = &self.inner;

        check_shape(&submission.proof)?;
        check_freshness(state, &submission.public_inputs.session_nullifier, received_at)?;
        inner
            .pipeline
            .check_location(state, submission.location.as_ref())?;

        let enrollment = inner
            .directory
            .active_enrollment(&submission.scholar_id, submission.biometric_type)?;
        let enrollment = check_commitment(enrollment.as_ref(), &submission.public_inputs)?;
        check_organization(enrollment, state)?;
        let bound = inner.pipeline.bind_public_inputs(
            enrollment,
            state,
            submission.attendance_type,
            &submission.public_inputs,
        )?;

        let expected = bound.public_inputs;
        {
            let _permit = inner.permits.acquire().await.map_err(|_| {
                AttendanceError::Internal("verification pool closed".to_string())
            })?;
            let worker = Arc::clone(&self.inner);
            let proof = submission.proof.clone();
            tokio::task::spawn_blocking(move || worker.pipeline.verify_proof(&proof, &expected))
                .await
                .map_err(|e| AttendanceError::Internal(format!("verification task failed: {}", e)))??;
        }

        if inner.store.is_session_consumed(&expected.session_nullifier)? {
            return Err(Rejection::rejected(
                ErrorKind::ReplayDetected,
                "session nullifier already consumed for this window",
            )
            .into());
        }

        let verified_at = now_ms();
        if state.challenge.is_expired_at(verified_at) {
            return Err(Rejection::expired().into());
        }
        let receipt = inner.signer.sign(AttendanceReceipt {
            proof_id: proof_id.to_string(),
            scholar_id: submission.scholar_id.clone(),
            organization_id: state.challenge.organization_id.clone(),
            attendance_type: submission.attendance_type,
            verified_at_ms: verified_at,
            session_nullifier: expected.session_nullifier,
        })?;

        let outcome = inner.store.commit_verified(&VerifiedCommit {
            proof_id,
            challenge_id: &state.challenge.challenge_id,
            session_nullifier: &expected.session_nullifier,
            window: &bound.window,
            verified_at_ms: verified_at,
            receipt: &receipt,
        })?;

        match outcome {
            CommitOutcome::Committed => Ok(receipt),
            CommitOutcome::ChallengeConsumed { same_session: true }
            | CommitOutcome::SessionReplayed => Err(Rejection::rejected(
                ErrorKind::ReplayDetected,
                "identical submission committed first",
            )
            .into()),
            CommitOutcome::ChallengeConsumed {
                same_session: false,
            } => Err(Rejection::rejected(
                ErrorKind::ChallengeConsumed,
                "challenge consumed by another submission",
            )
            .into()),
            CommitOutcome::RecordNotPending => Err(Rejection::expired().into()),
        }
    }

    fn reject(
        &self,
        proof_id: &str,
        submission: &Submission,
        state: &ChallengeState,
        rejection: &Rejection,
    ) -> Result<()> {
        self.inner
            .store
            .finish_record(proof_id, rejection.status, rejection.kind, now_ms())?;

        warn!(
            proof_id = proof_id,
            scholar_id = %submission.scholar_id,
            status = %rejection.status,
            kind = %rejection.kind,
            reason = %rejection.reason,
            "Attendance submission not verified"
        );

        if let Some(event_type) = rejection.event {
            self.inner.auditor.emit(
                SecurityEventBuilder::new(event_type)
                    .scholar(submission.scholar_id.clone())
                    .organization(state.challenge.organization_id.clone())
                    .message(rejection.reason.clone())
                    .detail("proof_id", proof_id)
                    .detail("challenge_id", state.challenge.challenge_id.clone())
                    .detail("error_kind", rejection.kind.as_str())
                    .detail("attendance_type", submission.attendance_type.as_str())
                    .build(),
            );
        }
        Ok(())
    }

    /// Fetch a record; pending records past their challenge TTL are expired
    /// on read.
    pub fn record(&self, proof_id: &str) -> Result<Option<AttendanceRecord>> {
        self.inner.store.record(proof_id, now_ms())
    }

    pub fn sweep_expired(&self) -> Result<usize> {
        let expired = self.inner.store.sweep_expired(now_ms())?;
        if expired > 0 {
            info!(expired = expired, "Expired stale pending attendance records");
        }
        Ok(expired)
    }

    /// Periodic expiry sweep on the current runtime.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let sweeper = service.clone();
                match tokio::task::spawn_blocking(move || sweeper.sweep_expired()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "Expiry sweep failed"),
                    Err(e) => warn!(error = %e, "Expiry sweep task panicked"),
                }
            }
        })
    }

    /// Administrative override of a terminal record. Logged to the override
    /// table and the security sink.
    pub fn override_status(
        &self,
        proof_id: &str,
        status: AttendanceStatus,
        admin_id: &str,
        reason: &str,
    ) -> Result<AttendanceRecord> {
        if admin_id.trim().is_empty() || reason.trim().is_empty() {
            return Err(AttendanceError::InvalidInput(
                "admin id and reason are required".to_string(),
            ));
        }
        let now = now_ms();
        let from = self
            .inner
            .store
            .override_status(proof_id, status, admin_id, reason, now)?;
        let record = self
            .inner
            .store
            .record(proof_id, now)?
            .ok_or_else(|| AttendanceError::RecordNotFound(proof_id.to_string()))?;

        warn!(
            proof_id = proof_id,
            admin_id = admin_id,
            from = %from,
            to = %status,
            "Attendance status overridden"
        );
        self.inner.auditor.emit(
            SecurityEventBuilder::new(SecurityEventType::AdminOverride)
                .scholar(record.scholar_id.clone())
                .organization(record.organization_id.clone())
                .message(format!("Attendance status overridden: {} -> {}", from, status))
                .detail("proof_id", proof_id)
                .detail("admin_id", admin_id)
                .detail("reason", reason)
                .build(),
        );
        Ok(record)
    }

    pub fn overrides(&self, proof_id: &str) -> Result<Vec<OverrideEntry>> {
        self.inner.store.overrides(proof_id)
    }

    pub fn records_for_scholar(&self, scholar_id: &str, limit: usize) -> Result<Vec<AttendanceRecord>> {
        self.inner
            .store
            .records_for_scholar(scholar_id, limit, now_ms())
    }

    pub fn records_for_organization(
        &self,
        organization_id: &str,
        status: Option<AttendanceStatus>,
        limit: usize,
    ) -> Result<Vec<AttendanceRecord>> {
        self.inner
            .store
            .records_for_organization(organization_id, status, limit, now_ms())
    }
}

impl std::fmt::Debug for AttendanceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceService")
            .field("pipeline", &self.inner.pipeline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pramaan_core::MemorySink;
    use pramaan_crypto::{
        setup, template_hash, AttendanceProver, AttendanceWitness, Commitment, ProvingParameters,
        Salt, SaltSealer, VerifyingParameters,
    };
    use pramaan_identity::{BiometricRegistry, EnrollmentRequest, EnrollmentService};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::OnceLock;
    use zeroize::Zeroizing;

    fn keys() -> &'static (Arc<ProvingParameters>, Arc<VerifyingParameters>) {
        static KEYS: OnceLock<(Arc<ProvingParameters>, Arc<VerifyingParameters>)> =
            OnceLock::new();
        KEYS.get_or_init(|| {
            let (pk, vk) = setup(&mut StdRng::seed_from_u64(7)).unwrap();
            (Arc::new(pk), Arc::new(vk))
        })
    }

    struct Harness {
        service: AttendanceService,
        prover: AttendanceProver,
        commitment: Commitment,
        sink: Arc<MemorySink>,
    }

    const SALT: [u8; 32] = [7u8; 32];

    fn harness() -> Harness {
        let (pk, vk) = keys();
        let sink = Arc::new(MemorySink::new());
        let auditor = SecurityAuditor::new(sink.clone());
        let registry = Arc::new(BiometricRegistry::open_in_memory(auditor.clone()).unwrap());
        let enrollment = EnrollmentService::new(
            CommitmentEngine::default(),
            registry.clone(),
            SaltSealer::new(&[1u8; 32]),
        );
        let enrolled = enrollment
            .enroll(EnrollmentRequest {
                scholar_id: "s-1".to_string(),
                organization_id: "org-a".to_string(),
                biometric_type: BiometricType::Face,
                template_hash: Zeroizing::new(template_hash(b"face-s1").to_vec()),
                salt: Salt::from_bytes(SALT.to_vec()),
            })
            .unwrap();

        let service = AttendanceService::new(
            &PramaanConfig::default(),
            AttendanceStore::open_in_memory().unwrap(),
            registry,
            AttendanceVerifier::new(vk.clone()),
            ReceiptSigner::from_seed(&[2u8; 32]),
            auditor,
        );
        Harness {
            service,
            prover: AttendanceProver::new(pk.clone(), CommitmentEngine::default()).unwrap(),
            commitment: enrolled.registration.commitment,
            sink,
        }
    }

    fn submission(h: &Harness, challenge: &Challenge, scholar: &str) -> Submission {
        let witness =
            AttendanceWitness::new(&template_hash(b"face-s1"), Salt::from_bytes(SALT.to_vec()), scholar)
                .unwrap();
        let (proof, public_inputs) = h
            .prover
            .generate_proof(
                &witness,
                &h.commitment,
                challenge,
                AttendanceType::CheckIn,
                &mut StdRng::seed_from_u64(99),
            )
            .unwrap();
        Submission {
            scholar_id: scholar.to_string(),
            biometric_type: BiometricType::Face,
            attendance_type: AttendanceType::CheckIn,
            challenge_id: challenge.challenge_id.clone(),
            proof,
            public_inputs,
            location: None,
        }
    }

    fn events_of(sink: &MemorySink, event_type: SecurityEventType) -> usize {
        sink.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    #[tokio::test]
    async fn test_verified_then_replay() {
        let h = harness();
        let challenge = h.service.issue_challenge("org-a", None).unwrap();
        let sub = submission(&h, &challenge, "s-1");

        let first = h.service.submit(sub.clone()).await.unwrap();
        assert_eq!(first.status, AttendanceStatus::Verified);
        let receipt = first.receipt.unwrap();
        h.service.verify_receipt(&receipt).unwrap();
        assert_eq!(receipt.receipt.proof_id, first.proof_id);

        let second = h.service.submit(sub).await.unwrap();
        assert_eq!(second.status, AttendanceStatus::Rejected);
        assert_eq!(second.error, Some(ErrorKind::ReplayDetected));
        assert_eq!(events_of(&h.sink, SecurityEventType::ReplayDetected), 1);

        let stored = h.service.record(&first.proof_id).unwrap().unwrap();
        assert_eq!(stored.status, AttendanceStatus::Verified);
        assert!(stored.verified_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_proof_for_other_challenge_rejected() {
        let h = harness();
        let a = h.service.issue_challenge("org-a", None).unwrap();
        let b = h.service.issue_challenge("org-a", None).unwrap();
        let mut sub = submission(&h, &a, "s-1");
        sub.challenge_id = b.challenge_id.clone();

        let outcome = h.service.submit(sub).await.unwrap();
        assert_eq!(outcome.status, AttendanceStatus::Rejected);
        assert_eq!(outcome.error, Some(ErrorKind::InvalidProof));
        assert_eq!(events_of(&h.sink, SecurityEventType::InvalidProof), 1);

        // b is still usable
        let ok = h.service.submit(submission(&h, &b, "s-1")).await.unwrap();
        assert_eq!(ok.status, AttendanceStatus::Verified);
    }

    #[tokio::test]
    async fn test_expired_challenge_is_expired_not_rejected() {
        let h = harness();
        let mut challenge = h.service.issue_challenge("org-a", None).unwrap();
        challenge.challenge_id = "ch-stale".to_string();
        challenge.issued_at_ms = now_ms() - 180_000;
        h.service.store().insert_challenge(&challenge).unwrap();

        let outcome = h.service.submit(submission(&h, &challenge, "s-1")).await.unwrap();
        assert_eq!(outcome.status, AttendanceStatus::Expired);
        assert_eq!(outcome.error, Some(ErrorKind::ChallengeExpired));
        assert!(h.sink.is_empty());
    }

    #[tokio::test]
    async fn test_commitment_mismatch() {
        let h = harness();
        let challenge = h.service.issue_challenge("org-a", None).unwrap();
        let mut sub = submission(&h, &challenge, "s-1");
        sub.public_inputs.commitment = Commitment([3u8; 32]);

        let outcome = h.service.submit(sub).await.unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::CommitmentMismatch));
        assert_eq!(events_of(&h.sink, SecurityEventType::CommitmentMismatch), 1);
    }

    #[tokio::test]
    async fn test_unenrolled_scholar_and_unknown_challenge() {
        let h = harness();
        let challenge = h.service.issue_challenge("org-a", None).unwrap();
        let mut sub = submission(&h, &challenge, "s-1");
        sub.scholar_id = "s-2".to_string();
        let outcome = h.service.submit(sub.clone()).await.unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::NotEnrolled));

        sub.challenge_id = "nope".to_string();
        let err = h.service.submit(sub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_malformed_proof_is_invalid_input() {
        let h = harness();
        let challenge = h.service.issue_challenge("org-a", None).unwrap();
        let mut sub = submission(&h, &challenge, "s-1");
        sub.proof.proof_bytes.truncate(10);
        let outcome = h.service.submit(sub).await.unwrap();
        assert_eq!(outcome.status, AttendanceStatus::Rejected);
        assert_eq!(outcome.error, Some(ErrorKind::InvalidInput));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_identical_submissions_verify_once() {
        let h = harness();
        let challenge = h.service.issue_challenge("org-a", None).unwrap();
        let sub = submission(&h, &challenge, "s-1");

        let (a, b) = tokio::join!(h.service.submit(sub.clone()), h.service.submit(sub));
        let statuses = [a.unwrap(), b.unwrap()];
        let verified = statuses
            .iter()
            .filter(|o| o.status == AttendanceStatus::Verified)
            .count();
        assert_eq!(verified, 1);
        let loser = statuses
            .iter()
            .find(|o| o.status != AttendanceStatus::Verified)
            .unwrap();
        assert!(matches!(
            loser.error,
            Some(ErrorKind::ReplayDetected) | Some(ErrorKind::ChallengeConsumed)
        ));
    }

    #[tokio::test]
    async fn test_admin_override_logged() {
        let h = harness();
        let challenge = h.service.issue_challenge("org-a", None).unwrap();
        let mut sub = submission(&h, &challenge, "s-1");
        sub.public_inputs.commitment = Commitment([3u8; 32]);
        let outcome = h.service.submit(sub).await.unwrap();

        let record = h
            .service
            .override_status(&outcome.proof_id, AttendanceStatus::Verified, "admin-1", "manual check")
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Verified);
        assert_eq!(h.service.overrides(&outcome.proof_id).unwrap().len(), 1);
        assert_eq!(events_of(&h.sink, SecurityEventType::AdminOverride), 1);

        assert!(h
            .service
            .override_status(&outcome.proof_id, AttendanceStatus::Rejected, "", "x")
            .is_err());
    }

    #[tokio::test]
    async fn test_dashboard_lists() {
        let h = harness();
        let challenge = h.service.issue_challenge("org-a", None).unwrap();
        h.service
            .submit(submission(&h, &challenge, "s-1"))
            .await
            .unwrap();

        assert_eq!(h.service.records_for_scholar("s-1", 10).unwrap().len(), 1);
        assert_eq!(
            h.service
                .records_for_organization("org-a", Some(AttendanceStatus::Verified), 10)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(h.service.sweep_expired().unwrap(), 0);
    }
}
