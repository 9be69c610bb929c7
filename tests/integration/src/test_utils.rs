//! Test utilities for end-to-end attendance tests

use pramaan_attendance::{AttendanceService, AttendanceStore, Submission};
use pramaan_core::{
    AttendanceType, BiometricType, Challenge, MemorySink, PramaanConfig, SecurityAuditor,
    SecurityEventType,
};
use pramaan_crypto::{
    setup, template_hash, AttendanceProver, AttendanceVerifier, Commitment, CommitmentEngine,
    ProvingParameters, ReceiptSigner, Salt, SaltSealer, VerifyingParameters,
};
use pramaan_identity::{BiometricRegistry, EnrollmentRequest, EnrollmentService, IdentityError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use zeroize::Zeroizing;

/// Groth16 keys shared by every test in the binary. Setup is deterministic
/// so failures reproduce.
pub fn circuit_keys() -> &'static (Arc<ProvingParameters>, Arc<VerifyingParameters>) {
    static KEYS: OnceLock<(Arc<ProvingParameters>, Arc<VerifyingParameters>)> = OnceLock::new();
    KEYS.get_or_init(|| {
        let (pk, vk) = setup(&mut StdRng::seed_from_u64(2024)).unwrap();
        (Arc::new(pk), Arc::new(vk))
    })
}

/// Secret material a scholar's device holds after enrollment.
#[derive(Clone)]
pub struct TestScholar {
    pub scholar_id: String,
    pub organization_id: String,
    pub template: Vec<u8>,
    pub salt: [u8; 32],
}

impl TestScholar {
    pub fn new(scholar_id: &str, organization_id: &str, template: &[u8], salt: [u8; 32]) -> Self {
        Self {
            scholar_id: scholar_id.to_string(),
            organization_id: organization_id.to_string(),
            template: template.to_vec(),
            salt,
        }
    }

    pub fn enrollment_request(&self) -> EnrollmentRequest {
        EnrollmentRequest {
            scholar_id: self.scholar_id.clone(),
            organization_id: self.organization_id.clone(),
            biometric_type: BiometricType::Face,
            template_hash: Zeroizing::new(template_hash(&self.template).to_vec()),
            salt: Salt::from_bytes(self.salt.to_vec()),
        }
    }
}

/// One node's worth of services over on-disk databases in a temp dir.
pub struct TestNode {
    pub dir: TempDir,
    pub sink: Arc<MemorySink>,
    pub registry: Arc<BiometricRegistry>,
    pub enrollment: EnrollmentService,
    pub attendance: AttendanceService,
    pub prover: AttendanceProver,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_config(PramaanConfig::default())
    }

    pub fn with_config(config: PramaanConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let auditor = SecurityAuditor::new(sink.clone());
        let (pk, vk) = circuit_keys();

        let registry = Arc::new(
            BiometricRegistry::open(dir.path().join("registry.db"), auditor.clone()).unwrap(),
        );
        let enrollment = EnrollmentService::new(
            CommitmentEngine::new(&config.protocol),
            registry.clone(),
            SaltSealer::new(&[21u8; 32]),
        );
        let attendance = AttendanceService::new(
            &config,
            AttendanceStore::open(dir.path().join("attendance.db")).unwrap(),
            registry.clone(),
            AttendanceVerifier::new(vk.clone()),
            ReceiptSigner::from_seed(&[22u8; 32]),
            auditor,
        );
        let prover =
            AttendanceProver::new(pk.clone(), CommitmentEngine::new(&config.protocol)).unwrap();

        Self {
            dir,
            sink,
            registry,
            enrollment,
            attendance,
            prover,
        }
    }

    pub fn enroll(&self, scholar: &TestScholar) -> Result<Commitment, IdentityError> {
        self.enrollment
            .enroll(scholar.enrollment_request())
            .map(|receipt| receipt.registration.commitment)
    }

    /// Build a submission the way the scholar's device would.
    pub fn prove(
        &self,
        scholar: &TestScholar,
        commitment: &Commitment,
        challenge: &Challenge,
        attendance_type: AttendanceType,
    ) -> Submission {
        let witness = pramaan_crypto::AttendanceWitness::new(
            &template_hash(&scholar.template),
            Salt::from_bytes(scholar.salt.to_vec()),
            scholar.scholar_id.clone(),
        )
        .unwrap();
        let (proof, public_inputs) = self
            .prover
            .generate_proof(
                &witness,
                commitment,
                challenge,
                attendance_type,
                &mut StdRng::from_entropy(),
            )
            .unwrap();
        Submission {
            scholar_id: scholar.scholar_id.clone(),
            biometric_type: BiometricType::Face,
            attendance_type,
            challenge_id: challenge.challenge_id.clone(),
            proof,
            public_inputs,
            location: None,
        }
    }

    pub fn events_of(&self, event_type: SecurityEventType) -> usize {
        self.sink
            .events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}
