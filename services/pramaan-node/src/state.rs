use anyhow::Context;
use pramaan_attendance::{AttendanceService, AttendanceStore};
use pramaan_core::{PramaanConfig, SecurityAuditor, Secrets};
use pramaan_crypto::{
    AttendanceVerifier, CommitmentEngine, ReceiptSigner, SaltSealer, VerifyingParameters,
};
use pramaan_identity::{BiometricRegistry, CommitmentDirectory, EnrollmentService};
use std::path::Path;
use std::sync::Arc;

pub struct AppState {
    pub config: PramaanConfig,
    pub enrollment: Arc<EnrollmentService>,
    pub attendance: AttendanceService,
    pub verifying_key_id: String,
}

impl AppState {
    /// Open both databases and wire the services from configuration.
    pub fn open(
        config: PramaanConfig,
        secrets: &Secrets,
        params: VerifyingParameters,
    ) -> anyhow::Result<Self> {
        let auditor = SecurityAuditor::tracing();
        for path in [&config.storage.registry_path, &config.storage.attendance_path] {
            ensure_parent(path)?;
        }

        let registry = BiometricRegistry::open(&config.storage.registry_path, auditor.clone())
            .with_context(|| {
                format!(
                    "opening registry at {}",
                    config.storage.registry_path.display()
                )
            })?;
        let store = AttendanceStore::open(&config.storage.attendance_path).with_context(|| {
            format!(
                "opening attendance store at {}",
                config.storage.attendance_path.display()
            )
        })?;

        Ok(Self::from_parts(
            config,
            secrets,
            params,
            Arc::new(registry),
            store,
            auditor,
        ))
    }

    pub fn from_parts(
        config: PramaanConfig,
        secrets: &Secrets,
        params: VerifyingParameters,
        registry: Arc<BiometricRegistry>,
        store: AttendanceStore,
        auditor: SecurityAuditor,
    ) -> Self {
        let verifying_key_id = params.key_id().to_string();
        let enrollment = Arc::new(EnrollmentService::new(
            CommitmentEngine::new(&config.protocol),
            registry.clone(),
            SaltSealer::new(&secrets.salt_sealing_key),
        ));
        let directory: Arc<dyn CommitmentDirectory> = registry;
        let attendance = AttendanceService::new(
            &config,
            store,
            directory,
            AttendanceVerifier::new(Arc::new(params)),
            ReceiptSigner::from_seed(&secrets.receipt_signing_seed),
            auditor,
        );
        Self {
            config,
            enrollment,
            attendance,
            verifying_key_id,
        }
    }
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}
