//! Global uniqueness and revocation lineage across organizations.

use crate::test_utils::*;
use pramaan_attendance::AttendanceStatus;
use pramaan_core::{AttendanceType, BiometricType, ErrorKind, SecurityEventType};
use pramaan_identity::{BiometricRegistry, EnrollmentStatus, SUSPICIOUS_ATTEMPT_THRESHOLD};

#[test]
fn test_duplicate_across_organizations_keeps_first() {
    let node = TestNode::new();
    let first = TestScholar::new("s-1", "org-a", b"same-face", [1u8; 32]);
    let second = TestScholar::new("s-9", "org-b", b"same-face", [1u8; 32]);

    let commitment = node.enroll(&first).unwrap();
    let err = node.enroll(&second).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateBiometric);
    assert_eq!(err.kind().public_message(), "This biometric is already enrolled.");
    assert!(!err.to_string().contains("s-1"));
    assert!(!err.to_string().contains("org-a"));

    let entry = node.registry.get(&commitment).unwrap().unwrap();
    assert_eq!(entry.owner_scholar_id, "s-1");
    assert_eq!(entry.organization_id, "org-a");
    assert_eq!(entry.status, EnrollmentStatus::Active);

    let events = node.sink.events();
    let duplicate = events
        .iter()
        .find(|e| e.event_type == SecurityEventType::DuplicateBiometric)
        .unwrap();
    assert_eq!(duplicate.scholar_id.as_deref(), Some("s-9"));
    let rendered = serde_json::to_string(duplicate).unwrap();
    assert!(!rendered.contains("s-1"));
    assert!(!rendered.contains("org-a"));
}

#[test]
fn test_repeated_duplicates_flag_suspicious_activity() {
    let node = TestNode::new();
    node.enroll(&TestScholar::new("s-1", "org-a", b"same-face", [2u8; 32]))
        .unwrap();

    for attempt in 0..SUSPICIOUS_ATTEMPT_THRESHOLD {
        let impostor = TestScholar::new(&format!("x-{}", attempt), "org-b", b"same-face", [2u8; 32]);
        assert_eq!(
            node.enroll(&impostor).unwrap_err().kind(),
            ErrorKind::DuplicateBiometric
        );
    }
    assert_eq!(
        node.events_of(SecurityEventType::DuplicateBiometric),
        SUSPICIOUS_ATTEMPT_THRESHOLD as usize
    );
    assert_eq!(node.events_of(SecurityEventType::SuspiciousActivity), 1);
}

#[test]
fn test_second_enrollment_of_same_type_rejected() {
    let node = TestNode::new();
    node.enroll(&TestScholar::new("s-1", "org-a", b"face-1", [3u8; 32]))
        .unwrap();
    let err = node
        .enroll(&TestScholar::new("s-1", "org-a", b"face-2", [4u8; 32]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyEnrolled);
}

#[tokio::test]
async fn test_revocation_retires_salt_lineage() {
    let node = TestNode::new();
    let original = TestScholar::new("s-1", "org-a", b"face-1", [5u8; 32]);
    node.enroll(&original).unwrap();

    let revoked = node
        .enrollment
        .revoke("s-1", BiometricType::Face, "admin-1", "biometric reset")
        .unwrap();
    assert_eq!(revoked.status, EnrollmentStatus::Revoked);
    assert_eq!(node.events_of(SecurityEventType::BiometricRevoked), 1);

    // Same salt lineage cannot come back
    let err = node.enroll(&original).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // A fresh salt re-enrolls, and attendance works against the new commitment
    let renewed = TestScholar::new("s-1", "org-a", b"face-1", [6u8; 32]);
    let commitment = node.enroll(&renewed).unwrap();
    let challenge = node.attendance.issue_challenge("org-a", None).unwrap();
    let outcome = node
        .attendance
        .submit(node.prove(&renewed, &commitment, &challenge, AttendanceType::CheckIn))
        .await
        .unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Verified);

    let history = node.registry.history("s-1").unwrap();
    assert_eq!(history.len(), 2);
}

#[test]
fn test_registry_survives_restart_and_salt_recovers() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [7u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    let (recovered_commitment, salt) = node
        .enrollment
        .recover_salt("s-1", BiometricType::Face)
        .unwrap();
    assert_eq!(recovered_commitment, commitment);
    assert_eq!(salt.as_bytes(), &scholar.salt[..]);

    let reopened = BiometricRegistry::open(
        node.dir.path().join("registry.db"),
        pramaan_core::SecurityAuditor::tracing(),
    )
    .unwrap();
    let entry = reopened.get(&commitment).unwrap().unwrap();
    assert_eq!(entry.owner_scholar_id, "s-1");
    assert!(entry.is_active());
}
