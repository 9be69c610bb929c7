//! Enrollment to verified attendance over on-disk stores.

use crate::test_utils::*;
use pramaan_attendance::{
    AttendanceRecord, AttendanceStatus, LocationPolicy, VerificationPipeline, VerificationRequest,
};
use pramaan_core::{
    now_ms, AttendanceType, BiometricType, DeviceLocation, ErrorKind, GeoCoordinate, Geofence,
    PramaanConfig, SecurityEventType,
};
use pramaan_crypto::{AttendanceVerifier, CommitmentEngine};
use pramaan_identity::CommitmentDirectory;

#[tokio::test]
async fn test_scholar_enrolls_checks_in_and_replay_is_detected() {
    let node = TestNode::new();
    let s1 = TestScholar::new("S1", "org-a", b"H1", [1u8; 32]);

    let c1 = node.enroll(&s1).unwrap();
    let ch1 = node.attendance.issue_challenge("org-a", None).unwrap();
    assert_eq!(ch1.ttl_ms, 120_000);

    let submission = node.prove(&s1, &c1, &ch1, AttendanceType::CheckIn);
    let first = node.attendance.submit(submission.clone()).await.unwrap();
    assert_eq!(first.status, AttendanceStatus::Verified);
    assert_eq!(first.error, None);

    let receipt = first.receipt.clone().unwrap();
    node.attendance.verify_receipt(&receipt).unwrap();
    assert_eq!(receipt.receipt.scholar_id, "S1");
    assert_eq!(receipt.receipt.proof_id, first.proof_id);

    let record = node.attendance.record(&first.proof_id).unwrap().unwrap();
    assert_eq!(record.status, AttendanceStatus::Verified);
    assert_eq!(record.public_inputs.commitment, c1);
    assert!(record.verified_at_ms.unwrap() >= record.created_at_ms);

    // Identical proof and challenge, immediately after
    let second = node.attendance.submit(submission).await.unwrap();
    assert_eq!(second.status, AttendanceStatus::Rejected);
    assert_eq!(second.error, Some(ErrorKind::ReplayDetected));
    assert!(second.receipt.is_none());

    let replays: Vec<_> = node
        .sink
        .events()
        .into_iter()
        .filter(|e| e.event_type == SecurityEventType::ReplayDetected)
        .collect();
    assert_eq!(replays.len(), 1);
    assert_eq!(replays[0].scholar_id.as_deref(), Some("S1"));
    assert_eq!(replays[0].organization_id.as_deref(), Some("org-a"));

    // Both attempts are on the scholar's history, newest first
    let history = node.attendance.records_for_scholar("S1", 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].proof_id, second.proof_id);
    assert_eq!(history[1].status, AttendanceStatus::Verified);
}

#[tokio::test]
async fn test_check_in_and_check_out_use_separate_windows() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [2u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    let morning = node.attendance.issue_challenge("org-a", None).unwrap();
    let check_in = node
        .attendance
        .submit(node.prove(&scholar, &commitment, &morning, AttendanceType::CheckIn))
        .await
        .unwrap();
    assert_eq!(check_in.status, AttendanceStatus::Verified);

    let evening = node.attendance.issue_challenge("org-a", None).unwrap();
    let check_out = node
        .attendance
        .submit(node.prove(&scholar, &commitment, &evening, AttendanceType::CheckOut))
        .await
        .unwrap();
    assert_eq!(check_out.status, AttendanceStatus::Verified);

    // A second check-in the same day reuses the session nullifier
    let again = node.attendance.issue_challenge("org-a", None).unwrap();
    let duplicate = node
        .attendance
        .submit(node.prove(&scholar, &commitment, &again, AttendanceType::CheckIn))
        .await
        .unwrap();
    assert_eq!(duplicate.error, Some(ErrorKind::ReplayDetected));
}

#[tokio::test]
async fn test_late_submission_expires_instead_of_rejecting() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [3u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    // Issued at T, submitted at T + 3 minutes against a 2 minute TTL
    let mut challenge = node.attendance.issue_challenge("org-a", None).unwrap();
    challenge.challenge_id = "ch-late".to_string();
    challenge.issued_at_ms = now_ms() - 180_000;
    node.attendance.store().insert_challenge(&challenge).unwrap();

    let outcome = node
        .attendance
        .submit(node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn))
        .await
        .unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Expired);
    assert_eq!(outcome.error, Some(ErrorKind::ChallengeExpired));
    assert!(node.sink.is_empty());

    let record = node.attendance.record(&outcome.proof_id).unwrap().unwrap();
    assert_eq!(record.status, AttendanceStatus::Expired);
    assert_eq!(record.error_kind, Some(ErrorKind::ChallengeExpired));
}

#[tokio::test]
async fn test_abandoned_pending_record_is_swept() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [4u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    let mut challenge = node.attendance.issue_challenge("org-a", None).unwrap();
    challenge.challenge_id = "ch-abandoned".to_string();
    challenge.issued_at_ms = now_ms() - 600_000;
    node.attendance.store().insert_challenge(&challenge).unwrap();

    let submission = node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn);
    let pending = AttendanceRecord::pending(
        "p-abandoned".to_string(),
        scholar.scholar_id.clone(),
        BiometricType::Face,
        AttendanceType::CheckIn,
        &challenge,
        submission.proof,
        submission.public_inputs,
        challenge.issued_at_ms + 1_000,
    );
    node.attendance.store().insert_record(&pending).unwrap();

    assert_eq!(node.attendance.sweep_expired().unwrap(), 1);
    assert_eq!(node.attendance.sweep_expired().unwrap(), 0);

    let record = node.attendance.record("p-abandoned").unwrap().unwrap();
    assert_eq!(record.status, AttendanceStatus::Expired);
    assert_eq!(record.error_kind, Some(ErrorKind::ChallengeExpired));
}

#[tokio::test]
async fn test_geofenced_challenge() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [5u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();
    let campus = Geofence::new(GeoCoordinate::new(12.9716, 77.5946).unwrap(), 150.0).unwrap();

    let spoofed_challenge = node
        .attendance
        .issue_challenge("org-a", Some(campus))
        .unwrap();
    let mut spoofed = node.prove(&scholar, &commitment, &spoofed_challenge, AttendanceType::CheckIn);
    spoofed.location = Some(DeviceLocation {
        coordinate: GeoCoordinate::new(12.9717, 77.5946).unwrap(),
        accuracy_m: 10.0,
        mocked: true,
    });
    let outcome = node.attendance.submit(spoofed).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Rejected);
    assert_eq!(outcome.error, Some(ErrorKind::LocationRejected));
    assert_eq!(node.events_of(SecurityEventType::LocationSpoofing), 1);

    let challenge = node
        .attendance
        .issue_challenge("org-a", Some(campus))
        .unwrap();
    let mut honest = node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn);
    honest.location = Some(DeviceLocation {
        coordinate: GeoCoordinate::new(12.9720, 77.5948).unwrap(),
        accuracy_m: 15.0,
        mocked: false,
    });
    let outcome = node.attendance.submit(honest).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Verified);
}

#[tokio::test]
async fn test_pipeline_verify_against_server_state() {
    let node = TestNode::new();
    let config = PramaanConfig::default();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [6u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();
    let (_, vk) = circuit_keys();
    let pipeline = VerificationPipeline::new(
        CommitmentEngine::new(&config.protocol),
        AttendanceVerifier::new(vk.clone()),
        LocationPolicy::new(&config.attendance),
    );

    let a = node.attendance.issue_challenge("org-a", None).unwrap();
    let b = node.attendance.issue_challenge("org-a", None).unwrap();
    let submission = node.prove(&scholar, &commitment, &a, AttendanceType::CheckIn);
    let enrollment = node
        .registry
        .active_enrollment("s-1", BiometricType::Face)
        .unwrap();

    let state_a = node.attendance.store().challenge(&a.challenge_id).unwrap().unwrap();
    let request = VerificationRequest {
        proof: &submission.proof,
        public_inputs: &submission.public_inputs,
        enrollment: enrollment.as_ref(),
        challenge: &state_a,
        attendance_type: AttendanceType::CheckIn,
        location: None,
        now_ms: now_ms(),
    };
    let bound = pipeline.verify(&request).unwrap();
    assert_eq!(bound.public_inputs, submission.public_inputs);
    assert_eq!(bound.window.organization_id, "org-a");

    // The same proof checked against challenge B
    let state_b = node.attendance.store().challenge(&b.challenge_id).unwrap().unwrap();
    let rejection = pipeline
        .verify(&VerificationRequest {
            challenge: &state_b,
            ..request
        })
        .unwrap_err();
    assert_eq!(rejection.kind, ErrorKind::InvalidProof);

    // Past the TTL the freshness stage stops it before anything else
    let rejection = pipeline
        .verify(&VerificationRequest {
            now_ms: a.expires_at_ms() + 1,
            ..request
        })
        .unwrap_err();
    assert_eq!(rejection.status, AttendanceStatus::Expired);
}

#[tokio::test]
async fn test_admin_override_is_audited() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [7u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    let mut challenge = node.attendance.issue_challenge("org-a", None).unwrap();
    challenge.challenge_id = "ch-late".to_string();
    challenge.issued_at_ms = now_ms() - 180_000;
    node.attendance.store().insert_challenge(&challenge).unwrap();
    let outcome = node
        .attendance
        .submit(node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn))
        .await
        .unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Expired);

    let record = node
        .attendance
        .override_status(
            &outcome.proof_id,
            AttendanceStatus::Verified,
            "admin-1",
            "network outage at gate",
        )
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::Verified);
    assert_eq!(node.events_of(SecurityEventType::AdminOverride), 1);

    let overrides = node.attendance.overrides(&outcome.proof_id).unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].from_status, AttendanceStatus::Expired);
    assert_eq!(overrides[0].admin_id, "admin-1");

    let verified = node
        .attendance
        .records_for_organization("org-a", Some(AttendanceStatus::Verified), 10)
        .unwrap();
    assert_eq!(verified.len(), 1);
}
