//! Replay, cross-challenge and double-submission attacks.

use crate::test_utils::*;
use pramaan_attendance::AttendanceStatus;
use pramaan_core::{AttendanceType, ErrorKind, SecurityEventType};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_identical_submissions_verify_once() {
    let node = Arc::new(TestNode::new());
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [1u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();
    let challenge = node.attendance.issue_challenge("org-a", None).unwrap();
    let submission = node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = node.attendance.clone();
            let submission = submission.clone();
            tokio::spawn(async move { service.submit(submission).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let verified = outcomes
        .iter()
        .filter(|o| o.status == AttendanceStatus::Verified)
        .count();
    assert_eq!(verified, 1);
    for outcome in outcomes.iter().filter(|o| o.status != AttendanceStatus::Verified) {
        assert_eq!(outcome.status, AttendanceStatus::Rejected);
        assert!(matches!(
            outcome.error,
            Some(ErrorKind::ReplayDetected) | Some(ErrorKind::ChallengeConsumed)
        ));
        assert!(outcome.receipt.is_none());
    }

    let records = node
        .attendance
        .records_for_organization("org-a", Some(AttendanceStatus::Verified), 50)
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_proof_for_challenge_a_rejected_on_challenge_b() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [2u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    let a = node.attendance.issue_challenge("org-a", None).unwrap();
    let b = node.attendance.issue_challenge("org-a", None).unwrap();
    let mut replayed = node.prove(&scholar, &commitment, &a, AttendanceType::CheckIn);
    replayed.challenge_id = b.challenge_id.clone();

    let outcome = node.attendance.submit(replayed).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Rejected);
    assert_eq!(outcome.error, Some(ErrorKind::InvalidProof));
    assert_eq!(node.events_of(SecurityEventType::InvalidProof), 1);

    // Neither challenge was consumed by the failed attempt
    for challenge in [&a, &b] {
        let state = node
            .attendance
            .store()
            .challenge(&challenge.challenge_id)
            .unwrap()
            .unwrap();
        assert!(state.consumption.is_none());
    }
}

#[tokio::test]
async fn test_proof_cannot_move_between_organizations() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [3u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    let home = node.attendance.issue_challenge("org-a", None).unwrap();
    let other = node.attendance.issue_challenge("org-b", None).unwrap();
    let mut moved = node.prove(&scholar, &commitment, &home, AttendanceType::CheckIn);
    moved.challenge_id = other.challenge_id.clone();

    let outcome = node.attendance.submit(moved).await.unwrap();
    assert_eq!(outcome.error, Some(ErrorKind::CommitmentMismatch));
}

#[tokio::test]
async fn test_scholar_cannot_check_into_foreign_organization() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [8u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();

    // An honestly generated proof against another tenant's challenge
    let foreign = node.attendance.issue_challenge("org-b", None).unwrap();
    let outcome = node
        .attendance
        .submit(node.prove(&scholar, &commitment, &foreign, AttendanceType::CheckIn))
        .await
        .unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Rejected);
    assert_eq!(outcome.error, Some(ErrorKind::CommitmentMismatch));
    assert!(outcome.receipt.is_none());

    let events: Vec<_> = node
        .sink
        .events()
        .into_iter()
        .filter(|e| e.event_type == SecurityEventType::CommitmentMismatch)
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].organization_id.as_deref(), Some("org-b"));

    let state = node
        .attendance
        .store()
        .challenge(&foreign.challenge_id)
        .unwrap()
        .unwrap();
    assert!(state.consumption.is_none());
    assert!(node
        .attendance
        .records_for_organization("org-b", Some(AttendanceStatus::Verified), 10)
        .unwrap()
        .is_empty());

    // The home organization still accepts the scholar
    let home = node.attendance.issue_challenge("org-a", None).unwrap();
    let outcome = node
        .attendance
        .submit(node.prove(&scholar, &commitment, &home, AttendanceType::CheckIn))
        .await
        .unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Verified);
}

#[tokio::test]
async fn test_stolen_proof_rejected_for_other_scholar() {
    let node = TestNode::new();
    let victim = TestScholar::new("s-1", "org-a", b"face-1", [4u8; 32]);
    let attacker = TestScholar::new("s-2", "org-a", b"face-2", [5u8; 32]);
    let victim_commitment = node.enroll(&victim).unwrap();
    let attacker_commitment = node.enroll(&attacker).unwrap();

    let challenge = node.attendance.issue_challenge("org-a", None).unwrap();
    let stolen = node.prove(&victim, &victim_commitment, &challenge, AttendanceType::CheckIn);

    // Claimed as the attacker with the victim's public inputs
    let mut as_attacker = stolen.clone();
    as_attacker.scholar_id = "s-2".to_string();
    let outcome = node.attendance.submit(as_attacker.clone()).await.unwrap();
    assert_eq!(outcome.error, Some(ErrorKind::CommitmentMismatch));

    // Public commitment swapped for the attacker's own
    as_attacker.public_inputs.commitment = attacker_commitment;
    let outcome = node.attendance.submit(as_attacker).await.unwrap();
    assert_eq!(outcome.error, Some(ErrorKind::InvalidProof));

    assert_eq!(node.events_of(SecurityEventType::CommitmentMismatch), 1);
    assert_eq!(node.events_of(SecurityEventType::InvalidProof), 1);

    // The victim's own submission still goes through
    let outcome = node.attendance.submit(stolen).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Verified);
}

#[tokio::test]
async fn test_tampered_proof_bytes_rejected() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [6u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();
    let challenge = node.attendance.issue_challenge("org-a", None).unwrap();

    let mut tampered = node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn);
    tampered.proof.proof_bytes[5] ^= 0x01;
    let outcome = node.attendance.submit(tampered).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Rejected);
    assert_eq!(outcome.error, Some(ErrorKind::InvalidProof));

    let mut truncated = node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn);
    truncated.proof.proof_bytes.truncate(64);
    let outcome = node.attendance.submit(truncated).await.unwrap();
    assert_eq!(outcome.error, Some(ErrorKind::InvalidInput));
}

#[tokio::test]
async fn test_revoked_enrollment_cannot_check_in() {
    let node = TestNode::new();
    let scholar = TestScholar::new("s-1", "org-a", b"face-1", [7u8; 32]);
    let commitment = node.enroll(&scholar).unwrap();
    let challenge = node.attendance.issue_challenge("org-a", None).unwrap();
    let submission = node.prove(&scholar, &commitment, &challenge, AttendanceType::CheckIn);

    node.enrollment
        .revoke("s-1", pramaan_core::BiometricType::Face, "admin-1", "device lost")
        .unwrap();

    let outcome = node.attendance.submit(submission).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Rejected);
    assert_eq!(outcome.error, Some(ErrorKind::NotEnrolled));
}
