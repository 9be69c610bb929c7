use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use pramaan_attendance::{AttendanceRecord, AttendanceStatus, Submission, SubmissionOutcome};
use pramaan_core::{now_ms, BiometricType, Challenge, Geofence};
use pramaan_crypto::Salt;
use pramaan_identity::{EnrollmentReceipt, EnrollmentRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{status_for, ApiError};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct EnrollBody {
    pub scholar_id: String,
    pub organization_id: String,
    pub biometric_type: BiometricType,
    /// Hex-encoded template hash computed on the device
    pub template_hash: String,
    /// Hex-encoded enrollment salt
    pub salt: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeBody {
    pub scholar_id: String,
    pub biometric_type: BiometricType,
    pub admin_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeBody {
    pub organization_id: String,
    #[serde(default)]
    pub geofence: Option<Geofence>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
    pub status: AttendanceStatus,
    pub admin_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<AttendanceStatus>,
    pub limit: Option<usize>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

/// Submission result on the wire. Rejections carry the generic message
/// for their kind.
#[derive(Debug, Serialize)]
pub struct SubmissionBody {
    #[serde(flatten)]
    pub outcome: SubmissionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pramaan-node",
        "version": env!("CARGO_PKG_VERSION"),
        "verifying_key_id": state.verifying_key_id,
        "receipt_key_id": state.attendance.receipt_key_id(),
        "challenge_ttl_secs": state.config.challenge.ttl_secs,
        "timestamp_ms": now_ms(),
    }))
}

pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnrollBody>,
) -> Result<(StatusCode, Json<EnrollmentReceipt>), ApiError> {
    let template_hash = hex::decode(&body.template_hash)
        .map(Zeroizing::new)
        .map_err(|_| ApiError::bad_request())?;
    let salt = Salt::from_hex(&body.salt).map_err(|_| ApiError::bad_request())?;
    let request = EnrollmentRequest {
        scholar_id: body.scholar_id,
        organization_id: body.organization_id,
        biometric_type: body.biometric_type,
        template_hash,
        salt,
    };

    let service = state.enrollment.clone();
    let receipt = tokio::task::spawn_blocking(move || service.enroll(request)).await??;
    info!(
        scholar_id = %receipt.scholar_id,
        biometric_type = %receipt.biometric_type,
        "Enrollment registered"
    );
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RevokeBody>,
) -> Result<Json<Value>, ApiError> {
    let service = state.enrollment.clone();
    let entry = tokio::task::spawn_blocking(move || {
        service.revoke(
            &body.scholar_id,
            body.biometric_type,
            &body.admin_id,
            &body.reason,
        )
    })
    .await??;
    Ok(Json(json!({
        "scholar_id": entry.owner_scholar_id,
        "biometric_type": entry.biometric_type,
        "status": entry.status,
        "revoked_at_ms": entry.revoked_at_ms,
    })))
}

pub async fn issue_challenge(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChallengeBody>,
) -> Result<(StatusCode, Json<Challenge>), ApiError> {
    let challenge = state
        .attendance
        .issue_challenge(&body.organization_id, body.geofence)?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

pub async fn submit_attendance(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<Submission>,
) -> Result<Response, ApiError> {
    let outcome = state.attendance.submit(submission).await?;
    let (status, message) = match outcome.error {
        Some(kind) => {
            warn!(
                proof_id = %outcome.proof_id,
                status = %outcome.status,
                error_kind = %kind,
                "Attendance submission not accepted"
            );
            (status_for(kind), Some(kind.public_message()))
        }
        None => (StatusCode::OK, None),
    };
    Ok((status, Json(SubmissionBody { outcome, message })).into_response())
}

pub async fn get_attendance(
    State(state): State<Arc<AppState>>,
    Path(proof_id): Path<String>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    state
        .attendance
        .record(&proof_id)?
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

pub async fn override_attendance(
    State(state): State<Arc<AppState>>,
    Path(proof_id): Path<String>,
    Json(body): Json<OverrideBody>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let record = state.attendance.override_status(
        &proof_id,
        body.status,
        &body.admin_id,
        &body.reason,
    )?;
    Ok(Json(record))
}

pub async fn scholar_attendance(
    State(state): State<Arc<AppState>>,
    Path(scholar_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let records = state
        .attendance
        .records_for_scholar(&scholar_id, query.limit())?;
    Ok(Json(records))
}

pub async fn organization_attendance(
    State(state): State<Arc<AppState>>,
    Path(organization_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let records = state.attendance.records_for_organization(
        &organization_id,
        query.status,
        query.limit(),
    )?;
    Ok(Json(records))
}
