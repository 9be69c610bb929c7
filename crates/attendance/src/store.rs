//! SQLite persistence for challenges, session nullifiers and attendance
//! records.
//!
//! Single-use semantics are enforced by the database: a challenge is
//! consumed with a compare-and-swap on `consumed_at IS NULL`, and a session
//! nullifier is consumed by inserting into a table where it is the primary
//! key. Both happen in one transaction together with the record's
//! `pending -> verified` transition, so two racing submissions of the same
//! proof cannot both be recorded.

use pramaan_core::{AttendanceType, AttendanceWindow, BiometricType, Challenge, ErrorKind};
use pramaan_crypto::{SessionNullifier, SignedReceipt};
use rusqlite::{
    params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row, TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{AttendanceError, Result};
use crate::state::{AttendanceRecord, AttendanceStatus};

/// Stored challenge plus its consumption, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeState {
    pub challenge: Challenge,
    pub consumption: Option<Consumption>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consumption {
    pub proof_id: String,
    pub session_nullifier: SessionNullifier,
    pub consumed_at_ms: u64,
}

/// Everything the final atomic step writes.
#[derive(Debug)]
pub struct VerifiedCommit<'a> {
    pub proof_id: &'a str,
    pub challenge_id: &'a str,
    pub session_nullifier: &'a SessionNullifier,
    pub window: &'a AttendanceWindow,
    pub verified_at_ms: u64,
    pub receipt: &'a SignedReceipt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Another submission consumed the challenge first. `same_session` is
    /// set when it carried the same session nullifier, i.e. an exact replay.
    ChallengeConsumed { same_session: bool },
    /// The session nullifier was already consumed in this window
    SessionReplayed,
    /// The record left `pending` (swept to expired) during verification
    RecordNotPending,
}

/// One admin override audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub proof_id: String,
    pub from_status: AttendanceStatus,
    pub to_status: AttendanceStatus,
    pub admin_id: String,
    pub reason: String,
    pub overridden_at_ms: u64,
}

const RECORD_COLUMNS: &str = "proof_id, scholar_id, organization_id, biometric_type, \
     attendance_type, challenge_id, status, error_kind, proof, public_inputs, created_at, \
     challenge_expires_at, verified_at, receipt";

pub struct AttendanceStore {
    conn: Mutex<Connection>,
}

impl AttendanceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening attendance store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AttendanceError::Internal(format!("create attendance store dir: {}", e))
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS challenges (
                challenge_id TEXT PRIMARY KEY NOT NULL,
                organization_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                consumed_at INTEGER,
                consumed_by TEXT,
                consumed_session TEXT
            );

            CREATE TABLE IF NOT EXISTS session_nullifiers (
                session_nullifier TEXT PRIMARY KEY NOT NULL,
                organization_id TEXT NOT NULL,
                window_day INTEGER NOT NULL,
                attendance_type TEXT NOT NULL,
                proof_id TEXT NOT NULL,
                consumed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attendance_records (
                proof_id TEXT PRIMARY KEY NOT NULL,
                scholar_id TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                biometric_type TEXT NOT NULL,
                attendance_type TEXT NOT NULL,
                challenge_id TEXT NOT NULL,
                status TEXT NOT NULL,
                error_kind TEXT,
                proof TEXT NOT NULL,
                public_inputs TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                challenge_expires_at INTEGER NOT NULL,
                verified_at INTEGER,
                receipt TEXT,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_scholar_created
                ON attendance_records(scholar_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_records_org_status_created
                ON attendance_records(organization_id, status, created_at);
            CREATE INDEX IF NOT EXISTS idx_records_pending_expiry
                ON attendance_records(status, challenge_expires_at);

            CREATE TABLE IF NOT EXISTS record_overrides (
                override_id INTEGER PRIMARY KEY AUTOINCREMENT,
                proof_id TEXT NOT NULL,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                admin_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                overridden_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_overrides_proof
                ON record_overrides(proof_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AttendanceError::Internal("attendance store lock poisoned".to_string()))
    }

    pub fn insert_challenge(&self, challenge: &Challenge) -> Result<()> {
        let payload = serde_json::to_string(challenge)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO challenges (challenge_id, organization_id, payload, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                challenge.challenge_id,
                challenge.organization_id,
                payload,
                challenge.expires_at_ms() as i64,
            ],
        )?;
        Ok(())
    }

    pub fn challenge(&self, challenge_id: &str) -> Result<Option<ChallengeState>> {
        let conn = self.lock()?;
        let row: Option<(String, Option<i64>, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT payload, consumed_at, consumed_by, consumed_session \
                 FROM challenges WHERE challenge_id = ?1",
                params![challenge_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        drop(conn);

        let Some((payload, consumed_at, consumed_by, consumed_session)) = row else {
            return Ok(None);
        };
        let challenge: Challenge = serde_json::from_str(&payload)?;
        let consumption = match (consumed_at, consumed_by, consumed_session) {
            (Some(at), Some(proof_id), Some(session)) => Some(Consumption {
                proof_id,
                session_nullifier: SessionNullifier::from_hex(&session)?,
                consumed_at_ms: at as u64,
            }),
            _ => None,
        };
        Ok(Some(ChallengeState {
            challenge,
            consumption,
        }))
    }

    pub fn insert_record(&self, record: &AttendanceRecord) -> Result<()> {
        let proof = serde_json::to_string(&record.proof)?;
        let public_inputs = serde_json::to_string(&record.public_inputs)?;
        let receipt = record
            .receipt
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO attendance_records (
                proof_id, scholar_id, organization_id, biometric_type, attendance_type,
                challenge_id, status, error_kind, proof, public_inputs, created_at,
                challenge_expires_at, verified_at, receipt, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?11)
            "#,
            params![
                record.proof_id,
                record.scholar_id,
                record.organization_id,
                record.biometric_type.as_str(),
                record.attendance_type.as_str(),
                record.challenge_id,
                record.status.as_str(),
                record.error_kind.map(|k| k.as_str()),
                proof,
                public_inputs,
                record.created_at_ms as i64,
                record.challenge_expires_at_ms as i64,
                record.verified_at_ms.map(|t| t as i64),
                receipt,
            ],
        )?;
        Ok(())
    }

    /// Move a pending record to a failure state. Returns false when the
    /// record had already left `pending`.
    pub fn finish_record(
        &self,
        proof_id: &str,
        status: AttendanceStatus,
        kind: ErrorKind,
        now_ms: u64,
    ) -> Result<bool> {
        if !matches!(status, AttendanceStatus::Rejected | AttendanceStatus::Expired) {
            return Err(AttendanceError::InvalidTransition {
                from: AttendanceStatus::Pending,
                to: status,
            });
        }
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE attendance_records SET status = ?2, error_kind = ?3, updated_at = ?4 \
             WHERE proof_id = ?1 AND status = 'pending'",
            params![proof_id, status.as_str(), kind.as_str(), now_ms as i64],
        )?;
        Ok(changed == 1)
    }

    pub fn is_session_consumed(&self, session_nullifier: &SessionNullifier) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM session_nullifiers WHERE session_nullifier = ?1",
                params![session_nullifier.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Consume the challenge and the session nullifier and mark the record
    /// verified, all or nothing.
    pub fn commit_verified(&self, commit: &VerifiedCommit<'_>) -> Result<CommitOutcome> {
        let receipt = serde_json::to_string(commit.receipt)?;
        let session = commit.session_nullifier.to_hex();

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let claimed = tx.execute(
            "UPDATE challenges SET consumed_at = ?2, consumed_by = ?3, consumed_session = ?4 \
             WHERE challenge_id = ?1 AND consumed_at IS NULL",
            params![
                commit.challenge_id,
                commit.verified_at_ms as i64,
                commit.proof_id,
                session,
            ],
        )?;
        if claimed == 0 {
            let holder: Option<Option<String>> = tx
                .query_row(
                    "SELECT consumed_session FROM challenges WHERE challenge_id = ?1",
                    params![commit.challenge_id],
                    |row| row.get(0),
                )
                .optional()?;
            // Row gone: the challenge lapsed and was purged mid-verification
            let Some(holder) = holder else {
                return Ok(CommitOutcome::RecordNotPending);
            };
            let same_session = holder.as_deref() == Some(session.as_str());
            return Ok(CommitOutcome::ChallengeConsumed { same_session });
        }

        let inserted = tx.execute(
            "INSERT INTO session_nullifiers (\
                session_nullifier, organization_id, window_day, attendance_type, proof_id, consumed_at\
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session,
                commit.window.organization_id,
                commit.window.day,
                commit.window.attendance_type.as_str(),
                commit.proof_id,
                commit.verified_at_ms as i64,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => return Ok(CommitOutcome::SessionReplayed),
            Err(e) => return Err(e.into()),
        }

        let updated = tx.execute(
            "UPDATE attendance_records \
             SET status = 'verified', verified_at = ?2, receipt = ?3, updated_at = ?2 \
             WHERE proof_id = ?1 AND status = 'pending'",
            params![commit.proof_id, commit.verified_at_ms as i64, receipt],
        )?;
        if updated == 0 {
            return Ok(CommitOutcome::RecordNotPending);
        }

        tx.commit()?;
        debug!(proof_id = commit.proof_id, "Attendance committed");
        Ok(CommitOutcome::Committed)
    }

    /// Fetch a record, expiring it first if its challenge lapsed while it
    /// was still pending.
    pub fn record(&self, proof_id: &str, now_ms: u64) -> Result<Option<AttendanceRecord>> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE attendance_records \
             SET status = 'expired', error_kind = 'challenge_expired', updated_at = ?2 \
             WHERE proof_id = ?1 AND status = 'pending' AND challenge_expires_at < ?2",
            params![proof_id, now_ms as i64],
        )?;
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE proof_id = ?1",
            RECORD_COLUMNS
        );
        let raw = conn
            .query_row(&sql, params![proof_id], RawRecord::from_row)
            .optional()?;
        drop(conn);
        raw.map(RawRecord::into_record).transpose()
    }

    /// Expire every pending record whose challenge lapsed, then drop lapsed
    /// challenges nobody consumed. Returns how many records moved.
    ///
    /// Consumed challenges stay so a later replay is still classified.
    pub fn sweep_expired(&self, now_ms: u64) -> Result<usize> {
        let conn = self.lock()?;
        let expired = Self::sweep_locked(&conn, now_ms)?;
        let purged = conn.execute(
            "DELETE FROM challenges WHERE consumed_at IS NULL AND expires_at < ?1",
            params![now_ms as i64],
        )?;
        if purged > 0 {
            debug!(purged = purged, "Purged lapsed challenges");
        }
        Ok(expired)
    }

    fn sweep_locked(conn: &Connection, now_ms: u64) -> Result<usize> {
        let expired = conn.execute(
            "UPDATE attendance_records \
             SET status = 'expired', error_kind = 'challenge_expired', updated_at = ?1 \
             WHERE status = 'pending' AND challenge_expires_at < ?1",
            params![now_ms as i64],
        )?;
        Ok(expired)
    }

    /// Newest first.
    pub fn records_for_scholar(
        &self,
        scholar_id: &str,
        limit: usize,
        now_ms: u64,
    ) -> Result<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        Self::sweep_locked(&conn, now_ms)?;
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE scholar_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            RECORD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![scholar_id, limit as i64], RawRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Newest first, optionally filtered by status.
    pub fn records_for_organization(
        &self,
        organization_id: &str,
        status: Option<AttendanceStatus>,
        limit: usize,
        now_ms: u64,
    ) -> Result<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        Self::sweep_locked(&conn, now_ms)?;
        let sql = format!(
            "SELECT {} FROM attendance_records \
             WHERE organization_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3",
            RECORD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(
                params![organization_id, status.map(|s| s.as_str()), limit as i64],
                RawRecord::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Admin override of a terminal record, written together with its audit
    /// row. Returns the status the record had before.
    pub fn override_status(
        &self,
        proof_id: &str,
        to: AttendanceStatus,
        admin_id: &str,
        reason: &str,
        now_ms: u64,
    ) -> Result<AttendanceStatus> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM attendance_records WHERE proof_id = ?1",
                params![proof_id],
                |row| row.get(0),
            )
            .optional()?;
        let from = match current {
            Some(status) => AttendanceStatus::parse(&status)?,
            None => return Err(AttendanceError::RecordNotFound(proof_id.to_string())),
        };
        if !from.is_terminal() || !to.is_terminal() || from == to {
            return Err(AttendanceError::InvalidTransition { from, to });
        }

        tx.execute(
            "UPDATE attendance_records \
             SET status = ?2, updated_at = ?3, \
                 verified_at = CASE WHEN ?2 = 'verified' THEN COALESCE(verified_at, ?3) ELSE verified_at END \
             WHERE proof_id = ?1",
            params![proof_id, to.as_str(), now_ms as i64],
        )?;
        tx.execute(
            "INSERT INTO record_overrides \
             (proof_id, from_status, to_status, admin_id, reason, overridden_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                proof_id,
                from.as_str(),
                to.as_str(),
                admin_id,
                reason,
                now_ms as i64
            ],
        )?;
        tx.commit()?;
        Ok(from)
    }

    pub fn overrides(&self, proof_id: &str) -> Result<Vec<OverrideEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT proof_id, from_status, to_status, admin_id, reason, overridden_at \
             FROM record_overrides WHERE proof_id = ?1 ORDER BY override_id",
        )?;
        let rows = stmt
            .query_map(params![proof_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(proof_id, from, to, admin_id, reason, at)| {
                Ok(OverrideEntry {
                    proof_id,
                    from_status: AttendanceStatus::parse(&from)?,
                    to_status: AttendanceStatus::parse(&to)?,
                    admin_id,
                    reason,
                    overridden_at_ms: at as u64,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for AttendanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceStore").finish_non_exhaustive()
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

struct RawRecord {
    proof_id: String,
    scholar_id: String,
    organization_id: String,
    biometric_type: String,
    attendance_type: String,
    challenge_id: String,
    status: String,
    error_kind: Option<String>,
    proof: String,
    public_inputs: String,
    created_at: i64,
    challenge_expires_at: i64,
    verified_at: Option<i64>,
    receipt: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            proof_id: row.get(0)?,
            scholar_id: row.get(1)?,
            organization_id: row.get(2)?,
            biometric_type: row.get(3)?,
            attendance_type: row.get(4)?,
            challenge_id: row.get(5)?,
            status: row.get(6)?,
            error_kind: row.get(7)?,
            proof: row.get(8)?,
            public_inputs: row.get(9)?,
            created_at: row.get(10)?,
            challenge_expires_at: row.get(11)?,
            verified_at: row.get(12)?,
            receipt: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<AttendanceRecord> {
        let error_kind = match self.error_kind {
            Some(kind) => Some(ErrorKind::parse(&kind).ok_or_else(|| {
                AttendanceError::Internal(format!("corrupt error kind: {}", kind))
            })?),
            None => None,
        };
        let receipt = self
            .receipt
            .as_deref()
            .map(serde_json::from_str::<SignedReceipt>)
            .transpose()?;
        Ok(AttendanceRecord {
            proof_id: self.proof_id,
            scholar_id: self.scholar_id,
            organization_id: self.organization_id,
            biometric_type: BiometricType::parse(&self.biometric_type)?,
            attendance_type: AttendanceType::parse(&self.attendance_type)?,
            challenge_id: self.challenge_id,
            status: AttendanceStatus::parse(&self.status)?,
            error_kind,
            proof: serde_json::from_str(&self.proof)?,
            public_inputs: serde_json::from_str(&self.public_inputs)?,
            created_at_ms: self.created_at as u64,
            challenge_expires_at_ms: self.challenge_expires_at as u64,
            verified_at_ms: self.verified_at.map(|t| t as u64),
            receipt,
        })
    }
}
