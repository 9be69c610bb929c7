//! Global Uniqueness Registry.
//!
//! SQLite-backed store of biometric commitments across every organization.
//! Uniqueness is enforced by the schema, never by read-then-write:
//!
//! - `commitment` is the primary key (one registration per biometric, globally)
//! - `nullifier` is unique (one enrollment per salt lineage)
//! - a partial unique index allows one *active* enrollment per
//!   (scholar, biometric type)
//!
//! Rows are never deleted. Revocation flips `status`, which keeps both the
//! commitment and the nullifier reserved forever.

use crate::error::{IdentityError, Result};
use pramaan_core::{
    now_ms, BiometricType, SecurityAuditor, SecurityEventBuilder, SecurityEventType,
};
use pramaan_crypto::{Commitment, Nullifier};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Rejected duplicate attempts after which an entry is flagged suspicious.
pub const SUSPICIOUS_ATTEMPT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Revoked,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Revoked => "revoked",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(EnrollmentStatus::Active),
            "revoked" => Ok(EnrollmentStatus::Revoked),
            other => Err(IdentityError::Internal(format!(
                "corrupt registry status: {}",
                other
            ))),
        }
    }
}

/// One registry row, without the sealed salt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub biometric_type: BiometricType,
    pub owner_scholar_id: String,
    pub organization_id: String,
    pub status: EnrollmentStatus,
    pub duplicate_attempts: u32,
    pub suspicious: bool,
    pub created_at_ms: u64,
    pub revoked_at_ms: Option<u64>,
}

impl RegistryEntry {
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub biometric_type: BiometricType,
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub owner_scholar_id: String,
    pub organization_id: String,
    /// Salt sealed under the server key with the commitment as AAD
    pub sealed_salt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub registered_at_ms: u64,
}

/// Read access to active enrollments, used by the attendance verifier.
pub trait CommitmentDirectory: Send + Sync {
    fn active_enrollment(
        &self,
        scholar_id: &str,
        biometric_type: BiometricType,
    ) -> Result<Option<RegistryEntry>>;
}

/// What an insert collided with.
enum Conflict {
    Commitment(EnrollmentStatus),
    Nullifier(EnrollmentStatus),
    ActiveOwner,
}

const ENTRY_COLUMNS: &str = "commitment, nullifier, biometric_type, owner_scholar_id, \
     organization_id, status, duplicate_attempts, suspicious, created_at, revoked_at";

pub struct BiometricRegistry {
    conn: Mutex<Connection>,
    auditor: SecurityAuditor,
}

impl BiometricRegistry {
    /// Create or open a registry database.
    pub fn open(path: impl AsRef<Path>, auditor: SecurityAuditor) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening biometric registry");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IdentityError::Internal(format!("create registry dir: {}", e)))?;
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
            auditor,
        })
    }

    /// Registry backed by a private in-memory database.
    pub fn open_in_memory(auditor: SecurityAuditor) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            auditor,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS biometric_registry (
                commitment TEXT PRIMARY KEY NOT NULL,
                nullifier TEXT NOT NULL UNIQUE,
                biometric_type TEXT NOT NULL,
                owner_scholar_id TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                sealed_salt BLOB NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                duplicate_attempts INTEGER NOT NULL DEFAULT 0,
                suspicious INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                revoked_at INTEGER,
                revoked_by TEXT,
                revoke_reason TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_registry_active_owner
                ON biometric_registry(owner_scholar_id, biometric_type)
                WHERE status = 'active';
            CREATE INDEX IF NOT EXISTS idx_registry_owner
                ON biometric_registry(owner_scholar_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IdentityError::Internal("registry lock poisoned".to_string()))
    }

    /// Register a commitment. The unique-constraint-backed insert is the
    /// existence check.
    pub fn register(&self, registration: NewRegistration) -> Result<RegistrationResult> {
        if registration.owner_scholar_id.is_empty() || registration.organization_id.is_empty() {
            return Err(IdentityError::InvalidInput(
                "scholar and organization ids must not be empty".to_string(),
            ));
        }
        if registration.sealed_salt.is_empty() {
            return Err(IdentityError::InvalidInput("sealed salt is empty".to_string()));
        }

        let registered_at_ms = now_ms();
        let conn = self.lock()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO biometric_registry (
                commitment, nullifier, biometric_type, owner_scholar_id,
                organization_id, sealed_salt, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)
            "#,
            params![
                registration.commitment.to_hex(),
                registration.nullifier.to_hex(),
                registration.biometric_type.as_str(),
                registration.owner_scholar_id,
                registration.organization_id,
                registration.sealed_salt,
                registered_at_ms as i64,
            ],
        );

        match inserted {
            Ok(_) => {
                drop(conn);
                info!(
                    scholar_id = %registration.owner_scholar_id,
                    organization_id = %registration.organization_id,
                    biometric_type = %registration.biometric_type,
                    "Biometric commitment registered"
                );
                Ok(RegistrationResult {
                    commitment: registration.commitment,
                    nullifier: registration.nullifier,
                    registered_at_ms,
                })
            }
            Err(err) if is_constraint_violation(&err) => {
                let conflict = Self::classify_conflict(&conn, &registration)?;
                match conflict {
                    Some(Conflict::Commitment(EnrollmentStatus::Active)) => {
                        let attempts =
                            Self::record_duplicate_attempt(&conn, &registration.commitment)?;
                        drop(conn);
                        self.report_duplicate(&registration, attempts);
                        Err(IdentityError::DuplicateBiometric)
                    }
                    Some(Conflict::Commitment(EnrollmentStatus::Revoked))
                    | Some(Conflict::Nullifier(EnrollmentStatus::Revoked)) => {
                        warn!(
                            scholar_id = %registration.owner_scholar_id,
                            "Registration attempted on a revoked lineage"
                        );
                        Err(IdentityError::RevokedLineage)
                    }
                    Some(Conflict::Nullifier(EnrollmentStatus::Active)) => {
                        Err(IdentityError::InvalidInput(
                            "salt is already bound to an enrollment".to_string(),
                        ))
                    }
                    Some(Conflict::ActiveOwner) => Err(IdentityError::AlreadyEnrolled {
                        biometric_type: registration.biometric_type.to_string(),
                    }),
                    None => Err(IdentityError::Database(err)),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn classify_conflict(
        conn: &Connection,
        registration: &NewRegistration,
    ) -> Result<Option<Conflict>> {
        let by_commitment: Option<String> = conn
            .query_row(
                "SELECT status FROM biometric_registry WHERE commitment = ?1",
                params![registration.commitment.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(status) = by_commitment {
            return Ok(Some(Conflict::Commitment(EnrollmentStatus::parse(&status)?)));
        }

        let by_nullifier: Option<String> = conn
            .query_row(
                "SELECT status FROM biometric_registry WHERE nullifier = ?1",
                params![registration.nullifier.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(status) = by_nullifier {
            return Ok(Some(Conflict::Nullifier(EnrollmentStatus::parse(&status)?)));
        }

        let active_owner: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM biometric_registry \
                 WHERE owner_scholar_id = ?1 AND biometric_type = ?2 AND status = 'active'",
                params![
                    registration.owner_scholar_id,
                    registration.biometric_type.as_str()
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(active_owner.map(|_| Conflict::ActiveOwner))
    }

    fn record_duplicate_attempt(conn: &Connection, commitment: &Commitment) -> Result<u32> {
        conn.execute(
            r#"
            UPDATE biometric_registry
            SET duplicate_attempts = duplicate_attempts + 1,
                suspicious = CASE WHEN duplicate_attempts + 1 >= ?2 THEN 1 ELSE suspicious END
            WHERE commitment = ?1
            "#,
            params![commitment.to_hex(), SUSPICIOUS_ATTEMPT_THRESHOLD as i64],
        )?;
        let attempts: i64 = conn.query_row(
            "SELECT duplicate_attempts FROM biometric_registry WHERE commitment = ?1",
            params![commitment.to_hex()],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    /// Audit a rejected duplicate. Details name the attempting party only.
    fn report_duplicate(&self, registration: &NewRegistration, attempts: u32) {
        self.auditor.emit(
            SecurityEventBuilder::new(SecurityEventType::DuplicateBiometric)
                .scholar(registration.owner_scholar_id.clone())
                .organization(registration.organization_id.clone())
                .message("Registration rejected: biometric already enrolled")
                .detail("biometric_type", registration.biometric_type.as_str())
                .detail("attempt", attempts)
                .build(),
        );
        if attempts == SUSPICIOUS_ATTEMPT_THRESHOLD {
            self.auditor.emit(
                SecurityEventBuilder::new(SecurityEventType::SuspiciousActivity)
                    .scholar(registration.owner_scholar_id.clone())
                    .organization(registration.organization_id.clone())
                    .message("Repeated duplicate enrollment attempts for one biometric")
                    .detail("biometric_type", registration.biometric_type.as_str())
                    .detail("attempts", attempts)
                    .build(),
            );
        }
    }

    /// Revoke an active enrollment. Idempotent for already-revoked entries.
    pub fn revoke(
        &self,
        commitment: &Commitment,
        revoked_by: &str,
        reason: &str,
    ) -> Result<RegistryEntry> {
        let now = now_ms();
        let entry = {
            let conn = self.lock()?;
            conn.execute(
                r#"
                UPDATE biometric_registry
                SET status = 'revoked', revoked_at = ?2, revoked_by = ?3, revoke_reason = ?4
                WHERE commitment = ?1 AND status = 'active'
                "#,
                params![commitment.to_hex(), now as i64, revoked_by, reason],
            )?;
            Self::get_internal(&conn, commitment)?
        };

        let entry = entry.ok_or_else(|| IdentityError::NotEnrolled {
            biometric_type: "any".to_string(),
        })?;

        info!(
            scholar_id = %entry.owner_scholar_id,
            biometric_type = %entry.biometric_type,
            revoked_by = revoked_by,
            "Biometric enrollment revoked"
        );
        self.auditor.emit(
            SecurityEventBuilder::new(SecurityEventType::BiometricRevoked)
                .scholar(entry.owner_scholar_id.clone())
                .organization(entry.organization_id.clone())
                .message("Biometric enrollment revoked")
                .detail("biometric_type", entry.biometric_type.as_str())
                .detail("revoked_by", revoked_by)
                .detail("reason", reason)
                .build(),
        );
        Ok(entry)
    }

    pub fn get(&self, commitment: &Commitment) -> Result<Option<RegistryEntry>> {
        let conn = self.lock()?;
        Self::get_internal(&conn, commitment)
    }

    fn get_internal(conn: &Connection, commitment: &Commitment) -> Result<Option<RegistryEntry>> {
        let sql = format!(
            "SELECT {} FROM biometric_registry WHERE commitment = ?1",
            ENTRY_COLUMNS
        );
        let raw = conn
            .query_row(&sql, params![commitment.to_hex()], RawEntry::from_row)
            .optional()?;
        raw.map(RawEntry::into_entry).transpose()
    }

    /// Sealed salt of the scholar's active enrollment of `biometric_type`.
    pub fn sealed_salt(
        &self,
        scholar_id: &str,
        biometric_type: BiometricType,
    ) -> Result<Option<(Commitment, Vec<u8>)>> {
        let conn = self.lock()?;
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT commitment, sealed_salt FROM biometric_registry \
                 WHERE owner_scholar_id = ?1 AND biometric_type = ?2 AND status = 'active'",
                params![scholar_id, biometric_type.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        drop(conn);
        match row {
            Some((commitment, sealed)) => Ok(Some((Commitment::from_hex(&commitment)?, sealed))),
            None => Ok(None),
        }
    }

    /// Every enrollment ever made by a scholar, newest first.
    pub fn history(&self, scholar_id: &str) -> Result<Vec<RegistryEntry>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM biometric_registry WHERE owner_scholar_id = ?1 \
             ORDER BY created_at DESC, rowid DESC",
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![scholar_id], RawEntry::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawEntry::into_entry).collect()
    }
}

impl CommitmentDirectory for BiometricRegistry {
    fn active_enrollment(
        &self,
        scholar_id: &str,
        biometric_type: BiometricType,
    ) -> Result<Option<RegistryEntry>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM biometric_registry \
             WHERE owner_scholar_id = ?1 AND biometric_type = ?2 AND status = 'active'",
            ENTRY_COLUMNS
        );
        let raw = conn
            .query_row(&sql, params![scholar_id, biometric_type.as_str()], RawEntry::from_row)
            .optional()?;
        debug!(scholar_id = scholar_id, found = raw.is_some(), "Active enrollment lookup");
        raw.map(RawEntry::into_entry).transpose()
    }
}

impl std::fmt::Debug for BiometricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiometricRegistry").finish_non_exhaustive()
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

struct RawEntry {
    commitment: String,
    nullifier: String,
    biometric_type: String,
    owner_scholar_id: String,
    organization_id: String,
    status: String,
    duplicate_attempts: i64,
    suspicious: bool,
    created_at: i64,
    revoked_at: Option<i64>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            commitment: row.get(0)?,
            nullifier: row.get(1)?,
            biometric_type: row.get(2)?,
            owner_scholar_id: row.get(3)?,
            organization_id: row.get(4)?,
            status: row.get(5)?,
            duplicate_attempts: row.get(6)?,
            suspicious: row.get(7)?,
            created_at: row.get(8)?,
            revoked_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<RegistryEntry> {
        Ok(RegistryEntry {
            commitment: Commitment::from_hex(&self.commitment)?,
            nullifier: Nullifier::from_hex(&self.nullifier)?,
            biometric_type: BiometricType::parse(&self.biometric_type)
                .map_err(|e| IdentityError::Internal(e.to_string()))?,
            owner_scholar_id: self.owner_scholar_id,
            organization_id: self.organization_id,
            status: EnrollmentStatus::parse(&self.status)?,
            duplicate_attempts: self.duplicate_attempts as u32,
            suspicious: self.suspicious,
            created_at_ms: self.created_at as u64,
            revoked_at_ms: self.revoked_at.map(|t| t as u64),
        })
    }
}
