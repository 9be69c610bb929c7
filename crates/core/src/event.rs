//! Security event schema.
//!
//! Every security-relevant protocol outcome (duplicate enrollment attempts,
//! replays, invalid proofs, location spoofing, admin overrides) is described
//! by a [`SecurityEvent`] and handed to a [`crate::audit::SecuritySink`].
//! Events never carry biometric material or salts.

use crate::error::ErrorKind;
use crate::types::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Severity level for security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    High,
    Critical,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::High => "high",
            EventSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    DuplicateBiometric,
    CommitmentMismatch,
    InvalidProof,
    ReplayDetected,
    LocationSpoofing,
    SuspiciousActivity,
    AdminOverride,
    BiometricRevoked,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::DuplicateBiometric => "duplicate_biometric",
            SecurityEventType::CommitmentMismatch => "commitment_mismatch",
            SecurityEventType::InvalidProof => "invalid_proof",
            SecurityEventType::ReplayDetected => "replay_detected",
            SecurityEventType::LocationSpoofing => "location_spoofing",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
            SecurityEventType::AdminOverride => "admin_override",
            SecurityEventType::BiometricRevoked => "biometric_revoked",
        }
    }

    /// Default severity. Replays are escalated above plain proof failures.
    pub fn default_severity(&self) -> EventSeverity {
        match self {
            SecurityEventType::DuplicateBiometric => EventSeverity::High,
            SecurityEventType::CommitmentMismatch => EventSeverity::High,
            SecurityEventType::InvalidProof => EventSeverity::High,
            SecurityEventType::ReplayDetected => EventSeverity::Critical,
            SecurityEventType::LocationSpoofing => EventSeverity::High,
            SecurityEventType::SuspiciousActivity => EventSeverity::Critical,
            SecurityEventType::AdminOverride => EventSeverity::Warning,
            SecurityEventType::BiometricRevoked => EventSeverity::Info,
        }
    }

    /// Event type for a failure kind, if that kind is a security event.
    pub fn for_kind(kind: ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::DuplicateBiometric => Some(SecurityEventType::DuplicateBiometric),
            ErrorKind::CommitmentMismatch => Some(SecurityEventType::CommitmentMismatch),
            ErrorKind::InvalidProof => Some(SecurityEventType::InvalidProof),
            ErrorKind::ReplayDetected => Some(SecurityEventType::ReplayDetected),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured security event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: String,
    pub event_type: SecurityEventType,
    pub severity: EventSeverity,
    /// Unix epoch milliseconds
    pub timestamp: u64,
    pub scholar_id: Option<String>,
    pub organization_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

/// Builder for [`SecurityEvent`].
pub struct SecurityEventBuilder {
    event: SecurityEvent,
}

impl SecurityEventBuilder {
    pub fn new(event_type: SecurityEventType) -> Self {
        Self {
            event: SecurityEvent {
                event_id: uuid::Uuid::new_v4().to_string(),
                event_type,
                severity: event_type.default_severity(),
                timestamp: now_ms(),
                scholar_id: None,
                organization_id: None,
                message: String::new(),
                details: HashMap::new(),
            },
        }
    }

    pub fn severity(mut self, severity: EventSeverity) -> Self {
        self.event.severity = severity;
        self
    }

    pub fn scholar(mut self, scholar_id: impl Into<String>) -> Self {
        self.event.scholar_id = Some(scholar_id.into());
        self
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.event.organization_id = Some(organization_id.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.event.message = message.into();
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.event.details.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    pub fn build(self) -> SecurityEvent {
        self.event
    }
}
