//! Core types for the Pramaan attendance-proof protocol.
//!
//! This crate provides the shared domain types, configuration, error
//! taxonomy and security event plumbing used by every other Pramaan crate.

pub mod audit;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod types;

pub use audit::{FanoutSink, MemorySink, SecurityAuditor, SecuritySink, TracingSink};
pub use config::{
    AttendanceConfig, ChallengeConfig, KeyConfig, LoggingConfig, PramaanConfig, ProtocolConfig,
    Secrets, ServerConfig, StorageConfig,
};
pub use error::{CoreError, ErrorKind, Result};
pub use event::{EventSeverity, SecurityEvent, SecurityEventBuilder, SecurityEventType};
pub use types::{
    now_ms, AttendanceType, AttendanceWindow, BiometricType, Challenge, DeviceLocation,
    GeoCoordinate, Geofence, TEMPLATE_HASH_LEN,
};
