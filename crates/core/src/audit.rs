//! Security audit sinks.
//!
//! The core never owns audit persistence. It hands every event to a
//! [`SecuritySink`] through a [`SecurityAuditor`], which always attempts
//! delivery and swallows sink failures after logging them.

use crate::error::{CoreError, Result};
use crate::event::{EventSeverity, SecurityEvent};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Destination for security events.
///
/// Implement this trait to forward events to a database, SIEM or message
/// bus owned by the embedding application.
pub trait SecuritySink: Send + Sync {
    /// Record one event.
    fn record(&self, event: &SecurityEvent) -> Result<()>;
}

/// Writes events as structured `tracing` records under `pramaan::security`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SecuritySink for TracingSink {
    fn record(&self, event: &SecurityEvent) -> Result<()> {
        let details = serde_json::to_string(&event.details)
            .map_err(|e| CoreError::Sink(e.to_string()))?;
        let scholar = event.scholar_id.as_deref().unwrap_or("-");
        let organization = event.organization_id.as_deref().unwrap_or("-");
        match event.severity {
            EventSeverity::Info => info!(
                target: "pramaan::security",
                event_id = %event.event_id,
                event_type = %event.event_type,
                severity = %event.severity,
                scholar_id = scholar,
                organization_id = organization,
                details = %details,
                "{}", event.message
            ),
            EventSeverity::Warning => warn!(
                target: "pramaan::security",
                event_id = %event.event_id,
                event_type = %event.event_type,
                severity = %event.severity,
                scholar_id = scholar,
                organization_id = organization,
                details = %details,
                "{}", event.message
            ),
            EventSeverity::High | EventSeverity::Critical => error!(
                target: "pramaan::security",
                event_id = %event.event_id,
                event_type = %event.event_type,
                severity = %event.severity,
                scholar_id = scholar,
                organization_id = organization,
                details = %details,
                "{}", event.message
            ),
        }
        Ok(())
    }
}

/// Keeps events in memory. Used by tests and by embedders that poll.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event, oldest first.
    pub fn events(&self) -> Vec<SecurityEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecuritySink for MemorySink {
    fn record(&self, event: &SecurityEvent) -> Result<()> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| CoreError::Sink("memory sink poisoned".to_string()))?;
        guard.push(event.clone());
        Ok(())
    }
}

/// Delivers each event to every inner sink. Reports the first failure after
/// attempting all of them.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SecuritySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn SecuritySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl SecuritySink for FanoutSink {
    fn record(&self, event: &SecurityEvent) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Cloneable handle the protocol components emit through.
#[derive(Clone)]
pub struct SecurityAuditor {
    sink: Arc<dyn SecuritySink>,
}

impl SecurityAuditor {
    pub fn new(sink: Arc<dyn SecuritySink>) -> Self {
        Self { sink }
    }

    /// Auditor backed by [`TracingSink`].
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Deliver an event. Failures are logged and never propagated.
    pub fn emit(&self, event: SecurityEvent) {
        if let Err(e) = self.sink.record(&event) {
            warn!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                error = %e,
                "Security sink failed to record event"
            );
        }
    }
}

impl Default for SecurityAuditor {
    fn default() -> Self {
        Self::tracing()
    }
}

impl std::fmt::Debug for SecurityAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityAuditor").finish_non_exhaustive()
    }
}
