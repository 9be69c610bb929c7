//! Challenge issuance.
//!
//! A challenge is a random 256-bit nonce with an issue time, a TTL and an
//! optional geofence, scoped to one organization. Challenges are persisted
//! by the store and consumed at most once.

use pramaan_core::{Challenge, ChallengeConfig, Geofence};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::{AttendanceError, Result};

#[derive(Debug, Clone)]
pub struct ChallengeIssuer {
    ttl_ms: u64,
}

impl ChallengeIssuer {
    pub fn new(config: &ChallengeConfig) -> Self {
        Self {
            ttl_ms: config.ttl_ms(),
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn issue(
        &self,
        organization_id: &str,
        geofence: Option<Geofence>,
        now_ms: u64,
    ) -> Result<Challenge> {
        if organization_id.trim().is_empty() {
            return Err(AttendanceError::InvalidInput(
                "organization id is required".to_string(),
            ));
        }
        if let Some(fence) = &geofence {
            fence.validate()?;
        }

        let mut nonce = [0u8; 32];
        OsRng.fill_bytes(&mut nonce);

        let challenge = Challenge {
            challenge_id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            nonce,
            issued_at_ms: now_ms,
            ttl_ms: self.ttl_ms,
            geofence,
        };
        debug!(
            challenge_id = %challenge.challenge_id,
            organization_id = organization_id,
            "Issued attendance challenge"
        );
        Ok(challenge)
    }
}
