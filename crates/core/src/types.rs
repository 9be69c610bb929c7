//! Shared domain types for the attendance-proof protocol.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of the client-side template hash that enters the protocol.
pub const TEMPLATE_HASH_LEN: usize = 32;

/// Milliseconds per calendar day, used for window bucketing.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Earth's mean radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Biometric modality of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricType {
    Face,
    Fingerprint,
    Iris,
    Voice,
}

impl BiometricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiometricType::Face => "face",
            BiometricType::Fingerprint => "fingerprint",
            BiometricType::Iris => "iris",
            BiometricType::Voice => "voice",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "face" => Ok(BiometricType::Face),
            "fingerprint" => Ok(BiometricType::Fingerprint),
            "iris" => Ok(BiometricType::Iris),
            "voice" => Ok(BiometricType::Voice),
            other => Err(CoreError::InvalidInput(format!(
                "unknown biometric type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for BiometricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an attendance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceType {
    CheckIn,
    CheckOut,
}

impl AttendanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceType::CheckIn => "check_in",
            AttendanceType::CheckOut => "check_out",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "check_in" => Ok(AttendanceType::CheckIn),
            "check_out" => Ok(AttendanceType::CheckOut),
            other => Err(CoreError::InvalidInput(format!(
                "unknown attendance type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AttendanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic coordinates (latitude, longitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl GeoCoordinate {
    /// Create a validated coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Check ranges. Deserialized coordinates bypass `new`, so boundary code
    /// calls this explicitly.
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoreError::InvalidInput(format!(
                "Latitude must be between -90 and 90, got {}",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoreError::InvalidInput(format!(
                "Longitude must be between -180 and 180, got {}",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Great-circle distance to another coordinate in meters (haversine).
    pub fn haversine_distance(&self, other: &GeoCoordinate) -> f64 {
        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// Circular area within which attendance is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: GeoCoordinate,
    pub radius_m: f64,
}

impl Geofence {
    pub fn new(center: GeoCoordinate, radius_m: f64) -> Result<Self> {
        let fence = Self { center, radius_m };
        fence.validate()?;
        Ok(fence)
    }

    pub fn validate(&self) -> Result<()> {
        self.center.validate()?;
        if !self.radius_m.is_finite() || self.radius_m <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "Geofence radius must be positive, got {}",
                self.radius_m
            )));
        }
        Ok(())
    }

    /// Distance from the fence centre to `point`.
    pub fn distance_to(&self, point: &GeoCoordinate) -> f64 {
        self.center.haversine_distance(point)
    }

    pub fn contains(&self, point: &GeoCoordinate) -> bool {
        self.distance_to(point) <= self.radius_m
    }

    /// Canonical text form folded into the challenge binding.
    pub fn token(&self) -> String {
        format!(
            "{:.7},{:.7},{:.2}",
            self.center.latitude, self.center.longitude, self.radius_m
        )
    }
}

/// Location reported by the scholar's device alongside a proof.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceLocation {
    pub coordinate: GeoCoordinate,
    /// Reported horizontal accuracy in meters
    pub accuracy_m: f64,
    /// Set by the device OS when a mock location provider is active
    #[serde(default)]
    pub mocked: bool,
}

/// Server-issued, single-use freshness token for one attendance submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub organization_id: String,
    #[serde(with = "serde_hex32")]
    pub nonce: [u8; 32],
    pub issued_at_ms: u64,
    pub ttl_ms: u64,
    pub geofence: Option<Geofence>,
}

impl Challenge {
    pub fn expires_at_ms(&self) -> u64 {
        self.issued_at_ms.saturating_add(self.ttl_ms)
    }

    /// A challenge is usable up to and including its expiry instant.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms()
    }

    /// Unambiguous byte encoding of every field the proof must be bound to.
    ///
    /// Variable-length fields are length-prefixed so no two distinct
    /// challenges share an encoding.
    pub fn binding_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        put_field(&mut out, self.challenge_id.as_bytes());
        put_field(&mut out, self.organization_id.as_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.issued_at_ms.to_be_bytes());
        out.extend_from_slice(&self.ttl_ms.to_be_bytes());
        match &self.geofence {
            Some(fence) => {
                out.push(1);
                put_field(&mut out, fence.token().as_bytes());
            }
            None => out.push(0),
        }
        out
    }
}

/// Attendance window a session nullifier is scoped to: one organization,
/// one organization-local calendar day, one attendance direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttendanceWindow {
    pub organization_id: String,
    /// Days since the Unix epoch in the organization's local time
    pub day: i64,
    pub attendance_type: AttendanceType,
}

impl AttendanceWindow {
    /// Window for a submission answering `challenge`. The day is taken from
    /// the challenge issue time so client and server agree on it.
    pub fn for_challenge(
        challenge: &Challenge,
        attendance_type: AttendanceType,
        utc_offset_minutes: i32,
    ) -> Self {
        let local_ms = challenge.issued_at_ms as i64 + i64::from(utc_offset_minutes) * 60_000;
        Self {
            organization_id: challenge.organization_id.clone(),
            day: local_ms.div_euclid(MS_PER_DAY),
            attendance_type,
        }
    }

    pub fn binding_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        put_field(&mut out, self.organization_id.as_bytes());
        out.extend_from_slice(&self.day.to_be_bytes());
        put_field(&mut out, self.attendance_type.as_str().as_bytes());
        out
    }
}

fn put_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Serde adapter for `[u8; 32]` as a lowercase hex string.
pub mod serde_hex32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let raw = hex::decode(text).map_err(D::Error::custom)?;
        raw.try_into()
            .map_err(|_| D::Error::custom("expected 32 bytes"))
    }
}
