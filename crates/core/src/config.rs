//! Configuration management for Pramaan.
//!
//! Non-secret settings are read from TOML. Key material is never stored in
//! the file; it is injected from the environment by [`PramaanConfig::secrets_from_env`].

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable carrying the hex-encoded 32-byte salt sealing key.
pub const SALT_SEALING_KEY_ENV: &str = "PRAMAAN_SALT_SEALING_KEY";

/// Environment variable carrying the hex-encoded 32-byte Ed25519 receipt seed.
pub const RECEIPT_SIGNING_KEY_ENV: &str = "PRAMAAN_RECEIPT_SIGNING_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PramaanConfig {
    pub protocol: ProtocolConfig,
    pub challenge: ChallengeConfig,
    pub attendance: AttendanceConfig,
    pub storage: StorageConfig,
    pub keys: KeyConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Parameters that client and server must agree on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Minimum salt entropy accepted by the commitment engine
    pub min_salt_bits: usize,
    /// Organization UTC offset used to bucket attendance into local days
    pub window_utc_offset_minutes: i32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_salt_bits: 256,
            window_utc_offset_minutes: 330,
        }
    }
}

impl ProtocolConfig {
    pub fn min_salt_bytes(&self) -> usize {
        self.min_salt_bits.div_ceil(8)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub ttl_secs: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self { ttl_secs: 120 }
    }
}

impl ChallengeConfig {
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_secs.saturating_mul(1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Reject submissions without a device location
    pub require_location: bool,
    /// Worst acceptable reported GPS accuracy
    pub max_accuracy_m: f64,
    /// Accuracy better than this is treated as a spoofing indicator
    pub suspicious_accuracy_m: f64,
    pub sweep_interval_secs: u64,
    /// Upper bound on concurrent Groth16 verifications
    pub max_concurrent_verifications: usize,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            require_location: false,
            max_accuracy_m: 50.0,
            suspicious_accuracy_m: 5.0,
            sweep_interval_secs: 30,
            max_concurrent_verifications: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub registry_path: PathBuf,
    pub attendance_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("data/registry.db"),
            attendance_path: PathBuf::from("data/attendance.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub verifying_key_path: PathBuf,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            verifying_key_path: PathBuf::from("keys/attendance.vk"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

/// Secret key material resolved once at startup.
#[derive(Clone)]
pub struct Secrets {
    pub salt_sealing_key: [u8; 32],
    pub receipt_signing_seed: [u8; 32],
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl PramaanConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PramaanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol.min_salt_bits < 128 {
            return Err(CoreError::Config(format!(
                "protocol.min_salt_bits must be at least 128, got {}",
                self.protocol.min_salt_bits
            )));
        }
        if !(-720..=840).contains(&self.protocol.window_utc_offset_minutes) {
            return Err(CoreError::Config(format!(
                "protocol.window_utc_offset_minutes out of range: {}",
                self.protocol.window_utc_offset_minutes
            )));
        }
        if self.challenge.ttl_secs == 0 {
            return Err(CoreError::Config(
                "challenge.ttl_secs must be positive".to_string(),
            ));
        }
        let att = &self.attendance;
        if !(att.max_accuracy_m > 0.0) || att.suspicious_accuracy_m < 0.0 {
            return Err(CoreError::Config(
                "attendance accuracy bounds must be positive".to_string(),
            ));
        }
        if att.suspicious_accuracy_m >= att.max_accuracy_m {
            return Err(CoreError::Config(
                "attendance.suspicious_accuracy_m must be below max_accuracy_m".to_string(),
            ));
        }
        if att.max_concurrent_verifications == 0 {
            return Err(CoreError::Config(
                "attendance.max_concurrent_verifications must be positive".to_string(),
            ));
        }
        if att.sweep_interval_secs == 0 {
            return Err(CoreError::Config(
                "attendance.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Read both secrets from the environment.
    pub fn secrets_from_env() -> Result<Secrets> {
        Ok(Secrets {
            salt_sealing_key: key_from_env(SALT_SEALING_KEY_ENV)?,
            receipt_signing_seed: key_from_env(RECEIPT_SIGNING_KEY_ENV)?,
        })
    }
}

fn key_from_env(name: &str) -> Result<[u8; 32]> {
    let value = std::env::var(name)
        .map_err(|_| CoreError::Config(format!("{} is not set", name)))?;
    parse_hex_key(name, value.trim())
}

/// Decode a 32-byte hex key, naming the source in errors but never the value.
pub fn parse_hex_key(name: &str, value: &str) -> Result<[u8; 32]> {
    let raw = hex::decode(value)
        .map_err(|_| CoreError::Config(format!("{} is not valid hex", name)))?;
    raw.try_into()
        .map_err(|_| CoreError::Config(format!("{} must be 32 bytes", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PramaanConfig::default();
        config.validate().unwrap();
        assert_eq!(config.challenge.ttl_ms(), 120_000);
        assert_eq!(config.protocol.min_salt_bytes(), 32);
        assert_eq!(config.protocol.window_utc_offset_minutes, 330);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = PramaanConfig::from_toml_str(
            r#"
            [challenge]
            ttl_secs = 60

            [attendance]
            require_location = true
            "#,
        )
        .unwrap();
        assert_eq!(config.challenge.ttl_secs, 60);
        assert!(config.attendance.require_location);
        assert_eq!(config.attendance.max_accuracy_m, 50.0);
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_validate_rejects_weak_salt_and_zero_ttl() {
        let weak = PramaanConfig::from_toml_str("[protocol]\nmin_salt_bits = 64\n");
        assert!(matches!(weak, Err(CoreError::Config(_))));

        let zero_ttl = PramaanConfig::from_toml_str("[challenge]\nttl_secs = 0\n");
        assert!(matches!(zero_ttl, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pramaan.toml");
        std::fs::write(&path, "[logging]\njson = true\n").unwrap();
        let config = PramaanConfig::from_file(&path).unwrap();
        assert!(config.logging.json);
    }

    #[test]
    fn test_parse_hex_key() {
        let key = parse_hex_key("K", &"ab".repeat(32)).unwrap();
        assert_eq!(key, [0xab; 32]);
        assert!(parse_hex_key("K", "abcd").is_err());
        let err = parse_hex_key("K", "zz").unwrap_err();
        assert!(!err.to_string().contains("zz"));
    }

    #[test]
    fn test_secrets_debug_redacts() {
        let secrets = Secrets {
            salt_sealing_key: [1; 32],
            receipt_signing_seed: [2; 32],
        };
        assert!(!format!("{:?}", secrets).contains("1, 1"));
    }
}
