//! Persistent application configuration
//!
//! Stores the default camera address, session timings, and the discovery
//! candidate lists in a JSON file at `<data_dir>/tsiken/config.json`.

use crate::locator::candidates::CandidateConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_server_url() -> String {
    crate::DEFAULT_SERVER_URL.to_string()
}

fn default_direct_timeout_ms() -> u64 {
    5000
}

fn default_discovery_timeout_ms() -> u64 {
    3000
}

/// Above the worst default pass: (3 peers x 2 + 2 hostnames + 13 batches) x 3 s
fn default_discovery_deadline_ms() -> u64 {
    90_000
}

fn default_telemetry_interval_ms() -> u64 {
    1000
}

fn default_telemetry_timeout_ms() -> u64 {
    3000
}

/// Timings used by [`StreamSession`](crate::StreamSession)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Probe timeout for the supplied and cached addresses
    #[serde(default = "default_direct_timeout_ms")]
    pub direct_timeout_ms: u64,
    /// Per-probe timeout handed to discovery
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// No new discovery step or sweep batch starts after this
    #[serde(default = "default_discovery_deadline_ms")]
    pub discovery_deadline_ms: u64,
    /// Telemetry poll period while connected
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
    /// Timeout for a single telemetry poll
    #[serde(default = "default_telemetry_timeout_ms")]
    pub telemetry_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            direct_timeout_ms: default_direct_timeout_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            discovery_deadline_ms: default_discovery_deadline_ms(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
            telemetry_timeout_ms: default_telemetry_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn discovery_deadline(&self) -> Duration {
        Duration::from_millis(self.discovery_deadline_ms)
    }

    /// Never zero; `tokio::time::interval` panics on a zero period
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms.max(1))
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address tried first when a session starts
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Key-value store path (None = platform default)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub candidates: CandidateConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            store_path: None,
            session: SessionConfig::default(),
            candidates: CandidateConfig::default(),
        }
    }
}

impl AppConfig {
    /// Config file path: `<data_dir>/tsiken/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tsiken")
            .join("config.json")
    }

    /// Load config from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server_url, "http://rpi5desktop.local:5000");
        assert_eq!(config.session.direct_timeout(), Duration::from_millis(5000));
        assert_eq!(config.session.discovery_timeout(), Duration::from_millis(3000));
        assert_eq!(config.session.telemetry_interval(), Duration::from_millis(1000));
        assert_eq!(config.candidates, CandidateConfig::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"server_url": "http://10.0.0.19:5000", "session": {"telemetry_interval_ms": 250}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_url, "http://10.0.0.19:5000");
        assert_eq!(config.session.telemetry_interval_ms, 250);
        assert_eq!(config.session.direct_timeout_ms, 5000);
        assert_eq!(config.candidates.port, 5000);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let session = SessionConfig {
            telemetry_interval_ms: 0,
            ..SessionConfig::default()
        };
        assert_eq!(session.telemetry_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsiken").join("config.json");

        let mut config = AppConfig::default();
        config.server_url = "http://192.168.43.19:5000".to_string();
        config.candidates.batch_size = 4;
        config.save(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "server_url = nope").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }
}
