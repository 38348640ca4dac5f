//! Application configuration
//!
//! Loaded from TOML. Every section falls back to its defaults, so a
//! config file only needs the keys it changes.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::signaling::{CandidateSide, NegotiationConfig};

const CONFIG_FILE: &str = "fx-link.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub signaling: SignalingConfig,
    pub audio: AudioConfig,
    pub network: NetworkConfig,
    pub ui: UiConfig,
}

/// Exchange store and negotiation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub collection: String,
    /// Candidate sub-collection written by the offering side
    pub offer_candidates: String,
    /// Candidate sub-collection written by the answering side
    pub answer_candidates: String,
    /// Longest time a negotiation may stay in one state
    pub state_timeout_secs: u64,
    /// Age after which a session record is considered expired; 0 disables
    pub session_ttl_secs: u64,
    pub append_retries: u32,
    pub append_backoff_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            collection: SESSION_COLLECTION.to_string(),
            offer_candidates: CandidateSide::Offer.default_collection().to_string(),
            answer_candidates: CandidateSide::Answer.default_collection().to_string(),
            state_timeout_secs: 30,
            session_ttl_secs: 60 * 60,
            append_retries: 3,
            append_backoff_ms: 250,
        }
    }
}

impl SignalingConfig {
    pub fn negotiation(&self) -> NegotiationConfig {
        NegotiationConfig {
            state_timeout: Duration::from_secs(self.state_timeout_secs),
            session_ttl: (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs)),
            append_retries: self.append_retries,
            append_backoff: Duration::from_millis(self.append_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Ring buffer size in samples
    pub ring_capacity: usize,
    /// Samples pulled per render callback
    pub render_quantum: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            ring_capacity: RING_BUFFER_CAPACITY,
            render_quantum: RENDER_QUANTUM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub udp_port: u16,
    pub recv_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            udp_port: DEFAULT_UDP_PORT,
            recv_buffer_size: 4 * 1024 * 1024,
        }
    }
}

impl NetworkConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.udp_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid UDP address: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl UiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid HTTP address: {}", e)))
    }
}

impl AppConfig {
    /// Default config file location for this platform
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "fx-link", "fx-link").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from `path`, or from the platform default location
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => {
                debug!("No config directory available, using defaults");
                return Ok(Self::default());
            }
        };
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.signaling.collection, "calls1");
        assert_eq!(config.signaling.offer_candidates, "offerCandidates");
        assert_eq!(config.signaling.answer_candidates, "answerCandidates");
        assert_eq!(config.audio.ring_capacity, 512 * 1000);
        assert_eq!(config.network.udp_port, 41234);
        assert_eq!(
            config.signaling.negotiation().state_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [network]
            udp_port = 5000

            [signaling]
            session_ttl_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.network.udp_port, 5000);
        assert_eq!(config.network.bind_address, "0.0.0.0");
        assert_eq!(config.signaling.negotiation().session_ttl, None);
        assert_eq!(config.ui, UiConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.ui.http_port = 9090;
        config.signaling.state_timeout_secs = 5;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_default_and_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(AppConfig::load(Some(&missing)).unwrap(), AppConfig::default());

        let garbage = dir.path().join("bad.toml");
        std::fs::write(&garbage, "network = 5").unwrap();
        assert!(matches!(AppConfig::load(Some(&garbage)), Err(Error::Config(_))));
    }
}
