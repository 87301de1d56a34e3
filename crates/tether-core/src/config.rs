//! Configuration system for tether.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TETHER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/tether/config.toml
//!   3. ~/.config/tether/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub network: NetworkConfig,
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the control-channel listener binds to.
    pub bind_addr: String,
    /// WebSocket control-channel port.
    pub ws_port: u16,
    /// Path the WebSocket upgrade is served on.
    pub ws_path: String,
    /// Status API port. Always bound on 127.0.0.1.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Largest datagram a UDP session can receive.
    pub udp_recv_buffer: usize,
    /// Read buffer size for TCP sessions.
    pub tcp_read_buffer: usize,
    /// Reply frames buffered per control channel before the writer applies backpressure.
    pub outbound_frames: usize,
    /// TCP connect timeout in seconds. 0 = wait indefinitely.
    pub connect_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            ws_port: 8080,
            ws_path: "/".to_string(),
            api_port: 9081,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            udp_recv_buffer: 65_535,
            tcp_read_buffer: 16 * 1024,
            outbound_frames: 1024,
            connect_timeout_secs: 0,
        }
    }
}

impl RelaySettings {
    /// Connect timeout, if one is configured.
    pub fn connect_timeout(&self) -> Option<std::time::Duration> {
        (self.connect_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.connect_timeout_secs))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("tether")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TetherConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            TetherConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config document. Missing tables and keys fall back to defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TETHER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&TetherConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply TETHER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TETHER_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Some(p) = lookup("TETHER_NETWORK__WS_PORT").and_then(|v| v.parse().ok()) {
            self.network.ws_port = p;
        }
        if let Some(p) = lookup("TETHER_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(s) = lookup("TETHER_RELAY__CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.relay.connect_timeout_secs = s;
        }
    }
}
