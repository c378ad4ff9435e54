//! Bridge configuration, loaded from TOML.

use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{TopologyMode, DEFAULT_PROXY_LIGHT_MARKER};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8083;

/// What the host sends to the external renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// A framed JSON scene snapshot.
    #[default]
    Json,
    /// The resolution as plain `"<width> <height>"` text without a frame.
    /// Only understood by early renderer builds.
    LegacyResolution,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the listener binds to. The external renderer connects back to
    /// it.
    pub host: String,
    pub port: u16,
    /// Renderer to launch for each request. When unset the renderer is
    /// expected to be started by other means.
    pub renderer_executable: Option<PathBuf>,
    pub renderer_args: Vec<String>,
    /// How long to wait for the renderer to connect.
    pub accept_timeout_ms: u64,
    /// How long to wait for the renderer to finish sending its image after
    /// the snapshot was delivered.
    pub response_timeout_ms: u64,
    /// How often blocking socket operations wake up to check for
    /// cancellation.
    pub poll_interval_ms: u64,
    pub protocol: Protocol,
    pub topology: TopologyMode,
    pub proxy_light_marker: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            renderer_executable: None,
            renderer_args: Vec::new(),
            accept_timeout_ms: 30_000,
            response_timeout_ms: 300_000,
            poll_interval_ms: 20,
            protocol: Protocol::default(),
            topology: TopologyMode::default(),
            proxy_light_marker: DEFAULT_PROXY_LIGHT_MARKER.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be larger than zero".to_string(),
            ));
        }

        if self.proxy_light_marker.is_empty() {
            return Err(ConfigError::Invalid(
                "proxy_light_marker must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve `host:port` to the address to bind. IPv4 addresses are
    /// preferred because renderers connect to `localhost` over IPv4.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::Resolve(self.host.clone(), e.to_string()))?
            .collect();

        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ConfigError::Resolve(self.host.clone(), "no addresses".to_string()))
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Cannot resolve {0}: {1}")]
    Resolve(String, String),
}
