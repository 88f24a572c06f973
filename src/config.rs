//! Configuration types for vcr-proxy

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ProxyError, Result};

/// Path of the legacy control-protocol endpoint matched with the relaxed strategy
pub const LEGACY_PROTOCOL_ROUTE: &str = "/node_agent2/node_agent";

/// Operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward unseen requests, record them, replay everything else
    #[default]
    Record,
    /// Serve from the cassette only, never touch the network
    Replay,
}

impl Mode {
    /// Check if mode is Replay
    #[must_use]
    pub fn is_replay(&self) -> bool {
        matches!(self, Mode::Replay)
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode
    #[serde(default)]
    pub mode: Mode,
    /// Port the proxy listens on
    pub listen_port: u16,
    /// Directory holding the cassette file
    #[serde(default = "default_cassette_dir")]
    pub cassette_dir: PathBuf,
    /// File name prefix of cassette files
    #[serde(default = "default_cassette_prefix")]
    pub cassette_prefix: String,
    /// Age in days after which the cassette is discarded
    #[serde(default = "default_refresh_cache_days")]
    pub refresh_cache_days: i64,
    /// Externally visible base URL of the proxy, used when rewriting service definitions.
    /// Defaults to `http://localhost:<listen_port>`.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Optional timeout for upstream calls
    #[serde(default)]
    pub upstream_timeout_secs: Option<u64>,
    /// Routes whose POST calls use the legacy-protocol matcher
    #[serde(default = "default_legacy_routes")]
    pub legacy_protocol_routes: Vec<String>,
    /// Inbound path to real upstream base URL
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_cassette_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_cassette_prefix() -> String {
    "test_server_recordings".to_string()
}

fn default_refresh_cache_days() -> i64 {
    1
}

fn default_legacy_routes() -> Vec<String> {
    vec![LEGACY_PROTOCOL_ROUTE.to_string()]
}

/// Redaction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Request headers whose values are not written to the cassette
    #[serde(default)]
    pub request_headers: Vec<String>,
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Maximum request size in bytes
    pub max_request_size: usize,
    /// Maximum response size in bytes
    pub max_response_size: usize,
    /// Maximum headers per request
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 256,
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
            max_headers: 128,
        }
    }
}

impl Config {
    /// Minimal configuration with no routes, mostly useful in tests
    #[must_use]
    pub fn new(listen_port: u16, cassette_dir: PathBuf) -> Self {
        Self {
            mode: Mode::Record,
            listen_port,
            cassette_dir,
            cassette_prefix: default_cassette_prefix(),
            refresh_cache_days: default_refresh_cache_days(),
            public_base_url: None,
            upstream_timeout_secs: None,
            legacy_protocol_routes: default_legacy_routes(),
            routes: BTreeMap::new(),
            redaction: RedactionConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ProxyError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Base URL the proxy advertises in rewritten service definitions
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.listen_port))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(ProxyError::ConfigError(
                "listen_port cannot be 0".to_string(),
            ));
        }

        if self.cassette_prefix.is_empty() || self.cassette_prefix.contains(['/', '\\']) {
            return Err(ProxyError::ConfigError(format!(
                "Invalid cassette_prefix: {:?}",
                self.cassette_prefix
            )));
        }

        if self.refresh_cache_days < 0 {
            return Err(ProxyError::ConfigError(format!(
                "refresh_cache_days cannot be negative: {}",
                self.refresh_cache_days
            )));
        }

        for (path, host) in &self.routes {
            if !path.starts_with('/') {
                return Err(ProxyError::ConfigError(format!(
                    "Route {path:?} must start with '/'"
                )));
            }

            if !(host.starts_with("http://") || host.starts_with("https://")) {
                return Err(ProxyError::ConfigError(format!(
                    "Route {path:?}: upstream {host:?} must be an http(s) URL"
                )));
            }
        }

        if self.limits.max_connections == 0
            || self.limits.max_request_size == 0
            || self.limits.max_response_size == 0
            || self.limits.max_headers == 0
        {
            return Err(ProxyError::ConfigError(
                "Resource limits must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
