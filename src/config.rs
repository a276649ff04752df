//! Server Configuration
//!
//! Values come from defaults, then an optional TOML file, then CLI flags and
//! environment variables.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::DEFAULT_RECORD_TTL;

/// Main configuration for the DNS server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // === Storage ===

    /// JSON file holding the record store
    pub records_file: PathBuf,

    /// HTML page served at `GET /`
    pub index_file: PathBuf,

    // === Network ===

    /// Address both listeners bind to
    pub bind_address: IpAddr,

    /// Port for DNS queries (UDP)
    pub dns_port: u16,

    /// Port for the administrative HTTP API
    pub api_port: u16,

    // === Resolution ===

    /// Names ending in this suffix are forwarded upstream with the suffix removed.
    /// Forwarding is disabled when unset.
    pub forward_suffix: Option<String>,

    /// Upper bound on a single upstream lookup (seconds)
    pub upstream_timeout_secs: u64,

    /// TTL of every answer record (seconds)
    pub record_ttl_secs: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            records_file: PathBuf::from("data.json"),
            index_file: PathBuf::from("index.html"),
            bind_address: IpAddr::from([0, 0, 0, 0]),
            dns_port: 53, // Requires root or CAP_NET_BIND_SERVICE
            api_port: 3000,
            forward_suffix: None,
            upstream_timeout_secs: 5,
            record_ttl_secs: DEFAULT_RECORD_TTL,
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_records_file(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.records_file = path;
        }
        self
    }

    pub fn with_index_file(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.index_file = path;
        }
        self
    }

    pub fn with_dns_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.dns_port = port;
        }
        self
    }

    pub fn with_api_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.api_port = port;
        }
        self
    }

    pub fn with_forward_suffix(mut self, suffix: Option<String>) -> Self {
        if suffix.is_some() {
            self.forward_suffix = suffix;
        }
        self
    }

    /// Normalize and validate configuration values
    pub fn validate(mut self) -> anyhow::Result<Self> {
        if self.forward_suffix.as_deref() == Some("") {
            self.forward_suffix = None;
        }

        if self.records_file.as_os_str().is_empty() {
            anyhow::bail!("records_file must not be empty");
        }

        if self.upstream_timeout_secs == 0 {
            anyhow::bail!("upstream_timeout_secs must be greater than 0");
        }

        if self.record_ttl_secs == 0 {
            anyhow::bail!("record_ttl_secs must be greater than 0");
        }

        Ok(self)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
