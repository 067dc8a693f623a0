//! Configuration management for the Service Location daemon.
//!
//! This module provides the daemon's configuration system:
//! - Loading from YAML files
//! - Environment variable overrides (`SLPD__<SECTION>__<KEY>`)
//! - Validation of ports, scopes and preload blocks

use crate::error::{ConfigError, Result};
use crate::types::{ScopeSet, UrlEntry};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default port of the RPC control channel.
pub const DEFAULT_RPC_PORT: u16 = 9011;

/// Default port of the diagnostic HTTP endpoint.
pub const DEFAULT_HTTP_PORT: u16 = 9012;

/// Scope served when none is configured.
pub const DEFAULT_SCOPE: &str = "default";

/// Main daemon configuration.
///
/// # Examples
///
/// ```
/// use slpd_core::config::DaemonConfig;
///
/// let config = DaemonConfig::from_yaml("rpc:\n  port: 9100\n").unwrap();
/// assert_eq!(config.rpc.port, 9100);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// RPC control channel settings
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Diagnostic HTTP endpoint settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Discovery engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Debug console settings
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Entries bulk loaded into the engine at startup
    #[serde(default)]
    pub preload: Vec<PreloadBlock>,
}

impl DaemonConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidFormat {
            reason: e.to_string(),
        })
    }

    /// Loads configuration using the `config` crate: an optional YAML file
    /// followed by `SLPD__*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be loaded or the merged result
    /// does not deserialize.
    pub fn from_config_builder(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let source = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let config = builder
            .add_source(
                config::Environment::with_prefix("SLPD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: source,
                reason: e.to_string(),
            })?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::InvalidFormat {
                reason: e.to_string(),
            })
    }

    /// Validates the configuration.
    ///
    /// Checks for:
    /// - Distinct RPC and HTTP ports when diagnostics are enabled
    /// - At least one engine scope and a non-zero expiry interval
    /// - Well-formed preload blocks
    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.engine.validate()?;

        if self.http.enabled && self.rpc.port != 0 && self.rpc.port == self.http.port {
            return Err(ConfigError::invalid_value(
                "http.port",
                format!("Port {} is already used by the RPC listener", self.rpc.port),
            ));
        }

        for (index, block) in self.preload.iter().enumerate() {
            block.validate().map_err(|reason| {
                ConfigError::invalid_value(format!("preload[{}]", index), reason)
            })?;
        }

        self.logging.parse_level()?;
        Ok(())
    }
}

/// RPC control channel configuration.
///
/// The listener always binds the loopback interface; port 0 asks the OS for
/// an ephemeral port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Control port
    #[serde(default = "default_rpc_port")]
    pub port: u16,
}

fn default_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            port: default_rpc_port(),
        }
    }
}

impl RpcConfig {
    /// Returns the loopback address the control listener binds.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

/// Diagnostic HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whether the endpoint is started
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint port
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_http_port(),
        }
    }
}

impl HttpConfig {
    /// Validates the HTTP configuration.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.port == 0 {
            return Err(ConfigError::invalid_value("http.port", "Port cannot be 0"));
        }
        Ok(())
    }

    /// Returns the loopback address the endpoint binds.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

/// Discovery engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scopes this daemon accepts registrations for
    #[serde(default = "default_scopes")]
    pub scopes: ScopeSet,

    /// How often expired registrations are purged (seconds)
    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,
}

fn default_scopes() -> ScopeSet {
    [DEFAULT_SCOPE].into_iter().collect()
}

fn default_expiry_interval() -> u64 {
    15
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
            expiry_interval_secs: default_expiry_interval(),
        }
    }
}

impl EngineConfig {
    /// Validates the engine configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scopes.is_empty() {
            return Err(ConfigError::invalid_value(
                "engine.scopes",
                "At least one scope must be configured",
            ));
        }

        if self.scopes.iter().any(str::is_empty) {
            return Err(ConfigError::invalid_value(
                "engine.scopes",
                "Scope names cannot be empty",
            ));
        }

        if self.expiry_interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "engine.expiry_interval_secs",
                "Interval cannot be 0",
            ));
        }

        Ok(())
    }

    /// Returns the expiry interval as a Duration.
    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs)
    }
}

/// Debug console configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Read single-character commands from stdin
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include the event target
    #[serde(default)]
    pub targets: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            targets: false,
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid_value("logging.level", format!("Invalid log level: {}", self.level))
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

/// A set of URL entries bulk loaded into one scope at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadBlock {
    /// Scope the entries are loaded into
    pub scope: String,

    /// Service type of every entry
    pub service_type: String,

    /// The entries themselves
    #[serde(default)]
    pub entries: Vec<UrlEntry>,
}

impl PreloadBlock {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.scope.trim().is_empty() {
            return Err("scope cannot be empty".to_string());
        }
        if self.service_type.trim().is_empty() {
            return Err("service_type cannot be empty".to_string());
        }
        if let Some(entry) = self.entries.iter().find(|e| e.url().is_empty()) {
            return Err(format!("entry with lifetime {} has an empty url", entry.lifetime()));
        }
        Ok(())
    }
}
