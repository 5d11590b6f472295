//! Configuration management for metrics-sidecar
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section is optional; an empty file yields the defaults (RPC on
//! port 50051, scrape endpoint on port 8080, 3 second RPC deadline).

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Longest deadline accepted for a single RPC, in milliseconds
pub const MAX_DEADLINE_MS: u64 = 60_000;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exposition: ExpositionConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// RPC listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_rpc_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_rpc_port(),
        }
    }
}

/// Scrape listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpositionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_exposition_port")]
    pub port: u16,
    #[serde(default = "default_exposition_path")]
    pub path: String,
}

impl Default for ExpositionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_exposition_port(),
            path: default_exposition_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_rpc_port() -> u16 {
    50051
}

fn default_exposition_port() -> u16 {
    8080
}

fn default_exposition_path() -> String {
    "/metrics".to_string()
}

/// RPC call limits
///
/// # Custom Deserialization
///
/// `deadline_ms` is range-checked while parsing, so an out-of-range
/// deadline never exists as a `RpcConfig` value.
#[derive(Debug, Clone, Serialize)]
pub struct RpcConfig {
    deadline_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
        }
    }
}

fn default_deadline_ms() -> u64 {
    3000
}

impl RpcConfig {
    /// Create an RpcConfig with a validated deadline
    ///
    /// # Errors
    ///
    /// Returns an error if `deadline_ms` is zero or exceeds [`MAX_DEADLINE_MS`].
    pub fn new(deadline_ms: u64) -> AppResult<Self> {
        if deadline_ms == 0 {
            return Err(AppError::Config(
                "rpc.deadline_ms must be greater than 0".to_string(),
            ));
        }
        if deadline_ms > MAX_DEADLINE_MS {
            return Err(AppError::Config(format!(
                "rpc.deadline_ms cannot exceed {} (60 seconds), got {}",
                MAX_DEADLINE_MS, deadline_ms
            )));
        }
        Ok(Self { deadline_ms })
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl<'de> Deserialize<'de> for RpcConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};
        use std::fmt;

        #[derive(Deserialize)]
        #[serde(field_identifier, rename_all = "snake_case")]
        enum Field {
            DeadlineMs,
        }

        struct RpcConfigVisitor;

        impl<'de> Visitor<'de> for RpcConfigVisitor {
            type Value = RpcConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a struct with an optional deadline_ms field")
            }

            fn visit_map<V>(self, mut map: V) -> Result<RpcConfig, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut deadline_ms = None;

                while let Some(key) = map.next_key()? {
                    match key {
                        Field::DeadlineMs => {
                            if deadline_ms.is_some() {
                                return Err(de::Error::duplicate_field("deadline_ms"));
                            }
                            deadline_ms = Some(map.next_value()?);
                        }
                    }
                }

                RpcConfig::new(deadline_ms.unwrap_or_else(default_deadline_ms))
                    .map_err(|e| de::Error::custom(format!("Invalid rpc configuration: {}", e)))
            }
        }

        deserializer.deserialize_struct("RpcConfig", &["deadline_ms"], RpcConfigVisitor)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display.clone(),
            source,
        })?;

        // Phase 3: Validate parsed config
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    ///
    /// Only a missing file falls back; unreadable or invalid files are
    /// still errors.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        let server_ip = parse_host("server.host", &self.server.host)?;
        let exposition_ip = parse_host("exposition.host", &self.exposition.host)?;

        if self.server.port == self.exposition.port
            && self.server.port != 0
            && (server_ip == exposition_ip
                || server_ip.is_unspecified()
                || exposition_ip.is_unspecified())
        {
            return Err(AppError::Config(format!(
                "server.port and exposition.port must differ, both are {}",
                self.server.port
            )));
        }

        if !self.exposition.path.starts_with('/') {
            return Err(AppError::Config(format!(
                "exposition.path must start with '/', got '{}'",
                self.exposition.path
            )));
        }

        if self.observability.log_level.trim().is_empty() {
            return Err(AppError::Config(
                "observability.log_level must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Socket address of the RPC listener
    pub fn server_addr(&self) -> AppResult<SocketAddr> {
        let ip = parse_host("server.host", &self.server.host)?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Socket address of the scrape listener
    pub fn exposition_addr(&self) -> AppResult<SocketAddr> {
        let ip = parse_host("exposition.host", &self.exposition.host)?;
        Ok(SocketAddr::new(ip, self.exposition.port))
    }
}

fn parse_host(field: &str, host: &str) -> AppResult<IpAddr> {
    host.parse::<IpAddr>().map_err(|e| {
        AppError::Config(format!(
            "{} must be an IP address, got '{}': {}",
            field, host, e
        ))
    })
}
