//! Configuration handling for the multi-database MCP server.
//!
//! Process-level settings come from CLI arguments and environment variables.
//! Connection definitions live in a JSON file managed by [`ConfigManager`].

mod manager;

pub use manager::{ConfigFile, ConfigManager};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONFIG_PATH: &str = "config/database_config.json";
pub const DEFAULT_ERROR_LOG_PATH: &str = "./error_logs";

// Pool configuration defaults
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_MAX_OVERFLOW: u32 = 20;
pub const DEFAULT_POOL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POOL_RECYCLE_SECS: u64 = 3600;

/// Connection pool sizing.
///
/// Every field is optional; unset values fall back to the configuration
/// file's `default_settings` and then to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PoolOptions {
    /// Connections kept open while idle (default: 10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<u32>,
    /// Extra connections allowed above pool_size under load (default: 20)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_overflow: Option<u32>,
    /// Seconds to wait for a free connection before failing (default: 30)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_timeout: Option<u64>,
    /// Seconds after which a connection is replaced (default: 3600)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_recycle: Option<u64>,
}

impl PoolOptions {
    /// Pool options with every field set to the built-in default.
    pub fn builtin() -> Self {
        Self {
            pool_size: Some(DEFAULT_POOL_SIZE),
            max_overflow: Some(DEFAULT_MAX_OVERFLOW),
            pool_timeout: Some(DEFAULT_POOL_TIMEOUT_SECS),
            pool_recycle: Some(DEFAULT_POOL_RECYCLE_SECS),
        }
    }

    pub fn pool_size_or_default(&self) -> u32 {
        self.pool_size.unwrap_or(DEFAULT_POOL_SIZE)
    }

    pub fn max_overflow_or_default(&self) -> u32 {
        self.max_overflow.unwrap_or(DEFAULT_MAX_OVERFLOW)
    }

    pub fn pool_timeout_or_default(&self) -> u64 {
        self.pool_timeout.unwrap_or(DEFAULT_POOL_TIMEOUT_SECS)
    }

    pub fn pool_recycle_or_default(&self) -> u64 {
        self.pool_recycle.unwrap_or(DEFAULT_POOL_RECYCLE_SECS)
    }

    /// Upper bound on simultaneously open connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size_or_default()
            .saturating_add(self.max_overflow_or_default())
    }

    /// Fill unset fields from `defaults`.
    pub fn merged_with(&self, defaults: &PoolOptions) -> PoolOptions {
        PoolOptions {
            pool_size: self.pool_size.or(defaults.pool_size),
            max_overflow: self.max_overflow.or(defaults.max_overflow),
            pool_timeout: self.pool_timeout.or(defaults.pool_timeout),
            pool_recycle: self.pool_recycle.or(defaults.pool_recycle),
        }
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == Some(0) {
            return Err("pool_size must be greater than 0".to_string());
        }
        if self.pool_timeout == Some(0) {
            return Err("pool_timeout must be greater than 0".to_string());
        }
        if self.pool_recycle == Some(0) {
            return Err("pool_recycle must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the multi-database MCP server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "multidb-mcp-server",
    about = "MCP server for managing connections, tables and data across MySQL, Oracle, PostgreSQL, SQLite and SQL Server",
    version,
    author
)]
pub struct Config {
    /// Path of the JSON file holding connection definitions
    #[arg(
        short,
        long = "config",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH,
        env = "DATABASE_CONFIG_PATH"
    )]
    pub config_path: PathBuf,

    /// Directory receiving one JSON file per failed operation
    #[arg(
        long = "error-log-path",
        value_name = "DIR",
        default_value = DEFAULT_ERROR_LOG_PATH,
        env = "ERROR_LOG_PATH"
    )]
    pub error_log_path: PathBuf,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Statement timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "MCP_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            error_log_path: PathBuf::from(DEFAULT_ERROR_LOG_PATH),
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the statement timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.config_path, PathBuf::from("config/database_config.json"));
        assert_eq!(config.error_log_path, PathBuf::from("./error_logs"));
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_parse_cli_arguments() {
        let config = Config::try_parse_from([
            "multidb-mcp-server",
            "--config",
            "/etc/db.json",
            "--error-log-path",
            "/var/log/db",
            "--transport",
            "http",
        ])
        .unwrap();
        assert_eq!(config.config_path, PathBuf::from("/etc/db.json"));
        assert_eq!(config.error_log_path, PathBuf::from("/var/log/db"));
        assert_eq!(config.transport, TransportMode::Http);
    }

    #[test]
    fn test_pool_options_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.pool_size_or_default(), 10);
        assert_eq!(opts.max_overflow_or_default(), 20);
        assert_eq!(opts.pool_timeout_or_default(), 30);
        assert_eq!(opts.pool_recycle_or_default(), 3600);
        assert_eq!(opts.max_connections(), 30);
    }

    #[test]
    fn test_pool_options_merge_prefers_own_values() {
        let own = PoolOptions {
            pool_size: Some(2),
            ..PoolOptions::default()
        };
        let defaults = PoolOptions {
            pool_size: Some(5),
            max_overflow: Some(1),
            ..PoolOptions::default()
        };
        let merged = own.merged_with(&defaults);
        assert_eq!(merged.pool_size, Some(2));
        assert_eq!(merged.max_overflow, Some(1));
        assert_eq!(merged.pool_timeout, None);
        assert_eq!(merged.max_connections(), 3);
    }

    #[test]
    fn test_pool_options_validation() {
        assert!(PoolOptions::builtin().validate().is_ok());
        let zero_size = PoolOptions {
            pool_size: Some(0),
            ..PoolOptions::default()
        };
        assert!(zero_size.validate().is_err());
        let zero_timeout = PoolOptions {
            pool_timeout: Some(0),
            ..PoolOptions::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_pool_options_flat_json() {
        let opts: PoolOptions =
            serde_json::from_str(r#"{"pool_size": 3, "pool_timeout": 5}"#).unwrap();
        assert_eq!(opts.pool_size, Some(3));
        assert_eq!(opts.pool_timeout, Some(5));
        assert_eq!(opts.max_overflow, None);
    }
}
