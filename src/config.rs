//! Configuration module for SHELF.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, ShelfError};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Whether to serve static files.
    #[serde(default)]
    pub serve_static: bool,
    /// Path to static files directory.
    #[serde(default = "default_static_path")]
    pub static_path: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_path() -> String {
    "web/dist".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            serve_static: false,
            static_path: default_static_path(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/shelf.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Upload and storage configuration.
///
/// These values are process defaults; the admin override store
/// ([`crate::db::SettingsRepository`]) is merged over them at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for uploaded files. Staging lives under `{root}/tmp`.
    #[serde(default = "default_upload_root")]
    pub upload_root: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Recommended chunk size in kilobytes (advertised to clients).
    #[serde(default = "default_chunk_size")]
    pub chunk_size_kb: u64,
    /// Expiration applied when the client does not request one, in minutes.
    #[serde(default = "default_expiration")]
    pub default_expiration_minutes: i64,
    /// Ceiling for client-requested expirations, in minutes.
    #[serde(default = "default_max_expiration")]
    pub max_expiration_minutes: i64,
    /// Minimum hours between empty-directory sweeps. 0 disables the sweep.
    #[serde(default = "default_cleanup_cooldown")]
    pub directory_cleanup_cooldown_hours: i64,
    /// Hours before an incomplete upload's staging directory is discarded.
    /// 0 disables the staging sweep.
    #[serde(default = "default_staging_ttl")]
    pub staging_ttl_hours: i64,
}

fn default_upload_root() -> String {
    "data/uploads".to_string()
}

fn default_max_upload_size() -> u64 {
    100
}

fn default_chunk_size() -> u64 {
    1024
}

fn default_expiration() -> i64 {
    60 * 24 // 1 day
}

fn default_max_expiration() -> i64 {
    60 * 24 * 7 // 7 days
}

fn default_cleanup_cooldown() -> i64 {
    6
}

fn default_staging_ttl() -> i64 {
    24
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            max_upload_size_mb: default_max_upload_size(),
            chunk_size_kb: default_chunk_size(),
            default_expiration_minutes: default_expiration(),
            max_expiration_minutes: default_max_expiration(),
            directory_cleanup_cooldown_hours: default_cleanup_cooldown(),
            staging_ttl_hours: default_staging_ttl(),
        }
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Maximum number of jobs processed concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Queue poll interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum delivery attempts per job.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    /// Seconds between expiry sweeps.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
    /// Seconds between empty-directory sweep triggers. The cooldown in
    /// [`StorageConfig`] further rate-limits actual walks.
    #[serde(default = "default_reclaimer_interval")]
    pub reclaimer_interval_secs: u64,
}

fn default_max_workers() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_attempts() -> i64 {
    3
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_reclaimer_interval() -> u64 {
    3600
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            reaper_interval_secs: default_reaper_interval(),
            reclaimer_interval_secs: default_reclaimer_interval(),
        }
    }
}

/// Admin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Shared secret checked against the `X-Admin-Password` header.
    /// Empty disables the admin surface entirely.
    #[serde(default)]
    pub password: String,
    /// Audit log entries per page.
    #[serde(default = "default_logs_per_page")]
    pub logs_per_page: i64,
}

fn default_logs_per_page() -> i64 {
    20
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            logs_per_page: default_logs_per_page(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/shelf.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upload and storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background job configuration.
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Admin configuration.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ShelfError::Config(e.to_string()))
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.storage.max_upload_size_mb * 1024 * 1024
    }

    /// Recommended chunk size in bytes.
    pub fn chunk_size_bytes(&self) -> u64 {
        self.storage.chunk_size_kb * 1024
    }
}
