//! Persisted configuration overrides.
//!
//! Admin-set values live in the `settings` table and are merged over the
//! process defaults from `config.toml` whenever an operation needs an
//! effective value. Only the keys named in [`EffectiveSettings`] are
//! meaningful; unknown keys are stored but ignored.

use sqlx::SqlitePool;
use tracing::warn;

use crate::config::StorageConfig;
use crate::Result;

/// Repository for the settings override store.
pub struct SettingsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SettingsRepository<'a> {
    /// Create a new SettingsRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get one override value.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool)
            .await?;
        Ok(value)
    }

    /// Set (or replace) one override value.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Remove one override, falling back to the config default.
    pub async fn unset(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All stored overrides as (key, value) pairs.
    pub async fn all(&self) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
                .fetch_all(self.pool)
                .await?;
        Ok(rows)
    }
}

/// Effective storage settings: config defaults with overrides applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    /// Maximum upload size in bytes.
    pub max_upload_size_bytes: u64,
    /// Recommended chunk size in bytes.
    pub chunk_size_bytes: u64,
    /// Expiration applied when the client requests none, in minutes.
    pub default_expiration_minutes: i64,
    /// Ceiling for client-requested expirations, in minutes.
    pub max_expiration_minutes: i64,
    /// Minimum hours between empty-directory sweeps (0 disables).
    pub directory_cleanup_cooldown_hours: i64,
    /// Hours before an incomplete staging directory is discarded (0 disables).
    pub staging_ttl_hours: i64,
}

impl EffectiveSettings {
    /// Build effective settings from the config defaults plus any stored
    /// overrides. Unparsable override values are logged and ignored.
    pub async fn load(repo: &SettingsRepository<'_>, config: &StorageConfig) -> Result<Self> {
        let mut settings = Self::from_config(config);

        for (key, value) in repo.all().await? {
            match key.as_str() {
                "max_upload_size_mb" => {
                    apply(&mut settings.max_upload_size_bytes, &key, &value, |v: u64| {
                        v * 1024 * 1024
                    });
                }
                "chunk_size_kb" => {
                    apply(&mut settings.chunk_size_bytes, &key, &value, |v: u64| {
                        v * 1024
                    });
                }
                "default_expiration_minutes" => {
                    apply(&mut settings.default_expiration_minutes, &key, &value, |v| v);
                }
                "max_expiration_minutes" => {
                    apply(&mut settings.max_expiration_minutes, &key, &value, |v| v);
                }
                "directory_cleanup_cooldown_hours" => {
                    apply(
                        &mut settings.directory_cleanup_cooldown_hours,
                        &key,
                        &value,
                        |v| v,
                    );
                }
                "staging_ttl_hours" => {
                    apply(&mut settings.staging_ttl_hours, &key, &value, |v| v);
                }
                _ => {}
            }
        }

        Ok(settings)
    }

    /// Effective settings from config defaults alone.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_upload_size_bytes: config.max_upload_size_mb * 1024 * 1024,
            chunk_size_bytes: config.chunk_size_kb * 1024,
            default_expiration_minutes: config.default_expiration_minutes,
            max_expiration_minutes: config.max_expiration_minutes,
            directory_cleanup_cooldown_hours: config.directory_cleanup_cooldown_hours,
            staging_ttl_hours: config.staging_ttl_hours,
        }
    }

    /// Clamp a requested expiration (minutes) to the configured ceiling,
    /// substituting the default when absent or non-positive.
    pub fn clamp_expiration(&self, requested: Option<i64>) -> i64 {
        let minutes = match requested {
            Some(m) if m > 0 => m,
            _ => self.default_expiration_minutes,
        };
        minutes.min(self.max_expiration_minutes)
    }
}

fn apply<T, U: std::str::FromStr>(slot: &mut T, key: &str, value: &str, convert: impl Fn(U) -> T) {
    match value.parse::<U>() {
        Ok(v) => *slot = convert(v),
        Err(_) => warn!(key, value, "ignoring unparsable settings override"),
    }
}
