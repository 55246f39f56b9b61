//! Append-only audit log repository.
//!
//! Every state-changing operation appends one entry as a side effect.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;

/// One audit log entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: i64,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Action tag (e.g. "UPLOAD", "DELETE", "EXPIRY_SWEEP").
    pub action: String,
    /// Free-text details.
    pub details: String,
}

/// One page of audit log entries, newest first.
#[derive(Debug, Clone)]
pub struct AuditPage {
    /// Entries on this page.
    pub entries: Vec<AuditEntry>,
    /// Total number of pages.
    pub total_pages: i64,
    /// The requested page (1-based).
    pub current_page: i64,
}

/// Repository for the audit log.
pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    /// Create a new AuditRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry.
    pub async fn append(&self, action: &str, details: &str) -> Result<()> {
        sqlx::query("INSERT INTO audit_log (timestamp, action, details) VALUES (?, ?, ?)")
            .bind(Utc::now())
            .bind(action)
            .bind(details)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// List one page of entries, newest first. Pages are 1-based; an
    /// out-of-range page yields an empty entry list, not an error.
    pub async fn list_page(&self, page: i64, per_page: i64) -> Result<AuditPage> {
        let page = page.max(1);
        let per_page = per_page.max(1);

        let total = self.count().await?;
        let total_pages = (total + per_page - 1) / per_page;

        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT id, timestamp, action, details FROM audit_log
             ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(self.pool)
        .await?;

        Ok(AuditPage {
            entries,
            total_pages,
            current_page: page,
        })
    }

    /// Total number of entries.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Delete all entries. Returns the number removed.
    pub async fn purge_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM audit_log")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
