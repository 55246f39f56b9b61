//! Expiry sweep.
//!
//! Removes file items whose expiration deadline has passed, from disk
//! and from the tree. One stubborn item never blocks the rest of the
//! sweep; its row is kept so the next sweep retries it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::{AuditRepository, ItemRepository};
use crate::file::Storage;
use crate::Result;

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Expired files removed.
    pub removed: usize,
    /// Expired files that could not be removed this pass.
    pub failed: usize,
}

/// Removes expired file items.
pub struct ExpiryReaper<'a> {
    pool: &'a SqlitePool,
    storage: &'a Storage,
}

impl<'a> ExpiryReaper<'a> {
    /// Create a new ExpiryReaper.
    pub fn new(pool: &'a SqlitePool, storage: &'a Storage) -> Self {
        Self { pool, storage }
    }

    /// Sweep every file expired as of `now`.
    ///
    /// A summary audit entry is written only when something was removed,
    /// so an idle instance does not fill the log with no-op entries.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let items = ItemRepository::new(self.pool);
        let mut report = SweepReport::default();

        for item in items.list_expired_files(now).await? {
            // Disk first; a missing file is fine, the row still goes.
            match self.storage.remove_file(&item.path) {
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %item.path, error = %e, "could not remove expired file");
                    report.failed += 1;
                    continue;
                }
            }
            match items.delete(item.id).await {
                Ok(_) => {
                    debug!(path = %item.path, "expired file removed");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(path = %item.path, error = %e, "could not delete expired item row");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 {
            AuditRepository::new(self.pool)
                .append(
                    "EXPIRY_SWEEP",
                    &format!("{} expired file(s) removed", report.removed),
                )
                .await?;
        }

        Ok(report)
    }
}
