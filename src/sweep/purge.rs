//! Admin purge: wipe all content, and the audit log on request.

use std::fs;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::{AuditRepository, ItemRepository};
use crate::file::Storage;
use crate::Result;

/// Outcome of a full purge.
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    /// Files removed from disk.
    pub files_removed: usize,
    /// Item rows removed.
    pub items_removed: u64,
    /// Disk entries that could not be removed.
    pub failures: Vec<String>,
}

/// Wipes stored content wholesale.
pub struct Purger<'a> {
    pool: &'a SqlitePool,
    storage: &'a Storage,
}

impl<'a> Purger<'a> {
    /// Create a new Purger.
    pub fn new(pool: &'a SqlitePool, storage: &'a Storage) -> Self {
        Self { pool, storage }
    }

    /// Remove every stored file, directory, and staged upload, then every
    /// item row.
    ///
    /// Disk failures are collected rather than aborting: the tree rows
    /// are always cleared so the instance comes back to a consistent
    /// empty state, and anything left on disk is reported for manual
    /// cleanup.
    pub async fn purge_all(&self) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();

        for file in self.storage.walk_files()? {
            match fs::remove_file(&file) {
                Ok(()) => report.files_removed += 1,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "purge could not remove file");
                    report.failures.push(format!("{}: {e}", file.display()));
                }
            }
        }

        for dir in self.storage.walk_dirs_bottom_up()? {
            if let Err(e) = self.storage.remove_empty_dir(&dir) {
                warn!(path = %dir.display(), error = %e, "purge could not remove directory");
                report.failures.push(format!("{}: {e}", dir.display()));
            }
        }

        // In-flight uploads go too
        for entry in fs::read_dir(self.storage.staging_root())? {
            let entry = entry?;
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                report.failures.push(format!("{}: {e}", entry.path().display()));
            }
        }

        report.items_removed = ItemRepository::new(self.pool).delete_all().await?;

        AuditRepository::new(self.pool)
            .append(
                "PURGE",
                &format!(
                    "all content purged ({} file(s), {} item(s), {} failure(s))",
                    report.files_removed,
                    report.items_removed,
                    report.failures.len()
                ),
            )
            .await?;
        info!(
            files = report.files_removed,
            items = report.items_removed,
            failures = report.failures.len(),
            "content purged"
        );

        Ok(report)
    }

    /// Clear the audit log, leaving a single entry recording the purge.
    pub async fn purge_logs(&self) -> Result<u64> {
        let audit = AuditRepository::new(self.pool);
        let removed = audit.purge_all().await?;
        audit
            .append("LOG_PURGE", &format!("{removed} audit entr(ies) purged"))
            .await?;
        Ok(removed)
    }
}
