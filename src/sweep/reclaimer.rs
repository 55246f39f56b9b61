//! Empty-directory reclamation.
//!
//! Walks the storage hierarchy bottom-up and removes directories that
//! ended up empty after expiry sweeps and deletions, together with their
//! tree rows. A marker file under the storage root throttles runs to the
//! configured cooldown; the throttle survives restarts without touching
//! the database. The stale-staging sweep piggybacks on each run.

use std::fs;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::{AuditRepository, EffectiveSettings, ItemRepository};
use crate::file::{StagingArea, Storage};
use crate::Result;

/// Marker file recording the last completed run, RFC 3339.
const LAST_RUN_MARKER: &str = ".reclaimer_last_run";

/// Outcome of one reclamation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReclaimReport {
    /// Empty directories removed.
    pub directories_removed: usize,
    /// Stale staging directories discarded.
    pub staging_discarded: usize,
    /// Whether the run was skipped (disabled or within cooldown).
    pub skipped: bool,
}

/// Reclaims empty directories from storage and the item tree.
pub struct DirectoryReclaimer<'a> {
    pool: &'a SqlitePool,
    storage: &'a Storage,
    staging: &'a StagingArea,
}

impl<'a> DirectoryReclaimer<'a> {
    /// Create a new DirectoryReclaimer.
    pub fn new(pool: &'a SqlitePool, storage: &'a Storage, staging: &'a StagingArea) -> Self {
        Self {
            pool,
            storage,
            staging,
        }
    }

    /// Run a reclamation pass, honoring the cooldown.
    ///
    /// A cooldown of zero disables reclamation. One undeletable directory
    /// never aborts the pass; it is logged and skipped. The marker is
    /// written only after a completed walk, so a crashed run does not
    /// consume the cooldown window.
    pub async fn run(&self, settings: &EffectiveSettings) -> Result<ReclaimReport> {
        let cooldown = settings.directory_cleanup_cooldown_hours;
        if cooldown <= 0 {
            return Ok(ReclaimReport {
                skipped: true,
                ..Default::default()
            });
        }
        if let Some(last_run) = self.read_marker() {
            if Utc::now() - last_run < Duration::hours(cooldown) {
                debug!(%last_run, "reclaimer within cooldown, skipping");
                return Ok(ReclaimReport {
                    skipped: true,
                    ..Default::default()
                });
            }
        }

        let items = ItemRepository::new(self.pool);
        let mut report = ReclaimReport::default();

        for dir in self.storage.walk_dirs_bottom_up()? {
            // Emptiness is checked live: removing children on this same
            // pass can empty a parent visited later.
            match self.storage.dir_is_empty(&dir) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "could not inspect directory");
                    continue;
                }
            }

            match self.storage.remove_empty_dir(&dir) {
                Ok(true) => {
                    report.directories_removed += 1;
                    debug!(path = %dir.display(), "reclaimed empty directory");
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "could not remove empty directory");
                    continue;
                }
            }

            // Directories on disk without a tree row are tolerated.
            if let Some(tree_path) = self.storage.tree_path(&dir) {
                if let Some(item) = items.get_by_path(&tree_path).await? {
                    if let Err(e) = items.delete(item.id).await {
                        warn!(path = tree_path, error = %e, "could not delete directory row");
                    }
                }
            }
        }

        report.staging_discarded = self.staging.sweep_stale(settings.staging_ttl_hours)?;

        self.write_marker()?;

        if report.directories_removed > 0 || report.staging_discarded > 0 {
            AuditRepository::new(self.pool)
                .append(
                    "DIR_RECLAIM",
                    &format!(
                        "{} empty director(ies) reclaimed, {} stale staging upload(s) discarded",
                        report.directories_removed, report.staging_discarded
                    ),
                )
                .await?;
        }

        Ok(report)
    }

    /// Last completed run, if the marker exists and parses.
    fn read_marker(&self) -> Option<DateTime<Utc>> {
        let raw = fs::read_to_string(self.storage.root().join(LAST_RUN_MARKER)).ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .ok()
    }

    fn write_marker(&self) -> Result<()> {
        fs::write(
            self.storage.root().join(LAST_RUN_MARKER),
            Utc::now().to_rfc3339(),
        )?;
        Ok(())
    }
}
