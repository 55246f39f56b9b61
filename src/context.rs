//! Shared application context.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::file::{StagingArea, Storage};
use crate::Result;

/// Everything a request handler or job worker needs, wired once at
/// startup and cloned cheaply.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Process configuration.
    pub config: Arc<Config>,
    /// Database handle.
    pub db: Database,
    /// Physical storage root.
    pub storage: Storage,
    /// Chunk staging area.
    pub staging: StagingArea,
}

impl AppContext {
    /// Build a context from a configuration and an opened database.
    pub fn new(config: Arc<Config>, db: Database) -> Result<Self> {
        let storage = Storage::new(&config.storage.upload_root)?;
        let staging = StagingArea::new(&storage);
        Ok(Self {
            config,
            db,
            storage,
            staging,
        })
    }

    /// Build a context over an explicit storage root, for tests.
    pub fn with_storage(config: Arc<Config>, db: Database, storage: Storage) -> Self {
        let staging = StagingArea::new(&storage);
        Self {
            config,
            db,
            storage,
            staging,
        }
    }
}
