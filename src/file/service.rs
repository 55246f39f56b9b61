//! Tree operations: browse, create directories, rename, delete, download.
//!
//! Keeps the item tree and the directory hierarchy on disk in step, and
//! records every state change in the audit log.

use std::path::PathBuf;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::path::{join_path, sanitize_name, PathResolver};
use super::storage::Storage;
use super::STAGING_DIR_NAME;
use crate::db::{AuditRepository, Item, ItemRepository};
use crate::{Result, ShelfError};

/// A directory listing: children plus the ancestor chain for breadcrumbs.
#[derive(Debug, Clone)]
pub struct Listing {
    /// Items in the requested directory, directories first.
    pub items: Vec<Item>,
    /// Ancestors from the root down to the requested directory (empty at
    /// the root level).
    pub breadcrumbs: Vec<Item>,
}

/// High-level operations over the item tree.
pub struct TreeService<'a> {
    pool: &'a SqlitePool,
    storage: &'a Storage,
}

impl<'a> TreeService<'a> {
    /// Create a new TreeService.
    pub fn new(pool: &'a SqlitePool, storage: &'a Storage) -> Self {
        Self { pool, storage }
    }

    /// List a directory (None = root level) with breadcrumbs.
    pub async fn list(&self, parent_id: Option<i64>) -> Result<Listing> {
        let items = ItemRepository::new(self.pool);

        let breadcrumbs = match parent_id {
            Some(id) => {
                let chain = items.ancestors(id).await?;
                if chain.is_empty() {
                    return Err(ShelfError::NotFound("directory".to_string()));
                }
                chain
            }
            None => Vec::new(),
        };

        Ok(Listing {
            items: items.list_by_parent(parent_id).await?,
            breadcrumbs,
        })
    }

    /// Create a directory (or chain of directories) under a parent.
    ///
    /// `name` may contain slashes; each segment is sanitized and created
    /// in turn. Returns the leaf directory. Creating a directory that
    /// already exists returns the existing item.
    pub async fn create_directory(&self, name: &str, parent_id: Option<i64>) -> Result<Item> {
        let items = ItemRepository::new(self.pool);
        let resolver = PathResolver::new(self.pool, self.storage);

        let leaf_id = resolver
            .ensure_directory_path(name, parent_id)
            .await?
            .ok_or_else(|| ShelfError::InvalidName("directory name is empty".to_string()))?;

        let dir = items
            .get_by_id(leaf_id)
            .await?
            .ok_or_else(|| ShelfError::NotFound("directory".to_string()))?;

        AuditRepository::new(self.pool)
            .append("CREATE_DIR", &format!("directory '{}' created", dir.path))
            .await?;

        Ok(dir)
    }

    /// Delete an item. Directories are deleted recursively, on disk and
    /// in the tree; descendant rows cascade via the parent foreign key.
    /// Absent disk entries are tolerated.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let items = ItemRepository::new(self.pool);

        let item = items
            .get_by_id(id)
            .await?
            .ok_or_else(|| ShelfError::NotFound("item".to_string()))?;

        let detail = if item.is_directory() {
            let subtree = items.list_subtree(&item.path).await?;
            self.storage.remove_dir_all(&item.path)?;
            format!(
                "directory '{}' deleted ({} item(s))",
                item.path,
                subtree.len()
            )
        } else {
            self.storage.remove_file(&item.path)?;
            format!("file '{}' deleted", item.path)
        };
        items.delete(id).await?;

        AuditRepository::new(self.pool)
            .append("DELETE", &detail)
            .await?;
        info!(path = %item.path, "item deleted");

        Ok(())
    }

    /// Rename an item in place.
    ///
    /// The new name is sanitized; the item keeps its parent. Directory
    /// renames rewrite every descendant path in the same transaction.
    pub async fn rename(&self, id: i64, new_name: &str) -> Result<Item> {
        let items = ItemRepository::new(self.pool);

        let item = items
            .get_by_id(id)
            .await?
            .ok_or_else(|| ShelfError::NotFound("item".to_string()))?;

        let name = sanitize_name(new_name)?;
        let parent_path = match item.path.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        if parent_path.is_empty() && name == STAGING_DIR_NAME {
            return Err(ShelfError::InvalidName(format!(
                "'{STAGING_DIR_NAME}' is reserved"
            )));
        }
        let new_path = join_path(&parent_path, &name);
        if new_path == item.path {
            return Ok(item);
        }

        // Check before touching the disk; the UNIQUE index still backstops
        // a rename racing this check.
        PathResolver::new(self.pool, self.storage)
            .ensure_vacant(&new_path)
            .await?;

        self.storage.rename(&item.path, &new_path)?;
        if let Err(e) = items.rename(&item, &name, &new_path).await {
            // Put the disk back so tree and storage stay in step.
            if let Err(undo) = self.storage.rename(&new_path, &item.path) {
                warn!(path = %item.path, error = %undo, "failed to undo disk rename");
            }
            return Err(e);
        }

        AuditRepository::new(self.pool)
            .append(
                "RENAME",
                &format!("'{}' renamed to '{}'", item.path, new_path),
            )
            .await?;
        info!(from = %item.path, to = %new_path, "item renamed");

        items
            .get_by_id(id)
            .await?
            .ok_or_else(|| ShelfError::NotFound("item".to_string()))
    }

    /// Resolve a file for download and record the access.
    ///
    /// Expired files are refused even if the expiry sweep has not run
    /// yet: expiration takes effect at the deadline, not at sweep time.
    pub async fn open_for_download(&self, id: i64) -> Result<(Item, PathBuf)> {
        let items = ItemRepository::new(self.pool);

        let item = items
            .get_by_id(id)
            .await?
            .ok_or_else(|| ShelfError::NotFound("file".to_string()))?;

        if !item.is_file() {
            return Err(ShelfError::Validation(
                "directories cannot be downloaded".to_string(),
            ));
        }
        if let Some(expires_at) = item.expires_at {
            if expires_at <= Utc::now() {
                return Err(ShelfError::NotFound("file".to_string()));
            }
        }

        let full_path = self.storage.full_path(&item.path);
        if !full_path.is_file() {
            return Err(ShelfError::NotFound("file".to_string()));
        }

        AuditRepository::new(self.pool)
            .append("DOWNLOAD", &format!("file '{}' downloaded", item.path))
            .await?;

        Ok((item, full_path))
    }
}
