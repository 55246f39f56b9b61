//! Physical storage for SHELF.
//!
//! This module maps tree paths onto a directory hierarchy under a single
//! upload root:
//! ```text
//! {root}/
//! ├── tmp/                   <- staging area (reserved, never tree items)
//! │   └── {upload_id}/...
//! ├── docs/
//! │   └── report.pdf
//! └── readme.txt
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::STAGING_DIR_NAME;
use crate::Result;

/// Physical storage rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct Storage {
    /// Base directory for all stored files.
    root: PathBuf,
}

impl Storage {
    /// Create a new Storage at the given root.
    ///
    /// The root and the staging directory under it are created if absent.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(STAGING_DIR_NAME))?;

        Ok(Self { root })
    }

    /// Get the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the staging root (`{root}/tmp`).
    pub fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    /// Absolute path for a tree path.
    pub fn full_path(&self, tree_path: &str) -> PathBuf {
        self.root.join(tree_path)
    }

    /// Create a directory (and any missing parents) for a tree path.
    /// Idempotent: an existing directory is fine.
    pub fn create_dir(&self, tree_path: &str) -> Result<()> {
        fs::create_dir_all(self.full_path(tree_path))?;
        Ok(())
    }

    /// Delete a file.
    ///
    /// Returns `true` if the file was deleted, `false` if it was already
    /// gone. Absence is not an error: deletes must tolerate "already gone".
    pub fn remove_file(&self, tree_path: &str) -> Result<bool> {
        match fs::remove_file(self.full_path(tree_path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a directory and everything under it.
    ///
    /// Returns `true` if it was removed, `false` if already gone.
    pub fn remove_dir_all(&self, tree_path: &str) -> Result<bool> {
        match fs::remove_dir_all(self.full_path(tree_path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a single empty directory by absolute path.
    ///
    /// Fails if the directory is not empty.
    pub fn remove_empty_dir(&self, abs_path: &Path) -> Result<bool> {
        match fs::remove_dir(abs_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Rename/move within the storage root.
    pub fn rename(&self, old_tree_path: &str, new_tree_path: &str) -> Result<()> {
        fs::rename(self.full_path(old_tree_path), self.full_path(new_tree_path))?;
        Ok(())
    }

    /// Whether a tree path exists on disk.
    pub fn exists(&self, tree_path: &str) -> bool {
        self.full_path(tree_path).exists()
    }

    /// Whether a directory has no entries.
    pub fn dir_is_empty(&self, abs_path: &Path) -> Result<bool> {
        Ok(fs::read_dir(abs_path)?.next().is_none())
    }

    /// Collect every directory under the root, deepest first, skipping the
    /// root itself and the staging area.
    pub fn walk_dirs_bottom_up(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let staging = self.staging_root();
        collect_dirs(&self.root, &staging, &mut dirs)?;
        // Children before parents
        dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        Ok(dirs)
    }

    /// Tree path for an absolute path under the root, if any.
    pub fn tree_path(&self, abs_path: &Path) -> Option<String> {
        abs_path
            .strip_prefix(&self.root)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
    }

    /// List regular files directly under the root and all subdirectories,
    /// excluding the staging area. Used by the admin purge.
    pub fn walk_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let staging = self.staging_root();
        collect_files(&self.root, &staging, &mut files)?;
        Ok(files)
    }
}

fn collect_dirs(dir: &Path, staging: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path == staging {
            continue;
        }
        if entry.file_type()?.is_dir() {
            collect_dirs(&path, staging, out)?;
            out.push(path);
        }
    }
    Ok(())
}

fn collect_files(dir: &Path, staging: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path == staging {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, staging, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
