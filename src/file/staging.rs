//! Chunk staging area.
//!
//! Incoming chunks are parked under `{root}/tmp/{upload_id}/` as
//! `{index:06}.part` files until the final chunk arrives and assembly
//! runs. Staging content is never registered in the item tree.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use super::path::validate_upload_id;
use super::storage::Storage;
use crate::{Result, ShelfError};

/// Filename extension for staged chunks.
const CHUNK_EXT: &str = "part";

/// Staging area for in-flight chunked uploads.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Create a staging area rooted at the storage's staging directory.
    pub fn new(storage: &Storage) -> Self {
        Self {
            root: storage.staging_root(),
        }
    }

    /// Directory holding one upload's chunks.
    pub fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(upload_id)
    }

    /// Path of one staged chunk. Zero-padded so lexical order is chunk order.
    pub fn chunk_path(&self, upload_id: &str, index: u32) -> PathBuf {
        self.upload_dir(upload_id).join(format!("{index:06}.{CHUNK_EXT}"))
    }

    /// Write one chunk to staging, replacing any previous copy at the same
    /// index. Retransmitted chunks overwrite rather than append, so a
    /// retried chunk never corrupts the assembled file.
    pub fn write_chunk(&self, upload_id: &str, index: u32, data: &[u8]) -> Result<()> {
        validate_upload_id(upload_id)?;
        fs::create_dir_all(self.upload_dir(upload_id))?;
        fs::write(self.chunk_path(upload_id, index), data)?;
        debug!(upload_id, index, bytes = data.len(), "staged chunk");
        Ok(())
    }

    /// Number of chunks currently staged for an upload.
    pub fn chunk_count(&self, upload_id: &str) -> Result<u32> {
        validate_upload_id(upload_id)?;
        match fs::read_dir(self.upload_dir(upload_id)) {
            Ok(entries) => {
                let mut count = 0;
                for entry in entries {
                    let entry = entry?;
                    if entry.path().extension().is_some_and(|e| e == CHUNK_EXT) {
                        count += 1;
                    }
                }
                Ok(count)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Total bytes currently staged for an upload.
    ///
    /// `replacing` excludes any existing copy of that chunk index from
    /// the total: a retransmitted chunk overwrites its predecessor, so
    /// counting both would overstate the upload.
    pub fn staged_bytes(&self, upload_id: &str, replacing: Option<u32>) -> Result<u64> {
        validate_upload_id(upload_id)?;
        let skip = replacing.map(|index| self.chunk_path(upload_id, index));

        match fs::read_dir(self.upload_dir(upload_id)) {
            Ok(entries) => {
                let mut total = 0;
                for entry in entries {
                    let entry = entry?;
                    let path = entry.path();
                    if path.extension().is_some_and(|e| e == CHUNK_EXT)
                        && skip.as_deref() != Some(path.as_path())
                    {
                        total += entry.metadata()?.len();
                    }
                }
                Ok(total)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Collect the full ordered chunk list for assembly.
    ///
    /// Fails with an assembly error if any index in `0..total_chunks` is
    /// missing, naming the first gap.
    pub fn complete_chunks(&self, upload_id: &str, total_chunks: u32) -> Result<Vec<PathBuf>> {
        validate_upload_id(upload_id)?;

        let mut paths = Vec::with_capacity(total_chunks as usize);
        for index in 0..total_chunks {
            let path = self.chunk_path(upload_id, index);
            if !path.is_file() {
                return Err(ShelfError::Assembly(format!(
                    "upload '{upload_id}' is missing chunk {index} of {total_chunks}"
                )));
            }
            paths.push(path);
        }
        Ok(paths)
    }

    /// Discard an upload's staging directory.
    ///
    /// Returns `true` if it existed, `false` if already gone.
    pub fn remove(&self, upload_id: &str) -> Result<bool> {
        validate_upload_id(upload_id)?;
        match fs::remove_dir_all(self.upload_dir(upload_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Discard staging directories not modified within `ttl_hours`.
    ///
    /// These are uploads that stalled before their final chunk; their
    /// chunks would otherwise sit in staging forever. A TTL of zero
    /// disables the sweep. Returns the number of directories removed.
    pub fn sweep_stale(&self, ttl_hours: i64) -> Result<usize> {
        if ttl_hours <= 0 {
            return Ok(0);
        }
        let ttl = Duration::from_secs(ttl_hours as u64 * 3600);

        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let age = entry
                .metadata()?
                .modified()?
                .elapsed()
                .unwrap_or(Duration::ZERO);
            if age < ttl {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "discarded stale staging directory");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e,
                        "failed to discard stale staging directory");
                }
            }
        }
        Ok(removed)
    }
}
