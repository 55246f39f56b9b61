//! Upload assembly.
//!
//! Concatenates staged chunks into the final file, hashing as it writes,
//! then registers the file in the item tree and discards the staging
//! directory. Assembly is idempotent: delivery of the same job twice
//! finds the item already registered and does nothing.

use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::path::{join_path, sanitize_name, PathResolver};
use super::staging::StagingArea;
use super::storage::Storage;
use super::{IO_BUF_SIZE, STAGING_DIR_NAME};
use crate::db::{AuditRepository, Item, ItemRepository, NewItem};
use crate::{Result, ShelfError};

/// Payload of an assembly job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembleRequest {
    /// Upload whose staged chunks to assemble.
    pub upload_id: String,
    /// Expected chunk count.
    pub total_chunks: u32,
    /// Original file name (sanitized here).
    pub file_name: String,
    /// Directory path under `parent_id` for the assembled file.
    pub directory_path: String,
    /// Directory item anchoring `directory_path` (None = root).
    pub parent_id: Option<i64>,
    /// Expiration for the assembled file, anchored at upload time.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Assembles completed uploads into tree items.
pub struct Assembler<'a> {
    pool: &'a SqlitePool,
    storage: &'a Storage,
    staging: &'a StagingArea,
}

impl<'a> Assembler<'a> {
    /// Create a new Assembler.
    pub fn new(pool: &'a SqlitePool, storage: &'a Storage, staging: &'a StagingArea) -> Self {
        Self {
            pool,
            storage,
            staging,
        }
    }

    /// Assemble one upload.
    ///
    /// Ensures the target directory chain exists, streams the chunks into
    /// the final file while hashing, registers the item, and removes the
    /// staging directory. A partial output file is removed on failure so
    /// a retry starts clean.
    pub async fn assemble(&self, request: &AssembleRequest) -> Result<Item> {
        let items = ItemRepository::new(self.pool);
        let resolver = PathResolver::new(self.pool, self.storage);

        let name = sanitize_name(&request.file_name)?;
        let dir_id = resolver
            .ensure_directory_path(&request.directory_path, request.parent_id)
            .await?;
        let dir_path = match dir_id {
            Some(id) => {
                items
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| ShelfError::NotFound("target directory".to_string()))?
                    .path
            }
            None => String::new(),
        };
        if dir_path.is_empty() && name == STAGING_DIR_NAME {
            return Err(ShelfError::InvalidName(format!(
                "'{STAGING_DIR_NAME}' is reserved"
            )));
        }
        let path = join_path(&dir_path, &name);

        // A previous delivery of this job may already have finished.
        if let Some(existing) = items.get_by_path(&path).await? {
            if existing.is_file() {
                debug!(upload_id = %request.upload_id, path, "already assembled, discarding staging");
                self.staging.remove(&request.upload_id)?;
                return Ok(existing);
            }
            return Err(ShelfError::AlreadyExists(path));
        }

        let chunks = self
            .staging
            .complete_chunks(&request.upload_id, request.total_chunks)?;

        let (size_bytes, content_hash) = match self.write_concat(&path, &chunks) {
            Ok(v) => v,
            Err(e) => {
                let _ = self.storage.remove_file(&path);
                return Err(e);
            }
        };

        let mut new_item = NewItem::file(&name, &path, dir_id)
            .with_size(size_bytes as i64)
            .with_content_hash(&content_hash);
        if let Some(expires_at) = request.expires_at {
            new_item = new_item.with_expires_at(expires_at);
        }

        let item = match items.create(&new_item).await {
            Ok(item) => item,
            Err(ShelfError::AlreadyExists(_)) => {
                // A concurrent duplicate delivery registered the item first.
                items.get_by_path(&path).await?.ok_or_else(|| {
                    ShelfError::Database(format!("item at '{path}' vanished after insert conflict"))
                })?
            }
            Err(e) => {
                let _ = self.storage.remove_file(&path);
                return Err(e);
            }
        };

        self.staging.remove(&request.upload_id)?;

        AuditRepository::new(self.pool)
            .append(
                "UPLOAD",
                &format!("file '{path}' assembled ({size_bytes} bytes, sha256:{content_hash})"),
            )
            .await?;
        info!(upload_id = %request.upload_id, path, size_bytes, "upload assembled");

        Ok(item)
    }

    /// Concatenate chunk files into the final location, returning the
    /// total size and hex SHA-256 of the written content.
    fn write_concat(&self, tree_path: &str, chunks: &[PathBuf]) -> Result<(u64, String)> {
        let out = fs::File::create(self.storage.full_path(tree_path))?;
        let mut writer = BufWriter::new(out);
        let mut hasher = Sha256::new();
        let mut total: u64 = 0;
        let mut buf = vec![0u8; IO_BUF_SIZE];

        for chunk in chunks {
            let mut reader = fs::File::open(chunk)?;
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                writer.write_all(&buf[..n])?;
                total += n as u64;
            }
        }
        writer.flush()?;

        Ok((total, format!("{:x}", hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ItemStatus;
    use crate::Database;
    use tempfile::TempDir;

    async fn setup() -> (Database, TempDir, Storage, StagingArea) {
        let db = Database::open_in_memory().await.unwrap();
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path()).unwrap();
        let staging = StagingArea::new(&storage);
        (db, temp_dir, storage, staging)
    }

    fn request(upload_id: &str, total: u32, name: &str, dir: &str) -> AssembleRequest {
        AssembleRequest {
            upload_id: upload_id.to_string(),
            total_chunks: total,
            file_name: name.to_string(),
            directory_path: dir.to_string(),
            parent_id: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_assemble_concatenates_in_order() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);

        // Staged out of order; assembly must honor index order
        staging.write_chunk("up1", 2, b" world").unwrap();
        staging.write_chunk("up1", 0, b"hello").unwrap();
        staging.write_chunk("up1", 1, b",").unwrap();

        let item = assembler
            .assemble(&request("up1", 3, "greeting.txt", ""))
            .await
            .unwrap();

        assert_eq!(item.path, "greeting.txt");
        assert_eq!(item.size_bytes, Some(12));
        assert_eq!(item.status, ItemStatus::Processed);

        let content = fs::read(storage.full_path("greeting.txt")).unwrap();
        assert_eq!(content, b"hello, world");

        let expected = format!("{:x}", Sha256::digest(b"hello, world"));
        assert_eq!(item.content_hash.as_deref(), Some(expected.as_str()));

        // Staging discarded
        assert!(!staging.upload_dir("up1").exists());
    }

    #[tokio::test]
    async fn test_assemble_creates_directory_chain() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);
        let items = ItemRepository::new(db.pool());

        staging.write_chunk("up1", 0, b"data").unwrap();

        let item = assembler
            .assemble(&request("up1", 1, "a.txt", "docs/2026"))
            .await
            .unwrap();

        assert_eq!(item.path, "docs/2026/a.txt");
        let dir = items.get_by_path("docs/2026").await.unwrap().unwrap();
        assert_eq!(item.parent_id, Some(dir.id));
        assert!(storage.full_path("docs/2026/a.txt").is_file());
    }

    #[tokio::test]
    async fn test_assemble_is_idempotent() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);

        staging.write_chunk("up1", 0, b"data").unwrap();
        let first = assembler
            .assemble(&request("up1", 1, "a.txt", ""))
            .await
            .unwrap();

        // Second delivery of the same job (chunks re-staged or not)
        staging.write_chunk("up1", 0, b"data").unwrap();
        let second = assembler
            .assemble(&request("up1", 1, "a.txt", ""))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(!staging.upload_dir("up1").exists());

        let audit = AuditRepository::new(db.pool());
        assert_eq!(audit.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_assemble_missing_chunk() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);

        staging.write_chunk("up1", 0, b"a").unwrap();
        staging.write_chunk("up1", 2, b"c").unwrap();

        let result = assembler.assemble(&request("up1", 3, "a.txt", "")).await;
        assert!(matches!(result, Err(ShelfError::Assembly(_))));

        // Chunks retained for a later retry
        assert_eq!(staging.chunk_count("up1").unwrap(), 2);
        assert!(!storage.exists("a.txt"));
    }

    #[tokio::test]
    async fn test_assemble_blocked_by_directory() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);
        let items = ItemRepository::new(db.pool());

        items
            .create(&NewItem::directory("a.txt", "a.txt", None))
            .await
            .unwrap();
        staging.write_chunk("up1", 0, b"data").unwrap();

        let result = assembler.assemble(&request("up1", 1, "a.txt", "")).await;
        assert!(matches!(result, Err(ShelfError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_assemble_sanitizes_name() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);

        staging.write_chunk("up1", 0, b"data").unwrap();

        let item = assembler
            .assemble(&request("up1", 1, "my report (final).pdf", ""))
            .await
            .unwrap();

        assert_eq!(item.name, "my_report_final_.pdf");
    }

    #[tokio::test]
    async fn test_assemble_records_expiration() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);

        staging.write_chunk("up1", 0, b"data").unwrap();
        let expires_at = Utc::now() + chrono::Duration::minutes(60);

        let mut req = request("up1", 1, "a.txt", "");
        req.expires_at = Some(expires_at);

        let item = assembler.assemble(&req).await.unwrap();
        assert_eq!(item.expires_at, Some(expires_at));
    }

    #[tokio::test]
    async fn test_assemble_empty_file() {
        let (db, _temp_dir, storage, staging) = setup().await;
        let assembler = Assembler::new(db.pool(), &storage, &staging);

        staging.write_chunk("up1", 0, b"").unwrap();

        let item = assembler
            .assemble(&request("up1", 1, "empty.txt", ""))
            .await
            .unwrap();

        assert_eq!(item.size_bytes, Some(0));
        let expected = format!("{:x}", Sha256::digest(b""));
        assert_eq!(item.content_hash.as_deref(), Some(expected.as_str()));
    }
}
