//! Chunk intake.
//!
//! The receiver accepts chunks in any order, parks them in staging, and
//! hands the upload to the job queue once every chunk has arrived. A
//! single-chunk upload takes the same path with `total_chunks == 1`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use super::assembler::AssembleRequest;
use super::path::sanitize_name;
use super::staging::StagingArea;
use crate::db::{JobRepository, JobType};
use crate::{Result, ShelfError};

/// One incoming chunk plus its upload metadata. The metadata rides along
/// on every chunk so no server-side session state is needed.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    /// Client-chosen upload identifier.
    pub upload_id: String,
    /// Zero-based position of this chunk.
    pub chunk_index: u32,
    /// Total number of chunks in the upload.
    pub total_chunks: u32,
    /// Original file name, sanitized at assembly time.
    pub file_name: String,
    /// Directory path under `parent_id` to place the file in (may be empty).
    pub directory_path: String,
    /// Directory item to anchor `directory_path` at (None = root).
    pub parent_id: Option<i64>,
    /// Absolute expiration for the assembled file, already clamped.
    pub expires_at: Option<DateTime<Utc>>,
    /// Chunk bytes.
    pub data: Vec<u8>,
}

/// Outcome of accepting one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Chunk staged; more chunks are still outstanding.
    Accepted {
        /// Chunks staged so far.
        received: u32,
        /// Total expected.
        total: u32,
    },
    /// All chunks staged; assembly has been queued.
    Queued {
        /// ID of the assembly job.
        job_id: String,
    },
}

/// Accepts upload chunks and queues assembly when an upload completes.
pub struct ChunkReceiver<'a> {
    pool: &'a SqlitePool,
    staging: &'a StagingArea,
    job_max_attempts: i64,
    max_total_bytes: u64,
}

impl<'a> ChunkReceiver<'a> {
    /// Create a new ChunkReceiver. `max_total_bytes` caps the combined
    /// size of all staged chunks for one upload.
    pub fn new(
        pool: &'a SqlitePool,
        staging: &'a StagingArea,
        job_max_attempts: i64,
        max_total_bytes: u64,
    ) -> Self {
        Self {
            pool,
            staging,
            job_max_attempts,
            max_total_bytes,
        }
    }

    /// Accept one chunk.
    ///
    /// Chunks may arrive in any order; assembly is queued when the staged
    /// count reaches the total, whichever chunk completes it. Concurrent
    /// completion can queue the job twice; assembly is idempotent, so a
    /// duplicate job is a no-op.
    pub async fn receive(&self, upload: ChunkUpload) -> Result<ChunkOutcome> {
        if upload.total_chunks == 0 {
            return Err(ShelfError::Validation(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        if upload.chunk_index >= upload.total_chunks {
            return Err(ShelfError::Validation(format!(
                "chunk index {} out of range for {} chunks",
                upload.chunk_index, upload.total_chunks
            )));
        }
        // Fail fast on a hopeless name before any disk work.
        sanitize_name(&upload.file_name)?;

        // The limit binds the whole upload, not each chunk: already
        // staged bytes count against it.
        let staged = self
            .staging
            .staged_bytes(&upload.upload_id, Some(upload.chunk_index))?;
        if staged + upload.data.len() as u64 > self.max_total_bytes {
            return Err(ShelfError::TooLarge(format!(
                "upload '{}' exceeds the {} byte limit",
                upload.upload_id, self.max_total_bytes
            )));
        }

        self.staging
            .write_chunk(&upload.upload_id, upload.chunk_index, &upload.data)?;

        let received = self.staging.chunk_count(&upload.upload_id)?;
        if received < upload.total_chunks {
            return Ok(ChunkOutcome::Accepted {
                received,
                total: upload.total_chunks,
            });
        }

        let request = AssembleRequest {
            upload_id: upload.upload_id,
            total_chunks: upload.total_chunks,
            file_name: upload.file_name,
            directory_path: upload.directory_path,
            parent_id: upload.parent_id,
            expires_at: upload.expires_at,
        };
        let payload = serde_json::to_value(&request)
            .map_err(|e| ShelfError::Validation(format!("unserializable job payload: {e}")))?;

        let jobs = JobRepository::new(self.pool);
        let job_id = jobs
            .enqueue(JobType::AssembleUpload, &payload, self.job_max_attempts)
            .await?;

        info!(
            upload_id = %request.upload_id,
            total_chunks = request.total_chunks,
            job_id = %job_id,
            "upload complete, assembly queued"
        );

        Ok(ChunkOutcome::Queued { job_id })
    }
}
