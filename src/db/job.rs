//! Durable job queue repository.
//!
//! Jobs are stored in SQLite and claimed by the worker pool with an
//! atomic UPDATE ... RETURNING, so each job is held by at most one worker
//! at a time. Delivery is at-least-once: a failed job is rescheduled with
//! exponential backoff until `max_attempts` is reached, so handlers must
//! be idempotent.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::Result;

/// Type of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    /// Assemble a chunked upload into its final artifact.
    AssembleUpload,
    /// Delete file items whose expiration has elapsed.
    SweepExpired,
    /// Remove empty directories from storage and the tree.
    ReclaimDirectories,
}

impl JobType {
    /// String representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::AssembleUpload => "assemble_upload",
            JobType::SweepExpired => "sweep_expired",
            JobType::ReclaimDirectories => "reclaim_directories",
        }
    }
}

impl TryFrom<String> for JobType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "assemble_upload" => Ok(JobType::AssembleUpload),
            "sweep_expired" => Ok(JobType::SweepExpired),
            "reclaim_directories" => Ok(JobType::ReclaimDirectories),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker.
    Running,
    /// Completed successfully.
    Done,
    /// Failed after exhausting attempts.
    Failed,
}

impl JobStatus {
    /// String representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A queued background job.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    /// Unique job ID.
    pub id: String,
    /// Job type.
    #[sqlx(try_from = "String")]
    pub job_type: JobType,
    /// JSON payload.
    pub payload: String,
    /// Current status.
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    /// Delivery attempts so far.
    pub attempts: i64,
    /// Maximum delivery attempts.
    pub max_attempts: i64,
    /// Earliest time the job may run.
    pub run_at: DateTime<Utc>,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether the job may be redelivered after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Deserialize the payload.
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.payload)
            .map_err(|e| crate::ShelfError::Validation(format!("bad job payload: {e}")))
    }
}

const JOB_COLUMNS: &str =
    "id, job_type, payload, status, attempts, max_attempts, run_at, created_at, updated_at";

/// Repository for the job queue.
pub struct JobRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobRepository<'a> {
    /// Create a new JobRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Enqueue a job, runnable immediately. Returns the job ID.
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: &serde_json::Value,
        max_attempts: i64,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO jobs (id, job_type, payload, status, attempts, max_attempts, run_at, created_at, updated_at)
             VALUES (?, ?, ?, 'pending', 0, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(job_type.as_str())
        .bind(payload.to_string())
        .bind(max_attempts)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(id)
    }

    /// Atomically claim the next runnable job, marking it running and
    /// counting the attempt. Returns None when the queue is idle.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let now = Utc::now();

        let job = sqlx::query_as::<_, Job>(&format!(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, updated_at = ?1
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'pending' AND run_at <= ?1
                 ORDER BY created_at, id LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        Ok(job)
    }

    /// Mark a job completed.
    pub async fn mark_done(&self, id: &str) -> Result<()> {
        self.set_status(id, JobStatus::Done, None).await
    }

    /// Mark a job permanently failed.
    pub async fn mark_failed(&self, id: &str) -> Result<()> {
        self.set_status(id, JobStatus::Failed, None).await
    }

    /// Reschedule a failed delivery with exponential backoff based on the
    /// attempt count already recorded on the job.
    pub async fn reschedule(&self, job: &Job) -> Result<()> {
        let backoff = Duration::seconds(2_i64.pow(job.attempts.min(16) as u32));
        self.set_status(&job.id, JobStatus::Pending, Some(Utc::now() + backoff))
            .await
    }

    async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match run_at {
            Some(run_at) => {
                sqlx::query("UPDATE jobs SET status = ?, run_at = ?, updated_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(run_at)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(self.pool)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(Utc::now())
                    .bind(id)
                    .execute(self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Get a job by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(job)
    }

    /// Whether any job of the given type is pending or running. Periodic
    /// schedulers use this to avoid stacking duplicate sweeps.
    pub async fn has_outstanding(&self, job_type: JobType) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE job_type = ? AND status IN ('pending', 'running')",
        )
        .bind(job_type.as_str())
        .fetch_one(self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Count jobs with the given status.
    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
