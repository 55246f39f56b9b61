//! Worker pool over the durable job queue.
//!
//! Workers poll the queue and execute jobs concurrently up to a
//! semaphore-bounded limit. Delivery is at-least-once: a failed job is
//! rescheduled with backoff while attempts remain, then marked failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::context::AppContext;
use crate::db::{
    AuditRepository, EffectiveSettings, Job, JobRepository, JobType, SettingsRepository,
};
use crate::file::{Assembler, AssembleRequest};
use crate::sweep::{DirectoryReclaimer, ExpiryReaper};
use crate::Result;

/// Handle to a running worker pool.
pub struct WorkerPool {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl WorkerPool {
    /// Start the pool. Workers run until [`WorkerPool::shutdown`].
    pub fn start(ctx: AppContext) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(ctx, shutdown_rx));
        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Stop polling and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

async fn run(ctx: AppContext, mut shutdown_rx: mpsc::Receiver<()>) {
    let max_workers = ctx.config.jobs.max_workers.max(1);
    let semaphore = Arc::new(Semaphore::new(max_workers));
    let poll_interval = Duration::from_millis(ctx.config.jobs.poll_interval_ms.max(1));

    info!(max_workers, "worker pool started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("worker pool shutting down");
                break;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        // Claim as many runnable jobs as free workers allow.
        loop {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };

            let job = match JobRepository::new(ctx.db.pool()).claim_next().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "failed to claim job");
                    break;
                }
            };

            let ctx = ctx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                execute(&ctx, &job).await;
            });
        }
    }

    // Hold every permit so in-flight jobs have finished before we return.
    let _ = semaphore.acquire_many(max_workers as u32).await;
}

/// Run one claimed job and record its outcome in the queue.
async fn execute(ctx: &AppContext, job: &Job) {
    debug!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempts, "executing job");

    let jobs = JobRepository::new(ctx.db.pool());
    match dispatch(ctx, job).await {
        Ok(()) => {
            if let Err(e) = jobs.mark_done(&job.id).await {
                error!(job_id = %job.id, error = %e, "failed to mark job done");
            }
        }
        Err(e) if job.can_retry() => {
            error!(job_id = %job.id, job_type = %job.job_type, error = %e,
                "job failed, rescheduling");
            if let Err(e) = jobs.reschedule(job).await {
                error!(job_id = %job.id, error = %e, "failed to reschedule job");
            }
        }
        Err(e) => {
            error!(job_id = %job.id, job_type = %job.job_type, error = %e,
                "job failed permanently");
            if let Err(e) = jobs.mark_failed(&job.id).await {
                error!(job_id = %job.id, error = %e, "failed to mark job failed");
            }
            if job.job_type == JobType::AssembleUpload {
                // No retry is coming; the staged chunks are dead weight.
                if let Ok(request) = job.parse_payload::<AssembleRequest>() {
                    if let Err(e) = ctx.staging.remove(&request.upload_id) {
                        error!(job_id = %job.id, error = %e,
                            "failed to discard staging for failed upload");
                    }
                }
                let _ = AuditRepository::new(ctx.db.pool())
                    .append(
                        "ASSEMBLY_ERROR",
                        &format!("assembly failed after {} attempt(s): {e}", job.attempts),
                    )
                    .await;
            }
        }
    }
}

/// Dispatch a job to its handler. Public so tests (and one-shot admin
/// tooling) can drive jobs without a running pool.
pub async fn dispatch(ctx: &AppContext, job: &Job) -> Result<()> {
    match job.job_type {
        JobType::AssembleUpload => {
            let request: AssembleRequest = job.parse_payload()?;
            Assembler::new(ctx.db.pool(), &ctx.storage, &ctx.staging)
                .assemble(&request)
                .await?;
        }
        JobType::SweepExpired => {
            ExpiryReaper::new(ctx.db.pool(), &ctx.storage)
                .sweep(Utc::now())
                .await?;
        }
        JobType::ReclaimDirectories => {
            let settings = EffectiveSettings::load(
                &SettingsRepository::new(ctx.db.pool()),
                &ctx.config.storage,
            )
            .await?;
            DirectoryReclaimer::new(ctx.db.pool(), &ctx.storage, &ctx.staging)
                .run(&settings)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{Database, ItemRepository, JobStatus};
    use crate::file::Storage;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup(poll_ms: u64) -> (AppContext, TempDir) {
        let mut config = Config::default();
        config.jobs.poll_interval_ms = poll_ms;
        let db = Database::open_in_memory().await.unwrap();
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path()).unwrap();
        let ctx = AppContext::with_storage(Arc::new(config), db, storage);
        (ctx, temp_dir)
    }

    #[tokio::test]
    async fn test_dispatch_assemble() {
        let (ctx, _temp_dir) = setup(1000).await;
        let jobs = JobRepository::new(ctx.db.pool());
        let items = ItemRepository::new(ctx.db.pool());

        ctx.staging.write_chunk("up1", 0, b"hello").unwrap();
        let payload = json!({
            "upload_id": "up1",
            "total_chunks": 1,
            "file_name": "a.txt",
            "directory_path": "",
            "parent_id": null,
            "expires_at": null,
        });
        jobs.enqueue(JobType::AssembleUpload, &payload, 3)
            .await
            .unwrap();

        let job = jobs.claim_next().await.unwrap().unwrap();
        dispatch(&ctx, &job).await.unwrap();

        let item = items.get_by_path("a.txt").await.unwrap().unwrap();
        assert_eq!(item.size_bytes, Some(5));
    }

    #[tokio::test]
    async fn test_dispatch_sweep() {
        let (ctx, _temp_dir) = setup(1000).await;
        let jobs = JobRepository::new(ctx.db.pool());
        let items = ItemRepository::new(ctx.db.pool());

        std::fs::write(ctx.storage.full_path("old.txt"), b"x").unwrap();
        items
            .create(
                &crate::db::NewItem::file("old.txt", "old.txt", None)
                    .with_expires_at(Utc::now() - chrono::Duration::minutes(1)),
            )
            .await
            .unwrap();

        jobs.enqueue(JobType::SweepExpired, &json!({}), 3)
            .await
            .unwrap();
        let job = jobs.claim_next().await.unwrap().unwrap();
        dispatch(&ctx, &job).await.unwrap();

        assert!(!ctx.storage.exists("old.txt"));
    }

    #[tokio::test]
    async fn test_pool_runs_job_to_completion() {
        let (ctx, _temp_dir) = setup(10).await;
        let jobs = JobRepository::new(ctx.db.pool());

        ctx.staging.write_chunk("up1", 0, b"data").unwrap();
        let payload = json!({
            "upload_id": "up1",
            "total_chunks": 1,
            "file_name": "a.txt",
            "directory_path": "",
            "parent_id": null,
            "expires_at": null,
        });
        let job_id = jobs
            .enqueue(JobType::AssembleUpload, &payload, 3)
            .await
            .unwrap();

        let pool = WorkerPool::start(ctx.clone());

        let mut done = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let job = jobs.get_by_id(&job_id).await.unwrap().unwrap();
            if job.status == JobStatus::Done {
                done = true;
                break;
            }
        }
        pool.shutdown().await;

        assert!(done, "assembly job never completed");
        assert!(ctx.storage.exists("a.txt"));
    }

    #[tokio::test]
    async fn test_exhausted_assembly_discards_staging() {
        let (ctx, _temp_dir) = setup(10).await;
        let jobs = JobRepository::new(ctx.db.pool());

        // One chunk short of the set: assembly fails on every attempt
        ctx.staging.write_chunk("up1", 0, b"a").unwrap();
        let payload = json!({
            "upload_id": "up1",
            "total_chunks": 2,
            "file_name": "a.txt",
            "directory_path": "",
            "parent_id": null,
            "expires_at": null,
        });
        let job_id = jobs
            .enqueue(JobType::AssembleUpload, &payload, 1)
            .await
            .unwrap();

        let job = jobs.claim_next().await.unwrap().unwrap();
        execute(&ctx, &job).await;

        let job = jobs.get_by_id(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);

        // Staging kept between retries, but not past the last attempt
        assert!(!ctx.staging.upload_dir("up1").exists());

        let audit = AuditRepository::new(ctx.db.pool());
        let page = audit.list_page(1, 10).await.unwrap();
        assert!(page.entries.iter().any(|e| e.action == "ASSEMBLY_ERROR"));
    }

    #[tokio::test]
    async fn test_pool_marks_bad_job_failed() {
        let (ctx, _temp_dir) = setup(10).await;
        let jobs = JobRepository::new(ctx.db.pool());

        // Unparsable payload: fails every attempt
        let job_id = jobs
            .enqueue(JobType::AssembleUpload, &json!({"nonsense": true}), 1)
            .await
            .unwrap();

        let pool = WorkerPool::start(ctx.clone());

        let mut failed = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let job = jobs.get_by_id(&job_id).await.unwrap().unwrap();
            if job.status == JobStatus::Failed {
                failed = true;
                break;
            }
        }
        pool.shutdown().await;

        assert!(failed, "bad job never marked failed");

        let audit = AuditRepository::new(ctx.db.pool());
        let page = audit.list_page(1, 10).await.unwrap();
        assert!(page.entries.iter().any(|e| e.action == "ASSEMBLY_ERROR"));
    }
}
