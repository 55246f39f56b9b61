//! Periodic sweep scheduler.
//!
//! Enqueues expiry and reclamation jobs on fixed intervals. Sweeps run
//! through the same queue as uploads so all background work shares the
//! worker pool and its at-least-once semantics. An interval tick is
//! skipped while a sweep of the same type is still outstanding.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::context::AppContext;
use crate::db::{JobRepository, JobType};

/// Handle to the running scheduler.
pub struct Scheduler {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl Scheduler {
    /// Start the scheduler.
    pub fn start(ctx: AppContext) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(ctx, shutdown_rx));
        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Stop the scheduler.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

async fn run(ctx: AppContext, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut reaper_tick = tokio::time::interval(Duration::from_secs(
        ctx.config.jobs.reaper_interval_secs.max(1),
    ));
    let mut reclaimer_tick = tokio::time::interval(Duration::from_secs(
        ctx.config.jobs.reclaimer_interval_secs.max(1),
    ));
    // Skip the immediate first tick of each interval
    reaper_tick.tick().await;
    reclaimer_tick.tick().await;

    info!(
        reaper_interval_secs = ctx.config.jobs.reaper_interval_secs,
        reclaimer_interval_secs = ctx.config.jobs.reclaimer_interval_secs,
        "sweep scheduler started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("sweep scheduler shutting down");
                break;
            }
            _ = reaper_tick.tick() => {
                enqueue_sweep(&ctx, JobType::SweepExpired).await;
            }
            _ = reclaimer_tick.tick() => {
                enqueue_sweep(&ctx, JobType::ReclaimDirectories).await;
            }
        }
    }
}

async fn enqueue_sweep(ctx: &AppContext, job_type: JobType) {
    let jobs = JobRepository::new(ctx.db.pool());

    match jobs.has_outstanding(job_type).await {
        Ok(true) => {
            debug!(%job_type, "previous sweep still outstanding, skipping tick");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            error!(%job_type, error = %e, "could not check for outstanding sweep");
            return;
        }
    }

    if let Err(e) = jobs
        .enqueue(job_type, &serde_json::json!({}), ctx.config.jobs.max_attempts)
        .await
    {
        error!(%job_type, error = %e, "could not enqueue sweep");
    }
}
