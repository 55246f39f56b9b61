//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use tempfile::TempDir;

use shelf::web::{create_router, AppState};
use shelf::{AppContext, Config, Database, JobRepository, Storage};

/// Build an application context over an in-memory database and a
/// temporary storage root.
pub async fn test_context(admin_password: &str) -> (AppContext, TempDir) {
    let mut config = Config::default();
    config.admin.password = admin_password.to_string();

    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = Storage::new(temp_dir.path()).expect("Failed to create storage");

    (
        AppContext::with_storage(Arc::new(config), db, storage),
        temp_dir,
    )
}

/// Create a test server over the full router.
pub fn test_server(ctx: AppContext) -> TestServer {
    let state = Arc::new(AppState::new(ctx));
    TestServer::new(create_router(state)).expect("Failed to start test server")
}

/// Drain the job queue synchronously, failing the test on any job error.
pub async fn run_pending_jobs(ctx: &AppContext) {
    let jobs = JobRepository::new(ctx.db.pool());
    while let Some(job) = jobs.claim_next().await.expect("claim failed") {
        shelf::jobs::dispatch(ctx, &job)
            .await
            .expect("job execution failed");
        jobs.mark_done(&job.id).await.expect("mark_done failed");
    }
}
