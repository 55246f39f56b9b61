use std::sync::Arc;

use tracing::info;

use shelf::{AppContext, Config, Database, Scheduler, WorkerPool};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = shelf::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        shelf::logging::init_console_only(&config.logging.level);
    }

    info!("SHELF - Self-Hosted Exchange for Large Files");

    if let Err(e) = run(config).await {
        tracing::error!("Fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> shelf::Result<()> {
    let config = Arc::new(config);

    let db = Database::open(&config.database.path).await?;
    let ctx = AppContext::new(config.clone(), db)?;

    let workers = WorkerPool::start(ctx.clone());
    let scheduler = Scheduler::start(ctx.clone());

    info!(
        "Serving on {}:{}, storage at {}",
        config.server.host, config.server.port, config.storage.upload_root
    );
    shelf::web::serve(ctx).await?;

    // Graceful shutdown once the server returns
    scheduler.shutdown().await;
    workers.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
