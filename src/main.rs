//! Linkwatch service binary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkwatch::config::Config;
use linkwatch::db::Store;
use linkwatch::probe::Prober;
use linkwatch::scheduler::{Scheduler, SchedulerConfig};
use linkwatch::web::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkwatch=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("starting Linkwatch on port {}...", cfg.port);

    // Initialize database
    let db_path = cfg.sqlite_path()?;
    tracing::info!("using database at {}", db_path);
    let store = Arc::new(Store::new(&db_path)?);
    tracing::info!("database initialized successfully");

    // Start the checker
    let prober = Prober::new(cfg.http_timeout)?;
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        prober,
        SchedulerConfig {
            check_interval: cfg.check_interval,
            max_concurrency: cfg.max_concurrency,
        },
    ));
    let cancel = CancellationToken::new();
    let scheduler_handle = scheduler.start(cancel.clone());

    // On SIGINT/SIGTERM: stop the scheduler, let its current cycle drain,
    // then begin the HTTP server's graceful shutdown.
    let http_shutdown = CancellationToken::new();
    {
        let http_shutdown = http_shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("shutting down gracefully");
            cancel.cancel();
            if let Err(err) = scheduler_handle.await {
                tracing::error!(error = %err, "scheduler task failed");
            }
            http_shutdown.cancel();
        });
    }

    // Serve the API until shutdown
    let server = Server::new(cfg.port, cfg.shutdown_grace, store);
    server.start(http_shutdown).await?;
    tracing::info!("shutdown complete");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
