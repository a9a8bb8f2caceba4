use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genrelay_events::EventBus;
use genrelay_pipeline::Orchestrator;
use genrelay_queue::{JobQueue, SnapshotStore};
use genrelay_worker::telegram::TelegramPoller;
use genrelay_worker::{app, console, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "genrelay_worker=info,genrelay_pipeline=info,genrelay_queue=info,\
                 genrelay_providers=info,genrelay_events=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        preset = %config.preset,
        dry_run = config.dry_run,
        queue_path = %config.queue_path.display(),
        "Loaded worker configuration",
    );

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    // --- Pipeline ---
    let chain = app::build_chain(&config, &http)?;
    let notifier = app::build_notifier(&config, &http)?;

    // --- Queue ---
    let (queue, interrupted) = JobQueue::open(SnapshotStore::new(&config.queue_path)).await;
    if !queue.is_persistent().await {
        tracing::warn!("Queue snapshot unavailable, running without persistence");
    }
    let queue = Arc::new(queue.with_job_gap(config.job_gap));
    tracing::info!(pending = queue.len().await, interrupted = interrupted.len(), "Queue restored");

    // --- Event bus ---
    let events = Arc::new(EventBus::default());
    let cancel = CancellationToken::new();
    let logger_handle = app::spawn_event_logger(&events, cancel.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&queue),
        chain,
        Arc::clone(&notifier),
        Arc::clone(&events),
    ));
    orchestrator.report_interrupted(&interrupted).await;
    orchestrator.start_processing();

    // --- Shutdown ---
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // --- Inbound ---
    if config.dry_run {
        console::run(Arc::clone(&orchestrator), notifier, cancel.clone()).await;
        app::wait_until_idle(&orchestrator, &cancel).await;
    } else {
        let telegram = app::telegram_config(&config)?;
        TelegramPoller::new(http, telegram, config.telegram_long_poll_secs)
            .run(Arc::clone(&orchestrator), notifier, cancel.clone())
            .await;
    }

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;
    tracing::info!(
        pending = queue.len().await,
        in_flight = ?queue.in_flight().await,
        "Worker stopped",
    );
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
