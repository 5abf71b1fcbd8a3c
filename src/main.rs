use api_rest::{router, AppState, ServerSettings};
use portal_core::logging::init_tracing;
use portal_core::model::UrgencyLevel;
use portal_core::notify::TracingNotifier;
use portal_core::refresh::{AppointmentFeed, FeedSources, PollSource, ReconciledBatch};
use portal_core::repositories::{AppointmentService, FileStore, TieredStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Main entry point for the care portal
///
/// Runs concurrently:
/// - the REST server on port 3000 (configurable via PORTAL_REST_ADDR)
/// - a reconciler that retries appointment writes the file store rejected
/// - optionally, a refresh feed for one facility's appointments (PORTAL_WATCH_FACILITY)
///
/// Everything stops on Ctrl-C. See `api_rest::settings` for the remaining environment
/// variables.
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ServerSettings::from_env()?;
    init_tracing(&settings.log_directive(), settings.suppression())?;

    tracing::info!("++ Starting care portal REST on {}", settings.rest_addr);

    let store = Arc::new(TieredStore::new(FileStore::new(settings.cfg.clone())));
    let triage = settings.triage();
    let state = AppState::new(
        settings.cfg.clone(),
        store.clone(),
        triage.clone(),
        settings.api_key.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = tokio::spawn(reconcile_pending(
        store.clone(),
        settings.cfg.poll_interval(),
        shutdown_rx.clone(),
    ));

    let feed = match std::env::var("PORTAL_WATCH_FACILITY").ok().filter(|f| !f.is_empty()) {
        Some(facility_id) => {
            tracing::info!(facility_id = %facility_id, "++ Watching facility appointments");
            let sources = FeedSources::poll(PollSource::facility(
                settings.cfg.poll_interval(),
                AppointmentService::new(store.clone()),
                facility_id,
            ));
            let feed = AppointmentFeed::new(
                triage.with_own_cache(),
                Arc::new(TracingNotifier),
                settings.cfg.notify_window(),
            );
            let (tx, rx) = mpsc::channel(8);
            let consumer = tokio::spawn(log_batches(rx));
            let shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                let exit = feed.run(sources, tx, shutdown).await;
                tracing::info!(?exit, "appointment feed stopped");
                let _ = consumer.await;
            }))
        }
        None => None,
    };

    let listener = tokio::net::TcpListener::bind(&settings.rest_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
            }
        })
        .await?;

    tracing::info!("-- Shutting down");
    let _ = shutdown_tx.send(true);
    reconciler.await?;
    if let Some(feed) = feed {
        feed.await?;
    }

    Ok(())
}

/// Retries pending remote writes every `interval` until shutdown.
async fn reconcile_pending(
    store: Arc<TieredStore<FileStore>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => break,
            _ = ticker.tick() => {
                let store = store.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || store.reconcile()).await {
                    tracing::error!("reconcile task failed: {e}");
                }
            }
        }
    }
    let remaining = store.pending().len();
    if remaining > 0 {
        tracing::warn!(remaining, "appointment writes still pending at shutdown");
    }
}

async fn log_batches(mut rx: mpsc::Receiver<ReconciledBatch>) {
    while let Some(batch) = rx.recv().await {
        let critical = batch
            .appointments
            .iter()
            .filter(|a| a.triage.level == UrgencyLevel::Red)
            .count();
        tracing::info!(
            appointments = batch.appointments.len(),
            critical,
            notifications = batch.notifications.len(),
            "facility appointments refreshed"
        );
    }
}
