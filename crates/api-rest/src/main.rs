//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own, against the file store.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the REST server (with
//! OpenAPI/Swagger UI). The workspace's main `portal-run` binary also runs the tiered store
//! reconciler and the facility refresh feed.

use api_rest::{router, AppState, ServerSettings};
use portal_core::logging::init_tracing;
use portal_core::repositories::FileStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ServerSettings::from_env()?;
    init_tracing(&settings.log_directive(), settings.suppression())?;

    tracing::info!("-- Starting care portal REST API on {}", settings.rest_addr);

    if !settings.cfg.data_dir().exists() {
        anyhow::bail!(
            "Portal data directory does not exist: {}",
            settings.cfg.data_dir().display()
        );
    }

    let store = Arc::new(FileStore::new(settings.cfg.clone()));
    let state = AppState::new(
        settings.cfg.clone(),
        store,
        settings.triage(),
        settings.api_key.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&settings.rest_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
