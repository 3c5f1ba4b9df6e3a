//! IntelliCaster Director
//!
//! Runs the director loop against the first detected sim and serves the
//! event API.

use anyhow::Result;
use caster_core::RaceStore;
use caster_director::{
    api,
    camera::LoggingCamera,
    commentary::TemplateCommentary,
    state::AppState,
    store::{default_data_dir, JsonlStore, MemoryStore},
    Director, DirectorConfig,
};
use caster_sources::{DemoSource, IRacingSource};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Telemetry kept in memory when the data directory is unusable
const FALLBACK_TELEMETRY_RECORDS: usize = 600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting IntelliCaster Director");

    let data_dir = default_data_dir();
    let store: Arc<dyn RaceStore> = match JsonlStore::open(&data_dir) {
        Ok(store) => {
            info!("Persisting race data to {}", store.dir().display());
            Arc::new(store)
        }
        Err(e) => {
            warn!("Cannot open data dir {}: {}, keeping data in memory", data_dir.display(), e);
            Arc::new(MemoryStore::with_telemetry_limit(FALLBACK_TELEMETRY_RECORDS))
        }
    };

    let mut config = DirectorConfig::load_or_default(&data_dir.join("config.json"));
    config.apply_settings(store.as_ref());

    // Create application state
    let state = AppState::new();
    state.register_source(Box::new(IRacingSource::new())).await;
    state.register_source(Box::new(DemoSource::new())).await;

    let camera = Arc::new(LoggingCamera::new(config.camera_count));
    let director = Director::new(config, state.source_manager(), state.queue.clone())
        .with_store(store)
        .with_commentary(Arc::new(TemplateCommentary::new()))
        .with_camera(camera)
        .with_event_sender(state.events_tx.clone())
        .with_feed(state.feed.clone());

    let handle = director.start();
    let control = handle.control();
    *state.director.write().await = Some(control.clone());

    // Build the router
    let app = api::create_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 9100));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
            control.stop();
        })
        .await?;

    handle.stop();
    handle.join().await?;

    Ok(())
}
