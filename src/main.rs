use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use reservd::api::{self, AppState};
use reservd::compactor;
use reservd::config::Config;
use reservd::engine::Engine;
use reservd::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reservd=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    reservd::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let notify = Arc::new(NotifyHub::new());
    let engine = match Engine::new(wal_path.clone(), notify) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(path = %wal_path.display(), "cannot open reservation store: {e}");
            return Err(e.into());
        }
    };

    if config.seed_tables {
        let seeded = engine.seed_tables_if_empty().await;
        if seeded > 0 {
            info!("seeded {seeded} tables");
        }
    }

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    let app = api::router(AppState::new(engine.clone(), &config), &config);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("reservd listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  cors_origin: {}", config.cors_origin);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final compaction so the next start replays a short log
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("shutdown compaction failed: {e}");
    }
    info!("reservd stopped");
    Ok(())
}

/// Resolves on SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining connections");
}
