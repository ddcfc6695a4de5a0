//! user-segmentation server entry point.
//!
//! Loads configuration, checks the database schema, starts the tidy
//! sweeper and serves the REST API until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use user_segmentation::api;
use user_segmentation::app_state::AppState;
use user_segmentation::config::{ServiceConfig, LogFormat};
use user_segmentation::persistence::{PostgresStore, SegmentationStore, schema};
use user_segmentation::service::{SegmentationService, TidySweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so a .env file can set RUST_LOG
    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    init_tracing(config.log_format);
    tracing::info!(?config, "starting user-segmentation");

    // Connect and check the schema
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(config.database_connect_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    schema::prepare(&pool, config.create_tables, config.audit_log_enabled)
        .await
        .context("database schema check failed")?;

    // Build service layer
    let store: Arc<dyn SegmentationStore> = Arc::new(PostgresStore::new(pool.clone()));
    let service = Arc::new(SegmentationService::new(store, config.audit_log_enabled));
    let sweeper = TidySweeper::new(Arc::clone(&service), config.tidy_interval).spawn();

    // Build router
    let app = api::build_app(AppState::new(service), config.request_timeout);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutting down");
    sweeper.shutdown().await;
    pool.close().await;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
