//! Process startup and graceful shutdown.

use crate::config::Config;
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use timebank_core::environment::SystemClock;
use timebank_postgres::PostgresStore;
use timebank_web::mail::{LogMailer, Mailer, SmtpMailer};
use timebank_web::rate_limit::RateLimiter;
use timebank_web::realtime::RoomHub;
use timebank_web::{build_router, AppState, JwtKeys};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Connects the store and builds the shared state.
///
/// # Errors
///
/// Fails when the database is unreachable, a migration fails, or the SMTP
/// settings are invalid.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
        .connect(&config.database.url)
        .await
        .context("failed to connect to database")?;
    let store = PostgresStore::from_pool(pool);
    store.migrate().await.context("failed to run migrations")?;
    info!("Database ready");

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Using SMTP mailer");
            Arc::new(SmtpMailer::new(smtp.settings()).context("invalid SMTP settings")?)
        }
        None => Arc::new(LogMailer),
    };

    Ok(AppState {
        store: Arc::new(store),
        clock: Arc::new(SystemClock),
        hub: RoomHub::new(),
        mailer,
        jwt: JwtKeys::from_secret(config.auth.jwt_secret.as_bytes()),
        limiter: RateLimiter::new(config.rate_limit()),
    })
}

/// Installs the Prometheus recorder and its scrape listener.
///
/// # Errors
///
/// Fails when the metrics port cannot be bound.
pub fn install_metrics(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener((Ipv4Addr::UNSPECIFIED, port))
        .install()
        .context("failed to install Prometheus exporter")?;
    timebank_web::metrics::describe();
    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Runs the server until Ctrl+C or SIGTERM, then gives in-flight requests
/// `shutdown_timeout` seconds to finish.
///
/// # Errors
///
/// Fails when startup fails or the listener cannot bind.
pub async fn run(config: Config) -> anyhow::Result<()> {
    install_metrics(config.server.metrics_port)?;
    let state = build_state(&config).await?;
    let cleanup = state.limiter.spawn_cleanup();
    let app = build_router(state, &config.server.frontend_url);

    let addr = config.bind_addr().context("invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "TimeBank server listening");

    let (stopping_tx, mut stopping_rx) = watch::channel(false);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = stopping_tx.send(true);
    })
    .into_future();

    let grace = Duration::from_secs(config.server.shutdown_timeout);
    tokio::select! {
        result = server => result.context("server error")?,
        () = async {
            if stopping_rx.wait_for(|stopping| *stopping).await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(timeout_secs = grace.as_secs(), "Shutdown timeout elapsed; closing open connections");
        }
    }

    cleanup.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down gracefully..."),
        () = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}
