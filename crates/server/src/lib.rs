//! Turnstile server library.
//!
//! Provides a reusable server function to serve Turnstile either for the binary, or for the integration tests,
//! and the admission middleware for services that embed admission control in their own router.

#![deny(missing_docs)]

mod admission;
mod check;
mod headers;
mod health;
mod identity;
mod response;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use ::admission::{AdmissionEngineBuilder, InMemoryCounterStore, spawn_sweeper};
use anyhow::anyhow;
use axum::Router;
use axum_server::{Handle, tls_rustls::RustlsConfig};
use config::{AdmissionConfig, Config};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::admission::Gate;

pub use crate::admission::{AdmissionLayer, AdmissionService};

/// Configuration for serving Turnstile.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Turnstile TOML configuration.
    pub config: Config,
    /// Cancel to stop accepting connections, drain in-flight requests and stop the counter sweeper.
    pub shutdown: CancellationToken,
}

/// Starts and runs the Turnstile server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let _telemetry = telemetry::init(&config.telemetry).await?;

    let mut app = Router::new();

    let gate = if config.admission.enabled {
        log::debug!("Initializing admission engine with configured policies");
        let engine = admission_engine(&config.admission, &shutdown)?;

        Some(Arc::new(Gate::new(Arc::new(engine), config.server.identity.clone())))
    } else {
        log::debug!("Admission control disabled - every request is let through");
        None
    };

    if config.server.check.enabled {
        app = app.merge(check::router(&config.server.check.path, gate));
    } else {
        log::warn!("The check endpoint is disabled, the server exposes no admission endpoint");
    }

    if config.server.health.enabled {
        if let Some(listen) = config.server.health.listen {
            tokio::spawn(health::bind_health_endpoint(
                listen,
                config.server.tls.clone(),
                config.server.health.clone(),
                shutdown.child_token(),
            ));
        } else {
            app = app.merge(health::router(&config.server.health));
        }
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    let check_path = &config.server.check.path;

    match &config.server.tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

            log::info!("Admission check endpoint available at: https://{listen_address}{check_path}");

            let handle = Handle::new();
            tokio::spawn(shutdown_on_cancel(handle.clone(), shutdown));

            axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .map_err(|e| anyhow!("Failed to start HTTPS server: {e}"))?;
        }
        None => {
            log::info!("Admission check endpoint available at: http://{listen_address}{check_path}");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;
        }
    }

    Ok(())
}

/// Builds the engine on a bounded in-memory store, and starts reclaiming stale counters until shutdown.
fn admission_engine(
    config: &AdmissionConfig,
    shutdown: &CancellationToken,
) -> anyhow::Result<::admission::AdmissionEngine> {
    let counters = &config.counters;

    let store = match counters.max_entries {
        Some(max_entries) => InMemoryCounterStore::new().max_entries(max_entries),
        None => InMemoryCounterStore::new(),
    };

    let store = Arc::new(store);

    spawn_sweeper(
        store.clone(),
        counters.sweep_interval,
        counters.retention,
        shutdown.child_token(),
    );

    log::info!(
        "Admission enabled with {} plan(s), {} endpoint weight(s) and {} fallback route(s)",
        config.plans.len(),
        config.weights.len(),
        config.fallback_routes.len()
    );

    Ok(AdmissionEngineBuilder::from_config(config)?.store(store).build())
}

pub(crate) async fn shutdown_on_cancel(handle: Handle, shutdown: CancellationToken) {
    shutdown.cancelled().await;
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
