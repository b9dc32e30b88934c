use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Json, Router, routing::get};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use config::{HealthConfig, TlsServerConfig};
use http::StatusCode;
use tokio_util::sync::CancellationToken;

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum HealthState {
    Healthy,
}

/// Handles health check requests. Never metered.
pub(crate) async fn health() -> (StatusCode, Json<HealthState>) {
    (StatusCode::OK, Json(HealthState::Healthy))
}

pub(crate) fn router(config: &HealthConfig) -> Router {
    Router::new().route(&config.path, get(health))
}

/// Serves the health endpoint on its own listener until shutdown.
pub(super) async fn bind_health_endpoint(
    addr: SocketAddr,
    tls_config: Option<TlsServerConfig>,
    health_config: HealthConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let scheme = if tls_config.is_some() { "https" } else { "http" };
    let path = &health_config.path;
    let app = router(&health_config).into_make_service();

    log::info!("Health check endpoint exposed at {scheme}://{addr}{path}");

    let handle = Handle::new();
    tokio::spawn(crate::shutdown_on_cancel(handle.clone(), shutdown));

    match tls_config {
        Some(tls) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls.certificate, &tls.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app)
                .await
                .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"))?;
        }
        None => axum_server::bind(addr)
            .handle(handle)
            .serve(app)
            .await
            .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"))?,
    }

    Ok(())
}
