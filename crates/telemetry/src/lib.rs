//! OpenTelemetry metrics for Turnstile.
//!
//! [`init`] installs the process-wide meter provider; the admission engine records on [`metrics::meter`].

pub mod metrics;

use config::TelemetryConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Owns the installed meter provider. Dropping it pushes what is left and stops the exporter.
pub struct TelemetryGuard {
    provider: SdkMeterProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(error) = self.provider.force_flush() {
            log::warn!("Could not push the last metrics before shutdown: {error}");
        }

        match self.provider.shutdown() {
            Ok(()) => log::debug!("Meter provider shut down"),
            Err(error) => log::error!("Failed to shut the meter provider down: {error}"),
        }
    }
}

/// Installs the global meter provider.
///
/// Without an enabled exporter, metrics are still recorded but never leave the process.
pub async fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let provider = metrics::init_metrics(config).await?;

    Ok(TelemetryGuard { provider })
}
