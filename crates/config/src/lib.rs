//! Turnstile configuration structures to map the turnstile.toml configuration.

#![deny(missing_docs)]

mod admission;
mod loader;
mod server;
mod telemetry;

use std::path::Path;

pub use admission::*;
pub use server::{CheckEndpointConfig, HealthConfig, IdentityConfig, ServerConfig, TlsServerConfig};
pub use telemetry::{ExportersConfig, OtlpExporterConfig, OtlpProtocol, TelemetryConfig};

use serde::Deserialize;

/// Main configuration structure for the Turnstile application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission control settings.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Telemetry configuration settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates the admission configuration, returning warnings for suspicious but valid setups.
    pub fn validate(&self) -> anyhow::Result<Vec<String>> {
        loader::validate_admission(&self.admission)
    }
}
