use std::collections::BTreeMap;

use serde::Deserialize;

pub mod exporters;

pub use self::exporters::{ExportersConfig, OtlpExporterConfig, OtlpProtocol};

/// Telemetry configuration for admission metrics.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name for telemetry identification
    service_name: Option<String>,

    /// Custom resource attributes to attach to all telemetry
    resource_attributes: BTreeMap<String, String>,

    /// Exporters used for metrics
    exporters: ExportersConfig,
}

impl TelemetryConfig {
    /// Get the service name
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Get the resource attributes
    pub fn resource_attributes(&self) -> &BTreeMap<String, String> {
        &self.resource_attributes
    }

    /// The OTLP exporter for metrics, only if it is enabled
    pub fn metrics_otlp_config(&self) -> Option<&OtlpExporterConfig> {
        let otlp = &self.exporters.otlp;
        otlp.enabled.then_some(otlp)
    }
}
