//! Meter provider setup and metric names.

use anyhow::Context;
use config::{OtlpProtocol, TelemetryConfig};
use opentelemetry::metrics::Meter;
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

const METER_NAME: &str = "turnstile";

/// Admission decisions, by `outcome`, `scope` and `fallback`.
pub const ADMISSION_DECISIONS: &str = "admission.decisions";

/// Admission decisions that could not be made because the counter store failed.
pub const ADMISSION_COUNTER_FAULTS: &str = "admission.counter_faults";

/// Time spent deciding, in milliseconds. Includes the entitlement lookups.
pub const ADMISSION_DECISION_DURATION: &str = "admission.decision.duration";

/// The global meter all admission metrics are recorded on.
pub fn meter() -> Meter {
    opentelemetry::global::meter(METER_NAME)
}

pub(crate) async fn init_metrics(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    let meter_provider = create_meter_provider(config)?;

    opentelemetry::global::set_meter_provider(meter_provider.clone());

    log::info!(
        "Telemetry metrics initialized for service '{}'",
        config.service_name().unwrap_or(METER_NAME)
    );

    Ok(meter_provider)
}

fn create_meter_provider(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    let Some(exporter_config) = config.metrics_otlp_config() else {
        log::debug!("No metrics exporter enabled, metrics will not be exported");
        return Ok(SdkMeterProvider::builder().build());
    };

    let mut resource = Resource::builder();

    if let Some(service_name) = config.service_name() {
        resource = resource.with_service_name(service_name.to_string());
    }

    for (key, value) in config.resource_attributes() {
        resource = resource.with_attribute(KeyValue::new(Key::from(key.clone()), Value::from(value.clone())));
    }

    let endpoint = exporter_config
        .endpoint()
        .context("Invalid OTLP metrics endpoint")?;

    let exporter = match exporter_config.protocol {
        OtlpProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint.as_str())
            .with_timeout(exporter_config.timeout)
            .build(),
        OtlpProtocol::Http => MetricExporter::builder()
            .with_http()
            .with_endpoint(endpoint.as_str())
            .with_timeout(exporter_config.timeout)
            .build(),
    }
    .with_context(|| format!("Failed to create {:?} OTLP metric exporter for {endpoint}", exporter_config.protocol))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(exporter_config.export_interval)
        .build();

    log::info!(
        "Exporting metrics to {endpoint} over {:?} every {:?}",
        exporter_config.protocol,
        exporter_config.export_interval
    );

    Ok(SdkMeterProvider::builder()
        .with_resource(resource.build())
        .with_reader(reader)
        .build())
}
