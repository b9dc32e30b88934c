//! Where admission metrics are pushed to.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

const GRPC_ENDPOINT: &str = "http://localhost:4317";
const HTTP_ENDPOINT: &str = "http://localhost:4318/v1/metrics";

/// Metric exporters. OTLP is the only one.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ExportersConfig {
    /// The OTLP exporter.
    pub otlp: OtlpExporterConfig,
}

/// Push-based OTLP metric export.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtlpExporterConfig {
    /// Off unless configured.
    pub enabled: bool,
    /// Collector URL. Without one, the local collector's conventional address for the protocol is used.
    endpoint: Option<Url>,
    /// Transport to the collector.
    pub protocol: OtlpProtocol,
    /// Deadline of a single export call.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// How often the accumulated metrics are pushed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub export_interval: Duration,
}

impl OtlpExporterConfig {
    /// The collector URL metrics are sent to.
    pub fn endpoint(&self) -> Result<Url, url::ParseError> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => Url::parse(self.protocol.default_endpoint()),
        }
    }
}

impl Default for OtlpExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            protocol: OtlpProtocol::Grpc,
            timeout: Duration::from_secs(10),
            export_interval: Duration::from_secs(15),
        }
    }
}

/// OTLP transport.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    /// gRPC, the default.
    #[default]
    Grpc,
    /// Protobuf over HTTP.
    Http,
}

impl OtlpProtocol {
    fn default_endpoint(self) -> &'static str {
        match self {
            OtlpProtocol::Grpc => GRPC_ENDPOINT,
            OtlpProtocol::Http => HTTP_ENDPOINT,
        }
    }
}
