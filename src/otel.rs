//! OpenTelemetry log export.
//!
//! When an OTLP endpoint is configured, every `tracing` event that passes the
//! env filter is also shipped as an OTel log record over gRPC, batched and
//! tagged with the service resource below.

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::{runtime, Resource};

pub const SERVICE_NAME: &str = "greenhouse-app";
pub const SERVICE_INSTANCE_ID: &str = "instance-1";

#[derive(Debug, thiserror::Error)]
pub enum OtelError {
    #[error("failed to build OTLP log exporter: {0}")]
    Exporter(String),
    #[error("failed to flush OTLP logs: {0}")]
    Shutdown(String),
}

/// Resource identifying this process in exported records.
pub fn resource() -> Resource {
    Resource::new([
        KeyValue::new("service.name", SERVICE_NAME),
        KeyValue::new("service.instance.id", SERVICE_INSTANCE_ID),
    ])
}

/// Build a logger provider exporting to `endpoint` (e.g. `http://localhost:4317`).
///
/// Must be called inside the tokio runtime; the batch processor runs on it.
pub fn log_provider(endpoint: &str) -> Result<LoggerProvider, OtelError> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| OtelError::Exporter(e.to_string()))?;

    Ok(LoggerProvider::builder()
        .with_resource(resource())
        .with_batch_exporter(exporter, runtime::Tokio)
        .build())
}

/// Flush pending records and stop the exporter.
pub fn shutdown(provider: &LoggerProvider) -> Result<(), OtelError> {
    provider
        .shutdown()
        .map_err(|e| OtelError::Shutdown(e.to_string()))
}
