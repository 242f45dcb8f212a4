//! Export of top-N results as an OpenTelemetry gauge
//!
//! Each record becomes one observation of `metrics_cardinality_count` with a
//! `metric_name` attribute, pushed over OTLP/HTTP. The exporter uses a
//! blocking HTTP client, so building, flushing and shutting down the provider
//! run on the blocking pool.
//!
//! Delta temporality clears the gauge after every collection, so a flush
//! carries only the names recorded since the previous one. A name that left
//! the top N is not exported again.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Gauge, MeterProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider, Temporality};
use thiserror::Error;

use crate::core::constants::SERVICE_NAME;
use crate::domain::cardinality::CardinalityRecord;

pub const GAUGE_NAME: &str = "metrics_cardinality_count";
pub const GAUGE_DESCRIPTION: &str = "Cardinality count for top N metrics in the workspace";
pub const METRIC_NAME_ATTRIBUTE: &str = "metric_name";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("OTLP exporter setup failed: {0}")]
    Exporter(String),

    #[error("Metrics export failed: {0}")]
    Export(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Destination for top-N results
#[async_trait]
pub trait CardinalitySink: Send + Sync {
    /// Record every entry and make sure it left the process
    async fn record(&self, records: &[CardinalityRecord]) -> Result<(), IngestError>;

    /// Flush and release exporter resources
    async fn shutdown(&self) -> Result<(), IngestError>;
}

/// OTLP gauge exporter
pub struct OtlpGaugeSink {
    provider: SdkMeterProvider,
    gauge: Gauge<u64>,
}

impl OtlpGaugeSink {
    /// `endpoint` is the full metrics URL. Without it the exporter falls back
    /// to the standard `OTEL_EXPORTER_OTLP_*` environment variables.
    pub async fn new(endpoint: Option<String>) -> Result<Self, IngestError> {
        tokio::task::spawn_blocking(move || Self::build(endpoint)).await?
    }

    fn build(endpoint: Option<String>) -> Result<Self, IngestError> {
        let mut builder = opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_temporality(Temporality::Delta);
        if let Some(endpoint) = &endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }
        let exporter = builder
            .build()
            .map_err(|e| IngestError::Exporter(e.to_string()))?;

        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter).build())
            .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
            .build();

        let gauge = provider
            .meter(SERVICE_NAME)
            .u64_gauge(GAUGE_NAME)
            .with_description(GAUGE_DESCRIPTION)
            .build();

        tracing::debug!(endpoint = ?endpoint, "OTLP gauge exporter initialized");
        Ok(Self { provider, gauge })
    }
}

#[async_trait]
impl CardinalitySink for OtlpGaugeSink {
    async fn record(&self, records: &[CardinalityRecord]) -> Result<(), IngestError> {
        for record in records {
            self.gauge.record(
                record.count,
                &[KeyValue::new(METRIC_NAME_ATTRIBUTE, record.name.clone())],
            );
        }

        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.force_flush())
            .await?
            .map_err(|e| IngestError::Export(e.to_string()))
    }

    async fn shutdown(&self) -> Result<(), IngestError> {
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.shutdown())
            .await?
            .map_err(|e| IngestError::Export(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_pushes_to_collector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/metrics"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = OtlpGaugeSink::new(Some(format!("{}/v1/metrics", server.uri())))
            .await
            .unwrap();
        sink.record(&[
            CardinalityRecord::new("http_requests_total", 90, 7),
            CardinalityRecord::new("up", 3, 7),
        ])
        .await
        .unwrap();
        sink.shutdown().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!requests.is_empty());
        assert_eq!(
            requests[0].headers["content-type"],
            "application/x-protobuf"
        );
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains(GAUGE_NAME));
        assert!(body.contains("http_requests_total"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_flush_exports_only_latest_entries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/metrics"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = OtlpGaugeSink::new(Some(format!("{}/v1/metrics", server.uri())))
            .await
            .unwrap();
        sink.record(&[CardinalityRecord::new("dropped_out_metric", 5, 2)])
            .await
            .unwrap();
        sink.record(&[CardinalityRecord::new("still_ranked_metric", 7, 2)])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() >= 2);
        let first = String::from_utf8_lossy(&requests[0].body);
        assert!(first.contains("dropped_out_metric"));
        let second = String::from_utf8_lossy(&requests[1].body);
        assert!(second.contains("still_ranked_metric"));
        assert!(!second.contains("dropped_out_metric"));

        sink.shutdown().await.unwrap();
    }
}
