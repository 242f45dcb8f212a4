//! Prometheus HTTP API access
//!
//! - `client` - reqwest-based client with per-call timeouts
//! - `signer` - request signing (SigV4 for Amazon Managed Prometheus)
//! - `types` - response shapes and parsing
//! - `error` - listing and lookup errors

mod client;
mod error;
mod signer;
mod types;

pub use client::{PrometheusClient, count_query};
pub use error::{LookupError, PrometheusError};
pub use signer::{NoSigner, RequestSigner, SigV4Signer};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to a metrics backend
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Every metric name with samples at instant `at`
    async fn list_metric_names(&self, at: DateTime<Utc>) -> Result<Vec<String>, PrometheusError>;

    /// Number of series of metric `name` at instant `at`
    async fn instant_count(&self, name: &str, at: DateTime<Utc>) -> Result<u64, LookupError>;
}
