//! External systems the pipeline talks to
//!
//! - `prometheus` - metric name listing and per-metric series counts
//! - `queue` - message queues between stages (memory and SQS)
//! - `otlp` - gauge export of the final top-N list

pub mod otlp;
pub mod prometheus;
pub mod queue;

pub use otlp::{CardinalitySink, IngestError, OtlpGaugeSink};
pub use prometheus::{LookupError, MetricsBackend, PrometheusClient, PrometheusError};
pub use queue::{Delivery, PublishReport, QueueError, QueueService};
