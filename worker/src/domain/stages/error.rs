use thiserror::Error;

use crate::data::{IngestError, PrometheusError, PublishReport, QueueError};

/// Failure of a whole stage invocation. Messages of a failed delivery group
/// are left on their queue for redelivery.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Failed to list metric names: {0}")]
    ListNames(#[from] PrometheusError),

    #[error("Failed to publish to {queue}: {failed} of {attempted} jobs not sent ({reason})")]
    Publish {
        queue: String,
        attempted: usize,
        failed: usize,
        reason: String,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Failed to record results: {0}")]
    Ingest(#[from] IngestError),
}

impl StageError {
    pub fn publish(queue: &str, report: &PublishReport) -> Self {
        Self::Publish {
            queue: queue.to_string(),
            attempted: report.attempted,
            failed: report.attempted - report.sent,
            reason: report
                .last_error
                .clone()
                .unwrap_or_else(|| "jobs could not be encoded".to_string()),
        }
    }
}
