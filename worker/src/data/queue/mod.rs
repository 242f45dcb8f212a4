//! Message queues between pipeline stages
//!
//! Pluggable backends behind [`QueueBackend`]:
//! - In-memory - single process, for local runs and tests
//! - SQS - durable, shared across invocations
//!
//! [`QueueService`] adds what every stage needs on top of a backend:
//! JSON encoding, batching into transport calls of at most
//! [`MAX_BATCH_SIZE`] entries with fresh UUID entry ids, retries of transient
//! failures, and deletion of handled delivery groups.

mod backend;
mod error;
mod event;
mod memory;
mod sqs;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

pub use backend::{BatchSendResult, FailedEntry, OutgoingMessage, QueueBackend, QueueMessage};
pub use error::QueueError;
pub use event::{STDIN_SOURCE, SqsEvent, SqsEventRecord};
pub use memory::MemoryQueueBackend;
pub use sqs::SqsQueueBackend;

use crate::core::config::{QueueBackendType, QueueConfig};
use crate::domain::cardinality::split;
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_with_backoff};

/// Most entries one send or delete call may carry
pub const MAX_BATCH_SIZE: usize = 10;

/// The messages one stage invocation handles together
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    /// Queue the messages were received from. `None` when they arrived in an
    /// invocation event.
    pub queue: Option<String>,
    pub messages: Vec<QueueMessage>,
}

impl Delivery {
    pub fn from_event(messages: Vec<QueueMessage>) -> Self {
        Self {
            queue: None,
            messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Outcome of publishing a list of jobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Jobs handed to `publish`
    pub attempted: usize,
    pub sent: usize,
    /// Jobs the queue refused or that never reached it
    pub failed: usize,
    /// Jobs that could not be encoded
    pub skipped: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub last_error: Option<String>,
}

impl PublishReport {
    /// Every job reached the queue
    pub fn is_complete(&self) -> bool {
        self.sent == self.attempted
    }

    /// There was something to send and none of it arrived
    pub fn nothing_sent(&self) -> bool {
        self.attempted > 0 && self.sent == 0
    }
}

/// Queue access shared by all stages
#[derive(Clone)]
pub struct QueueService {
    backend: Arc<dyn QueueBackend>,
    max_messages: usize,
    wait: Duration,
}

impl QueueService {
    pub fn new(backend: Arc<dyn QueueBackend>, max_messages: usize, wait: Duration) -> Self {
        Self {
            backend,
            max_messages: max_messages.clamp(1, MAX_BATCH_SIZE),
            wait,
        }
    }

    /// In-memory queues that never block on receive
    pub fn memory() -> Self {
        Self::new(
            Arc::new(MemoryQueueBackend::new()),
            MAX_BATCH_SIZE,
            Duration::ZERO,
        )
    }

    pub async fn from_config(config: &QueueConfig, region: Option<String>) -> Self {
        let backend: Arc<dyn QueueBackend> = match config.backend {
            QueueBackendType::Memory => Arc::new(MemoryQueueBackend::new()),
            QueueBackendType::Sqs => Arc::new(SqsQueueBackend::new(region).await),
        };
        tracing::debug!(
            backend = backend.backend_name(),
            max_messages = config.max_messages,
            wait_secs = config.wait_secs,
            "Queue service initialized"
        );
        Self::new(backend, config.max_messages, config.wait())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Encode `jobs` as JSON and send them in batches of at most
    /// [`MAX_BATCH_SIZE`].
    ///
    /// Jobs that fail to encode are skipped. A batch that fails after retries
    /// is counted as failed and the remaining batches are still sent.
    pub async fn publish<T>(&self, queue: &str, jobs: &[T]) -> PublishReport
    where
        T: Serialize + Sync,
    {
        let mut report = PublishReport {
            attempted: jobs.len(),
            ..Default::default()
        };

        let mut entries = Vec::with_capacity(jobs.len());
        for job in jobs {
            match serde_json::to_string(job) {
                Ok(body) => entries.push(OutgoingMessage {
                    id: Uuid::new_v4().to_string(),
                    body,
                }),
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(queue, error = %e, "Skipping job that failed to encode");
                }
            }
        }

        for batch in split(entries, MAX_BATCH_SIZE) {
            report.batches += 1;
            let size = batch.len();

            let result = retry_with_backoff(
                DEFAULT_MAX_ATTEMPTS,
                DEFAULT_BASE_DELAY_MS,
                QueueError::is_transient,
                || self.backend.send_batch(queue, batch.clone()),
            )
            .await;

            match result {
                Ok(result) => {
                    report.sent += result.sent;
                    if !result.failed.is_empty() {
                        report.failed += result.failed.len();
                        report.failed_batches += 1;
                        for entry in &result.failed {
                            tracing::warn!(queue, id = %entry.id, reason = %entry.reason, "Queue refused entry");
                        }
                        report.last_error = result.failed.last().map(|f| f.reason.clone());
                    }
                }
                Err(e) => {
                    report.failed += size;
                    report.failed_batches += 1;
                    tracing::error!(queue, batch_size = size, error = %e, "Failed to send batch");
                    report.last_error = Some(e.to_string());
                }
            }
        }

        tracing::debug!(
            queue,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            batches = report.batches,
            "Published jobs"
        );
        report
    }

    /// Receive one delivery group from `queue`
    pub async fn receive(&self, queue: &str) -> Result<Delivery, QueueError> {
        let messages = self
            .backend
            .receive(queue, self.max_messages, self.wait)
            .await?;
        Ok(Delivery {
            queue: Some(queue.to_string()),
            messages,
        })
    }

    /// Delete a handled delivery group. Event deliveries are left to their
    /// trigger. Returns the number of messages deleted.
    pub async fn ack(&self, delivery: &Delivery) -> Result<usize, QueueError> {
        let Some(queue) = delivery.queue.as_deref() else {
            return Ok(0);
        };

        let receipts: Vec<String> = delivery
            .messages
            .iter()
            .filter_map(|m| m.receipt.clone())
            .collect();
        let total = receipts.len();

        for chunk in split(receipts, MAX_BATCH_SIZE) {
            retry_with_backoff(
                DEFAULT_MAX_ATTEMPTS,
                DEFAULT_BASE_DELAY_MS,
                QueueError::is_transient,
                || self.backend.delete_batch(queue, &chunk),
            )
            .await?;
        }
        Ok(total)
    }
}
