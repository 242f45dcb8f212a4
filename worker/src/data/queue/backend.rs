//! Queue backend trait definition
//!
//! Defines the interface for queue implementations (memory and SQS).
//! Delivery is at-least-once: a received message stays invisible for a while
//! and comes back unless it is deleted.

use std::time::Duration;

use async_trait::async_trait;

use super::error::QueueError;

/// Message entry to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Entry id, unique within one batch
    pub id: String,
    pub body: String,
}

/// Message received from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    /// Handle for deletion. `None` when the message came from an event that
    /// the trigger acknowledges on its own.
    pub receipt: Option<String>,
    pub body: String,
}

/// Entry the queue refused within an otherwise accepted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub id: String,
    pub reason: String,
}

/// Per-entry outcome of one batch send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSendResult {
    pub sent: usize,
    pub failed: Vec<FailedEntry>,
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Send up to 10 entries in one request
    async fn send_batch(
        &self,
        queue: &str,
        entries: Vec<OutgoingMessage>,
    ) -> Result<BatchSendResult, QueueError>;

    /// Receive up to `max_messages`, waiting at most `wait` when the queue is
    /// empty
    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete up to 10 received messages by receipt
    async fn delete_batch(&self, queue: &str, receipts: &[String]) -> Result<(), QueueError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
