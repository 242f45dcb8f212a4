//! In-memory queue backend
//!
//! Local-only queues for single-process runs and tests:
//! - FIFO per queue name
//! - received messages stay in flight until deleted and become visible
//!   again once the visibility timeout passes
//! - receivers wait on a per-queue notifier instead of polling
//!
//! Process exit loses every message.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::MAX_BATCH_SIZE;
use super::backend::{BatchSendResult, OutgoingMessage, QueueBackend, QueueMessage};
use super::error::QueueError;

const BACKEND: &str = "memory";

/// Default time a received message stays hidden
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct StoredMessage {
    id: String,
    body: String,
}

struct InFlight {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    /// Received but not yet deleted, by receipt
    in_flight: HashMap<String, InFlight>,
}

struct SharedState {
    queues: RwLock<HashMap<String, QueueState>>,
    notifiers: RwLock<HashMap<String, Arc<Notify>>>,
    visibility_timeout: Duration,
    next_receipt: AtomicU64,
}

/// In-memory queue backend
#[derive(Clone)]
pub struct MemoryQueueBackend {
    state: Arc<SharedState>,
}

impl Default for MemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(SharedState {
                queues: RwLock::new(HashMap::new()),
                notifiers: RwLock::new(HashMap::new()),
                visibility_timeout,
                next_receipt: AtomicU64::new(1),
            }),
        }
    }

    /// Messages waiting or in flight
    pub fn depth(&self, queue: &str) -> usize {
        self.state
            .queues
            .read()
            .get(queue)
            .map(|q| q.ready.len() + q.in_flight.len())
            .unwrap_or(0)
    }

    /// Get or create the notifier that wakes receivers of `queue`
    fn get_or_create_notifier(&self, queue: &str) -> Arc<Notify> {
        {
            let notifiers = self.state.notifiers.read();
            if let Some(n) = notifiers.get(queue) {
                return Arc::clone(n);
            }
        }
        let mut notifiers = self.state.notifiers.write();
        Arc::clone(notifiers.entry(queue.to_string()).or_default())
    }

    fn take_ready(&self, queue: &str, max_messages: usize) -> Vec<QueueMessage> {
        let mut queues = self.state.queues.write();
        let Some(state) = queues.get_mut(queue) else {
            return Vec::new();
        };

        let now = Instant::now();
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(f) = state.in_flight.remove(&receipt) {
                state.ready.push_front(f.message);
            }
        }

        let mut received = Vec::new();
        while received.len() < max_messages {
            let Some(message) = state.ready.pop_front() else {
                break;
            };
            let receipt = format!(
                "{}#{}",
                message.id,
                self.state.next_receipt.fetch_add(1, Ordering::Relaxed)
            );
            received.push(QueueMessage {
                id: message.id.clone(),
                receipt: Some(receipt.clone()),
                body: message.body.clone(),
            });
            state.in_flight.insert(
                receipt,
                InFlight {
                    message,
                    visible_at: now + self.state.visibility_timeout,
                },
            );
        }
        received
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn send_batch(
        &self,
        queue: &str,
        entries: Vec<OutgoingMessage>,
    ) -> Result<BatchSendResult, QueueError> {
        if entries.len() > MAX_BATCH_SIZE {
            return Err(QueueError::rejected(
                BACKEND,
                format!("batch of {} exceeds {MAX_BATCH_SIZE} entries", entries.len()),
            ));
        }

        let sent = entries.len();
        {
            let mut queues = self.state.queues.write();
            let state = queues.entry(queue.to_string()).or_default();
            state
                .ready
                .extend(entries.into_iter().map(|e| StoredMessage {
                    id: e.id,
                    body: e.body,
                }));
        }

        self.get_or_create_notifier(queue).notify_waiters();
        Ok(BatchSendResult {
            sent,
            failed: Vec::new(),
        })
    }

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let notifier = self.get_or_create_notifier(queue);
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Register interest before checking so a concurrent send is not missed
            let notified = notifier.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let received = self.take_ready(queue, max_messages.max(1));
            if !received.is_empty() {
                return Ok(received);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn delete_batch(&self, queue: &str, receipts: &[String]) -> Result<(), QueueError> {
        let mut queues = self.state.queues.write();
        if let Some(state) = queues.get_mut(queue) {
            for receipt in receipts {
                state.in_flight.remove(receipt);
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(bodies: &[&str]) -> Vec<OutgoingMessage> {
        bodies
            .iter()
            .enumerate()
            .map(|(i, b)| OutgoingMessage {
                id: i.to_string(),
                body: b.to_string(),
            })
            .collect()
    }

    fn bodies(messages: &[QueueMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.body.as_str()).collect()
    }

    #[tokio::test]
    async fn test_send_and_receive_in_order() {
        let backend = MemoryQueueBackend::new();
        let result = backend
            .send_batch("q", entries(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(result.sent, 3);

        let received = backend.receive("q", 10, Duration::ZERO).await.unwrap();
        assert_eq!(bodies(&received), vec!["a", "b", "c"]);
        assert!(received.iter().all(|m| m.receipt.is_some()));
    }

    #[tokio::test]
    async fn test_receive_respects_max_messages() {
        let backend = MemoryQueueBackend::new();
        backend
            .send_batch("q", entries(&["a", "b", "c"]))
            .await
            .unwrap();

        let first = backend.receive("q", 2, Duration::ZERO).await.unwrap();
        let second = backend.receive("q", 2, Duration::ZERO).await.unwrap();
        assert_eq!(bodies(&first), vec!["a", "b"]);
        assert_eq!(bodies(&second), vec!["c"]);
    }

    #[tokio::test]
    async fn test_receive_empty_returns_immediately() {
        let backend = MemoryQueueBackend::new();
        let received = backend.receive("q", 10, Duration::ZERO).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_in_flight() {
        let backend = MemoryQueueBackend::new();
        backend.send_batch("q", entries(&["a"])).await.unwrap();
        let received = backend.receive("q", 10, Duration::ZERO).await.unwrap();
        assert_eq!(backend.depth("q"), 1);

        let receipts: Vec<String> = received.into_iter().filter_map(|m| m.receipt).collect();
        backend.delete_batch("q", &receipts).await.unwrap();
        assert_eq!(backend.depth("q"), 0);
    }

    #[tokio::test]
    async fn test_undeleted_message_is_redelivered() {
        let backend = MemoryQueueBackend::with_visibility_timeout(Duration::from_millis(10));
        backend.send_batch("q", entries(&["a"])).await.unwrap();

        let first = backend.receive("q", 10, Duration::ZERO).await.unwrap();
        assert_eq!(bodies(&first), vec!["a"]);
        assert!(
            backend
                .receive("q", 10, Duration::ZERO)
                .await
                .unwrap()
                .is_empty()
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        let again = backend.receive("q", 10, Duration::ZERO).await.unwrap();
        assert_eq!(bodies(&again), vec!["a"]);
        assert_ne!(first[0].receipt, again[0].receipt);
    }

    #[tokio::test]
    async fn test_receive_waits_for_send() {
        let backend = MemoryQueueBackend::new();
        let sender = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send_batch("q", entries(&["late"])).await.unwrap();
        });

        let received = backend
            .receive("q", 10, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(bodies(&received), vec!["late"]);
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let backend = MemoryQueueBackend::new();
        let oversized: Vec<&str> = vec!["x"; MAX_BATCH_SIZE + 1];
        let err = backend
            .send_batch("q", entries(&oversized))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(backend.depth("q"), 0);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let backend = MemoryQueueBackend::new();
        backend.send_batch("names", entries(&["a"])).await.unwrap();
        assert!(
            backend
                .receive("counts", 10, Duration::ZERO)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(backend.depth("names"), 1);
    }
}
