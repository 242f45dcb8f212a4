//! Long-running queue consumer driving one stage
//!
//! Receives a delivery group, hands it to the stage, and deletes it only
//! after the stage succeeded. A failed group stays on the queue and comes
//! back after the visibility timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::DeliveryHandler;
use crate::data::{Delivery, QueueService};

/// Pause after an empty receive before polling again
const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Pause after a failed receive
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct QueueConsumer {
    handler: Arc<dyn DeliveryHandler>,
    queues: QueueService,
    queue: String,
    idle_backoff: Duration,
}

impl QueueConsumer {
    pub fn new(
        handler: Arc<dyn DeliveryHandler>,
        queues: QueueService,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            handler,
            queues,
            queue: queue.into(),
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    pub fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let stage = self.handler.name();
            tracing::debug!(stage, queue = %self.queue, "Consumer started");

            loop {
                let pause = tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        None
                    }
                    result = self.queues.receive(&self.queue) => {
                        match result {
                            Ok(delivery) if delivery.is_empty() => Some(self.idle_backoff),
                            Ok(delivery) => {
                                self.process(&delivery).await;
                                None
                            }
                            Err(e) => {
                                tracing::error!(stage, queue = %self.queue, error = %e, "Receive failed");
                                Some(ERROR_BACKOFF)
                            }
                        }
                    }
                };

                if let Some(pause) = pause {
                    tokio::select! {
                        biased;
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            }
            tracing::debug!(stage, "Consumer shutdown complete");
        })
    }

    async fn process(&self, delivery: &Delivery) {
        let stage = self.handler.name();
        match self.handler.handle(delivery).await {
            Ok(()) => {
                if let Err(e) = self.queues.ack(delivery).await {
                    tracing::warn!(stage, error = %e, "Failed to delete handled messages");
                }
            }
            Err(e) => {
                tracing::error!(
                    stage,
                    messages = delivery.len(),
                    error = %e,
                    "Delivery failed, messages will be redelivered"
                );
            }
        }
    }
}
