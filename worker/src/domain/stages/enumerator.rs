//! Enumerator stage: list every metric name and fan the names out as jobs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::StageError;
use crate::core::constants::DEFAULT_QUERY_OFFSET_SECS;
use crate::data::{MetricsBackend, PublishReport, QueueService};
use crate::domain::cardinality::{CardinalityRecord, split};
use crate::utils::time::offset_from;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerateSummary {
    /// Names listed, also the `total_expected` of every job
    pub names: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub published: usize,
}

pub struct Enumerator {
    backend: Arc<dyn MetricsBackend>,
    queues: QueueService,
    names_queue: String,
    chunk_size: usize,
    query_offset: Duration,
}

impl Enumerator {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        queues: QueueService,
        names_queue: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            backend,
            queues,
            names_queue: names_queue.into(),
            chunk_size,
            query_offset: Duration::from_secs(DEFAULT_QUERY_OFFSET_SECS),
        }
    }

    /// List names as of `offset` in the past, the same instant the prober
    /// counts at
    pub fn with_query_offset(mut self, offset: Duration) -> Self {
        self.query_offset = offset;
        self
    }

    /// One enumeration.
    ///
    /// Fails when the listing fails, or when there were names to publish and
    /// not a single batch made it to the queue.
    pub async fn run(&self) -> Result<EnumerateSummary, StageError> {
        let at = offset_from(Utc::now(), self.query_offset);
        let names = self.backend.list_metric_names(at).await?;
        let total_expected = names.len() as u64;
        tracing::info!(names = names.len(), "Listed metric names");

        let mut summary = EnumerateSummary {
            names: names.len(),
            ..Default::default()
        };
        let mut totals = PublishReport::default();

        for batch in split(names, self.chunk_size) {
            let jobs: Vec<CardinalityRecord> = batch
                .into_iter()
                .map(|name| CardinalityRecord::job(name, total_expected))
                .collect();

            let report = self.queues.publish(&self.names_queue, &jobs).await;
            summary.batches += 1;
            summary.published += report.sent;
            if !report.is_complete() {
                summary.failed_batches += 1;
                tracing::warn!(
                    queue = %self.names_queue,
                    jobs = jobs.len(),
                    sent = report.sent,
                    "Batch only partially published"
                );
            }
            totals.attempted += report.attempted;
            totals.sent += report.sent;
            if report.last_error.is_some() {
                totals.last_error = report.last_error;
            }
        }

        if totals.nothing_sent() {
            return Err(StageError::publish(&self.names_queue, &totals));
        }

        tracing::info!(
            names = summary.names,
            batches = summary.batches,
            failed_batches = summary.failed_batches,
            published = summary.published,
            "Enumeration complete"
        );
        Ok(summary)
    }

    /// Run an enumeration now and then every `interval` until shutdown
    pub fn start_interval(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run().await {
                            tracing::error!(error = %e, "Scheduled enumeration failed");
                        }
                    }
                }
            }
            tracing::debug!("Enumeration schedule stopped");
        })
    }
}
