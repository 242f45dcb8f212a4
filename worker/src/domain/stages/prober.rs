//! Prober stage: look up the cardinality of every job in a delivery group

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;

use super::error::StageError;
use super::{DeliveryHandler, parse_records};
use crate::data::{Delivery, MetricsBackend, QueueService};
use crate::domain::cardinality::CardinalityRecord;
use crate::utils::time::offset_from;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub received: usize,
    pub malformed: usize,
    pub lookup_failures: usize,
    pub zero_counts: usize,
    pub published: usize,
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Lookups in flight at once within one delivery group
    pub concurrency: usize,
    /// Publish results whose count is zero instead of dropping them
    pub forward_zero_counts: bool,
    /// Query this far in the past so recent samples are complete
    pub query_offset: Duration,
}

pub struct Prober {
    backend: Arc<dyn MetricsBackend>,
    queues: QueueService,
    counts_queue: String,
    settings: ProbeSettings,
}

impl Prober {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        queues: QueueService,
        counts_queue: impl Into<String>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            backend,
            queues,
            counts_queue: counts_queue.into(),
            settings,
        }
    }

    /// Probe one delivery group.
    ///
    /// Malformed bodies and failed lookups are skipped. Fails only when the
    /// results cannot be published.
    pub async fn process(&self, delivery: &Delivery) -> Result<ProbeSummary, StageError> {
        let (jobs, malformed) = parse_records("probe", delivery);
        let mut summary = ProbeSummary {
            received: delivery.len(),
            malformed,
            ..Default::default()
        };

        let at = offset_from(Utc::now(), self.settings.query_offset);
        let lookups: Vec<_> = futures::stream::iter(jobs.into_iter().map(|job| async move {
            let result = self.backend.instant_count(&job.name, at).await;
            (job, result)
        }))
        .buffered(self.settings.concurrency.max(1))
        .collect()
        .await;

        let mut results = Vec::with_capacity(lookups.len());
        for (job, result) in lookups {
            match result {
                Ok(0) if !self.settings.forward_zero_counts => {
                    summary.zero_counts += 1;
                    tracing::debug!(metric = %job.name, "Dropping zero cardinality");
                }
                Ok(count) => {
                    tracing::debug!(metric = %job.name, count, "Cardinality");
                    results.push(CardinalityRecord::new(job.name, count, job.total_expected));
                }
                Err(e) => {
                    summary.lookup_failures += 1;
                    tracing::warn!(
                        metric = %job.name,
                        kind = e.kind(),
                        error = %e,
                        "Cardinality lookup failed"
                    );
                }
            }
        }

        if !results.is_empty() {
            let report = self.queues.publish(&self.counts_queue, &results).await;
            if !report.is_complete() {
                return Err(StageError::publish(&self.counts_queue, &report));
            }
            summary.published = report.sent;
        }

        tracing::info!(
            received = summary.received,
            malformed = summary.malformed,
            lookup_failures = summary.lookup_failures,
            zero_counts = summary.zero_counts,
            published = summary.published,
            "Probe complete"
        );
        Ok(summary)
    }
}

#[async_trait]
impl DeliveryHandler for Prober {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), StageError> {
        self.process(delivery).await.map(|_| ())
    }
}
