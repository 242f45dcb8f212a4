//! Reducer stage: deduplicate a delivery group and forward only the top N

use async_trait::async_trait;

use super::error::StageError;
use super::{DeliveryHandler, parse_records};
use crate::data::{Delivery, QueueService};
use crate::domain::cardinality::{CardinalityRecord, RankedEntry, fold_records, top_n};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceSummary {
    pub received: usize,
    pub malformed: usize,
    /// Distinct metric names after deduplication
    pub unique: usize,
    pub total_expected: Option<u64>,
    pub winners: Vec<RankedEntry>,
}

pub struct Reducer {
    queues: QueueService,
    ingest_queue: String,
    top_n: usize,
}

impl Reducer {
    pub fn new(queues: QueueService, ingest_queue: impl Into<String>, top_n: usize) -> Self {
        Self {
            queues,
            ingest_queue: ingest_queue.into(),
            top_n,
        }
    }

    pub async fn process(&self, delivery: &Delivery) -> Result<ReduceSummary, StageError> {
        let (records, malformed) = parse_records("reduce", delivery);
        let folded = fold_records(records);
        let winners = top_n(&folded.table, self.top_n);

        // Each invocation only sees its own delivery group, so this is an
        // approximate completeness signal rather than a global one
        if let Some(total_expected) = folded.total_expected
            && (folded.records as u64) < total_expected
        {
            tracing::debug!(
                records = folded.records,
                total_expected,
                "Reducing a partial view of the run"
            );
        }

        let summary = ReduceSummary {
            received: delivery.len(),
            malformed,
            unique: folded.table.len(),
            total_expected: folded.total_expected,
            winners,
        };

        if !summary.winners.is_empty() {
            let total_expected = summary.total_expected.unwrap_or_default();
            let jobs: Vec<CardinalityRecord> = summary
                .winners
                .iter()
                .cloned()
                .map(|entry| entry.into_record(total_expected))
                .collect();

            let report = self.queues.publish(&self.ingest_queue, &jobs).await;
            if !report.is_complete() {
                return Err(StageError::publish(&self.ingest_queue, &report));
            }
        }

        tracing::info!(
            received = summary.received,
            malformed = summary.malformed,
            unique = summary.unique,
            total_expected = ?summary.total_expected,
            top_n = self.top_n,
            published = summary.winners.len(),
            "Reduce complete"
        );
        Ok(summary)
    }
}

#[async_trait]
impl DeliveryHandler for Reducer {
    fn name(&self) -> &'static str {
        "reduce"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), StageError> {
        self.process(delivery).await.map(|_| ())
    }
}
