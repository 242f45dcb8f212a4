//! Pipeline stages
//!
//! Enumerator -> names queue -> Prober -> counts queue -> Reducer ->
//! ingest queue -> Ingestor
//!
//! Every stage is stateless between invocations. The queue-fed stages
//! implement [`DeliveryHandler`] so one [`QueueConsumer`] loop can drive any
//! of them.

mod consumer;
mod enumerator;
mod error;
mod ingestor;
mod prober;
mod reducer;


pub use consumer::QueueConsumer;
pub use enumerator::{EnumerateSummary, Enumerator};
pub use error::StageError;
pub use ingestor::{IngestSummary, Ingestor};
pub use prober::{ProbeSettings, ProbeSummary, Prober};
pub use reducer::{ReduceSummary, Reducer};

use async_trait::async_trait;

use crate::data::Delivery;
use crate::domain::cardinality::CardinalityRecord;

/// A stage that handles one delivery group per invocation
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, delivery: &Delivery) -> Result<(), StageError>;
}

/// Parse every message body, skipping the unusable ones.
/// Returns the records in delivery order and the number skipped.
fn parse_records(stage: &'static str, delivery: &Delivery) -> (Vec<CardinalityRecord>, usize) {
    let mut records = Vec::with_capacity(delivery.len());
    let mut malformed = 0;
    for message in &delivery.messages {
        match CardinalityRecord::from_body(&message.body) {
            Ok(record) => records.push(record),
            Err(e) => {
                malformed += 1;
                tracing::warn!(stage, message_id = %message.id, error = %e, "Skipping malformed message");
            }
        }
    }
    (records, malformed)
}
