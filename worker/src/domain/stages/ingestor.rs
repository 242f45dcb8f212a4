//! Ingestor stage: record the top-N list as gauge observations

use std::sync::Arc;

use async_trait::async_trait;

use super::error::StageError;
use super::{DeliveryHandler, parse_records};
use crate::data::{CardinalitySink, Delivery};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub received: usize,
    pub malformed: usize,
    pub recorded: usize,
}

pub struct Ingestor {
    sink: Arc<dyn CardinalitySink>,
}

impl Ingestor {
    pub fn new(sink: Arc<dyn CardinalitySink>) -> Self {
        Self { sink }
    }

    pub async fn process(&self, delivery: &Delivery) -> Result<IngestSummary, StageError> {
        let (records, malformed) = parse_records("ingest", delivery);
        if !records.is_empty() {
            self.sink.record(&records).await?;
        }

        tracing::info!(
            received = delivery.len(),
            malformed,
            recorded = records.len(),
            "Ingest complete"
        );
        Ok(IngestSummary {
            received: delivery.len(),
            malformed,
            recorded: records.len(),
        })
    }

    /// Flush and close the sink
    pub async fn shutdown(&self) -> Result<(), StageError> {
        self.sink.shutdown().await.map_err(StageError::from)
    }
}

#[async_trait]
impl DeliveryHandler for Ingestor {
    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), StageError> {
        self.process(delivery).await.map(|_| ())
    }
}
