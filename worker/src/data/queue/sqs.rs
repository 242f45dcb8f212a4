use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, SendMessageBatchRequestEntry};

use super::backend::{BatchSendResult, FailedEntry, OutgoingMessage, QueueBackend, QueueMessage};
use super::error::QueueError;

const BACKEND: &str = "sqs";

/// Longest long-poll SQS accepts
const MAX_WAIT_SECS: u64 = 20;

/// Amazon SQS backend
#[derive(Debug, Clone)]
pub struct SqsQueueBackend {
    client: Client,
}

impl SqsQueueBackend {
    pub async fn new(region: Option<String>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            config_loader = config_loader.region(aws_sdk_sqs::config::Region::new(region));
        }
        let config = config_loader.load().await;

        tracing::debug!(region = ?config.region(), "SQS queue backend initialized");
        Self {
            client: Client::new(&config),
        }
    }
}

/// Service errors are definitive answers. Everything else (dispatch, timeout,
/// unparsable response) may succeed on a retry.
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> QueueError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) => QueueError::rejected(BACKEND, message),
        _ => QueueError::transport(BACKEND, message),
    }
}

#[async_trait]
impl QueueBackend for SqsQueueBackend {
    async fn send_batch(
        &self,
        queue: &str,
        entries: Vec<OutgoingMessage>,
    ) -> Result<BatchSendResult, QueueError> {
        let entries = entries
            .into_iter()
            .map(|entry| {
                SendMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .message_body(entry.body)
                    .build()
                    .map_err(|e| QueueError::rejected(BACKEND, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .send_message_batch()
            .queue_url(queue)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let failed = output
            .failed()
            .iter()
            .map(|f| FailedEntry {
                id: f.id().to_string(),
                reason: format!("{}: {}", f.code(), f.message().unwrap_or("no message")),
            })
            .collect();

        Ok(BatchSendResult {
            sent: output.successful().len(),
            failed,
        })
    }

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue)
            .max_number_of_messages(max_messages.clamp(1, super::MAX_BATCH_SIZE) as i32)
            .wait_time_seconds(wait.as_secs().min(MAX_WAIT_SECS) as i32)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let messages = output
            .messages()
            .iter()
            .map(|m| QueueMessage {
                id: m.message_id().unwrap_or_default().to_string(),
                receipt: m.receipt_handle().map(str::to_string),
                body: m.body().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(messages)
    }

    async fn delete_batch(&self, queue: &str, receipts: &[String]) -> Result<(), QueueError> {
        if receipts.is_empty() {
            return Ok(());
        }

        let entries = receipts
            .iter()
            .enumerate()
            .map(|(i, receipt)| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(i.to_string())
                    .receipt_handle(receipt)
                    .build()
                    .map_err(|e| QueueError::rejected(BACKEND, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .delete_message_batch()
            .queue_url(queue)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(map_sdk_error)?;

        if let Some(first) = output.failed().first() {
            return Err(QueueError::rejected(
                BACKEND,
                format!(
                    "{} of {} deletes failed, first: {}",
                    output.failed().len(),
                    receipts.len(),
                    first.code()
                ),
            ));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
