//! Queue-triggered invocation events
//!
//! A stage can be handed its delivery group directly, in the shape SQS uses
//! for function triggers: `{"Records": [{"messageId": "...", "body": "..."}]}`.
//! Messages from an event carry no receipt; the trigger deletes them.

use serde::Deserialize;
use tokio::io::AsyncReadExt;

use super::Delivery;
use super::backend::QueueMessage;
use super::error::QueueError;

/// Reads the event from standard input
pub const STDIN_SOURCE: &str = "-";

#[derive(Debug, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsEventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SqsEventRecord {
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl SqsEvent {
    pub fn from_json(json: &str) -> Result<Self, QueueError> {
        serde_json::from_str(json).map_err(|e| QueueError::InvalidEvent(e.to_string()))
    }

    /// Load an event from a file path, or stdin for `-`
    pub async fn read(source: &str) -> Result<Self, QueueError> {
        let json = if source == STDIN_SOURCE {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        } else {
            tokio::fs::read_to_string(source).await?
        };
        Self::from_json(&json)
    }

    pub fn into_delivery(self) -> Delivery {
        let messages = self
            .records
            .into_iter()
            .enumerate()
            .map(|(i, record)| QueueMessage {
                id: record.message_id.unwrap_or_else(|| format!("record-{i}")),
                receipt: None,
                body: record.body,
            })
            .collect();
        Delivery::from_event(messages)
    }
}
