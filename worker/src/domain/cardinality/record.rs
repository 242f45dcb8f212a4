//! Cardinality records and their queue wire form
//!
//! Every stage exchanges the same JSON object:
//! `{"name": "...", "count": 123, "totalMetricsCount": 456}`.
//! Enumerator jobs carry no `count`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a queue body is not a usable record
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record has an empty metric name")]
    EmptyName,
}

/// One metric's cardinality as it travels between stages.
///
/// `total_expected` is the number of metric names the enumerator listed for
/// the run this record belongs to. No stage re-derives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub count: u64,
    #[serde(rename = "totalMetricsCount", default)]
    pub total_expected: u64,
}

fn is_zero(count: &u64) -> bool {
    *count == 0
}

impl CardinalityRecord {
    /// Job emitted by the enumerator (no count yet)
    pub fn job(name: impl Into<String>, total_expected: u64) -> Self {
        Self {
            name: name.into(),
            count: 0,
            total_expected,
        }
    }

    pub fn new(name: impl Into<String>, count: u64, total_expected: u64) -> Self {
        Self {
            name: name.into(),
            count,
            total_expected,
        }
    }

    /// Parse a queue message body
    pub fn from_body(body: &str) -> Result<Self, RecordError> {
        let record: Self = serde_json::from_str(body)?;
        if record.name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        Ok(record)
    }
}

/// A `(name, count)` pair in a top-N list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub name: String,
    pub count: u64,
}

impl RankedEntry {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }

    /// Re-tag the entry for publishing
    pub fn into_record(self, total_expected: u64) -> CardinalityRecord {
        CardinalityRecord::new(self.name, self.count, total_expected)
    }
}
