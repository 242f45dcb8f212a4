//! Cardinality data model and the pure algorithms of the pipeline
//!
//! - `batch` - fixed-size batch splitting
//! - `rank` - last-write-wins folding and top-N selection
//! - `record` - records exchanged between stages

mod batch;
mod rank;
mod record;

pub use batch::split;
pub use rank::{CardinalityTable, FoldedRecords, fold_records, top_n};
pub use record::{CardinalityRecord, RankedEntry, RecordError};
