//! Cardinality domain logic
//!
//! - `cardinality` - records, batching, folding and top-N ranking
//! - `stages` - the enumerate, probe, reduce and ingest stages

pub mod cardinality;
pub mod stages;
