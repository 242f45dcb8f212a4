//! Deduplication and top-N selection

use std::cmp::Ordering;
use std::collections::HashMap;

use super::record::{CardinalityRecord, RankedEntry};

/// Metric name to cardinality, built per reducer invocation
pub type CardinalityTable = HashMap<String, u64>;

/// Result of folding one delivery group of records
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FoldedRecords {
    pub table: CardinalityTable,
    /// `total_expected` of the last record folded
    pub total_expected: Option<u64>,
    /// Records folded, duplicates included
    pub records: usize,
}

/// Fold records into a table. Later records overwrite earlier ones with the
/// same name.
pub fn fold_records<I>(records: I) -> FoldedRecords
where
    I: IntoIterator<Item = CardinalityRecord>,
{
    let mut folded = FoldedRecords::default();
    for record in records {
        folded.records += 1;
        folded.total_expected = Some(record.total_expected);
        folded.table.insert(record.name, record.count);
    }
    folded
}

/// Highest count first, then name ascending so equal counts rank the same
/// way on every run.
fn rank_order(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name))
}

/// Select the `n` highest-cardinality entries of `table`.
///
/// Returns `min(n, table.len())` entries sorted by [`rank_order`]. When the
/// table holds no more than `n` entries they are all returned, sorted.
pub fn top_n(table: &CardinalityTable, n: usize) -> Vec<RankedEntry> {
    if table.is_empty() || n == 0 {
        return Vec::new();
    }

    let mut entries: Vec<RankedEntry> = table
        .iter()
        .map(|(name, &count)| RankedEntry::new(name.clone(), count))
        .collect();

    if n < entries.len() {
        entries.select_nth_unstable_by(n - 1, rank_order);
        entries.truncate(n);
    }
    entries.sort_unstable_by(rank_order);
    entries
}
