//! Common types for the bitmap index tree.

use crate::tuple::Datum;
use zyron_common::RowId;

/// Ordering key of an index record: key columns, then start row ID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    /// Key column values.
    pub keys: Vec<Datum>,
    /// Start row ID of the record.
    pub start_rid: RowId,
}

impl IndexKey {
    /// Creates an index key.
    pub fn new(keys: Vec<Datum>, start_rid: RowId) -> Self {
        Self { keys, start_rid }
    }

    /// Returns true if the key columns of both keys are equal, ignoring the
    /// start row ID.
    #[inline]
    pub fn same_key_columns(&self, other: &IndexKey) -> bool {
        self.keys == other.keys
    }
}

impl std::fmt::Display for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for key in &self.keys {
            write!(f, "{}, ", key)?;
        }
        write!(f, "{})", self.start_rid)
    }
}

/// Statistics for one index tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of records.
    pub entry_count: usize,
    /// Number of distinct key column values.
    pub unique_key_count: usize,
    /// Pages needed to hold the encoded records.
    pub page_count: u64,
}
