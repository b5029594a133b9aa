//! Ordered bitmap index trees.
//!
//! Records are ordered by `(key columns, start row ID)`:
//!
//! ```text
//! IndexSegment ── root PageId ──> BTreeMap<IndexKey, encoded record>
//!        ^
//!        │ BTreeDescriptor { segment, root, tuple descriptor, key count }
//!        │
//!   BTreeReader ── search_first / search_for_key / search_next
//!   BTreeWriter ── + delete_current / insert
//!   DeletionReader ── search_for_rid
//! ```
//!
//! Readers and writers hold a cursor that is repositioned by every search,
//! so callers can interleave lookups with deletes and inserts.

pub mod reader;
pub mod store;
pub mod types;
pub mod writer;

pub use reader::{BTreeReader, DeletionReader};
pub use store::IndexSegment;
pub use types::{IndexKey, IndexStats};
pub use writer::BTreeWriter;

use crate::bitmap::{IndexRecord, bitmap_tuple_descriptor};
use crate::tuple::TupleDescriptor;
use std::sync::Arc;
use zyron_common::{PageId, Result, TypeId};

/// Identifies one bitmap index tree and its record layout.
#[derive(Clone)]
pub struct BTreeDescriptor {
    /// Segment holding the tree.
    pub segment: Arc<IndexSegment>,
    /// Root page of the tree.
    pub root_page_id: PageId,
    /// Record layout: key columns, start row ID, payload.
    pub tuple_desc: TupleDescriptor,
    /// Number of key columns.
    pub n_keys: usize,
}

impl BTreeDescriptor {
    /// Describes the tree at `root` with the given key column types.
    pub fn new(segment: Arc<IndexSegment>, root_page_id: PageId, key_types: &[TypeId]) -> Self {
        Self {
            segment,
            root_page_id,
            tuple_desc: bitmap_tuple_descriptor(key_types),
            n_keys: key_types.len(),
        }
    }

    /// Decodes every record of the tree in index order.
    pub fn scan(&self) -> Result<Vec<IndexRecord>> {
        self.segment.scan(self.root_page_id, &self.tuple_desc)
    }

    /// Returns statistics for the tree.
    pub fn stats(&self) -> Result<IndexStats> {
        self.segment.index_stats(self.root_page_id)
    }
}

impl std::fmt::Debug for BTreeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTreeDescriptor")
            .field("segment", &self.segment.file_id())
            .field("root_page_id", &self.root_page_id)
            .field("tuple_desc", &self.tuple_desc)
            .field("n_keys", &self.n_keys)
            .finish()
    }
}
