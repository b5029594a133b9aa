//! Storage layer for ZyronDB bitmap indexes.
//!
//! This crate provides:
//! - Typed tuple representation and serialization
//! - Compressed bitmap records and the bounded merge entry
//! - Ordered bitmap index trees with positioned readers and writers
//! - Snapshot versioning of index root pages

pub mod bitmap;
pub mod btree;
mod snapshot;
mod tuple;

pub use bitmap::{
    IndexRecord, LBM_ONE_BYTE_SIZE, LbmEntry, MIN_ENTRIES_PER_PAGE, RUN_HEADER_SIZE,
    bitmap_tuple_descriptor, round_to_byte_boundary, size_bounds,
};
pub use btree::{
    BTreeDescriptor, BTreeReader, BTreeWriter, DeletionReader, IndexKey, IndexSegment, IndexStats,
};
pub use snapshot::{PageVersion, SnapshotSegment};
pub use tuple::{Datum, MAX_VARLEN_SIZE, TupleData, TupleDescriptor};
