//! Bitmap index entries.
//!
//! - [`payload`]: compressed bit-run encoding and byte-stream merging
//! - [`record`]: the typed record stored in an index and carried by streams
//! - [`entry`]: the bounded in-memory entry that absorbs merges

pub mod entry;
pub mod payload;
pub mod record;

pub use entry::{LbmEntry, MIN_ENTRIES_PER_PAGE, size_bounds};
pub use payload::{LBM_ONE_BYTE_SIZE, RUN_HEADER_SIZE, round_to_byte_boundary};
pub use record::{IndexRecord, bitmap_tuple_descriptor};
