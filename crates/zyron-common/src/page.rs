//! Index page identifiers and page geometry.

use serde::{Deserialize, Serialize};

/// Default page size in bytes (16 KB).
pub const PAGE_SIZE: usize = 16 * 1024;

/// Bytes at the start of every page reserved for the page header.
pub const PAGE_HEADER_SIZE: usize = 32;

/// Identifies an index page, in practice a B+ tree root.
///
/// A rebuilt index gets a new root in the same segment file, so the file
/// stays fixed while the page number moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    /// Index segment file.
    pub file_id: u32,
    /// Page number within the segment.
    pub page_num: u32,
}

impl PageId {
    /// Page ID that refers to no page.
    pub const NULL: PageId = PageId {
        file_id: u32::MAX,
        page_num: u32::MAX,
    };

    /// Creates a new PageId.
    pub fn new(file_id: u32, page_num: u32) -> Self {
        Self { file_id, page_num }
    }

    /// Returns true if this is the null page ID.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Packs the page ID into one u64, file in the high half.
    pub fn as_u64(&self) -> u64 {
        ((self.file_id as u64) << 32) | (self.page_num as u64)
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}:{}", self.file_id, self.page_num)
        }
    }
}
