//! Snapshot versioning of index root pages.

use parking_lot::Mutex;
use tracing::debug;
use zyron_common::{PageId, Result, ZyronError};

/// Link between an original root page and the page versioning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageVersion {
    /// Root page as originally allocated.
    pub original: PageId,
    /// Page holding the snapshot version.
    pub version: PageId,
}

/// Snapshot segment of one transaction.
///
/// Records which root pages were versioned by the transaction. A page may
/// only be versioned once.
pub struct SnapshotSegment {
    snapshot_id: u64,
    versions: Mutex<Vec<PageVersion>>,
}

impl SnapshotSegment {
    /// Creates a snapshot segment with no versioned pages.
    pub fn new(snapshot_id: u64) -> Self {
        Self {
            snapshot_id,
            versions: Mutex::new(Vec::new()),
        }
    }

    /// Returns the snapshot ID.
    #[inline]
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot_id
    }

    /// Links `version` to `original` in this snapshot.
    pub fn version_page(&self, original: PageId, version: PageId) -> Result<()> {
        if original.is_null() || version.is_null() {
            return Err(ZyronError::InvalidParameter {
                name: "page_id".to_string(),
                value: "null".to_string(),
            });
        }
        let mut versions = self.versions.lock();
        if versions.iter().any(|v| v.original == original) {
            return Err(ZyronError::InvariantViolation(format!(
                "page {} already versioned in snapshot {}",
                original, self.snapshot_id
            )));
        }
        versions.push(PageVersion { original, version });
        debug!(
            snapshot = self.snapshot_id,
            original = %original,
            version = %version,
            "versioned page"
        );
        Ok(())
    }

    /// Returns the pages versioned so far, in versioning order.
    pub fn versioned_pages(&self) -> Vec<PageVersion> {
        self.versions.lock().clone()
    }
}
