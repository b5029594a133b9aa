//! In-memory segment storage for bitmap index trees.

use super::types::{IndexKey, IndexStats};
use crate::bitmap::IndexRecord;
use crate::tuple::TupleDescriptor;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use zyron_common::{PageId, Result, StorageConfig, ZyronError};

/// Records of one tree, ordered by index key, holding encoded record bytes.
pub(crate) type Tree = BTreeMap<IndexKey, Bytes>;

struct SegmentInner {
    /// Trees keyed by root page number.
    trees: HashMap<u32, Tree>,
    next_page_num: u32,
}

/// In-memory segment holding one ordered tree per root page.
///
/// All trees are kept in RAM. Records are stored in their encoded form so
/// every read goes through the typed codec.
pub struct IndexSegment {
    file_id: u32,
    config: StorageConfig,
    inner: RwLock<SegmentInner>,
}

impl IndexSegment {
    /// Creates an empty segment.
    pub fn new(file_id: u32, config: StorageConfig) -> Self {
        Self {
            file_id,
            config,
            inner: RwLock::new(SegmentInner {
                trees: HashMap::new(),
                next_page_num: 0,
            }),
        }
    }

    /// Returns the file ID of this segment.
    #[inline]
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Returns the storage configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Allocates the root page of a new, empty tree.
    pub fn create_empty_root(&self) -> PageId {
        let mut inner = self.inner.write();
        let page_num = inner.next_page_num;
        inner.next_page_num += 1;
        inner.trees.insert(page_num, Tree::new());
        let root = PageId::new(self.file_id, page_num);
        debug!(root = %root, "allocated index root");
        root
    }

    /// Returns true if `root` is the root of a tree in this segment.
    pub fn contains_root(&self, root: PageId) -> bool {
        root.file_id == self.file_id && self.inner.read().trees.contains_key(&root.page_num)
    }

    /// Returns the number of root pages allocated so far.
    pub fn root_count(&self) -> usize {
        self.inner.read().trees.len()
    }

    /// Returns the number of records in a tree.
    pub fn len(&self, root: PageId) -> Result<usize> {
        self.with_tree(root, |tree| tree.len())
    }

    /// Returns true if a tree holds no records.
    pub fn is_empty(&self, root: PageId) -> Result<bool> {
        self.with_tree(root, |tree| tree.is_empty())
    }

    /// Decodes every record of a tree in index order. Each record must
    /// carry the key it is stored under.
    pub fn scan(&self, root: PageId, desc: &TupleDescriptor) -> Result<Vec<IndexRecord>> {
        self.with_tree(root, |tree| {
            tree.iter()
                .map(|(key, bytes)| {
                    let record = IndexRecord::decode(desc, bytes)?;
                    if record.index_key() != *key {
                        return Err(ZyronError::BTreeCorrupted(format!(
                            "record {} stored under key {}",
                            record, key
                        )));
                    }
                    Ok(record)
                })
                .collect()
        })?
    }

    /// Returns entry, key and page statistics for a tree.
    ///
    /// The page count assumes records are packed into pages back to back;
    /// an empty tree still occupies its root page.
    pub fn index_stats(&self, root: PageId) -> Result<IndexStats> {
        let usable = self.config.usable_page_size().max(1) as u64;
        self.with_tree(root, |tree| {
            let bytes: u64 = tree.values().map(|v| v.len() as u64).sum();
            let unique_keys: HashSet<_> = tree.keys().map(|k| &k.keys).collect();
            IndexStats {
                entry_count: tree.len(),
                unique_key_count: unique_keys.len(),
                page_count: bytes.div_ceil(usable).max(1),
            }
        })
    }

    /// Runs `f` against a tree under a shared lock.
    pub(crate) fn with_tree<R>(&self, root: PageId, f: impl FnOnce(&Tree) -> R) -> Result<R> {
        let inner = self.inner.read();
        let tree = self.lookup(&inner, root)?;
        Ok(f(tree))
    }

    /// Runs `f` against a tree under an exclusive lock.
    pub(crate) fn with_tree_mut<R>(
        &self,
        root: PageId,
        f: impl FnOnce(&mut Tree) -> R,
    ) -> Result<R> {
        let mut inner = self.inner.write();
        if root.file_id != self.file_id {
            return Err(ZyronError::PageNotFound {
                page_id: root.as_u64(),
            });
        }
        let tree = inner
            .trees
            .get_mut(&root.page_num)
            .ok_or(ZyronError::PageNotFound {
                page_id: root.as_u64(),
            })?;
        Ok(f(tree))
    }

    fn lookup<'a>(&self, inner: &'a SegmentInner, root: PageId) -> Result<&'a Tree> {
        if root.file_id != self.file_id {
            return Err(ZyronError::PageNotFound {
                page_id: root.as_u64(),
            });
        }
        inner
            .trees
            .get(&root.page_num)
            .ok_or(ZyronError::PageNotFound {
                page_id: root.as_u64(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::bitmap_tuple_descriptor;
    use crate::tuple::Datum;
    use bytes::BytesMut;
    use zyron_common::{RowId, TypeId};

    fn put(segment: &IndexSegment, root: PageId, desc: &TupleDescriptor, record: &IndexRecord) {
        let mut buf = BytesMut::new();
        record.encode(desc, &mut buf).unwrap();
        segment
            .with_tree_mut(root, |tree| tree.insert(record.index_key(), buf.freeze()))
            .unwrap();
    }

    #[test]
    fn test_create_roots() {
        let segment = IndexSegment::new(3, StorageConfig::default());
        let a = segment.create_empty_root();
        let b = segment.create_empty_root();
        assert_ne!(a, b);
        assert_eq!(a.file_id, 3);
        assert!(segment.contains_root(a));
        assert!(segment.contains_root(b));
        assert!(!segment.contains_root(PageId::new(4, a.page_num)));
        assert_eq!(segment.root_count(), 2);
        assert!(segment.is_empty(a).unwrap());
    }

    #[test]
    fn test_unknown_root() {
        let segment = IndexSegment::new(0, StorageConfig::default());
        let missing = PageId::new(0, 42);
        assert!(matches!(
            segment.len(missing),
            Err(ZyronError::PageNotFound { .. })
        ));
        assert!(segment.index_stats(missing).is_err());
    }

    #[test]
    fn test_scan_in_key_order() {
        let segment = IndexSegment::new(0, StorageConfig::default());
        let root = segment.create_empty_root();
        let desc = bitmap_tuple_descriptor(&[TypeId::Int64]);

        let records = [
            IndexRecord::singleton(vec![Datum::Int64(2)], RowId(5)),
            IndexRecord::singleton(vec![Datum::Int64(1)], RowId(9)),
            IndexRecord::from_rids(vec![Datum::Int64(1)], &[RowId(0), RowId(1)]).unwrap(),
        ];
        for record in &records {
            put(&segment, root, &desc, record);
        }

        let scanned = segment.scan(root, &desc).unwrap();
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[0], records[2]);
        assert_eq!(scanned[1], records[1]);
        assert_eq!(scanned[2], records[0]);
    }

    #[test]
    fn test_index_stats() {
        let config = StorageConfig { page_size: 64 };
        let segment = IndexSegment::new(0, config);
        let root = segment.create_empty_root();
        let desc = bitmap_tuple_descriptor(&[TypeId::Int64]);

        let empty = segment.index_stats(root).unwrap();
        assert_eq!(empty.entry_count, 0);
        assert_eq!(empty.page_count, 1);

        for (key, rid) in [(1, 0), (1, 8), (2, 0), (3, 0)] {
            put(
                &segment,
                root,
                &desc,
                &IndexRecord::singleton(vec![Datum::Int64(key)], RowId(rid)),
            );
        }
        let stats = segment.index_stats(root).unwrap();
        assert_eq!(stats.entry_count, 4);
        assert_eq!(stats.unique_key_count, 3);
        // Four 21-byte singletons on 32 usable bytes per page.
        assert_eq!(stats.page_count, 3);
    }
}
