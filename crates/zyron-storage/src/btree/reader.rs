//! Positioned read access to a bitmap index tree.

use super::BTreeDescriptor;
use super::types::IndexKey;
use crate::bitmap::IndexRecord;
use std::ops::Bound::{Excluded, Unbounded};
use zyron_common::{Result, RowId, ZyronError};

/// Cursor over one index tree.
///
/// The cursor is either positioned on a record or singular. Every search
/// repositions it, so callers may interleave searches freely.
pub struct BTreeReader {
    desc: BTreeDescriptor,
    position: Option<IndexKey>,
}

impl BTreeReader {
    /// Creates a singular reader over the tree described by `desc`.
    pub fn new(desc: BTreeDescriptor) -> Self {
        Self {
            desc,
            position: None,
        }
    }

    /// Returns the descriptor of the tree.
    #[inline]
    pub fn descriptor(&self) -> &BTreeDescriptor {
        &self.desc
    }

    /// Positions on the first record. Returns false if the tree is empty.
    pub fn search_first(&mut self) -> Result<bool> {
        let first = self.desc.segment.with_tree(self.desc.root_page_id, |tree| {
            tree.keys().next().cloned()
        })?;
        self.position = first;
        Ok(self.position.is_some())
    }

    /// Searches for `key`.
    ///
    /// Returns true if a record with exactly this key exists, and positions
    /// on it. Otherwise positions on the least upper bound when `least_upper`
    /// is set (singular if there is none), or on the greatest lower bound
    /// (the first record if every record sorts after `key`), and returns false.
    pub fn search_for_key(&mut self, key: &IndexKey, least_upper: bool) -> Result<bool> {
        let (found, position) = self.desc.segment.with_tree(self.desc.root_page_id, |tree| {
            if tree.contains_key(key) {
                return (true, Some(key.clone()));
            }
            let position = if least_upper {
                tree.range((Excluded(key), Unbounded)).next()
            } else {
                tree.range(..key).next_back().or_else(|| tree.iter().next())
            };
            (false, position.map(|(k, _)| k.clone()))
        })?;
        self.position = position;
        Ok(found)
    }

    /// Advances to the next record. Returns false, leaving the reader
    /// singular, at the end of the tree.
    pub fn search_next(&mut self) -> Result<bool> {
        let Some(current) = self.position.take() else {
            return Ok(false);
        };
        let next = self.desc.segment.with_tree(self.desc.root_page_id, |tree| {
            tree.range((Excluded(&current), Unbounded))
                .next()
                .map(|(k, _)| k.clone())
        })?;
        self.position = next;
        Ok(self.position.is_some())
    }

    /// Returns true if the reader is not positioned on a record.
    #[inline]
    pub fn is_singular(&self) -> bool {
        self.position.is_none()
    }

    /// Returns the key of the record the reader is positioned on.
    pub fn current_key(&self) -> Option<&IndexKey> {
        self.position.as_ref()
    }

    /// Decodes the record the reader is positioned on.
    pub fn current_record(&self) -> Result<IndexRecord> {
        let Some(key) = &self.position else {
            return Err(ZyronError::InvariantViolation(
                "reading from a singular index cursor".to_string(),
            ));
        };
        let bytes = self
            .desc
            .segment
            .with_tree(self.desc.root_page_id, |tree| tree.get(key).cloned())?
            .ok_or_else(|| {
                ZyronError::InvariantViolation(format!("index cursor on missing record {}", key))
            })?;
        IndexRecord::decode(&self.desc.tuple_desc, &bytes)
    }

    /// Releases the current position.
    #[inline]
    pub fn end_search(&mut self) {
        self.position = None;
    }
}

/// Reader over a deletion index: a key-less bitmap index whose records mark
/// logically deleted rows.
pub struct DeletionReader {
    reader: BTreeReader,
}

impl DeletionReader {
    /// Creates a reader over a deletion index.
    pub fn new(desc: BTreeDescriptor) -> Result<Self> {
        if desc.n_keys != 0 {
            return Err(ZyronError::ConfigError(format!(
                "deletion index must have no key columns, found {}",
                desc.n_keys
            )));
        }
        Ok(Self {
            reader: BTreeReader::new(desc),
        })
    }

    /// Returns true if `rid` is marked deleted.
    pub fn search_for_rid(&mut self, rid: RowId) -> Result<bool> {
        let key = IndexKey::new(Vec::new(), rid);
        if self.reader.search_for_key(&key, false)? {
            return Ok(true);
        }
        if self.reader.is_singular() {
            return Ok(false);
        }
        let record = self.reader.current_record()?;
        Ok(record.contains(rid))
    }

    /// Releases the current position.
    pub fn end_search(&mut self) {
        self.reader.end_search();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{BTreeWriter, IndexSegment};
    use crate::tuple::Datum;
    use std::sync::Arc;
    use zyron_common::{StorageConfig, TypeId};

    fn key(v: i64, rid: u64) -> IndexKey {
        IndexKey::new(vec![Datum::Int64(v)], RowId(rid))
    }

    fn populated() -> BTreeDescriptor {
        let segment = Arc::new(IndexSegment::new(0, StorageConfig::default()));
        let root = segment.create_empty_root();
        let desc = BTreeDescriptor::new(segment, root, &[TypeId::Int64]);
        let mut writer = BTreeWriter::new(desc.clone(), false);
        for (v, rid) in [(1, 0), (1, 16), (3, 8), (5, 40)] {
            writer
                .insert(&IndexRecord::singleton(vec![Datum::Int64(v)], RowId(rid)))
                .unwrap();
        }
        desc
    }

    #[test]
    fn test_search_first_and_next() {
        let mut reader = BTreeReader::new(populated());
        assert!(reader.is_singular());
        assert!(reader.search_first().unwrap());
        assert_eq!(reader.current_key(), Some(&key(1, 0)));

        let mut seen = 1;
        while reader.search_next().unwrap() {
            seen += 1;
        }
        assert_eq!(seen, 4);
        assert!(reader.is_singular());
        assert!(!reader.search_next().unwrap());
    }

    #[test]
    fn test_search_exact() {
        let mut reader = BTreeReader::new(populated());
        assert!(reader.search_for_key(&key(3, 8), true).unwrap());
        let record = reader.current_record().unwrap();
        assert_eq!(record.keys, vec![Datum::Int64(3)]);
        assert_eq!(record.start_rid, RowId(8));
    }

    #[test]
    fn test_search_least_upper_bound() {
        let mut reader = BTreeReader::new(populated());
        assert!(!reader.search_for_key(&key(1, 5), true).unwrap());
        assert_eq!(reader.current_key(), Some(&key(1, 16)));

        assert!(!reader.search_for_key(&key(2, 0), true).unwrap());
        assert_eq!(reader.current_key(), Some(&key(3, 8)));

        assert!(!reader.search_for_key(&key(9, 0), true).unwrap());
        assert!(reader.is_singular());
    }

    #[test]
    fn test_search_greatest_lower_bound() {
        let mut reader = BTreeReader::new(populated());
        assert!(!reader.search_for_key(&key(1, 5), false).unwrap());
        assert_eq!(reader.current_key(), Some(&key(1, 0)));

        assert!(!reader.search_for_key(&key(9, 0), false).unwrap());
        assert_eq!(reader.current_key(), Some(&key(5, 40)));

        // Nothing lower: falls back to the first record.
        assert!(!reader.search_for_key(&key(0, 0), false).unwrap());
        assert_eq!(reader.current_key(), Some(&key(1, 0)));
    }

    #[test]
    fn test_current_record_when_singular() {
        let reader = BTreeReader::new(populated());
        assert!(reader.current_record().unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_empty_tree() {
        let segment = Arc::new(IndexSegment::new(0, StorageConfig::default()));
        let root = segment.create_empty_root();
        let mut reader = BTreeReader::new(BTreeDescriptor::new(segment, root, &[]));
        assert!(!reader.search_first().unwrap());
        assert!(!reader.search_for_key(&IndexKey::new(vec![], RowId(3)), false).unwrap());
        assert!(reader.is_singular());
    }

    #[test]
    fn test_deletion_reader() {
        let segment = Arc::new(IndexSegment::new(1, StorageConfig::default()));
        let root = segment.create_empty_root();
        let desc = BTreeDescriptor::new(segment, root, &[]);
        let mut writer = BTreeWriter::new(desc.clone(), false);
        writer
            .insert(&IndexRecord::singleton(vec![], RowId(10)))
            .unwrap();
        writer
            .insert(&IndexRecord::from_rids(vec![], &[RowId(32), RowId(35), RowId(90)]).unwrap())
            .unwrap();

        let mut deleted = DeletionReader::new(desc).unwrap();
        assert!(deleted.search_for_rid(RowId(10)).unwrap());
        assert!(!deleted.search_for_rid(RowId(11)).unwrap());
        assert!(!deleted.search_for_rid(RowId(2)).unwrap());
        assert!(deleted.search_for_rid(RowId(35)).unwrap());
        assert!(deleted.search_for_rid(RowId(90)).unwrap());
        assert!(!deleted.search_for_rid(RowId(33)).unwrap());
        assert!(!deleted.search_for_rid(RowId(1000)).unwrap());
    }

    #[test]
    fn test_deletion_reader_requires_keyless_index() {
        let desc = populated();
        assert!(matches!(
            DeletionReader::new(desc),
            Err(ZyronError::ConfigError(_))
        ));
    }
}
