//! Positioned write access to a bitmap index tree.

use super::BTreeDescriptor;
use super::reader::BTreeReader;
use super::types::IndexKey;
use crate::bitmap::IndexRecord;
use bytes::BytesMut;
use std::collections::btree_map::Entry;
use zyron_common::{Result, ZyronError};

/// Writer over one index tree.
///
/// Shares the positioning operations of [`BTreeReader`] and adds delete and
/// insert. In monotonic mode every insert must sort after every record
/// already in the tree, which holds when filling a tree that started empty
/// from sorted input.
pub struct BTreeWriter {
    reader: BTreeReader,
    monotonic: bool,
}

impl BTreeWriter {
    /// Creates a writer over the tree described by `desc`.
    pub fn new(desc: BTreeDescriptor, monotonic: bool) -> Self {
        Self {
            reader: BTreeReader::new(desc),
            monotonic,
        }
    }

    /// Returns the descriptor of the tree.
    #[inline]
    pub fn descriptor(&self) -> &BTreeDescriptor {
        self.reader.descriptor()
    }

    /// Returns true if inserts must arrive in ascending key order.
    #[inline]
    pub fn is_monotonic(&self) -> bool {
        self.monotonic
    }

    /// See [`BTreeReader::search_first`].
    pub fn search_first(&mut self) -> Result<bool> {
        self.reader.search_first()
    }

    /// See [`BTreeReader::search_for_key`].
    pub fn search_for_key(&mut self, key: &IndexKey, least_upper: bool) -> Result<bool> {
        self.reader.search_for_key(key, least_upper)
    }

    /// See [`BTreeReader::search_next`].
    pub fn search_next(&mut self) -> Result<bool> {
        self.reader.search_next()
    }

    /// See [`BTreeReader::is_singular`].
    #[inline]
    pub fn is_singular(&self) -> bool {
        self.reader.is_singular()
    }

    /// See [`BTreeReader::current_record`].
    pub fn current_record(&self) -> Result<IndexRecord> {
        self.reader.current_record()
    }

    /// See [`BTreeReader::end_search`].
    #[inline]
    pub fn end_search(&mut self) {
        self.reader.end_search();
    }

    /// Deletes the record the writer is positioned on. The writer is
    /// singular afterwards.
    pub fn delete_current(&mut self) -> Result<()> {
        let Some(key) = self.reader.current_key().cloned() else {
            return Err(ZyronError::InvariantViolation(
                "delete from a singular index cursor".to_string(),
            ));
        };
        let desc = self.reader.descriptor();
        let removed = desc
            .segment
            .with_tree_mut(desc.root_page_id, |tree| tree.remove(&key))?;
        self.reader.end_search();
        match removed {
            Some(_) => Ok(()),
            None => Err(ZyronError::KeyNotFound),
        }
    }

    /// Inserts a record, failing with `DuplicateKey` if a record with the
    /// same key and start row ID exists. The writer is singular afterwards.
    pub fn insert(&mut self, record: &IndexRecord) -> Result<()> {
        let desc = self.reader.descriptor();
        let tuple = record.to_tuple();
        desc.tuple_desc.validate(&tuple)?;
        record.validate()?;

        let mut buf = BytesMut::with_capacity(record.encoded_len());
        desc.tuple_desc.encode(&tuple, &mut buf)?;
        let key = record.index_key();
        let monotonic = self.monotonic;

        desc.segment.with_tree_mut(desc.root_page_id, |tree| {
            if monotonic {
                if let Some((last, _)) = tree.last_key_value() {
                    if *last >= key {
                        return Err(ZyronError::InvariantViolation(format!(
                            "monotonic insert of {} after {}",
                            key, last
                        )));
                    }
                }
            }
            match tree.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(buf.freeze());
                    Ok(())
                }
                Entry::Occupied(_) => Err(ZyronError::DuplicateKey),
            }
        })??;

        self.reader.end_search();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::IndexSegment;
    use crate::tuple::Datum;
    use std::sync::Arc;
    use zyron_common::{RowId, StorageConfig, TypeId};

    fn descriptor() -> BTreeDescriptor {
        let segment = Arc::new(IndexSegment::new(0, StorageConfig::default()));
        let root = segment.create_empty_root();
        BTreeDescriptor::new(segment, root, &[TypeId::Int64])
    }

    fn singleton(v: i64, rid: u64) -> IndexRecord {
        IndexRecord::singleton(vec![Datum::Int64(v)], RowId(rid))
    }

    #[test]
    fn test_insert_and_scan() {
        let desc = descriptor();
        let mut writer = BTreeWriter::new(desc.clone(), false);
        writer.insert(&singleton(2, 0)).unwrap();
        writer.insert(&singleton(1, 0)).unwrap();
        let all = desc.scan().unwrap();
        assert_eq!(all, vec![singleton(1, 0), singleton(2, 0)]);
    }

    #[test]
    fn test_insert_duplicate() {
        let mut writer = BTreeWriter::new(descriptor(), false);
        writer.insert(&singleton(1, 4)).unwrap();
        assert!(matches!(
            writer.insert(&singleton(1, 4)),
            Err(ZyronError::DuplicateKey)
        ));
    }

    #[test]
    fn test_insert_rejects_oversized_key() {
        let segment = Arc::new(IndexSegment::new(0, StorageConfig::default()));
        let root = segment.create_empty_root();
        let desc = BTreeDescriptor::new(segment, root, &[TypeId::Varchar]);
        let mut writer = BTreeWriter::new(desc.clone(), false);

        let long = "k".repeat(crate::tuple::MAX_VARLEN_SIZE + 1);
        let record = IndexRecord::singleton(vec![Datum::Varchar(long)], RowId(3));
        assert!(matches!(
            writer.insert(&record),
            Err(ZyronError::EntryTooLarge { .. })
        ));
        assert!(desc.scan().unwrap().is_empty());
    }

    #[test]
    fn test_insert_type_checked() {
        let mut writer = BTreeWriter::new(descriptor(), false);
        let bad = IndexRecord::singleton(vec![Datum::Varchar("x".into())], RowId(0));
        assert!(matches!(
            writer.insert(&bad),
            Err(ZyronError::TypeMismatch { .. })
        ));
        let wrong_arity = IndexRecord::singleton(vec![], RowId(0));
        assert!(writer.insert(&wrong_arity).is_err());
    }

    #[test]
    fn test_monotonic_order() {
        let mut writer = BTreeWriter::new(descriptor(), true);
        assert!(writer.is_monotonic());
        writer.insert(&singleton(1, 0)).unwrap();
        writer.insert(&singleton(1, 8)).unwrap();
        writer.insert(&singleton(2, 0)).unwrap();
        let err = writer.insert(&singleton(1, 16)).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_delete_current() {
        let desc = descriptor();
        let mut writer = BTreeWriter::new(desc.clone(), false);
        writer.insert(&singleton(1, 0)).unwrap();
        writer.insert(&singleton(2, 0)).unwrap();

        assert!(writer.search_for_key(&singleton(1, 0).index_key(), false).unwrap());
        writer.delete_current().unwrap();
        assert!(writer.is_singular());
        assert_eq!(desc.scan().unwrap(), vec![singleton(2, 0)]);

        assert!(writer.delete_current().unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_insert_resets_position() {
        let mut writer = BTreeWriter::new(descriptor(), false);
        writer.insert(&singleton(1, 0)).unwrap();
        assert!(writer.search_first().unwrap());
        writer.insert(&singleton(3, 0)).unwrap();
        assert!(writer.is_singular());
    }
}
