//! In-memory bitmap entry that grows by merging fragments.

use super::payload::{self, LBM_ONE_BYTE_SIZE, RUN_HEADER_SIZE, RecordBytes, RunEncoder};
use super::record::{IndexRecord, key_overhead};
use crate::tuple::{Datum, TupleDescriptor};
use bytes::{Bytes, BytesMut};
use std::cmp::Ordering;
use zyron_common::{PAGE_HEADER_SIZE, Result, RowId, ZyronError};

/// Minimum number of maximum-size entries that must fit on one page.
pub const MIN_ENTRIES_PER_PAGE: usize = 4;

/// Returns the `(min, max)` encoded size of an entry for an index with
/// tuple descriptor `desc` and `n_keys` key columns on pages of `page_size`
/// bytes.
///
/// The minimum assumes empty variable-length keys and a one-byte bitmap.
pub fn size_bounds(desc: &TupleDescriptor, n_keys: usize, page_size: usize) -> Result<(usize, usize)> {
    let usable = page_size.saturating_sub(PAGE_HEADER_SIZE);
    let max = usable / MIN_ENTRIES_PER_PAGE;

    let keys: usize = desc.columns()[..n_keys]
        .iter()
        .map(|t| 1 + t.fixed_size().unwrap_or(2))
        .sum();
    let min = keys + 9 + 3 + RUN_HEADER_SIZE + 1;

    if max <= min {
        return Err(ZyronError::ConfigError(format!(
            "page size {} leaves {} bytes per bitmap entry, need more than {}",
            page_size, max, min
        )));
    }
    Ok((min, max))
}

/// A bitmap entry under construction.
///
/// Holds one bitmap in a buffer allocated once with the maximum entry size
/// as capacity, plus a second buffer of the same size used as merge
/// workspace. Merges never grow either buffer past that bound.
pub struct LbmEntry {
    keys: Vec<Datum>,
    start_rid: RowId,
    bitmap: BytesMut,
    merge: BytesMut,
    max_entry_size: usize,
}

impl LbmEntry {
    /// Creates an empty entry whose encoded size never exceeds `max_entry_size`.
    pub fn new(max_entry_size: usize) -> Self {
        Self {
            keys: Vec::new(),
            start_rid: RowId(0),
            bitmap: BytesMut::with_capacity(max_entry_size),
            merge: BytesMut::with_capacity(max_entry_size),
            max_entry_size,
        }
    }

    /// Returns the maximum encoded size of this entry.
    #[inline]
    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// Returns the key column values.
    pub fn keys(&self) -> &[Datum] {
        &self.keys
    }

    /// Returns the first row ID covered by this entry.
    #[inline]
    pub fn start_rid(&self) -> RowId {
        self.start_rid
    }

    /// Returns true if this entry covers a single row.
    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Returns the number of rows spanned by this entry.
    pub fn row_count(&self) -> u64 {
        if self.is_singleton() {
            1
        } else {
            payload::span_bytes(&self.bitmap) * LBM_ONE_BYTE_SIZE
        }
    }

    /// Returns the encoded size of this entry.
    pub fn encoded_len(&self) -> usize {
        key_overhead(&self.keys) + self.bitmap.len()
    }

    /// Replaces the contents of this entry with `record`.
    pub fn set_from(&mut self, record: &IndexRecord) -> Result<()> {
        record.validate()?;
        let size = record.encoded_len();
        if size > self.max_entry_size {
            return Err(ZyronError::EntryTooLarge {
                size,
                max: self.max_entry_size,
            });
        }
        self.keys.clear();
        self.keys.extend(record.keys.iter().cloned());
        self.start_rid = record.start_rid;
        self.bitmap.clear();
        self.bitmap.extend_from_slice(&record.payload);
        Ok(())
    }

    /// Compares the key columns of this entry with those of `record`.
    pub fn compare_key(&self, record: &IndexRecord) -> Ordering {
        self.keys.as_slice().cmp(record.keys.as_slice())
    }

    /// Merges the rows of `record` into this entry.
    ///
    /// Returns false, leaving the entry unchanged, if the merged entry would
    /// exceed the maximum entry size. The record must have the same key.
    pub fn try_merge(&mut self, record: &IndexRecord) -> Result<bool> {
        if self.compare_key(record) != Ordering::Equal {
            return Err(ZyronError::InvariantViolation(format!(
                "merging {} into an entry with a different key",
                record
            )));
        }
        record.validate()?;

        let limit = self
            .max_entry_size
            .saturating_sub(key_overhead(&self.keys));
        let Self {
            start_rid,
            bitmap,
            merge,
            ..
        } = self;

        let mut encoder = RunEncoder::new(merge, limit);
        let merged = payload::merge_union(
            RecordBytes::new(*start_rid, bitmap),
            record.bytes(),
            &mut encoder,
        );
        if !merged {
            return Ok(false);
        }
        let Some(encoded) = encoder.finish() else {
            return Err(ZyronError::InvariantViolation(
                "merge produced an empty bitmap".to_string(),
            ));
        };

        if encoded.bit_count == 1 {
            *start_rid = encoded.first_rid;
            bitmap.clear();
        } else {
            *start_rid = encoded.start;
            std::mem::swap(bitmap, merge);
        }
        Ok(true)
    }

    /// Produces a record holding the current contents of this entry.
    pub fn produce_record(&self) -> IndexRecord {
        IndexRecord {
            keys: self.keys.clone(),
            start_rid: self.start_rid,
            payload: Bytes::copy_from_slice(&self.bitmap),
        }
    }
}

impl std::fmt::Display for LbmEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.produce_record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::record::bitmap_tuple_descriptor;
    use zyron_common::TypeId;

    fn key(v: i64) -> Vec<Datum> {
        vec![Datum::Int64(v)]
    }

    fn singleton(v: i64, rid: u64) -> IndexRecord {
        IndexRecord::singleton(key(v), RowId(rid))
    }

    #[test]
    fn test_size_bounds() {
        let desc = bitmap_tuple_descriptor(&[TypeId::Int64]);
        let (min, max) = size_bounds(&desc, 1, 16384).unwrap();
        assert_eq!(max, (16384 - PAGE_HEADER_SIZE) / MIN_ENTRIES_PER_PAGE);
        assert_eq!(min, 9 + 9 + 3 + RUN_HEADER_SIZE + 1);

        assert!(matches!(
            size_bounds(&desc, 1, 64),
            Err(ZyronError::ConfigError(_))
        ));
    }

    #[test]
    fn test_set_from_and_produce() {
        let mut entry = LbmEntry::new(256);
        let record = IndexRecord::from_rids(key(1), &[RowId(16), RowId(20)]).unwrap();
        entry.set_from(&record).unwrap();
        assert!(!entry.is_singleton());
        assert_eq!(entry.start_rid(), RowId(16));
        assert_eq!(entry.row_count(), 8);
        assert_eq!(entry.produce_record(), record);
        assert_eq!(entry.encoded_len(), record.encoded_len());
    }

    #[test]
    fn test_set_from_too_large() {
        let mut entry = LbmEntry::new(32);
        let rids: Vec<RowId> = (0..40).map(|i| RowId(i * 8)).collect();
        let record = IndexRecord::from_rids(key(1), &rids).unwrap();
        assert!(matches!(
            entry.set_from(&record),
            Err(ZyronError::EntryTooLarge { .. })
        ));
    }

    #[test]
    fn test_merge_singletons() {
        let mut entry = LbmEntry::new(256);
        entry.set_from(&singleton(1, 13)).unwrap();
        assert!(entry.is_singleton());

        assert!(entry.try_merge(&singleton(1, 20)).unwrap());
        assert!(!entry.is_singleton());
        assert_eq!(entry.start_rid(), RowId(8));
        assert_eq!(entry.row_count(), 16);

        let rids: Vec<_> = entry.produce_record().rids().collect();
        assert_eq!(rids, vec![RowId(13), RowId(20)]);
    }

    #[test]
    fn test_merge_same_row_stays_singleton() {
        let mut entry = LbmEntry::new(256);
        entry.set_from(&singleton(1, 13)).unwrap();
        assert!(entry.try_merge(&singleton(1, 13)).unwrap());
        assert!(entry.is_singleton());
        assert_eq!(entry.start_rid(), RowId(13));
    }

    #[test]
    fn test_merge_before_start() {
        let mut entry = LbmEntry::new(256);
        entry
            .set_from(&IndexRecord::from_rids(key(1), &[RowId(64), RowId(65)]).unwrap())
            .unwrap();
        assert!(entry.try_merge(&singleton(1, 3)).unwrap());
        assert_eq!(entry.start_rid(), RowId(0));
        let rids: Vec<_> = entry.produce_record().rids().collect();
        assert_eq!(rids, vec![RowId(3), RowId(64), RowId(65)]);
    }

    #[test]
    fn test_merge_refused_leaves_entry_unchanged() {
        let max = key_overhead(&key(1)) + RUN_HEADER_SIZE + 2;
        let mut entry = LbmEntry::new(max);
        entry.set_from(&singleton(1, 0)).unwrap();
        assert!(entry.try_merge(&singleton(1, 9)).unwrap());
        let before = entry.produce_record();

        // A third byte would need one more payload byte than the limit allows.
        assert!(!entry.try_merge(&singleton(1, 17)).unwrap());
        assert_eq!(entry.produce_record(), before);

        // Rows inside the existing bytes still fit.
        assert!(entry.try_merge(&singleton(1, 15)).unwrap());
        assert_eq!(entry.encoded_len(), max);
    }

    #[test]
    fn test_merge_different_key_is_invariant_violation() {
        let mut entry = LbmEntry::new(256);
        entry.set_from(&singleton(1, 0)).unwrap();
        let err = entry.try_merge(&singleton(2, 1)).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_compare_key() {
        let mut entry = LbmEntry::new(256);
        entry.set_from(&singleton(5, 0)).unwrap();
        assert_eq!(entry.compare_key(&singleton(5, 99)), Ordering::Equal);
        assert_eq!(entry.compare_key(&singleton(6, 0)), Ordering::Less);
        assert_eq!(entry.compare_key(&singleton(4, 0)), Ordering::Greater);
    }

    #[test]
    fn test_buffers_keep_capacity() {
        let mut entry = LbmEntry::new(128);
        entry.set_from(&singleton(1, 0)).unwrap();
        for rid in 1..200 {
            if !entry.try_merge(&singleton(1, rid)).unwrap() {
                break;
            }
        }
        assert!(entry.encoded_len() <= 128);
        assert!(entry.bitmap.capacity() >= 128);
        assert!(entry.merge.capacity() >= 128);
    }
}
