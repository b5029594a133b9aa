//! Bitmap index records.
//!
//! An index record is the key columns, a start row ID, and a payload. Its
//! tuple layout appends two columns to the key columns:
//!
//! ```text
//! | key_0 | ... | key_n-1 | start_rid: UINT64 | payload: VARBINARY |
//! ```

use super::payload::{self, RecordBytes, RowIds};
use crate::btree::IndexKey;
use crate::tuple::{Datum, TupleData, TupleDescriptor};
use bytes::{Bytes, BytesMut};
use zyron_common::{Result, RowId, TypeId, ZyronError};

/// Builds the tuple descriptor of a bitmap index with the given key columns.
pub fn bitmap_tuple_descriptor(key_types: &[TypeId]) -> TupleDescriptor {
    let mut columns = key_types.to_vec();
    columns.push(TypeId::UInt64);
    columns.push(TypeId::Varbinary);
    TupleDescriptor::new(columns)
}

/// A bitmap fragment or stored index entry.
///
/// An empty payload makes the record a singleton covering exactly
/// `start_rid`. Otherwise `start_rid` is byte-aligned and the payload holds
/// compressed bit runs starting there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// Key column values.
    pub keys: Vec<Datum>,
    /// First row ID covered by the record.
    pub start_rid: RowId,
    /// Compressed bit runs, empty for singletons.
    pub payload: Bytes,
}

impl IndexRecord {
    /// Creates a singleton record for one row.
    pub fn singleton(keys: Vec<Datum>, rid: RowId) -> Self {
        Self {
            keys,
            start_rid: rid,
            payload: Bytes::new(),
        }
    }

    /// Creates a record covering strictly ascending row IDs.
    pub fn from_rids(keys: Vec<Datum>, rids: &[RowId]) -> Result<Self> {
        match rids {
            [] => Err(ZyronError::Internal(
                "bitmap fragment needs at least one row id".to_string(),
            )),
            [rid] => Ok(Self::singleton(keys, *rid)),
            _ => {
                let mut buf = BytesMut::new();
                let encoded = payload::encode_rids(rids, &mut buf, usize::MAX)?;
                Ok(Self {
                    keys,
                    start_rid: encoded.start,
                    payload: buf.freeze(),
                })
            }
        }
    }

    /// Returns true if this record covers a single row.
    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns the number of rows spanned by this record.
    ///
    /// Singletons span one row; bitmaps span every row from the aligned
    /// start to the end of the last run, whether set or not.
    pub fn row_count(&self) -> u64 {
        if self.is_singleton() {
            1
        } else {
            payload::span_bytes(&self.payload) * payload::LBM_ONE_BYTE_SIZE
        }
    }

    /// Returns the ordering key of this record in an index.
    pub fn index_key(&self) -> IndexKey {
        IndexKey::new(self.keys.clone(), self.start_rid)
    }

    /// Iterates the non-zero bitmap bytes of this record.
    pub fn bytes(&self) -> RecordBytes<'_> {
        RecordBytes::new(self.start_rid, &self.payload)
    }

    /// Iterates the row IDs set in this record, ascending.
    pub fn rids(&self) -> RowIds<RecordBytes<'_>> {
        RowIds::new(self.bytes())
    }

    /// Returns true if `rid` is set in this record.
    pub fn contains(&self, rid: RowId) -> bool {
        if self.is_singleton() {
            return rid == self.start_rid;
        }
        let target = rid.byte_index();
        let bit = 1u8 << rid.bit_offset();
        for (index, bits) in self.bytes() {
            if index == target {
                return bits & bit != 0;
            }
            if index > target {
                break;
            }
        }
        false
    }

    /// Checks the payload framing and start alignment.
    pub fn validate(&self) -> Result<()> {
        if self.is_singleton() {
            return Ok(());
        }
        if self.start_rid != self.start_rid.round_to_byte_boundary() {
            return Err(ZyronError::BitmapCorrupted(format!(
                "bitmap start row id {} is not byte aligned",
                self.start_rid
            )));
        }
        payload::validate_payload(&self.payload)
    }

    /// Converts this record into its tuple layout.
    pub fn to_tuple(&self) -> TupleData {
        let mut tuple = Vec::with_capacity(self.keys.len() + 2);
        tuple.extend(self.keys.iter().cloned());
        tuple.push(Datum::UInt64(self.start_rid.as_u64()));
        tuple.push(Datum::Varbinary(self.payload.clone()));
        tuple
    }

    /// Reads a record out of a tuple with `n_keys` key columns.
    ///
    /// A null payload column is read as a singleton.
    pub fn from_tuple(tuple: &[Datum], n_keys: usize) -> Result<Self> {
        if tuple.len() != n_keys + 2 {
            return Err(ZyronError::TypeMismatch {
                expected: format!("{} columns", n_keys + 2),
                actual: format!("{} columns", tuple.len()),
            });
        }
        let start_rid = match &tuple[n_keys] {
            Datum::UInt64(v) => RowId(*v),
            other => {
                return Err(ZyronError::TypeMismatch {
                    expected: TypeId::UInt64.to_string(),
                    actual: other
                        .type_id()
                        .map_or_else(|| "NULL".to_string(), |t| t.to_string()),
                });
            }
        };
        let payload = match &tuple[n_keys + 1] {
            Datum::Null => Bytes::new(),
            Datum::Varbinary(b) => b.clone(),
            other => {
                return Err(ZyronError::TypeMismatch {
                    expected: TypeId::Varbinary.to_string(),
                    actual: other
                        .type_id()
                        .map_or_else(|| "NULL".to_string(), |t| t.to_string()),
                });
            }
        };
        let record = Self {
            keys: tuple[..n_keys].to_vec(),
            start_rid,
            payload,
        };
        record.validate()?;
        Ok(record)
    }

    /// Returns the encoded size of this record in bytes.
    pub fn encoded_len(&self) -> usize {
        key_overhead(&self.keys) + self.payload.len()
    }

    /// Serializes this record using the index tuple descriptor.
    pub fn encode(&self, desc: &TupleDescriptor, buf: &mut BytesMut) -> Result<()> {
        desc.encode(&self.to_tuple(), buf)
    }

    /// Deserializes a record using the index tuple descriptor.
    pub fn decode(desc: &TupleDescriptor, buf: &[u8]) -> Result<Self> {
        let mut slice = buf;
        let tuple = desc.decode(&mut slice)?;
        if !slice.is_empty() {
            return Err(ZyronError::TupleDecode {
                column: desc.len(),
                reason: format!("{} trailing bytes", slice.len()),
            });
        }
        Self::from_tuple(&tuple, desc.len() - 2)
    }
}

/// Encoded bytes of a record other than its payload bytes: the key columns,
/// the start row ID column, and the payload column's presence and length.
pub(crate) fn key_overhead(keys: &[Datum]) -> usize {
    keys.iter().map(Datum::encoded_len).sum::<usize>() + 9 + 3
}

impl std::fmt::Display for IndexRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", key)?;
        }
        if self.is_singleton() {
            write!(f, "] @{} singleton", self.start_rid)
        } else {
            write!(
                f,
                "] @{} {} rows, {} payload bytes",
                self.start_rid,
                self.row_count(),
                self.payload.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: i64) -> Vec<Datum> {
        vec![Datum::Int64(v)]
    }

    #[test]
    fn test_singleton() {
        let record = IndexRecord::singleton(key(1), RowId(13));
        assert!(record.is_singleton());
        assert_eq!(record.row_count(), 1);
        assert!(record.contains(RowId(13)));
        assert!(!record.contains(RowId(12)));
        assert_eq!(record.rids().collect::<Vec<_>>(), vec![RowId(13)]);
    }

    #[test]
    fn test_from_rids() {
        let record =
            IndexRecord::from_rids(key(1), &[RowId(10), RowId(11), RowId(12)]).unwrap();
        assert!(!record.is_singleton());
        assert_eq!(record.start_rid, RowId(8));
        assert_eq!(record.row_count(), 8);
        assert_eq!(
            record.rids().collect::<Vec<_>>(),
            vec![RowId(10), RowId(11), RowId(12)]
        );
        assert!(record.contains(RowId(11)));
        assert!(!record.contains(RowId(9)));
        assert!(!record.contains(RowId(100)));

        let single = IndexRecord::from_rids(key(1), &[RowId(77)]).unwrap();
        assert!(single.is_singleton());
        assert!(IndexRecord::from_rids(key(1), &[]).is_err());
    }

    #[test]
    fn test_tuple_roundtrip_and_validation() {
        let record = IndexRecord::from_rids(key(5), &[RowId(0), RowId(9)]).unwrap();
        let tuple = record.to_tuple();
        assert_eq!(tuple.len(), 3);
        assert_eq!(IndexRecord::from_tuple(&tuple, 1).unwrap(), record);

        // Null payload column reads as a singleton.
        let tuple = vec![Datum::Int64(5), Datum::UInt64(42), Datum::Null];
        let singleton = IndexRecord::from_tuple(&tuple, 1).unwrap();
        assert!(singleton.is_singleton());
        assert_eq!(singleton.start_rid, RowId(42));

        // Wrong arity and wrong row id type.
        assert!(IndexRecord::from_tuple(&tuple, 0).is_err());
        let tuple = vec![Datum::Int64(5), Datum::Int64(42), Datum::Null];
        assert!(matches!(
            IndexRecord::from_tuple(&tuple, 1),
            Err(ZyronError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unaligned_bitmap_rejected() {
        let mut record = IndexRecord::from_rids(key(1), &[RowId(8), RowId(9)]).unwrap();
        record.start_rid = RowId(9);
        assert!(matches!(
            record.validate(),
            Err(ZyronError::BitmapCorrupted(_))
        ));
    }

    #[test]
    fn test_encode_decode() {
        let desc = bitmap_tuple_descriptor(&[TypeId::Int64, TypeId::Varchar]);
        let record = IndexRecord::from_rids(
            vec![Datum::Int64(3), Datum::Varchar("blue".into())],
            &[RowId(64), RowId(65), RowId(1000)],
        )
        .unwrap();
        let mut buf = BytesMut::new();
        record.encode(&desc, &mut buf).unwrap();
        assert_eq!(buf.len(), record.encoded_len());
        assert_eq!(IndexRecord::decode(&desc, &buf).unwrap(), record);

        buf.extend_from_slice(&[0xAB]);
        assert!(IndexRecord::decode(&desc, &buf).is_err());
    }

    #[test]
    fn test_display() {
        let record = IndexRecord::singleton(key(7), RowId(3));
        assert_eq!(record.to_string(), "[7] @3 singleton");
    }
}
