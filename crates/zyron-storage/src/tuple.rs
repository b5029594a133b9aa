//! Typed tuple representation and serialization.
//!
//! Tuples flowing between streams and records stored in an index are both
//! sequences of [`Datum`] values described by a [`TupleDescriptor`]. All
//! decoding is bounds-checked; a short or malformed buffer yields
//! `ZyronError::TupleDecode` instead of a panic.

use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use zyron_common::{Result, TypeId, ZyronError};

/// Longest VARCHAR or VARBINARY value the u16 length prefix can describe.
pub const MAX_VARLEN_SIZE: usize = u16::MAX as usize;

/// A single column value.
///
/// Ordering is total, with `Null` sorting before every non-null value.
/// Values of different types only compare by variant order, which never
/// happens for columns that share a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Varchar(String),
    Varbinary(Bytes),
}

/// A row of column values.
pub type TupleData = Vec<Datum>;

impl Datum {
    /// Returns the type of this value, or None for null.
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(TypeId::Boolean),
            Datum::Int32(_) => Some(TypeId::Int32),
            Datum::Int64(_) => Some(TypeId::Int64),
            Datum::UInt64(_) => Some(TypeId::UInt64),
            Datum::Varchar(_) => Some(TypeId::Varchar),
            Datum::Varbinary(_) => Some(TypeId::Varbinary),
        }
    }

    /// Returns true if this value is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Returns the value as a u64 if it is a UINT64.
    #[inline]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Datum::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the encoded size of this value in bytes.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Datum::Null => 0,
            Datum::Boolean(_) => 1,
            Datum::Int32(_) => 4,
            Datum::Int64(_) | Datum::UInt64(_) => 8,
            Datum::Varchar(s) => 2 + s.len(),
            Datum::Varbinary(b) => 2 + b.len(),
        }
    }

    /// Fails if a variable-length value is longer than its length prefix
    /// can describe.
    pub fn check_len(&self) -> Result<()> {
        let len = match self {
            Datum::Varchar(s) => s.len(),
            Datum::Varbinary(b) => b.len(),
            _ => return Ok(()),
        };
        if len > MAX_VARLEN_SIZE {
            return Err(ZyronError::EntryTooLarge {
                size: len,
                max: MAX_VARLEN_SIZE,
            });
        }
        Ok(())
    }

    /// Serializes this value.
    ///
    /// Layout: a presence byte (0 = null), then the value. Fixed-size values
    /// are little-endian; variable-length values carry a u16 length prefix.
    /// Nothing is written if the value is too long for its prefix.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.check_len()?;
        match self {
            Datum::Null => buf.put_u8(0),
            Datum::Boolean(v) => {
                buf.put_u8(1);
                buf.put_u8(*v as u8);
            }
            Datum::Int32(v) => {
                buf.put_u8(1);
                buf.put_i32_le(*v);
            }
            Datum::Int64(v) => {
                buf.put_u8(1);
                buf.put_i64_le(*v);
            }
            Datum::UInt64(v) => {
                buf.put_u8(1);
                buf.put_u64_le(*v);
            }
            Datum::Varchar(s) => {
                buf.put_u8(1);
                buf.put_u16_le(s.len() as u16);
                buf.extend_from_slice(s.as_bytes());
            }
            Datum::Varbinary(b) => {
                buf.put_u8(1);
                buf.put_u16_le(b.len() as u16);
                buf.extend_from_slice(b);
            }
        }
        Ok(())
    }

    /// Deserializes a value of the given type, advancing `buf` past it.
    pub fn decode(type_id: TypeId, buf: &mut &[u8], column: usize) -> Result<Datum> {
        let present = take(buf, 1, column)?[0];
        if present == 0 {
            return Ok(Datum::Null);
        }
        let datum = match type_id {
            TypeId::Boolean => Datum::Boolean(take(buf, 1, column)?[0] != 0),
            TypeId::Int32 => {
                let b = take(buf, 4, column)?;
                Datum::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            TypeId::Int64 => Datum::Int64(i64::from_le_bytes(take_8(buf, column)?)),
            TypeId::UInt64 => Datum::UInt64(u64::from_le_bytes(take_8(buf, column)?)),
            TypeId::Varchar => {
                let len = take_len(buf, column)?;
                let raw = take(buf, len, column)?;
                let s = std::str::from_utf8(raw).map_err(|e| ZyronError::TupleDecode {
                    column,
                    reason: e.to_string(),
                })?;
                Datum::Varchar(s.to_string())
            }
            TypeId::Varbinary => {
                let len = take_len(buf, column)?;
                Datum::Varbinary(Bytes::copy_from_slice(take(buf, len, column)?))
            }
        };
        Ok(datum)
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(v) => write!(f, "{}", v),
            Datum::Int32(v) => write!(f, "{}", v),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::UInt64(v) => write!(f, "{}", v),
            Datum::Varchar(s) => write!(f, "'{}'", s),
            Datum::Varbinary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

fn take<'a>(buf: &mut &'a [u8], n: usize, column: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(ZyronError::TupleDecode {
            column,
            reason: format!("need {} bytes, have {}", n, buf.len()),
        });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn take_8(buf: &mut &[u8], column: usize) -> Result<[u8; 8]> {
    let b = take(buf, 8, column)?;
    let mut out = [0u8; 8];
    out.copy_from_slice(b);
    Ok(out)
}

fn take_len(buf: &mut &[u8], column: usize) -> Result<usize> {
    let b = take(buf, 2, column)?;
    Ok(u16::from_le_bytes([b[0], b[1]]) as usize)
}

/// Describes the column types of a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TupleDescriptor {
    columns: Vec<TypeId>,
}

impl TupleDescriptor {
    /// Creates a descriptor from column types.
    pub fn new(columns: Vec<TypeId>) -> Self {
        Self { columns }
    }

    /// Returns the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the descriptor has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the column types.
    pub fn columns(&self) -> &[TypeId] {
        &self.columns
    }

    /// Returns a descriptor over the first `n` columns.
    pub fn prefix(&self, n: usize) -> TupleDescriptor {
        TupleDescriptor::new(self.columns[..n.min(self.columns.len())].to_vec())
    }

    /// Checks that a tuple has this descriptor's arity and column types,
    /// and that variable-length values fit their length prefix. Nulls are
    /// accepted in any column.
    pub fn validate(&self, tuple: &[Datum]) -> Result<()> {
        if tuple.len() != self.columns.len() {
            return Err(ZyronError::TypeMismatch {
                expected: format!("{} columns", self.columns.len()),
                actual: format!("{} columns", tuple.len()),
            });
        }
        for (expected, datum) in self.columns.iter().zip(tuple) {
            if let Some(actual) = datum.type_id() {
                if actual != *expected {
                    return Err(ZyronError::TypeMismatch {
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }
            datum.check_len()?;
        }
        Ok(())
    }

    /// Compares the first `n_keys` columns of two tuples.
    pub fn compare_keys(a: &[Datum], b: &[Datum], n_keys: usize) -> Ordering {
        a[..n_keys].cmp(&b[..n_keys])
    }

    /// Serializes a tuple laid out by this descriptor.
    pub fn encode(&self, tuple: &[Datum], buf: &mut BytesMut) -> Result<()> {
        for datum in tuple {
            datum.encode(buf)?;
        }
        Ok(())
    }

    /// Deserializes a tuple laid out by this descriptor, advancing `buf`.
    pub fn decode(&self, buf: &mut &[u8]) -> Result<TupleData> {
        self.columns
            .iter()
            .enumerate()
            .map(|(column, type_id)| Datum::decode(*type_id, buf, column))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> TupleDescriptor {
        TupleDescriptor::new(vec![
            TypeId::Int64,
            TypeId::Varchar,
            TypeId::UInt64,
            TypeId::Varbinary,
        ])
    }

    #[test]
    fn test_null_sorts_first() {
        assert!(Datum::Null < Datum::Int64(i64::MIN));
        assert!(Datum::Null < Datum::Varchar(String::new()));
        assert!(Datum::Int64(-1) < Datum::Int64(0));
        assert!(Datum::Varchar("a".into()) < Datum::Varchar("b".into()));
    }

    #[test]
    fn test_tuple_encode_decode() {
        let tuple = vec![
            Datum::Int64(-42),
            Datum::Varchar("red".into()),
            Datum::UInt64(1000),
            Datum::Varbinary(Bytes::from_static(&[1, 2, 3])),
        ];
        let mut buf = BytesMut::new();
        desc().encode(&tuple, &mut buf).unwrap();
        let expected_len: usize = tuple.iter().map(Datum::encoded_len).sum();
        assert_eq!(buf.len(), expected_len);

        let mut slice = &buf[..];
        let decoded = desc().decode(&mut slice).unwrap();
        assert_eq!(decoded, tuple);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_decode_nulls() {
        let tuple = vec![Datum::Null, Datum::Null, Datum::UInt64(7), Datum::Null];
        let mut buf = BytesMut::new();
        desc().encode(&tuple, &mut buf).unwrap();
        let decoded = desc().decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, tuple);
    }

    #[test]
    fn test_decode_truncated() {
        let tuple = vec![
            Datum::Int64(5),
            Datum::Varchar("abcdef".into()),
            Datum::UInt64(1),
            Datum::Null,
        ];
        let mut buf = BytesMut::new();
        desc().encode(&tuple, &mut buf).unwrap();

        let truncated = &buf[..12];
        let err = desc().decode(&mut &truncated[..]).unwrap_err();
        assert!(matches!(err, ZyronError::TupleDecode { column: 1, .. }));
    }

    #[test]
    fn test_validate() {
        let d = desc();
        let good = vec![
            Datum::Int64(1),
            Datum::Null,
            Datum::UInt64(2),
            Datum::Varbinary(Bytes::new()),
        ];
        assert!(d.validate(&good).is_ok());

        let wrong_type = vec![
            Datum::Int64(1),
            Datum::UInt64(3),
            Datum::UInt64(2),
            Datum::Null,
        ];
        assert!(matches!(
            d.validate(&wrong_type),
            Err(ZyronError::TypeMismatch { .. })
        ));

        assert!(d.validate(&good[..2]).is_err());
    }

    #[test]
    fn test_oversized_varlen_is_rejected() {
        let d = desc();
        let long = vec![
            Datum::Int64(1),
            Datum::Varchar("x".repeat(MAX_VARLEN_SIZE + 1)),
            Datum::UInt64(2),
            Datum::Null,
        ];
        assert!(matches!(
            d.validate(&long),
            Err(ZyronError::EntryTooLarge { size, max: MAX_VARLEN_SIZE }) if size == MAX_VARLEN_SIZE + 1
        ));

        let mut buf = BytesMut::new();
        let err = Datum::Varbinary(Bytes::from(vec![0u8; MAX_VARLEN_SIZE + 1]))
            .encode(&mut buf)
            .unwrap_err();
        assert!(matches!(err, ZyronError::EntryTooLarge { .. }));
        assert!(buf.is_empty());

        // The longest value the prefix describes still round-trips.
        let edge = vec![
            Datum::Int64(1),
            Datum::Varchar("y".repeat(MAX_VARLEN_SIZE)),
            Datum::UInt64(2),
            Datum::Null,
        ];
        assert!(d.validate(&edge).is_ok());
        d.encode(&edge, &mut buf).unwrap();
        assert_eq!(d.decode(&mut &buf[..]).unwrap(), edge);
    }

    #[test]
    fn test_compare_keys() {
        let a = vec![Datum::Int64(1), Datum::UInt64(100)];
        let b = vec![Datum::Int64(1), Datum::UInt64(5)];
        let c = vec![Datum::Int64(2), Datum::UInt64(0)];
        assert_eq!(TupleDescriptor::compare_keys(&a, &b, 1), Ordering::Equal);
        assert_eq!(TupleDescriptor::compare_keys(&a, &b, 2), Ordering::Greater);
        assert_eq!(TupleDescriptor::compare_keys(&a, &c, 1), Ordering::Less);
        assert_eq!(TupleDescriptor::compare_keys(&a, &c, 0), Ordering::Equal);
    }

    #[test]
    fn test_prefix() {
        let d = desc();
        assert_eq!(d.prefix(2).columns(), &[TypeId::Int64, TypeId::Varchar]);
        assert!(d.prefix(0).is_empty());
    }
}
