//! Type identifiers and row identifiers for ZyronDB.

use serde::{Deserialize, Serialize};

/// Count of rows, as carried by row-count outputs and parameters.
pub type RecordNum = u64;

/// Identifier for the column types an index tuple can carry.
///
/// Type IDs are stored in tuple descriptors to identify the type of each
/// column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeId {
    // Boolean
    Boolean = 1,

    // Integer types
    Int32 = 12,
    Int64 = 13,

    // Unsigned integer types
    UInt64 = 23,

    // String types
    Varchar = 51,

    // Binary types
    Varbinary = 61,
}

impl TypeId {
    /// Returns the fixed byte size for this type, or None for variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            TypeId::Boolean => Some(1),
            TypeId::Int32 => Some(4),
            TypeId::Int64 | TypeId::UInt64 => Some(8),
            TypeId::Varchar | TypeId::Varbinary => None,
        }
    }

    /// Returns true if this type has a fixed byte size.
    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size().is_some()
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeId::Boolean => "BOOLEAN",
            TypeId::Int32 => "INT32",
            TypeId::Int64 => "INT64",
            TypeId::UInt64 => "UINT64",
            TypeId::Varchar => "VARCHAR",
            TypeId::Varbinary => "VARBINARY",
        };
        write!(f, "{}", name)
    }
}

/// Identifier of a logical row in the indexed table.
///
/// Row IDs are dense and monotonically assigned, so bitmap entries can
/// describe runs of them with one bit per row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RowId(pub u64);

impl RowId {
    /// Number of row IDs described by one bitmap byte.
    pub const BYTE_SPAN: u64 = 8;

    /// Creates a new row ID.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Rounds down to the first row ID of the bitmap byte containing this one.
    #[inline]
    pub const fn round_to_byte_boundary(&self) -> RowId {
        RowId(self.0 & !(Self::BYTE_SPAN - 1))
    }

    /// Returns the index of the bitmap byte containing this row ID.
    #[inline]
    pub const fn byte_index(&self) -> u64 {
        self.0 / Self::BYTE_SPAN
    }

    /// Returns the bit position of this row ID within its bitmap byte.
    #[inline]
    pub const fn bit_offset(&self) -> u32 {
        (self.0 % Self::BYTE_SPAN) as u32
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RowId {
    fn from(value: u64) -> Self {
        RowId(value)
    }
}
