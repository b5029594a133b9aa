//! Compressed bit-run payload encoding.
//!
//! A bitmap payload describes a set of row IDs relative to a byte-aligned
//! start row ID. One bitmap byte covers [`LBM_ONE_BYTE_SIZE`] consecutive
//! rows, least significant bit first. Bytes are grouped into runs:
//!
//! ```text
//! +-----------+----------+--------------------+
//! | gap: u32  | len: u16 | bitmap bytes (len) |  <- repeated
//! +-----------+----------+--------------------+
//! ```
//!
//! `gap` is the number of all-zero bytes skipped since the end of the
//! previous run (or since the start row ID for the first run). Zero gaps no
//! longer than a run header are stored inline instead of opening a new run.

use bytes::{BufMut, BytesMut};
use zyron_common::{Result, RowId, ZyronError};

/// Number of row IDs covered by one bitmap byte.
pub const LBM_ONE_BYTE_SIZE: u64 = RowId::BYTE_SPAN;

/// Size of a run header (gap:4 + len:2).
pub const RUN_HEADER_SIZE: usize = 6;

/// Maximum bitmap bytes in a single run.
const MAX_RUN_LEN: usize = u16::MAX as usize;

/// Rounds a row ID down to the start of its bitmap byte.
#[inline]
pub fn round_to_byte_boundary(rid: RowId) -> RowId {
    rid.round_to_byte_boundary()
}

/// Checks that a payload is a well-formed sequence of runs.
pub fn validate_payload(payload: &[u8]) -> Result<()> {
    let mut buf = payload;
    while !buf.is_empty() {
        if buf.len() < RUN_HEADER_SIZE {
            return Err(ZyronError::BitmapCorrupted(format!(
                "truncated run header: {} bytes left",
                buf.len()
            )));
        }
        let len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
        if len == 0 {
            return Err(ZyronError::BitmapCorrupted("empty run".to_string()));
        }
        if buf.len() < RUN_HEADER_SIZE + len {
            return Err(ZyronError::BitmapCorrupted(format!(
                "run of {} bytes overruns payload ({} left)",
                len,
                buf.len() - RUN_HEADER_SIZE
            )));
        }
        buf = &buf[RUN_HEADER_SIZE + len..];
    }
    Ok(())
}

/// Returns the number of bitmap bytes spanned by a payload, gaps included.
pub fn span_bytes(payload: &[u8]) -> u64 {
    let mut buf = payload;
    let mut total = 0u64;
    while buf.len() >= RUN_HEADER_SIZE {
        let gap = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64;
        let len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
        if buf.len() < RUN_HEADER_SIZE + len {
            break;
        }
        total += gap + len as u64;
        buf = &buf[RUN_HEADER_SIZE + len..];
    }
    total
}

/// Iterator over the non-zero bytes of a payload as
/// `(absolute byte index, bits)` pairs, in ascending byte order.
///
/// Stops at the first malformed run; payloads are validated at the codec
/// boundary before they are iterated.
#[derive(Debug, Clone)]
pub struct PayloadBytes<'a> {
    buf: &'a [u8],
    run: &'a [u8],
    cursor: u64,
}

impl<'a> PayloadBytes<'a> {
    /// Iterates a payload whose first byte covers `start`.
    pub fn new(start: RowId, payload: &'a [u8]) -> Self {
        Self {
            buf: payload,
            run: &[],
            cursor: start.byte_index(),
        }
    }
}

impl Iterator for PayloadBytes<'_> {
    type Item = (u64, u8);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((&bits, rest)) = self.run.split_first() {
                self.run = rest;
                let index = self.cursor;
                self.cursor += 1;
                if bits != 0 {
                    return Some((index, bits));
                }
                continue;
            }

            if self.buf.len() < RUN_HEADER_SIZE {
                return None;
            }
            let gap = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
            let len = u16::from_le_bytes([self.buf[4], self.buf[5]]) as usize;
            if self.buf.len() < RUN_HEADER_SIZE + len {
                return None;
            }
            self.cursor += gap as u64;
            self.run = &self.buf[RUN_HEADER_SIZE..RUN_HEADER_SIZE + len];
            self.buf = &self.buf[RUN_HEADER_SIZE + len..];
        }
    }
}

/// Iterator over the bitmap bytes of a record, singleton or not.
#[derive(Debug, Clone)]
pub struct RecordBytes<'a> {
    singleton: Option<(u64, u8)>,
    payload: PayloadBytes<'a>,
}

impl<'a> RecordBytes<'a> {
    /// Iterates the bytes of a record starting at `start` with `payload`.
    /// An empty payload denotes the single row `start`.
    pub fn new(start: RowId, payload: &'a [u8]) -> Self {
        let singleton = payload
            .is_empty()
            .then(|| (start.byte_index(), 1u8 << start.bit_offset()));
        Self {
            singleton,
            payload: PayloadBytes::new(start, payload),
        }
    }
}

impl Iterator for RecordBytes<'_> {
    type Item = (u64, u8);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(byte) = self.singleton.take() {
            return Some(byte);
        }
        self.payload.next()
    }
}

/// Iterator over the row IDs set in a sequence of bitmap bytes.
#[derive(Debug, Clone)]
pub struct RowIds<I> {
    bytes: I,
    current: Option<(u64, u8)>,
}

impl<I: Iterator<Item = (u64, u8)>> RowIds<I> {
    pub fn new(bytes: I) -> Self {
        Self {
            bytes,
            current: None,
        }
    }
}

impl<I: Iterator<Item = (u64, u8)>> Iterator for RowIds<I> {
    type Item = RowId;

    fn next(&mut self) -> Option<RowId> {
        loop {
            match self.current {
                Some((index, bits)) if bits != 0 => {
                    let bit = bits.trailing_zeros();
                    self.current = Some((index, bits & (bits - 1)));
                    return Some(RowId(index * LBM_ONE_BYTE_SIZE + bit as u64));
                }
                _ => self.current = Some(self.bytes.next()?),
            }
        }
    }
}

/// Summary of an encoded bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedBitmap {
    /// Byte-aligned row ID covered by the first payload byte.
    pub start: RowId,
    /// Number of set bits.
    pub bit_count: u64,
    /// The lowest set row ID.
    pub first_rid: RowId,
}

/// Streams ascending bitmap bytes into a bounded payload buffer.
pub struct RunEncoder<'a> {
    out: &'a mut BytesMut,
    limit: usize,
    base: Option<u64>,
    next_byte: u64,
    run_header: usize,
    run_len: usize,
    bit_count: u64,
    first_rid: RowId,
}

impl<'a> RunEncoder<'a> {
    /// Creates an encoder that clears `out` and never grows it past `limit` bytes.
    pub fn new(out: &'a mut BytesMut, limit: usize) -> Self {
        out.clear();
        Self {
            out,
            limit,
            base: None,
            next_byte: 0,
            run_header: 0,
            run_len: 0,
            bit_count: 0,
            first_rid: RowId(0),
        }
    }

    /// Appends a non-zero byte at `index`, which must be past every byte
    /// pushed so far. Returns false if the payload would exceed its limit.
    pub fn push(&mut self, index: u64, bits: u8) -> bool {
        debug_assert!(bits != 0);
        let Some(_) = self.base else {
            if !self.fits(RUN_HEADER_SIZE + 1) {
                return false;
            }
            self.base = Some(index);
            self.first_rid = RowId(index * LBM_ONE_BYTE_SIZE + bits.trailing_zeros() as u64);
            self.open_run(0);
            self.append(bits);
            self.next_byte = index + 1;
            return true;
        };

        debug_assert!(index >= self.next_byte);
        let gap = index - self.next_byte;
        if gap as usize <= RUN_HEADER_SIZE && self.run_len + gap as usize + 1 <= MAX_RUN_LEN {
            if !self.fits(gap as usize + 1) {
                return false;
            }
            for _ in 0..gap {
                self.append(0);
            }
            self.append(bits);
        } else {
            let Ok(gap) = u32::try_from(gap) else {
                return false;
            };
            if !self.fits(RUN_HEADER_SIZE + 1) {
                return false;
            }
            self.open_run(gap);
            self.append(bits);
        }
        self.next_byte = index + 1;
        true
    }

    /// Finishes encoding. Returns None if nothing was pushed.
    pub fn finish(self) -> Option<EncodedBitmap> {
        self.base.map(|base| EncodedBitmap {
            start: RowId(base * LBM_ONE_BYTE_SIZE),
            bit_count: self.bit_count,
            first_rid: self.first_rid,
        })
    }

    #[inline]
    fn fits(&self, extra: usize) -> bool {
        self.out.len() + extra <= self.limit
    }

    fn open_run(&mut self, gap: u32) {
        self.run_header = self.out.len();
        self.run_len = 0;
        self.out.put_u32_le(gap);
        self.out.put_u16_le(0);
    }

    fn append(&mut self, bits: u8) {
        self.out.put_u8(bits);
        self.bit_count += bits.count_ones() as u64;
        self.run_len += 1;
        let len = (self.run_len as u16).to_le_bytes();
        self.out[self.run_header + 4] = len[0];
        self.out[self.run_header + 5] = len[1];
    }
}

/// Writes the union of two ascending byte streams into `encoder`.
/// Returns false if the encoder ran out of room.
pub fn merge_union<A, B>(a: A, b: B, encoder: &mut RunEncoder<'_>) -> bool
where
    A: Iterator<Item = (u64, u8)>,
    B: Iterator<Item = (u64, u8)>,
{
    let mut a = a.peekable();
    let mut b = b.peekable();
    loop {
        let next = match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return true,
            (Some(x), None) => {
                a.next();
                x
            }
            (None, Some(y)) => {
                b.next();
                y
            }
            (Some(x), Some(y)) => {
                if x.0 < y.0 {
                    a.next();
                    x
                } else if y.0 < x.0 {
                    b.next();
                    y
                } else {
                    a.next();
                    b.next();
                    (x.0, x.1 | y.1)
                }
            }
        };
        if !encoder.push(next.0, next.1) {
            return false;
        }
    }
}

/// Encodes strictly ascending row IDs into `out`.
pub fn encode_rids(rids: &[RowId], out: &mut BytesMut, limit: usize) -> Result<EncodedBitmap> {
    let mut encoder = RunEncoder::new(out, limit);
    let mut pending: Option<(u64, u8)> = None;
    let mut prev: Option<RowId> = None;
    for &rid in rids {
        if prev.is_some_and(|p| p >= rid) {
            return Err(ZyronError::InvariantViolation(format!(
                "row ids not strictly ascending at {}",
                rid
            )));
        }
        prev = Some(rid);
        let bit = 1u8 << rid.bit_offset();
        pending = match pending {
            Some((index, bits)) if index == rid.byte_index() => Some((index, bits | bit)),
            Some((index, bits)) => {
                if !encoder.push(index, bits) {
                    return Err(ZyronError::EntryTooLarge {
                        size: limit + 1,
                        max: limit,
                    });
                }
                Some((rid.byte_index(), bit))
            }
            None => Some((rid.byte_index(), bit)),
        };
    }
    if let Some((index, bits)) = pending {
        if !encoder.push(index, bits) {
            return Err(ZyronError::EntryTooLarge {
                size: limit + 1,
                max: limit,
            });
        }
    }
    encoder
        .finish()
        .ok_or_else(|| ZyronError::Internal("cannot encode an empty row id set".to_string()))
}
