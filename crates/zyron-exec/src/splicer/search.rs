//! Locating the on-disk entry a fragment belongs to.

use super::LbmSplicerStream;
use tracing::trace;
use zyron_common::{Result, RowId, ZyronError};
use zyron_storage::{IndexRecord, LBM_ONE_BYTE_SIZE};

impl LbmSplicerStream {
    /// Finds the on-disk entry `fragment` should be spliced into, leaving
    /// the writer positioned on it.
    ///
    /// With key columns the entry must have the fragment's key: the least
    /// upper bound is tried first, then the greatest lower bound. Without
    /// key columns the closest entry is returned: the greatest lower bound,
    /// unless it does not cover the fragment's row and the next entry's
    /// first byte does.
    ///
    /// A keyed least upper bound with the fragment's key must start in the
    /// fragment's first byte; anything later means the fragment would be
    /// spliced into an entry past its position.
    pub(super) fn find_btree_entry(&mut self, fragment: &IndexRecord) -> Result<Option<IndexRecord>> {
        let n_keys = self.n_keys;
        let key = fragment.index_key();
        let writer = self.writer_mut()?;

        if writer.search_for_key(&key, n_keys > 0)? {
            return writer.current_record().map(Some);
        }

        if n_keys == 0 {
            if writer.is_singular() {
                return Ok(None);
            }
            let new_rid = fragment.start_rid;
            let glb = writer.current_record()?;
            if rid_overlaps(new_rid, &glb, false) || !writer.search_next()? {
                return Ok(Some(glb));
            }
            let next = writer.current_record()?;
            if rid_overlaps(new_rid, &next, true) {
                return Ok(Some(next));
            }
            if writer.search_for_key(&key, false)? {
                return Err(ZyronError::InvariantViolation(format!(
                    "entry {} appeared between searches",
                    key
                )));
            }
            return writer.current_record().map(Some);
        }

        if !writer.is_singular() {
            let lub = writer.current_record()?;
            if lub.keys == fragment.keys {
                if lub.start_rid.round_to_byte_boundary()
                    != fragment.start_rid.round_to_byte_boundary()
                {
                    return Err(ZyronError::InvariantViolation(format!(
                        "fragment {} sorts before entry {} of the same key",
                        fragment, lub
                    )));
                }
                return Ok(Some(lub));
            }
        }

        if writer.search_for_key(&key, false)? {
            return Err(ZyronError::InvariantViolation(format!(
                "greatest lower bound search hit {} exactly after the least upper bound missed it",
                key
            )));
        }
        if writer.is_singular() {
            return Ok(None);
        }
        let glb = writer.current_record()?;
        Ok((glb.keys == fragment.keys).then_some(glb))
    }

    /// Switches the current entry to the on-disk entry closest to
    /// `fragment` when that entry is a better home for it. Only used when
    /// loading single rows into an index without key columns.
    pub(super) fn find_better_entry(&mut self, fragment: &IndexRecord) -> Result<()> {
        if self.is_empty()? {
            return Ok(());
        }
        let Some(found) = self.find_btree_entry(fragment)? else {
            return Ok(());
        };

        let btree_rid = found.start_rid.round_to_byte_boundary();
        let new_rid = fragment.start_rid;
        let entry = self.entry()?;
        let curr_rid = entry.start_rid().round_to_byte_boundary();

        if (curr_rid > new_rid && curr_rid > btree_rid) || (new_rid >= btree_rid && btree_rid > curr_rid)
        {
            let row_count = match entry.row_count() {
                1 => LBM_ONE_BYTE_SIZE,
                n => n,
            };
            if btree_rid >= curr_rid && btree_rid.as_u64() - curr_rid.as_u64() < row_count {
                return Ok(());
            }

            trace!(
                current = %curr_rid,
                found = %found.start_rid,
                rid = %new_rid,
                "switching to closer on-disk entry"
            );
            self.insert_bitmap_entry()?;
            self.curr_existing_entry = true;
            self.create_new_bitmap_entry(&found)?;
        }
        Ok(())
    }
}

/// Returns true if `rid` falls in the byte-aligned range of `entry`: its
/// first byte when `first_byte` is set, otherwise every row it spans, with
/// singletons covering a whole byte.
pub(super) fn rid_overlaps(rid: RowId, entry: &IndexRecord, first_byte: bool) -> bool {
    let start = entry.start_rid.round_to_byte_boundary();
    let span = if first_byte {
        LBM_ONE_BYTE_SIZE
    } else {
        match entry.row_count() {
            1 => LBM_ONE_BYTE_SIZE,
            n => n,
        }
    };
    rid >= start && rid.as_u64() - start.as_u64() < span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_overlaps_singleton_covers_byte() {
        let entry = IndexRecord::singleton(vec![], RowId(13));
        assert!(rid_overlaps(RowId(8), &entry, false));
        assert!(rid_overlaps(RowId(15), &entry, false));
        assert!(!rid_overlaps(RowId(16), &entry, false));
        assert!(!rid_overlaps(RowId(7), &entry, false));
    }

    #[test]
    fn test_rid_overlaps_bitmap_span() {
        let entry = IndexRecord::from_rids(vec![], &[RowId(16), RowId(40)]).unwrap();
        assert_eq!(entry.row_count(), 32);
        assert!(rid_overlaps(RowId(47), &entry, false));
        assert!(!rid_overlaps(RowId(48), &entry, false));
        // First byte only.
        assert!(rid_overlaps(RowId(23), &entry, true));
        assert!(!rid_overlaps(RowId(24), &entry, true));
    }

    #[test]
    fn test_rid_overlaps_last_byte_of_range() {
        let entry = IndexRecord::singleton(vec![], RowId(u64::MAX - 2));
        assert!(rid_overlaps(RowId(u64::MAX), &entry, false));
        assert!(rid_overlaps(RowId(u64::MAX - 7), &entry, true));
        assert!(!rid_overlaps(RowId(u64::MAX - 8), &entry, false));
    }
}
