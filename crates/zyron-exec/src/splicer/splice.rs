//! The per-tuple splice loop and the current entry's updates.

use super::LbmSplicerStream;
use super::validator::ValidatedTuple;
use crate::stream::{ExecStreamQuantum, ExecStreamResult};
use std::cmp::Ordering;
use tracing::trace;
use zyron_common::{Result, ZyronError};
use zyron_storage::{IndexKey, IndexRecord};

impl LbmSplicerStream {
    pub(super) fn execute_impl(&mut self, quantum: &ExecStreamQuantum) -> Result<ExecStreamResult> {
        if self.is_done {
            return self.finish();
        }
        if self.input.is_eos() {
            return self.end_of_stream();
        }

        for _ in 0..quantum.n_tuples_max {
            let fragment = match self.get_validated_tuple()? {
                ValidatedTuple::Ready(fragment) => fragment,
                ValidatedTuple::Suspend(ExecStreamResult::BufUnderflow) if self.input.is_eos() => {
                    return self.end_of_stream();
                }
                ValidatedTuple::Suspend(rc) => return Ok(rc),
            };

            if self.unique_required(&fragment) {
                if self.curr_entry {
                    self.insert_bitmap_entry()?;
                }
                self.upsert_singleton(&fragment)?;
            } else if !self.curr_entry {
                if self.existing_entry(&fragment)? {
                    self.splice_entry(&fragment)?;
                }
            } else {
                let order = self.entry()?.compare_key(&fragment);
                match order {
                    Ordering::Greater => {
                        return Err(ZyronError::InvariantViolation(format!(
                            "input fragment {} sorts before the current entry {}",
                            fragment,
                            self.entry()?
                        )));
                    }
                    Ordering::Equal => {
                        if self.compute_row_count {
                            self.find_better_entry(&fragment)?;
                        }
                        self.splice_entry(&fragment)?;
                    }
                    Ordering::Less => {
                        self.insert_bitmap_entry()?;
                        if self.existing_entry(&fragment)? {
                            self.splice_entry(&fragment)?;
                        }
                    }
                }
            }
            self.input.consume_tuple();
        }

        Ok(ExecStreamResult::QuantumExpired)
    }

    /// Makes the on-disk entry for `fragment` the current entry if there is
    /// one and returns true. Otherwise the fragment itself becomes the
    /// current entry.
    pub(super) fn existing_entry(&mut self, fragment: &IndexRecord) -> Result<bool> {
        if !self.is_empty()? {
            if let Some(found) = self.find_btree_entry(fragment)? {
                self.curr_existing_entry = true;
                self.create_new_bitmap_entry(&found)?;
                return Ok(true);
            }
        }
        self.curr_existing_entry = false;
        self.create_new_bitmap_entry(fragment)?;
        Ok(false)
    }

    /// Merges `fragment` into the current entry, or flushes the entry and
    /// starts a new one from the fragment if the merged entry would not fit.
    pub(super) fn splice_entry(&mut self, fragment: &IndexRecord) -> Result<()> {
        if self.entry_mut()?.try_merge(fragment)? {
            self.stats.merges += 1;
            trace!(fragment = %fragment, "merged fragment into current entry");
            return Ok(());
        }
        self.stats.splits += 1;
        trace!(fragment = %fragment, "current entry full, starting a new one");
        self.insert_bitmap_entry()?;
        self.create_new_bitmap_entry(fragment)
    }

    /// Writes the current entry to the index. An entry read from the index
    /// replaces its original, which is found again by key and original
    /// start row ID since searches since then may have moved the writer.
    pub(super) fn insert_bitmap_entry(&mut self) -> Result<()> {
        let record = self.entry()?.produce_record();
        let existing = self.curr_existing_entry;
        let original = IndexKey::new(record.keys.clone(), self.curr_btree_start_rid);
        let writer = self.writer_mut()?;

        if existing {
            if !writer.search_for_key(&original, false)? {
                return Err(ZyronError::InvariantViolation(format!(
                    "on-disk entry {} not found again for rewrite",
                    original
                )));
            }
            writer.delete_current()?;
            trace!(entry = %original, "deleted on-disk entry before rewrite");
        }
        writer.insert(&record)?;
        trace!(entry = %record, "inserted entry");

        if existing {
            self.stats.entries_deleted += 1;
            self.curr_existing_entry = false;
        }
        self.stats.entries_inserted += 1;
        self.curr_entry = false;
        Ok(())
    }

    /// Makes `record` the current entry.
    pub(super) fn create_new_bitmap_entry(&mut self, record: &IndexRecord) -> Result<()> {
        self.entry_mut()?.set_from(record)?;
        self.curr_btree_start_rid = record.start_rid;
        self.curr_entry = true;
        Ok(())
    }

    /// Replaces the singleton for `fragment`'s key, if any, with `fragment`.
    pub(super) fn upsert_singleton(&mut self, fragment: &IndexRecord) -> Result<()> {
        if !self.is_empty()? {
            if let Some(existing) = self.find_btree_entry(fragment)? {
                if !existing.is_singleton() {
                    return Err(ZyronError::InvariantViolation(format!(
                        "unique index entry {} is not a singleton",
                        existing
                    )));
                }
                self.writer_mut()?.delete_current()?;
                self.stats.entries_deleted += 1;
                trace!(entry = %existing, "deleted replaced singleton");
            }
        }
        self.writer_mut()?.insert(fragment)?;
        self.stats.entries_inserted += 1;
        self.stats.singletons_upserted += 1;
        trace!(entry = %fragment, "upserted singleton");
        Ok(())
    }
}
