//! Open, close, deferred index creation, emptiness caching and end of stream.

use super::{LbmSplicerStream, SplicerStats};
use super::validator::ValidationState;
use crate::stream::{ExecStreamResourceQuantity, ExecStreamResult};
use tracing::debug;
use zyron_common::{Result, RowId, ZyronError};
use zyron_storage::{BTreeWriter, Datum, DeletionReader, LbmEntry};

impl LbmSplicerStream {
    pub(super) fn open_impl(&mut self, restart: bool) -> Result<()> {
        if !restart || self.current_entry.is_none() {
            self.current_entry = Some(LbmEntry::new(self.max_entry_size));
            self.new_index_created = false;
            self.root_versioned = false;

            if let Some(slot) = &self.write_row_count {
                slot.reset();
            }
            if let Some(desc) = &self.deletion_desc {
                self.deletion_reader = Some(DeletionReader::new(desc.clone())?);
            }
        }

        // The previous run may have filled an index that was empty, so
        // emptiness is checked again and the writer starts positioned.
        self.empty_table = None;
        self.writer = Some(BTreeWriter::new(self.write_desc.clone(), false));

        self.is_done = false;
        self.eos_flushed = false;
        self.curr_entry = false;
        self.curr_existing_entry = false;
        self.curr_btree_start_rid = RowId(0);
        self.num_rows_loaded = 0;
        self.validation = ValidationState::default();
        self.stats = SplicerStats::default();

        debug!(
            root = %self.write_desc.root_page_id,
            restart,
            create_new_index = self.create_new_index,
            unique = self.unique_key,
            max_entry_size = self.max_entry_size,
            "opened bitmap splicer"
        );
        Ok(())
    }

    /// Releases cursors before the writer that owns the index.
    pub(super) fn close_impl(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.end_search();
        }
        if let Some(reader) = self.deletion_reader.as_mut() {
            reader.end_search();
        }
        self.deletion_reader = None;
        self.current_entry = None;
        self.writer = None;
    }

    pub(super) fn resource_requirements_impl(&self) -> ExecStreamResourceQuantity {
        let trees = if self.unique_key { 2 } else { 1 };
        ExecStreamResourceQuantity {
            n_cache_pages: self.config.btree_cache_pages * trees,
        }
    }

    /// Returns true if the index held no records when first asked. An empty
    /// index gets a monotonic writer, since everything written to it from
    /// here on arrives in key order.
    pub(super) fn is_empty(&mut self) -> Result<bool> {
        if let Some(empty) = self.empty_table {
            return Ok(empty);
        }
        let writer = self.writer_mut()?;
        let empty = !writer.search_first()?;
        writer.end_search();
        if empty {
            self.writer = Some(BTreeWriter::new(self.write_desc.clone(), true));
            debug!(root = %self.write_desc.root_page_id, "index is empty, writing monotonically");
        }
        self.empty_table = Some(empty);
        Ok(empty)
    }

    /// Allocates the root of the new index on the first tuple read.
    pub(super) fn create_index(&mut self) {
        let root = self.write_desc.segment.create_empty_root();
        self.write_desc.root_page_id = root;
        self.new_index_created = true;
        self.empty_table = Some(true);
        self.writer = Some(BTreeWriter::new(self.write_desc.clone(), true));
        debug!(
            original = %self.orig_root_page_id,
            root = %root,
            "created new index root"
        );
    }

    /// Flushes the pending entry, resolves the row count and produces the
    /// summary tuple. The flush happens once even if the summary output is
    /// full and this is called again.
    pub(super) fn end_of_stream(&mut self) -> Result<ExecStreamResult> {
        if !self.eos_flushed {
            if self.curr_entry {
                self.insert_bitmap_entry()?;
            }
            if let Some(slot) = &self.insert_row_count {
                self.num_rows_loaded = slot.read()?;
            }
            if let Some(slot) = &self.write_row_count {
                slot.write(self.num_rows_loaded);
            }
            self.eos_flushed = true;
            debug!(
                rows = self.num_rows_loaded,
                inserted = self.stats.entries_inserted,
                deleted = self.stats.entries_deleted,
                violations = self.stats.violations,
                "bitmap splicer reached end of input"
            );
        }

        if !self
            .summary_output
            .produce_tuple(vec![Datum::UInt64(self.num_rows_loaded)])?
        {
            return Ok(ExecStreamResult::BufOverflow);
        }
        self.is_done = true;
        Ok(ExecStreamResult::BufOverflow)
    }

    /// Versions a newly created root and marks every output finished.
    pub(super) fn finish(&mut self) -> Result<ExecStreamResult> {
        if self.new_index_created && !self.root_versioned {
            let snapshot = self.snapshot.as_ref().ok_or_else(|| {
                ZyronError::ConfigError("new index root has no snapshot to version it".to_string())
            })?;
            snapshot.version_page(self.orig_root_page_id, self.write_desc.root_page_id)?;
            self.root_versioned = true;
        }
        self.summary_output.mark_eos();
        if let Some(violations) = &self.violation_output {
            violations.mark_eos();
        }
        Ok(ExecStreamResult::Eos)
    }
}
