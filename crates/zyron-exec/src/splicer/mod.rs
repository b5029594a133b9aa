//! Bitmap index splicer.
//!
//! Consumes bitmap fragments sorted by `(key, start row ID)` and splices them
//! into a bitmap index, either appending to an existing index or building a
//! new one. At most one entry is held in memory at a time:
//!
//! ```text
//! input ──> validator ──> splice loop ──> LbmEntry ──flush──> BTreeWriter
//!              │                               ^
//!              │                               │ adopt on-disk entry
//!              v                               │
//!        violations                      positioning search
//! ```
//!
//! When a deletion index is supplied the index key must be unique. Rows
//! with duplicate keys are rejected onto the violation output and reported
//! to the error target; processing continues.
//!
//! The stream is resumable: every `execute` call may stop at any tuple and
//! the next call continues from there. At end of stream the pending entry
//! is flushed once, the row count is published, a single summary tuple is
//! produced, and a newly created index root is versioned in the snapshot.

mod lifecycle;
mod search;
mod splice;
mod validator;

use crate::buffer::ExecStreamBufAccessor;
use crate::error_target::ErrorTarget;
use crate::param::SharedRowCount;
use crate::stream::{ExecStream, ExecStreamQuantum, ExecStreamResourceQuantity, ExecStreamResult};
use std::sync::Arc;
pub use validator::UNIQUE_CONSTRAINT_VIOLATED;
use validator::ValidationState;
use zyron_common::{PageId, RecordNum, Result, RowId, SplicerConfig, TypeId, ZyronError};
use zyron_storage::{
    BTreeDescriptor, BTreeWriter, DeletionReader, LbmEntry, SnapshotSegment, TupleDescriptor,
    size_bounds,
};

/// Parameters of a splicer stream.
pub struct LbmSplicerParams {
    /// Index being written. In build mode its root is the original root
    /// that the newly created root versions.
    pub write_index: BTreeDescriptor,
    /// Deletion index. Supplying it makes the index key unique.
    pub deletion_index: Option<BTreeDescriptor>,
    /// Build a new index instead of appending to `write_index`.
    pub create_new_index: bool,
    /// Row count computed upstream. Without it, input tuples are single row
    /// IDs and rows are counted here.
    pub insert_row_count: Option<SharedRowCount>,
    /// Slot the final row count is published to.
    pub write_row_count: Option<SharedRowCount>,
    /// Snapshot that versions a newly created root. Required in build mode.
    pub snapshot: Option<Arc<SnapshotSegment>>,
    /// Input fragments.
    pub input: ExecStreamBufAccessor,
    /// Receives one `[row count]` tuple at end of stream.
    pub summary_output: ExecStreamBufAccessor,
    /// Receives one `[key..., row id]` tuple per rejected duplicate.
    pub violation_output: Option<ExecStreamBufAccessor>,
    /// Receives one row error per rejected duplicate.
    pub error_target: Option<Arc<dyn ErrorTarget>>,
    /// Tuning.
    pub config: SplicerConfig,
}

/// Statistics for one splicer run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplicerStats {
    /// Input tuples read.
    pub tuples_read: u64,
    /// Records inserted into the index.
    pub entries_inserted: u64,
    /// Records deleted from the index before being rewritten.
    pub entries_deleted: u64,
    /// Fragments merged into the current entry.
    pub merges: u64,
    /// Fragments that started a new entry because the current one was full.
    pub splits: u64,
    /// Singletons written by unique-key upserts.
    pub singletons_upserted: u64,
    /// Rejected duplicate rows.
    pub violations: u64,
}

/// Splices sorted bitmap fragments into a bitmap index.
pub struct LbmSplicerStream {
    // Setup
    write_desc: BTreeDescriptor,
    orig_root_page_id: PageId,
    deletion_desc: Option<BTreeDescriptor>,
    create_new_index: bool,
    insert_row_count: Option<SharedRowCount>,
    write_row_count: Option<SharedRowCount>,
    snapshot: Option<Arc<SnapshotSegment>>,
    input: ExecStreamBufAccessor,
    summary_output: ExecStreamBufAccessor,
    violation_output: Option<ExecStreamBufAccessor>,
    error_target: Option<Arc<dyn ErrorTarget>>,
    config: SplicerConfig,
    n_keys: usize,
    compute_row_count: bool,
    unique_key: bool,
    max_entry_size: usize,

    // Held between open and close
    writer: Option<BTreeWriter>,
    deletion_reader: Option<DeletionReader>,
    current_entry: Option<LbmEntry>,

    // Survives restart
    new_index_created: bool,
    root_versioned: bool,

    // Reset on every open
    empty_table: Option<bool>,
    is_done: bool,
    eos_flushed: bool,
    curr_entry: bool,
    curr_existing_entry: bool,
    curr_btree_start_rid: RowId,
    num_rows_loaded: RecordNum,
    validation: ValidationState,
    stats: SplicerStats,
}

impl LbmSplicerStream {
    /// Creates a splicer, checking that inputs, outputs and indexes fit
    /// together.
    pub fn new(params: LbmSplicerParams) -> Result<Self> {
        let write_desc = params.write_index;
        let n_keys = write_desc.n_keys;
        let compute_row_count = params.insert_row_count.is_none();

        if compute_row_count {
            if n_keys != 0 {
                return Err(ZyronError::ConfigError(format!(
                    "counting rows locally needs an index without key columns, found {}",
                    n_keys
                )));
            }
            expect_desc(
                "input",
                params.input.tuple_desc(),
                &TupleDescriptor::new(vec![TypeId::UInt64]),
            )?;
        } else {
            expect_desc("input", params.input.tuple_desc(), &write_desc.tuple_desc)?;
        }

        expect_desc(
            "summary output",
            params.summary_output.tuple_desc(),
            &TupleDescriptor::new(vec![TypeId::UInt64]),
        )?;

        let (_, max_entry_size) =
            size_bounds(&write_desc.tuple_desc, n_keys, params.config.page_size)?;

        let unique_key = params.deletion_index.is_some();
        if let Some(deletion) = &params.deletion_index {
            if n_keys == 0 {
                return Err(ZyronError::ConfigError(
                    "a unique bitmap index needs at least one key column".to_string(),
                ));
            }
            if deletion.n_keys != 0 {
                return Err(ZyronError::ConfigError(format!(
                    "deletion index must have no key columns, found {}",
                    deletion.n_keys
                )));
            }
            if let Some(violations) = &params.violation_output {
                let mut columns = write_desc.tuple_desc.columns()[..n_keys].to_vec();
                columns.push(TypeId::UInt64);
                expect_desc(
                    "violation output",
                    violations.tuple_desc(),
                    &TupleDescriptor::new(columns),
                )?;
            }
        }

        if params.create_new_index && params.snapshot.is_none() {
            return Err(ZyronError::ConfigError(
                "building a new index needs a snapshot segment".to_string(),
            ));
        }

        Ok(Self {
            orig_root_page_id: write_desc.root_page_id,
            write_desc,
            deletion_desc: params.deletion_index,
            create_new_index: params.create_new_index,
            insert_row_count: params.insert_row_count,
            write_row_count: params.write_row_count,
            snapshot: params.snapshot,
            input: params.input,
            summary_output: params.summary_output,
            violation_output: params.violation_output,
            error_target: params.error_target,
            config: params.config,
            n_keys,
            compute_row_count,
            unique_key,
            max_entry_size,
            writer: None,
            deletion_reader: None,
            current_entry: None,
            new_index_created: false,
            root_versioned: false,
            empty_table: None,
            is_done: false,
            eos_flushed: false,
            curr_entry: false,
            curr_existing_entry: false,
            curr_btree_start_rid: RowId(0),
            num_rows_loaded: 0,
            validation: ValidationState::default(),
            stats: SplicerStats::default(),
        })
    }

    /// Returns the statistics of the current run.
    pub fn stats(&self) -> &SplicerStats {
        &self.stats
    }

    /// Returns the root the stream writes to. In build mode this changes to
    /// the new root once the first tuple is read.
    pub fn root_page_id(&self) -> PageId {
        self.write_desc.root_page_id
    }

    /// Returns the descriptor of the index being written.
    pub fn write_descriptor(&self) -> &BTreeDescriptor {
        &self.write_desc
    }

    /// Returns true once a new root has been allocated.
    pub fn new_index_created(&self) -> bool {
        self.new_index_created
    }

    /// Returns the maximum encoded size of an index entry.
    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// Returns the number of rows loaded so far. Final once the summary
    /// tuple has been produced.
    pub fn rows_loaded(&self) -> RecordNum {
        self.num_rows_loaded
    }

    fn writer_mut(&mut self) -> Result<&mut BTreeWriter> {
        self.writer.as_mut().ok_or_else(not_open)
    }

    fn entry(&self) -> Result<&LbmEntry> {
        self.current_entry.as_ref().ok_or_else(not_open)
    }

    fn entry_mut(&mut self) -> Result<&mut LbmEntry> {
        self.current_entry.as_mut().ok_or_else(not_open)
    }
}

impl ExecStream for LbmSplicerStream {
    fn open(&mut self, restart: bool) -> Result<()> {
        self.open_impl(restart)
    }

    fn execute(&mut self, quantum: &ExecStreamQuantum) -> Result<ExecStreamResult> {
        self.execute_impl(quantum)
    }

    fn close(&mut self) {
        self.close_impl();
    }

    fn resource_requirements(&self) -> ExecStreamResourceQuantity {
        self.resource_requirements_impl()
    }
}

fn not_open() -> ZyronError {
    ZyronError::Internal("splicer stream is not open".to_string())
}

fn expect_desc(what: &str, actual: &TupleDescriptor, expected: &TupleDescriptor) -> Result<()> {
    if actual != expected {
        return Err(ZyronError::ConfigError(format!(
            "{} columns {:?} do not match {:?}",
            what,
            actual.columns(),
            expected.columns()
        )));
    }
    Ok(())
}
