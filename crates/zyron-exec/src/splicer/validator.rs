//! Unique key validation of input fragments.
//!
//! For each key the first row that is not deleted survives and is passed on
//! as a singleton; every other row of that key is a violation. When the
//! index already holds a live row for the key, every input row is a
//! violation. State is kept across calls so a full violation output can
//! suspend validation in the middle of a fragment.

use super::LbmSplicerStream;
use crate::error_target::RowError;
use crate::stream::ExecStreamResult;
use tracing::debug;
use zyron_common::{Result, RowId, ZyronError};
use zyron_storage::{Datum, IndexRecord};

/// Message attached to each rejected duplicate row.
pub const UNIQUE_CONSTRAINT_VIOLATED: &str = "unique constraint violated";

/// Outcome of reading the next input fragment.
pub(super) enum ValidatedTuple {
    /// A fragment ready to splice.
    Ready(IndexRecord),
    /// Stop and return this result to the scheduler.
    Suspend(ExecStreamResult),
}

/// Validation progress, kept across `execute` calls.
#[derive(Debug)]
pub(super) struct ValidationState {
    /// True while the rows of `input` are being validated.
    curr_validation: bool,
    /// True until the first key has been seen.
    first_validation: bool,
    /// Key of the group being validated.
    curr_unique_key: Vec<Datum>,
    /// Live rows already accepted for `curr_unique_key`.
    n_key_rows: u32,
    /// Fragment being validated.
    input: Option<IndexRecord>,
    /// Rows of `input`.
    rids: Vec<RowId>,
    /// Next row of `rids` to decide on.
    next_rid: usize,
    /// Surviving row of `input`, if any.
    upsert_rid: Option<RowId>,
}

impl Default for ValidationState {
    fn default() -> Self {
        Self {
            curr_validation: false,
            first_validation: true,
            curr_unique_key: Vec::new(),
            n_key_rows: 0,
            input: None,
            rids: Vec::new(),
            next_rid: 0,
            upsert_rid: None,
        }
    }
}

impl LbmSplicerStream {
    /// Reads the next input fragment, applying unique key validation.
    ///
    /// Fragments that need no validation are returned as read. Validated
    /// fragments come back as a singleton for the surviving row; fragments
    /// with no survivor are consumed here.
    pub(super) fn get_validated_tuple(&mut self) -> Result<ValidatedTuple> {
        loop {
            if !self.validation.curr_validation {
                let Some(tuple) = self.input.unmarshal_tuple() else {
                    return Ok(ValidatedTuple::Suspend(ExecStreamResult::BufUnderflow));
                };
                let fragment = if self.compute_row_count {
                    let rid = match tuple.first() {
                        Some(Datum::UInt64(rid)) => RowId(*rid),
                        other => {
                            return Err(ZyronError::TypeMismatch {
                                expected: "UINT64 row id".to_string(),
                                actual: format!("{:?}", other),
                            });
                        }
                    };
                    self.num_rows_loaded += 1;
                    IndexRecord::singleton(Vec::new(), rid)
                } else {
                    IndexRecord::from_tuple(&tuple, self.n_keys)?
                };
                self.stats.tuples_read += 1;

                if self.create_new_index && !self.new_index_created {
                    self.create_index();
                }

                if !self.unique_required(&fragment) {
                    return Ok(ValidatedTuple::Ready(fragment));
                }

                if self.validation.first_validation
                    || fragment.keys != self.validation.curr_unique_key
                {
                    self.validation.first_validation = false;
                    self.validation.curr_unique_key = fragment.keys.clone();
                    self.validation.n_key_rows = self.count_key_rows(&fragment)?;
                }

                self.validation.rids = fragment.rids().collect();
                self.validation.next_rid = 0;
                self.validation.upsert_rid = None;
                self.validation.input = Some(fragment);
                self.validation.curr_validation = true;
            }

            if self.validation.n_key_rows == 0 {
                while let Some(&rid) = self.validation.rids.get(self.validation.next_rid) {
                    self.validation.next_rid += 1;
                    if !self.create_new_index || !self.is_deleted(rid)? {
                        self.validation.upsert_rid = Some(rid);
                        self.validation.n_key_rows += 1;
                        break;
                    }
                }
            }

            while let Some(&rid) = self.validation.rids.get(self.validation.next_rid) {
                if self.create_new_index && self.is_deleted(rid)? {
                    self.validation.next_rid += 1;
                    continue;
                }
                let Some(output) = &self.violation_output else {
                    return Err(ZyronError::ConfigError(
                        "unique key violation with no violation output".to_string(),
                    ));
                };
                let mut violation = self.validation.curr_unique_key.clone();
                violation.push(Datum::UInt64(rid.as_u64()));
                if !output.produce_tuple(violation.clone())? {
                    return Ok(ValidatedTuple::Suspend(ExecStreamResult::BufOverflow));
                }
                self.post_violation(violation, rid);
                self.validation.next_rid += 1;
            }
            self.validation.curr_validation = false;

            let input = self.validation.input.take();
            if let (Some(rid), Some(input)) = (self.validation.upsert_rid, input) {
                return Ok(ValidatedTuple::Ready(IndexRecord::singleton(input.keys, rid)));
            }
            self.input.consume_tuple();
        }
    }

    /// Returns true if `fragment` is subject to unique key validation: the
    /// index is unique and no key column is null.
    pub(super) fn unique_required(&self, fragment: &IndexRecord) -> bool {
        self.unique_key && fragment.keys.iter().all(|key| !key.is_null())
    }

    /// Returns the number of live rows the index already holds for the key
    /// of `fragment`: zero or one.
    fn count_key_rows(&mut self, fragment: &IndexRecord) -> Result<u32> {
        if self.is_empty()? {
            return Ok(0);
        }
        let Some(found) = self.find_btree_entry(fragment)? else {
            return Ok(0);
        };
        if !found.is_singleton() {
            return Err(ZyronError::InvariantViolation(format!(
                "unique index entry {} is not a singleton",
                found
            )));
        }
        if self.is_deleted(found.start_rid)? {
            return Ok(0);
        }
        Ok(1)
    }

    fn is_deleted(&mut self, rid: RowId) -> Result<bool> {
        match self.deletion_reader.as_mut() {
            Some(reader) => reader.search_for_rid(rid),
            None => Ok(false),
        }
    }

    fn post_violation(&mut self, tuple: Vec<Datum>, rid: RowId) {
        self.stats.violations += 1;
        debug!(
            key = ?self.validation.curr_unique_key,
            rid = %rid,
            "{}",
            UNIQUE_CONSTRAINT_VIOLATED
        );
        if let Some(target) = &self.error_target {
            target.post_error(RowError {
                message: UNIQUE_CONSTRAINT_VIOLATED.to_string(),
                tuple,
            });
        }
    }
}
