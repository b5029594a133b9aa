//! Tuple buffers connecting streams.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use zyron_common::Result;
use zyron_storage::{TupleData, TupleDescriptor};

/// Consumer-visible state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStreamBufState {
    /// At least one tuple is ready.
    DataReady,
    /// No tuple is ready but more may arrive.
    Underflow,
    /// No tuple is ready and none will arrive.
    Eos,
}

struct BufInner {
    tuples: VecDeque<TupleData>,
    eos: bool,
}

/// Handle to a tuple queue shared by one producer and one consumer.
///
/// Clones share the same queue. `produce_tuple` respects the capacity and
/// reports a full buffer; `push` is for sources that fill a buffer ahead of
/// time and ignores it.
#[derive(Clone)]
pub struct ExecStreamBufAccessor {
    desc: Arc<TupleDescriptor>,
    capacity: usize,
    inner: Arc<Mutex<BufInner>>,
}

impl ExecStreamBufAccessor {
    /// Creates an empty buffer of tuples laid out by `desc`.
    pub fn new(desc: TupleDescriptor, capacity: usize) -> Self {
        Self {
            desc: Arc::new(desc),
            capacity: capacity.max(1),
            inner: Arc::new(Mutex::new(BufInner {
                tuples: VecDeque::new(),
                eos: false,
            })),
        }
    }

    /// Returns the tuple descriptor.
    #[inline]
    pub fn tuple_desc(&self) -> &TupleDescriptor {
        &self.desc
    }

    /// Returns the capacity in tuples.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of queued tuples.
    pub fn len(&self) -> usize {
        self.inner.lock().tuples.len()
    }

    /// Returns true if no tuple is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().tuples.is_empty()
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    /// Appends a tuple regardless of capacity.
    pub fn push(&self, tuple: TupleData) -> Result<()> {
        self.desc.validate(&tuple)?;
        self.inner.lock().tuples.push_back(tuple);
        Ok(())
    }

    /// Appends a tuple if the buffer has room. Returns false if it is full.
    pub fn produce_tuple(&self, tuple: TupleData) -> Result<bool> {
        self.desc.validate(&tuple)?;
        let mut inner = self.inner.lock();
        if inner.tuples.len() >= self.capacity {
            return Ok(false);
        }
        inner.tuples.push_back(tuple);
        Ok(true)
    }

    /// Marks that no more tuples will be produced.
    pub fn mark_eos(&self) {
        self.inner.lock().eos = true;
    }

    /// Clears queued tuples and the end-of-stream mark.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.tuples.clear();
        inner.eos = false;
    }

    // =========================================================================
    // Consumer side
    // =========================================================================

    /// Returns the consumer-visible state.
    pub fn state(&self) -> ExecStreamBufState {
        let inner = self.inner.lock();
        if !inner.tuples.is_empty() {
            ExecStreamBufState::DataReady
        } else if inner.eos {
            ExecStreamBufState::Eos
        } else {
            ExecStreamBufState::Underflow
        }
    }

    /// Returns true if a tuple is ready to be read.
    pub fn demand_data(&self) -> bool {
        self.state() == ExecStreamBufState::DataReady
    }

    /// Returns true once every tuple has been consumed and no more will arrive.
    pub fn is_eos(&self) -> bool {
        self.state() == ExecStreamBufState::Eos
    }

    /// Returns a copy of the next tuple without consuming it.
    pub fn unmarshal_tuple(&self) -> Option<TupleData> {
        self.inner.lock().tuples.front().cloned()
    }

    /// Consumes the next tuple.
    pub fn consume_tuple(&self) {
        self.inner.lock().tuples.pop_front();
    }

    /// Removes and returns every queued tuple.
    pub fn drain(&self) -> Vec<TupleData> {
        self.inner.lock().tuples.drain(..).collect()
    }
}
