//! Pull-scheduled execution stream contract.

use zyron_common::Result;

/// Outcome of one `execute` call. None of these are errors; they tell the
/// scheduler when to call the stream again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStreamResult {
    /// An input has no tuple ready. Call again after it is refilled.
    BufUnderflow,
    /// An output is full. Call again after it is drained.
    BufOverflow,
    /// The quantum was used up with work remaining.
    QuantumExpired,
    /// All outputs are at end of stream.
    Eos,
}

/// Maximum amount of work per `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStreamQuantum {
    /// Maximum input tuples to process.
    pub n_tuples_max: u64,
}

impl ExecStreamQuantum {
    /// Creates a quantum of `n_tuples_max` tuples.
    pub fn new(n_tuples_max: u64) -> Self {
        Self { n_tuples_max }
    }
}

impl Default for ExecStreamQuantum {
    fn default() -> Self {
        Self {
            n_tuples_max: u64::MAX,
        }
    }
}

/// Resources a stream asks the scheduler to reserve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStreamResourceQuantity {
    /// Cache pages the stream keeps pinned.
    pub n_cache_pages: u32,
}

/// A stream driven by a cooperative scheduler.
///
/// State lives in the stream between calls, so `execute` may return at any
/// tuple boundary and resume exactly there on the next call.
pub trait ExecStream {
    /// Prepares for execution. With `restart` set, per-run state is reset
    /// and the stream runs again over fresh input.
    fn open(&mut self, restart: bool) -> Result<()>;

    /// Does at most `quantum` worth of work.
    fn execute(&mut self, quantum: &ExecStreamQuantum) -> Result<ExecStreamResult>;

    /// Releases every resource held by the stream.
    fn close(&mut self);

    /// Returns the resources the stream needs while open.
    fn resource_requirements(&self) -> ExecStreamResourceQuantity;
}
