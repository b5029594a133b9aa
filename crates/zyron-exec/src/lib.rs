//! Execution streams for ZyronDB bitmap index maintenance.
//!
//! This crate provides:
//! - The pull-scheduled stream contract and tuple buffers between streams
//! - A shared row count slot handed from one stream to another
//! - Row-level error reporting
//! - The bitmap index splicer

pub mod buffer;
pub mod error_target;
pub mod param;
pub mod splicer;
pub mod stream;

pub use buffer::{ExecStreamBufAccessor, ExecStreamBufState};
pub use error_target::{ErrorLog, ErrorTarget, RowError};
pub use param::SharedRowCount;
pub use splicer::{LbmSplicerParams, LbmSplicerStream, SplicerStats, UNIQUE_CONSTRAINT_VIOLATED};
pub use stream::{ExecStream, ExecStreamQuantum, ExecStreamResourceQuantity, ExecStreamResult};
