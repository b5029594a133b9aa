//! ZyronDB common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all ZyronDB components.

pub mod config;
pub mod error;
pub mod page;
pub mod types;

pub use config::{SplicerConfig, StorageConfig};
pub use error::{Result, ZyronError};
pub use page::{PAGE_HEADER_SIZE, PAGE_SIZE, PageId};
pub use types::{RecordNum, RowId, TypeId};
