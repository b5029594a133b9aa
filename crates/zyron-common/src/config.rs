//! Configuration structures for ZyronDB.

use crate::page::{PAGE_HEADER_SIZE, PAGE_SIZE};
use serde::{Deserialize, Serialize};

/// Storage configuration for an index segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Page size in bytes.
    pub page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
        }
    }
}

impl StorageConfig {
    /// Returns the bytes of each page available for index records.
    pub fn usable_page_size(&self) -> usize {
        self.page_size.saturating_sub(PAGE_HEADER_SIZE)
    }
}

/// Configuration for the bitmap index splicer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplicerConfig {
    /// Page size of the index segment. Drives the bitmap entry size bounds.
    pub page_size: usize,
    /// Cache pages reserved per B+ tree the splicer touches.
    pub btree_cache_pages: u32,
}

impl Default for SplicerConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            btree_cache_pages: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.page_size, PAGE_SIZE);
        assert_eq!(config.page_size, 16384);
    }

    #[test]
    fn test_usable_page_size() {
        let config = StorageConfig::default();
        assert_eq!(config.usable_page_size(), 16384 - 32);

        let tiny = StorageConfig { page_size: 16 };
        assert_eq!(tiny.usable_page_size(), 0);
    }

    #[test]
    fn test_splicer_config_defaults() {
        let config = SplicerConfig::default();
        assert_eq!(config.page_size, PAGE_SIZE);
        assert_eq!(config.btree_cache_pages, 5);
    }

    #[test]
    fn test_splicer_config_custom() {
        let config = SplicerConfig {
            page_size: 512,
            ..Default::default()
        };
        assert_eq!(config.page_size, 512);
        assert_eq!(config.btree_cache_pages, 5);
    }

    #[test]
    fn test_storage_config_serde_roundtrip() {
        let original = StorageConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.page_size, deserialized.page_size);
    }

    #[test]
    fn test_splicer_config_from_json() {
        let config: SplicerConfig =
            serde_json::from_str(r#"{"page_size": 4096, "btree_cache_pages": 7}"#).unwrap();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.btree_cache_pages, 7);
    }
}
