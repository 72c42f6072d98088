// ProbeDB - disk-backed linear-probing hash index
// Core library module

pub mod buffer;
pub mod common;
pub mod error;
pub mod index;
pub mod storage;

pub use error::{DbError, Result};

use crate::buffer::{BufferPoolManager, PAGE_SIZE};
use crate::storage::DiskManager;
use std::sync::Arc;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub page_size: usize,
    pub buffer_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            page_size: PAGE_SIZE,
            buffer_pool_size: 1000,
        }
    }
}

/// Open a disk manager and buffer pool for `config`.
pub fn open_buffer_pool(config: &Config) -> Result<Arc<BufferPoolManager>> {
    if config.page_size != PAGE_SIZE {
        return Err(DbError::Storage(format!(
            "unsupported page size {} (expected {})",
            config.page_size, PAGE_SIZE
        )));
    }
    let disk = DiskManager::new(&config.data_dir, config.page_size)?;
    Ok(Arc::new(BufferPoolManager::new(
        config.buffer_pool_size,
        Arc::new(disk),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let config = Config::default();
        assert_eq!(config.page_size, PAGE_SIZE);
        assert!(config.buffer_pool_size > 0);
    }

    #[test]
    fn open_buffer_pool_round_trips_a_page() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_string_lossy().into_owned(),
            buffer_pool_size: 8,
            ..Config::default()
        };

        let pool = open_buffer_pool(&config).unwrap();
        let guard = pool.new_page().unwrap();
        let page_id = guard.page_id();
        guard.write_data().data_mut()[0] = 9;
        drop(guard);

        assert_eq!(pool.fetch_page(page_id).unwrap().read_data().data()[0], 9);
    }

    #[test]
    fn odd_page_sizes_are_rejected() {
        let config = Config {
            page_size: 1024,
            ..Config::default()
        };
        assert!(open_buffer_pool(&config).is_err());
    }
}
