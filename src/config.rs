//! Process-wide engine settings.
//!
//! A [`Config`] is fixed when a [`crate::database::Database`] is built and is
//! never changed afterwards. The page size is only meant to be overridden by
//! tests; every table opened through one database shares it.

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes per page, header included.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Number of pages the buffer pool caches by default.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Sleep between two attempts to acquire a refused lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub page_size: usize,
    pub pool_pages: usize,
    pub lock_wait: Duration,
}

impl Config {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_pages: DEFAULT_POOL_PAGES,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Overrides the page size. Only tests should need this.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pool_pages(mut self, pool_pages: usize) -> Self {
        self.pool_pages = pool_pages;
        self
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.page_size == 0 {
            return Err(StorageError::InvalidConfig(
                "page size must be greater than zero".to_string(),
            ));
        }
        if self.pool_pages == 0 {
            return Err(StorageError::InvalidConfig(
                "buffer pool must hold at least one page".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
