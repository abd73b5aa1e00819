use crate::storage::page::PageId;
use std::fmt::Debug;

/// Eviction policy of the buffer pool. Only unpinned pages are candidates.
pub trait Replacer: Send + Sync + Debug {
    /// Select a page to evict. Returns None if no page can be evicted.
    fn evict(&mut self) -> Option<PageId>;

    /// Mark a page as pinned (not evictable).
    fn pin(&mut self, page_id: PageId);

    /// Mark a page as unpinned (evictable). Counts as its most recent use.
    fn unpin(&mut self, page_id: PageId);

    /// Forget a page that left the cache without being evicted.
    fn remove(&mut self, page_id: PageId);

    /// Get the number of evictable pages.
    fn size(&self) -> usize;
}
