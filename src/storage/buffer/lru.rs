use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::{BTreeMap, HashMap};

/// Least-recently-used replacer. Every unpin stamps the page with a fresh
/// tick; the victim is the evictable page with the oldest stamp.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Last-use tick of each evictable page
    last_use: HashMap<PageId, u64>,
    /// Evictable pages ordered by last use (oldest first)
    by_age: BTreeMap<u64, PageId>,
    tick: u64,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self) -> Option<PageId> {
        let (_, page_id) = self.by_age.pop_first()?;
        self.last_use.remove(&page_id);
        Some(page_id)
    }

    fn pin(&mut self, page_id: PageId) {
        self.remove(page_id);
    }

    fn unpin(&mut self, page_id: PageId) {
        self.remove(page_id);
        self.tick += 1;
        self.last_use.insert(page_id, self.tick);
        self.by_age.insert(self.tick, page_id);
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(tick) = self.last_use.remove(&page_id) {
            self.by_age.remove(&tick);
        }
    }

    fn size(&self) -> usize {
        self.last_use.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableId;

    fn pid(page_no: u32) -> PageId {
        PageId::new(TableId(7), page_no)
    }

    #[test]
    fn test_basic_lru_operations() {
        let mut replacer = LruReplacer::new();

        // Initially empty
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.unpin(pid(1));
        replacer.unpin(pid(2));
        replacer.unpin(pid(3));
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.evict(), Some(pid(1)));
        assert_eq!(replacer.evict(), Some(pid(2)));
        assert_eq!(replacer.evict(), Some(pid(3)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_pin_unpin() {
        let mut replacer = LruReplacer::new();

        replacer.unpin(pid(1));
        replacer.unpin(pid(2));
        replacer.pin(pid(1));
        assert_eq!(replacer.size(), 1);

        // Only page 2 should be evictable
        assert_eq!(replacer.evict(), Some(pid(2)));
        assert_eq!(replacer.evict(), None);

        replacer.unpin(pid(1));
        assert_eq!(replacer.evict(), Some(pid(1)));
    }

    #[test]
    fn test_reuse_refreshes_recency() {
        let mut replacer = LruReplacer::new();

        replacer.unpin(pid(1));
        replacer.unpin(pid(2));
        replacer.unpin(pid(3));

        // page 1 used again
        replacer.pin(pid(1));
        replacer.unpin(pid(1));

        assert_eq!(replacer.evict(), Some(pid(2)));
        assert_eq!(replacer.evict(), Some(pid(3)));
        assert_eq!(replacer.evict(), Some(pid(1)));
    }

    #[test]
    fn test_duplicate_unpin() {
        let mut replacer = LruReplacer::new();

        replacer.unpin(pid(1));
        replacer.unpin(pid(1));
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_pin_and_remove_non_existent() {
        let mut replacer = LruReplacer::new();

        replacer.pin(pid(999));
        replacer.remove(pid(999));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_remove() {
        let mut replacer = LruReplacer::new();

        replacer.unpin(pid(1));
        replacer.unpin(pid(2));
        replacer.remove(pid(1));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(pid(2)));
        assert_eq!(replacer.evict(), None);
    }
}
