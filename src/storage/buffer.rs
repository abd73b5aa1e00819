//! Transactional page cache.
//!
//! Every page access goes through [`BufferPool::fetch_page`], which first
//! takes the page lock for the requesting transaction and then returns the
//! cached page, loading it from its table file if needed. The pool never
//! holds more than `capacity` pages; a page is evictable once no
//! [`PageHandle`] to it is alive.

pub mod lru;
pub mod replacer;

use crate::access::tuple::{Tuple, TupleId};
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::{LockManager, LockMode};
use crate::config::Config;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use log::{debug, error, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use replacer::Replacer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct CachedPage {
    page: Arc<RwLock<HeapPage>>,
    pin_count: usize,
}

struct PageCache {
    pages: HashMap<PageId, CachedPage>,
    replacer: Box<dyn Replacer>,
}

#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    cache: Mutex<PageCache>,
    /// Pages whose committed contents failed to reach disk
    unflushed: Mutex<HashSet<PageId>>,
    capacity: usize,
    lock_wait: Duration,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, config: &Config) -> Self {
        Self::with_replacer(catalog, config, Box::new(LruReplacer::new()))
    }

    pub fn with_replacer(
        catalog: Arc<Catalog>,
        config: &Config,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                catalog,
                lock_manager: LockManager::new(),
                cache: Mutex::new(PageCache {
                    pages: HashMap::with_capacity(config.pool_pages),
                    replacer,
                }),
                unflushed: Mutex::new(HashSet::new()),
                capacity: config.pool_pages,
                lock_wait: config.lock_wait,
            }),
        }
    }

    /// Locks `page_id` for `tid` in `mode` and returns the cached page.
    ///
    /// While the lock is held by someone else the call sleeps and retries.
    /// If waiting would close a cycle in the wait-for graph the request is
    /// refused with [`StorageError::TransactionAborted`]; the caller must
    /// then abort `tid`. A lock taken by this call is given back if the page
    /// cannot be loaded.
    pub fn fetch_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> StorageResult<PageHandle> {
        let locks = &self.inner.lock_manager;
        let held_before = locks.holds(tid, page_id);
        self.acquire_lock(tid, page_id, mode)?;

        let page = match self.inner.pin_or_load(page_id) {
            Ok(page) => page,
            Err(e) => {
                if !held_before {
                    locks.release(tid, page_id);
                }
                return Err(e);
            }
        };
        Ok(PageHandle {
            inner: Arc::clone(&self.inner),
            page_id,
            mode,
            page,
        })
    }

    fn acquire_lock(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> StorageResult<()> {
        let locks = &self.inner.lock_manager;
        loop {
            if locks.acquire(tid, page_id, mode) {
                return Ok(());
            }
            if locks.deadlock_check(tid, page_id) {
                locks.cancel_wait(tid);
                warn!(
                    "{} aborted waiting for {:?} lock on page {}: deadlock",
                    tid, mode, page_id
                );
                return Err(StorageError::TransactionAborted(tid));
            }
            thread::sleep(self.inner.lock_wait);
        }
    }

    /// Adds `tuple` to the table on behalf of `tid` and returns the pages
    /// it changed. Those pages are tagged dirty by `tid`.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageId>> {
        let file = self.inner.catalog.table(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        debug!("{} inserted into table {} at {:?}", tid, table_id, tuple.tuple_id());
        Ok(pages)
    }

    /// Removes `tuple` from the table its location names.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<Vec<PageId>> {
        let tuple_id: TupleId = tuple
            .tuple_id()
            .ok_or_else(|| StorageError::RowNotFound("tuple has no location".to_string()))?;
        let file = self.inner.catalog.table(tuple_id.page_id.table_id)?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        debug!("{} deleted {:?}", tid, tuple_id);
        Ok(pages)
    }

    /// Ends `tid`, committing or aborting it.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        if commit {
            self.commit(tid)
        } else {
            self.abort(tid)
        }
    }

    /// Writes every page dirtied by `tid` to disk, then releases its locks.
    ///
    /// A page that fails to flush keeps its dirty tag. The remaining pages
    /// are still flushed and the locks are released either way; the first
    /// error is returned.
    pub fn commit(&self, tid: TransactionId) -> StorageResult<()> {
        let result = self.flush_pages(tid);

        // pages that failed to flush still hold committed rows
        for page in self.inner.exclusive_pages(tid) {
            let mut page = page.write();
            if let Err(e) = page.set_before_image() {
                error!("{}: cannot capture image of page {}: {}", tid, page.page_id(), e);
            }
        }

        self.inner.lock_manager.release_all(tid);
        debug!("{} committed", tid);
        result
    }

    /// Rolls every page `tid` could have changed back to its image at the
    /// last load or commit, then releases its locks.
    ///
    /// A page still tagged dirty by another transaction is left alone: that
    /// transaction committed but its write-back failed.
    pub fn abort(&self, tid: TransactionId) -> StorageResult<()> {
        let mut result = Ok(());

        for page in self.inner.exclusive_pages(tid) {
            let mut page = page.write();
            if page.is_dirty().is_some_and(|owner| owner != tid) {
                continue;
            }
            match page.before_image() {
                Ok(restored) => {
                    *page = restored;
                    // the image holds committed rows that are not on disk yet
                    if self.inner.unflushed.lock().contains(&page.page_id()) {
                        page.mark_dirty(true, tid);
                    }
                }
                Err(e) => {
                    error!("{}: cannot restore page {}: {}", tid, page.page_id(), e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }

        self.inner.lock_manager.release_all(tid);
        debug!("{} aborted", tid);
        result
    }

    /// Releases one lock before the transaction ends.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) -> StorageResult<()> {
        if self.inner.lock_manager.release(tid, page_id) {
            Ok(())
        } else {
            Err(StorageError::LockNotHeld { tid, page_id })
        }
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.holds(tid, page_id)
    }

    /// Writes one cached page to disk if it is dirty. The before-image is
    /// left alone, so a later abort still rolls the page back in memory.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let page = self.inner.cache.lock().pages.get(&page_id).map(|e| Arc::clone(&e.page));
        match page {
            Some(page) => self.inner.write_back(&page),
            None => Ok(()),
        }
    }

    pub fn flush_all_pages(&self) -> StorageResult<()> {
        for page in self.inner.cached(|_| true) {
            self.inner.write_back(&page)?;
        }
        Ok(())
    }

    /// Writes every page dirtied by `tid` and refreshes its before-image.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let mut result = Ok(());

        for page in self.inner.cached(|page| page.is_dirty() == Some(tid)) {
            let flushed = self
                .inner
                .write_back(&page)
                .and_then(|_| page.write().set_before_image());
            if let Err(e) = flushed {
                let page_id = page.read().page_id();
                error!("{}: flush of page {} failed: {}", tid, page_id, e);
                self.inner.unflushed.lock().insert(page_id);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }

    /// Drops a page from the cache without writing it back.
    pub fn discard_page(&self, page_id: PageId) {
        let mut cache = self.inner.cache.lock();
        cache.pages.remove(&page_id);
        cache.replacer.remove(page_id);
        self.inner.unflushed.lock().remove(&page_id);
    }

    /// Writes back and drops every cached page of one table.
    pub fn evict_table(&self, table_id: TableId) -> StorageResult<()> {
        for page in self.inner.cached(|page| page.page_id().table_id == table_id) {
            self.inner.write_back(&page)?;
        }

        let mut guard = self.inner.cache.lock();
        let cache = &mut *guard;
        let page_ids: Vec<PageId> = cache
            .pages
            .keys()
            .filter(|page_id| page_id.table_id == table_id)
            .copied()
            .collect();
        for page_id in page_ids {
            cache.pages.remove(&page_id);
            cache.replacer.remove(page_id);
            self.inner.unflushed.lock().remove(&page_id);
        }
        Ok(())
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.inner.cache.lock().pages.contains_key(&page_id)
    }

    pub fn cached_pages(&self) -> usize {
        self.inner.cache.lock().pages.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.lock_manager
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }
}

impl BufferPoolInner {
    fn pin_or_load(&self, page_id: PageId) -> StorageResult<Arc<RwLock<HeapPage>>> {
        let mut guard = self.cache.lock();
        let cache = &mut *guard;

        if let Some(entry) = cache.pages.get_mut(&page_id) {
            entry.pin_count += 1;
            cache.replacer.pin(page_id);
            return Ok(Arc::clone(&entry.page));
        }

        let file = self.catalog.table(page_id.table_id)?;
        let page = file.read_page(page_id)?;
        if cache.pages.len() >= self.capacity {
            self.evict(cache)?;
        }
        debug!("loaded page {}", page_id);

        let page = Arc::new(RwLock::new(page));
        cache.pages.insert(
            page_id,
            CachedPage {
                page: Arc::clone(&page),
                pin_count: 1,
            },
        );
        Ok(page)
    }

    fn unpin(&self, page_id: PageId, page: &Arc<RwLock<HeapPage>>) {
        let mut guard = self.cache.lock();
        let cache = &mut *guard;

        // the page may have been discarded and reloaded since
        if let Some(entry) = cache.pages.get_mut(&page_id) {
            if Arc::ptr_eq(&entry.page, page) {
                entry.pin_count -= 1;
                if entry.pin_count == 0 {
                    cache.replacer.unpin(page_id);
                }
            }
        }
    }

    fn evict(&self, cache: &mut PageCache) -> StorageResult<()> {
        let victim = cache.replacer.evict().ok_or(StorageError::BufferPoolFull)?;
        let Some(entry) = cache.pages.remove(&victim) else {
            return Ok(());
        };

        if let Err(e) = self.write_back(&entry.page) {
            error!("eviction of page {} failed: {}", victim, e);
            cache.pages.insert(victim, entry);
            cache.replacer.unpin(victim);
            return Err(e);
        }

        debug!("evicted page {}", victim);
        Ok(())
    }

    fn write_back(&self, page: &RwLock<HeapPage>) -> StorageResult<()> {
        let mut page = page.write();
        let Some(tid) = page.is_dirty() else {
            return Ok(());
        };

        let file = self.catalog.table(page.page_id().table_id)?;
        file.write_page(&page)?;
        page.mark_dirty(false, tid);
        self.unflushed.lock().remove(&page.page_id());
        Ok(())
    }

    fn cached(&self, filter: impl Fn(&HeapPage) -> bool) -> Vec<Arc<RwLock<HeapPage>>> {
        // page latches are only taken after the cache mutex is released
        let pages: Vec<_> = self
            .cache
            .lock()
            .pages
            .values()
            .map(|entry| Arc::clone(&entry.page))
            .collect();
        let mut pages: Vec<_> = pages.into_iter().filter(|page| filter(&page.read())).collect();
        pages.sort_by_key(|page| page.read().page_id());
        pages
    }

    /// Cached pages `tid` holds exclusively.
    fn exclusive_pages(&self, tid: TransactionId) -> Vec<Arc<RwLock<HeapPage>>> {
        let held = self.lock_manager.held_pages(tid);
        let cache = self.cache.lock();
        held.into_iter()
            .filter(|page_id| self.lock_manager.lock_mode(tid, *page_id) == Some(LockMode::Exclusive))
            .filter_map(|page_id| cache.pages.get(&page_id).map(|e| Arc::clone(&e.page)))
            .collect()
    }
}

/// A pinned page, valid for the lock mode it was fetched with. The page
/// stays in the pool until the handle is dropped.
pub struct PageHandle {
    inner: Arc<BufferPoolInner>,
    page_id: PageId,
    mode: LockMode,
    page: Arc<RwLock<HeapPage>>,
}

impl PageHandle {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    pub fn write(&self) -> StorageResult<RwLockWriteGuard<'_, HeapPage>> {
        match self.mode {
            LockMode::Exclusive => Ok(self.page.write()),
            LockMode::Shared => Err(StorageError::ReadOnlyPage(self.page_id)),
        }
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        self.inner.unpin(self.page_id, &self.page);
    }
}
