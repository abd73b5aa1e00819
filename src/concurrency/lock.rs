//! Page-level lock table for strict two-phase locking.
//!
//! Each page is either unlocked, shared by a set of transactions, or held
//! exclusively by one. Acquisition never blocks: a refused request returns
//! `false` and is remembered as "waiting", which is what the wait-for graph
//! of [`LockManager::deadlock_check`] is built from. The buffer pool owns the
//! retry loop.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// Lock state of one page. An unlocked page has no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageLock {
    Shared(HashSet<TransactionId>),
    Exclusive(TransactionId),
}

impl PageLock {
    fn new(tid: TransactionId, mode: LockMode) -> Self {
        match mode {
            LockMode::Shared => PageLock::Shared(HashSet::from([tid])),
            LockMode::Exclusive => PageLock::Exclusive(tid),
        }
    }

    fn mode_of(&self, tid: TransactionId) -> Option<LockMode> {
        match self {
            PageLock::Shared(holders) if holders.contains(&tid) => Some(LockMode::Shared),
            PageLock::Exclusive(holder) if *holder == tid => Some(LockMode::Exclusive),
            _ => None,
        }
    }

    /// Holders that keep `tid` from getting the page in `mode`.
    fn blockers(&self, tid: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        if self.mode().is_compatible_with(&mode) {
            return Vec::new();
        }
        self.holders().into_iter().filter(|h| *h != tid).collect()
    }

    fn mode(&self) -> LockMode {
        match self {
            PageLock::Shared(_) => LockMode::Shared,
            PageLock::Exclusive(_) => LockMode::Exclusive,
        }
    }

    fn holders(&self) -> Vec<TransactionId> {
        match self {
            PageLock::Shared(holders) => holders.iter().copied().collect(),
            PageLock::Exclusive(holder) => vec![*holder],
        }
    }
}

/// A refused request: the page and mode the transaction is waiting for.
#[derive(Debug, Clone, Copy)]
struct WaitRequest {
    page_id: PageId,
    mode: LockMode,
}

/// Wait-for graph: tid -> set of tids it's waiting for.
#[derive(Debug, Default)]
struct WaitForGraph {
    edges: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitForGraph {
    fn add_edge(&mut self, waiter: TransactionId, holder: TransactionId) {
        self.edges.entry(waiter).or_default().insert(holder);
    }

    /// Whether following edges from `tid` leads back to `tid`.
    fn has_cycle_through(&self, tid: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = self
            .edges
            .get(&tid)
            .map(|next| next.iter().copied().collect())
            .unwrap_or_default();

        while let Some(current) = queue.pop_front() {
            if current == tid {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.edges.get(&current) {
                    queue.extend(next.iter().copied());
                }
            }
        }

        false
    }
}

#[derive(Debug, Default)]
struct LockTable {
    pages: HashMap<PageId, PageLock>,
    held: HashMap<TransactionId, HashSet<PageId>>,
    waiting: HashMap<TransactionId, WaitRequest>,
}

impl LockTable {
    fn try_acquire(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        let granted = match self.pages.entry(page_id) {
            Entry::Vacant(entry) => {
                entry.insert(PageLock::new(tid, mode));
                true
            }
            Entry::Occupied(mut entry) => {
                let lock = entry.get_mut();
                if !lock.blockers(tid, mode).is_empty() {
                    false
                } else {
                    match mode {
                        LockMode::Shared => {
                            // an exclusive lock of tid already covers reads
                            if let PageLock::Shared(holders) = lock {
                                holders.insert(tid);
                            }
                        }
                        LockMode::Exclusive => *lock = PageLock::Exclusive(tid),
                    }
                    true
                }
            }
        };

        if granted {
            self.held.entry(tid).or_default().insert(page_id);
            self.waiting.remove(&tid);
        } else {
            self.waiting.insert(tid, WaitRequest { page_id, mode });
        }
        granted
    }

    fn unlock_page(&mut self, tid: TransactionId, page_id: PageId) {
        let now_free = match self.pages.get_mut(&page_id) {
            Some(PageLock::Shared(holders)) => {
                holders.remove(&tid);
                holders.is_empty()
            }
            Some(PageLock::Exclusive(holder)) => *holder == tid,
            None => false,
        };
        if now_free {
            self.pages.remove(&page_id);
        }
    }

    fn wait_for_graph(&self) -> WaitForGraph {
        let mut graph = WaitForGraph::default();
        for (waiter, request) in &self.waiting {
            if let Some(lock) = self.pages.get(&request.page_id) {
                for holder in lock.blockers(*waiter, request.mode) {
                    graph.add_edge(*waiter, holder);
                }
            }
        }
        graph
    }
}

/// Lock manager shared by every transaction of one buffer pool.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Granted when the page is unlocked, shared, or already held
    /// exclusively by `tid`.
    pub fn acquire_shared(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.acquire(tid, page_id, LockMode::Shared)
    }

    /// Granted when the page is unlocked, shared by `tid` alone (upgrade),
    /// or already held exclusively by `tid`.
    pub fn acquire_exclusive(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.acquire(tid, page_id, LockMode::Exclusive)
    }

    pub fn acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        self.table.lock().try_acquire(tid, page_id, mode)
    }

    /// Reports whether `tid`, waiting for `page_id`, is part of a cycle in
    /// the wait-for graph. An edge `t -> t'` exists when `t` waits for a page
    /// that `t'` holds in a conflicting mode.
    pub fn deadlock_check(&self, tid: TransactionId, page_id: PageId) -> bool {
        let table = self.table.lock();
        let mode = table
            .waiting
            .get(&tid)
            .filter(|request| request.page_id == page_id)
            .map_or(LockMode::Exclusive, |request| request.mode);

        let mut graph = table.wait_for_graph();
        graph.edges.remove(&tid);
        if let Some(lock) = table.pages.get(&page_id) {
            for holder in lock.blockers(tid, mode) {
                graph.add_edge(tid, holder);
            }
        }
        graph.has_cycle_through(tid)
    }

    /// Forgets that `tid` is waiting for a lock.
    pub fn cancel_wait(&self, tid: TransactionId) {
        self.table.lock().waiting.remove(&tid);
    }

    /// Releases `tid`'s lock on one page. Returns false if it held none.
    pub fn release(&self, tid: TransactionId, page_id: PageId) -> bool {
        let mut table = self.table.lock();
        let held = match table.held.get_mut(&tid) {
            Some(pages) => {
                let removed = pages.remove(&page_id);
                if pages.is_empty() {
                    table.held.remove(&tid);
                }
                removed
            }
            None => false,
        };
        if held {
            table.unlock_page(tid, page_id);
        }
        held
    }

    /// Releases every lock of `tid`. Returns false if it held none.
    pub fn release_all(&self, tid: TransactionId) -> bool {
        let mut table = self.table.lock();
        table.waiting.remove(&tid);
        match table.held.remove(&tid) {
            Some(pages) => {
                for page_id in pages {
                    table.unlock_page(tid, page_id);
                }
                true
            }
            None => false,
        }
    }

    pub fn holds(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table
            .lock()
            .pages
            .get(&page_id)
            .and_then(|lock| lock.mode_of(tid))
    }

    /// Transactions currently holding any lock on `page_id`.
    pub fn holders(&self, page_id: PageId) -> Vec<TransactionId> {
        let mut holders = self
            .table
            .lock()
            .pages
            .get(&page_id)
            .map(PageLock::holders)
            .unwrap_or_default();
        holders.sort();
        holders
    }

    /// Pages `tid` holds a lock on, in page order.
    pub fn held_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .table
            .lock()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}
