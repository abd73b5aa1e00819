//! Transaction manager for coordinating transaction lifecycle.

use super::id::{TransactionId, TransactionIdGenerator};
use super::state::TransactionState;
use crate::access::heap::HeapFile;
use crate::access::scan::HeapFileScan;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::{BufferPool, PageHandle};
use crate::storage::error::StorageResult;
use crate::storage::page::PageId;
use log::warn;

/// Starts transactions against one buffer pool.
pub struct TransactionManager {
    id_generator: TransactionIdGenerator,
    pool: BufferPool,
}

impl TransactionManager {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            id_generator: TransactionIdGenerator::new(),
            pool,
        }
    }

    /// Begins a new transaction.
    pub fn begin(&self) -> Transaction {
        Transaction {
            id: self.id_generator.next(),
            pool: self.pool.clone(),
            state: TransactionState::Active,
        }
    }

    /// Id of the most recently started transaction.
    pub fn last_id(&self) -> TransactionId {
        self.id_generator.current()
    }
}

/// A running transaction.
///
/// Every page it touches stays locked until [`commit`](Self::commit) or
/// [`abort`](Self::abort). Dropping an active transaction aborts it.
pub struct Transaction {
    id: TransactionId,
    pool: BufferPool,
    state: TransactionState,
}

impl Transaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn fetch_page(&self, page_id: PageId, mode: LockMode) -> StorageResult<PageHandle> {
        self.pool.fetch_page(self.id, page_id, mode)
    }

    pub fn insert(&self, table_id: TableId, tuple: &mut Tuple) -> StorageResult<Vec<PageId>> {
        self.pool.insert_tuple(self.id, table_id, tuple)
    }

    pub fn delete(&self, tuple: &Tuple) -> StorageResult<Vec<PageId>> {
        self.pool.delete_tuple(self.id, tuple)
    }

    pub fn scan<'a>(&'a self, file: &'a HeapFile) -> HeapFileScan<'a> {
        file.scan(&self.pool, self.id)
    }

    pub fn commit(mut self) -> StorageResult<()> {
        self.finish(true)
    }

    pub fn abort(mut self) -> StorageResult<()> {
        self.finish(false)
    }

    fn finish(&mut self, commit: bool) -> StorageResult<()> {
        self.state = if commit {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        };
        self.pool.transaction_complete(self.id, commit)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_active() {
            if let Err(e) = self.finish(false) {
                warn!("{}: abort on drop failed: {}", self.id, e);
            }
        }
    }
}
