//! Storage layer error types.

use crate::access::tuple::TupleId;
use crate::catalog::TableId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Page is full: {0} has no empty slot")]
    PageFull(PageId),

    #[error("Tuple {tuple_id:?} is not on page {page_id} or its slot is already empty")]
    NotOnPage {
        page_id: PageId,
        tuple_id: Option<TupleId>,
    },

    #[error("Tuple not found: {0}")]
    RowNotFound(String),

    #[error("Page {page_id} does not belong to table {expected}")]
    BadPageId { page_id: PageId, expected: TableId },

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("No table with id {0}")]
    NoSuchTable(TableId),

    #[error("Transaction {0} aborted: deadlock detected")]
    TransactionAborted(TransactionId),

    #[error("Transaction {tid} holds no lock on page {page_id}")]
    LockNotHeld { tid: TransactionId, page_id: PageId },

    #[error("Page {0} was fetched read-only")]
    ReadOnlyPage(PageId),

    #[error("Buffer pool is full: every cached page is in use")]
    BufferPoolFull,

    #[error("Scan has no more tuples")]
    ScanExhausted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
