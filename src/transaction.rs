//! Transaction management module.
//!
//! Transactions are identified by a [`TransactionId`]; the buffer pool
//! records page locks and dirty tags against it. [`Transaction`] is the
//! handle callers drive work through.

pub mod id;
pub mod manager;
pub mod state;

// Re-export commonly used types
pub use id::{TransactionId, TransactionIdGenerator};
pub use manager::{Transaction, TransactionManager};
pub use state::TransactionState;
