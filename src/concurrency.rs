//! Concurrency control module.
//!
//! Page-granularity strict two-phase locking: shared and exclusive page
//! locks held until the transaction ends, with deadlock detection over a
//! wait-for graph built on demand.

pub mod lock;

pub use lock::{LockManager, LockMode};
