//! Storage layer for heapdb.
//!
//! Tables live in files of fixed-size pages. Key components:
//!
//! - **PageManager**: reads and writes whole pages of one file
//! - **HeapPage**: fixed-slot page with an occupancy bitmap header
//! - **BufferPool**: bounded page cache that takes page locks for every
//!   access and drives commit and abort
//!
//! There is no write-ahead log. A committed transaction's pages are forced
//! to disk before its locks are released.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPool, PageHandle};
pub use disk::PageManager;
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, PageId};
