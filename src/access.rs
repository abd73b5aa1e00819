//! Access layer for tuple-oriented operations.
//!
//! - **HeapFile**: a table stored as a file of heap pages
//! - **HeapFileScan**: page-at-a-time sequential scan
//! - **Schema**: ordered column types of a table
//! - **Tuple**: one row, with its location once stored
//! - **Value**: fixed-width column values
//!
//! Everything a transaction does here goes through the buffer pool, which
//! takes the page locks.

pub mod heap;
pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use heap::HeapFile;
pub use scan::{HeapFileScan, TupleScan};
pub use schema::{Column, Schema};
pub use tuple::{Tuple, TupleId};
pub use value::{DataType, Value};
