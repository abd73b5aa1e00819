//! Raw page I/O against a single file.

pub mod page_manager;

pub use page_manager::PageManager;
