//! Sequential table scans.

use crate::access::heap::HeapFile;
use crate::access::tuple::Tuple;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::BufferPool;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::collections::VecDeque;

/// Pull-based cursor over rows.
///
/// A cursor yields nothing until opened, and nothing after it is closed.
/// `rewind` starts over from the first row.
pub trait TupleScan {
    fn open(&mut self) -> StorageResult<()>;

    fn has_next(&mut self) -> StorageResult<bool>;

    /// Fails with [`StorageError::ScanExhausted`] once every row was returned.
    fn next_tuple(&mut self) -> StorageResult<Tuple>;

    fn rewind(&mut self) -> StorageResult<()>;

    fn close(&mut self);
}

/// Scan over every occupied slot of a [`HeapFile`], one page at a time.
///
/// Rows of the current page are copied out while its shared lock is taken,
/// so the page itself is unpinned between calls.
pub struct HeapFileScan<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: u32,
    buffered: VecDeque<Tuple>,
    is_open: bool,
}

impl<'a> HeapFileScan<'a> {
    /// An open scan positioned before the first row.
    pub fn new(file: &'a HeapFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            buffered: VecDeque::new(),
            is_open: true,
        }
    }

    /// Loads pages until a row is buffered or the file ends.
    fn fill(&mut self) -> StorageResult<()> {
        while self.buffered.is_empty() && self.next_page < self.file.num_pages()? {
            let page_id = PageId::new(self.file.table_id(), self.next_page);
            let handle = self.pool.fetch_page(self.tid, page_id, LockMode::Shared)?;
            self.buffered.extend(handle.read().iter().cloned());
            self.next_page += 1;
        }
        Ok(())
    }
}

impl TupleScan for HeapFileScan<'_> {
    fn open(&mut self) -> StorageResult<()> {
        self.is_open = true;
        self.rewind()
    }

    fn has_next(&mut self) -> StorageResult<bool> {
        if !self.is_open {
            return Ok(false);
        }
        self.fill()?;
        Ok(!self.buffered.is_empty())
    }

    fn next_tuple(&mut self) -> StorageResult<Tuple> {
        if !self.has_next()? {
            return Err(StorageError::ScanExhausted);
        }
        self.buffered.pop_front().ok_or(StorageError::ScanExhausted)
    }

    fn rewind(&mut self) -> StorageResult<()> {
        self.next_page = 0;
        self.buffered.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.is_open = false;
        self.buffered.clear();
    }
}

impl Iterator for HeapFileScan<'_> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_tuple()),
            Ok(false) => None,
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::Schema;
    use crate::access::tuple::TupleId;
    use crate::access::value::{DataType, Value};
    use crate::catalog::Catalog;
    use crate::config::Config;
    use anyhow::Result;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    const PAGE_SIZE: usize = 256;
    const T1: TransactionId = TransactionId(1);

    fn setup(rows: i32) -> Result<(TempDir, BufferPool, Arc<HeapFile>)> {
        let dir = tempdir()?;
        let schema = Arc::new(Schema::from_types(&[DataType::Int32, DataType::Int32]));
        let catalog = Arc::new(Catalog::new());
        let id = catalog.add_table(
            HeapFile::open(dir.path().join("scan.tbl"), Arc::clone(&schema), PAGE_SIZE)?,
            "scan",
        );
        let file = catalog.table(id)?;
        let pool = BufferPool::new(catalog, &Config::new().with_page_size(PAGE_SIZE));

        for i in 0..rows {
            let mut tuple = Tuple::new(Arc::clone(&schema), vec![Value::Int32(i), Value::Int32(-i)])?;
            pool.insert_tuple(T1, file.table_id(), &mut tuple)?;
        }
        pool.commit(T1)?;
        Ok((dir, pool, file))
    }

    #[test]
    fn test_scan_empty_table() -> Result<()> {
        let (_dir, pool, file) = setup(0)?;

        let mut scan = file.scan(&pool, TransactionId(2));
        assert!(!scan.has_next()?);
        assert!(matches!(scan.next_tuple(), Err(StorageError::ScanExhausted)));

        Ok(())
    }

    #[test]
    fn test_scan_across_pages_in_order() -> Result<()> {
        // 31 rows of 8 bytes per 256-byte page
        let (_dir, pool, file) = setup(70)?;
        assert_eq!(file.num_pages()?, 3);

        let tid = TransactionId(2);
        let rows: Vec<Tuple> = file.scan(&pool, tid).collect::<StorageResult<_>>()?;
        assert_eq!(rows.len(), 70);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.value(0), Some(&Value::Int32(i as i32)));
        }

        let ids: Vec<TupleId> = rows.iter().filter_map(|row| row.tuple_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        // every page was read under a shared lock
        for page_no in 0..3 {
            let page_id = PageId::new(file.table_id(), page_no);
            assert_eq!(pool.lock_manager().lock_mode(tid, page_id), Some(LockMode::Shared));
        }

        Ok(())
    }

    #[test]
    fn test_scan_skips_deleted_rows() -> Result<()> {
        let (_dir, pool, file) = setup(5)?;

        let tid = TransactionId(2);
        let victim = file.scan(&pool, tid).nth(2).transpose()?.unwrap();
        pool.delete_tuple(tid, &victim)?;

        let values: Vec<i32> = file
            .scan(&pool, tid)
            .map(|row| match row?.value(0) {
                Some(Value::Int32(v)) => Ok(*v),
                other => panic!("unexpected value {:?}", other),
            })
            .collect::<StorageResult<_>>()?;
        assert_eq!(values, vec![0, 1, 3, 4]);

        Ok(())
    }

    #[test]
    fn test_rewind_and_close() -> Result<()> {
        let (_dir, pool, file) = setup(3)?;

        let mut scan = file.scan(&pool, TransactionId(2));
        let first = scan.next_tuple()?;
        scan.next_tuple()?;
        scan.rewind()?;
        assert_eq!(scan.next_tuple()?, first);

        scan.close();
        assert!(!scan.has_next()?);
        assert!(scan.next().is_none());

        scan.open()?;
        assert_eq!(scan.by_ref().count(), 3);

        Ok(())
    }
}
