use crate::access::scan::HeapFileScan;
use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::concurrency::lock::LockMode;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::PageManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A table stored as a sequence of [`HeapPage`]s in one file.
///
/// Reads and writes here go straight to disk; everything a transaction does
/// goes through the [`BufferPool`] instead.
pub struct HeapFile {
    path: PathBuf,
    table_id: TableId,
    schema: Arc<Schema>,
    page_size: usize,
    disk: Mutex<PageManager>,
}

impl HeapFile {
    /// Opens the table file at `path`, creating it empty if missing. The
    /// table id is derived from the absolute path, so reopening the same
    /// file yields the same id.
    pub fn open(
        path: impl AsRef<Path>,
        schema: Arc<Schema>,
        page_size: usize,
    ) -> StorageResult<Self> {
        let disk = PageManager::open(path.as_ref(), page_size)?;
        let path = path.as_ref().canonicalize()?;
        let table_id = TableId(crc32fast::hash(path.to_string_lossy().as_bytes()));

        Ok(Self {
            path,
            table_id,
            schema,
            page_size,
            disk: Mutex::new(disk),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        Ok(self.disk.lock().num_pages()?)
    }

    pub fn read_page(&self, page_id: PageId) -> StorageResult<HeapPage> {
        self.check_page_id(page_id)?;

        let mut disk = self.disk.lock();
        if page_id.page_no >= disk.num_pages()? {
            return Err(StorageError::PageNotFound(page_id));
        }
        let mut buf = vec![0u8; self.page_size];
        disk.read_page(page_id.page_no, &mut buf)?;
        drop(disk);

        HeapPage::new(page_id, Arc::clone(&self.schema), &buf, self.page_size)
    }

    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        let page_id = page.page_id();
        self.check_page_id(page_id)?;

        let data = page.to_bytes()?;
        self.disk.lock().write_page(page_id.page_no, &data)?;
        Ok(())
    }

    /// Appends an empty page to the file.
    pub fn allocate_page(&self) -> StorageResult<PageId> {
        let page_no = self.disk.lock().allocate_page()?;
        debug!("table {} grew to {} pages", self.table_id, page_no + 1);
        Ok(PageId::new(self.table_id, page_no))
    }

    /// Stores `tuple` in the first page with a free slot, appending a page
    /// when all are full. Each page is examined under an exclusive lock of
    /// `tid`. Returns the pages that changed, already tagged dirty by `tid`.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageId>> {
        if **tuple.schema() != *self.schema {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple schema {} does not match table schema {}",
                tuple.schema(),
                self.schema
            )));
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            if self.insert_into(pool, tid, page_id, tuple)? {
                return Ok(vec![page_id]);
            }
        }

        // another inserter can claim the new page first, so keep appending
        loop {
            let page_id = self.allocate_page()?;
            if self.insert_into(pool, tid, page_id, tuple)? {
                return Ok(vec![page_id]);
            }
        }
    }

    fn insert_into(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        page_id: PageId,
        tuple: &mut Tuple,
    ) -> StorageResult<bool> {
        let handle = pool.fetch_page(tid, page_id, LockMode::Exclusive)?;
        let mut page = handle.write()?;
        if page.empty_slot_count() == 0 {
            return Ok(false);
        }
        page.insert_tuple(tuple)?;
        page.mark_dirty(true, tid);
        Ok(true)
    }

    /// Removes `tuple` from the page its location names.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageId>> {
        let tuple_id = tuple
            .tuple_id()
            .ok_or_else(|| StorageError::RowNotFound("tuple has no location".to_string()))?;
        let page_id = tuple_id.page_id;
        if page_id.table_id != self.table_id || page_id.page_no >= self.num_pages()? {
            return Err(StorageError::RowNotFound(format!(
                "{:?} is not in table {}",
                tuple_id, self.table_id
            )));
        }

        let handle = pool.fetch_page(tid, page_id, LockMode::Exclusive)?;
        let mut page = handle.write()?;
        page.delete_tuple(tuple)?;
        page.mark_dirty(true, tid);
        Ok(vec![page_id])
    }

    /// Every row of the table in (page, slot) order, read under shared
    /// locks of `tid`.
    pub fn scan<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileScan<'a> {
        HeapFileScan::new(self, pool, tid)
    }

    fn check_page_id(&self, page_id: PageId) -> StorageResult<()> {
        if page_id.table_id != self.table_id {
            return Err(StorageError::BadPageId {
                page_id,
                expected: self.table_id,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("path", &self.path)
            .field("table_id", &self.table_id)
            .field("schema", &self.schema)
            .finish()
    }
}
