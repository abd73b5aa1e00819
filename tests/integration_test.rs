use anyhow::Result;
use heapdb::access::heap::HeapFile;
use heapdb::access::schema::Schema;
use heapdb::access::tuple::{Tuple, TupleId};
use heapdb::access::value::{DataType, Value};
use heapdb::catalog::TableId;
use heapdb::concurrency::lock::LockMode;
use heapdb::config::Config;
use heapdb::database::Database;
use heapdb::storage::error::{StorageError, StorageResult};
use heapdb::storage::page::PageId;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const PAGE_SIZE: usize = 512;

struct TestDb {
    _dir: TempDir,
    db: Arc<Database>,
    table_id: TableId,
    file: Arc<HeapFile>,
}

impl TestDb {
    fn new(pool_pages: usize, pages: u32) -> Result<Self> {
        let dir = tempdir()?;
        let config = Config::new()
            .with_page_size(PAGE_SIZE)
            .with_pool_pages(pool_pages)
            .with_lock_wait(Duration::from_millis(1));
        let db = Database::new(config)?;
        let table_id = db.open_table(
            dir.path().join("rows.tbl"),
            Schema::from_types(&[DataType::Int32; 5]),
            "rows",
        )?;
        let file = db.table("rows")?;
        for _ in 0..pages {
            file.allocate_page()?;
        }

        Ok(Self {
            _dir: dir,
            db: Arc::new(db),
            table_id,
            file,
        })
    }

    fn pid(&self, page_no: u32) -> PageId {
        PageId::new(self.table_id, page_no)
    }

    fn row(&self, n: i32) -> Tuple {
        let values = (0..5).map(|i| Value::Int32(n * 10 + i)).collect();
        Tuple::new(Arc::clone(self.file.schema()), values).unwrap()
    }

    fn committed_rows(&self) -> Result<Vec<Tuple>> {
        let txn = self.db.begin();
        let rows = txn.scan(&self.file).collect::<StorageResult<Vec<_>>>()?;
        txn.commit()?;
        Ok(rows)
    }
}

fn first_value(row: &Tuple) -> i32 {
    match row.value(0) {
        Some(Value::Int32(v)) => *v,
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn test_insert_fills_last_free_slot_before_growing() -> Result<()> {
    let t = TestDb::new(8, 1)?;

    // 25 slots of 20 bytes fit in a 512-byte page
    let txn = t.db.begin();
    for n in 0..24 {
        txn.insert(t.table_id, &mut t.row(n))?;
    }
    txn.commit()?;

    let txn = t.db.begin();
    let mut last = t.row(24);
    assert_eq!(txn.insert(t.table_id, &mut last)?, vec![t.pid(0)]);
    assert_eq!(t.file.num_pages()?, 1);

    let mut overflow = t.row(25);
    assert_eq!(txn.insert(t.table_id, &mut overflow)?, vec![t.pid(1)]);
    assert_eq!(overflow.tuple_id(), Some(TupleId::new(t.pid(1), 0)));
    assert_eq!(t.file.num_pages()?, 2);
    txn.commit()?;

    assert_eq!(t.committed_rows()?.len(), 26);
    Ok(())
}

#[test]
fn test_exclusive_waits_for_shared_release() -> Result<()> {
    let t = TestDb::new(8, 1)?;
    let page_id = t.pid(0);

    let reader = t.db.begin();
    drop(reader.fetch_page(page_id, LockMode::Shared)?);

    let db = Arc::clone(&t.db);
    let (sender, receiver) = std::sync::mpsc::channel();
    let writer = thread::spawn(move || -> StorageResult<()> {
        let txn = db.begin();
        sender.send(txn.id()).unwrap();
        let handle = txn.fetch_page(page_id, LockMode::Exclusive)?;
        drop(handle.write()?);
        drop(handle);
        txn.commit()
    });

    let writer_id = receiver.recv()?;
    thread::sleep(Duration::from_millis(50));
    let locks = t.db.buffer_pool().lock_manager();
    assert!(!locks.holds(writer_id, page_id));
    assert_eq!(locks.holders(page_id), vec![reader.id()]);

    reader.commit()?;
    writer.join().unwrap()?;
    assert!(locks.holders(page_id).is_empty());

    Ok(())
}

#[test]
fn test_crossing_writers_deadlock() -> Result<()> {
    let t = TestDb::new(8, 2)?;
    let barrier = Arc::new(Barrier::new(2));

    let workers: Vec<_> = [(0, 1), (1, 0)]
        .into_iter()
        .map(|(first, second)| {
            let db = Arc::clone(&t.db);
            let barrier = Arc::clone(&barrier);
            let (first, second) = (t.pid(first), t.pid(second));
            thread::spawn(move || -> StorageResult<bool> {
                let txn = db.begin();
                drop(txn.fetch_page(first, LockMode::Exclusive)?);
                barrier.wait();

                match txn.fetch_page(second, LockMode::Exclusive) {
                    Ok(handle) => {
                        drop(handle);
                        txn.commit()?;
                        Ok(true)
                    }
                    Err(StorageError::TransactionAborted(tid)) => {
                        assert_eq!(tid, txn.id());
                        txn.abort()?;
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            })
        })
        .collect();

    let outcomes: Vec<bool> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect::<StorageResult<_>>()?;
    assert!(outcomes.contains(&false), "no transaction was aborted");

    for page_no in 0..2 {
        assert!(t.db.buffer_pool().lock_manager().holders(t.pid(page_no)).is_empty());
    }
    Ok(())
}

#[test]
fn test_concurrent_inserts() -> Result<()> {
    let t = TestDb::new(4, 0)?;
    let threads = 4;
    let per_thread = 40;
    let barrier = Arc::new(Barrier::new(threads));

    let workers: Vec<_> = (0..threads as i32)
        .map(|worker| {
            let db = Arc::clone(&t.db);
            let barrier = Arc::clone(&barrier);
            let table_id = t.table_id;
            let schema = Arc::clone(t.file.schema());
            thread::spawn(move || -> StorageResult<()> {
                barrier.wait();
                for i in 0..per_thread {
                    let n = worker * 1000 + i;
                    loop {
                        let txn = db.begin();
                        let mut row = Tuple::new(
                            Arc::clone(&schema),
                            (0..5).map(|c| Value::Int32(n * 10 + c)).collect(),
                        )?;
                        match txn.insert(table_id, &mut row) {
                            Ok(_) => {
                                txn.commit()?;
                                break;
                            }
                            Err(StorageError::TransactionAborted(_)) => txn.abort()?,
                            Err(e) => return Err(e),
                        }
                    }
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap()?;
    }

    let rows = t.committed_rows()?;
    assert_eq!(rows.len(), threads * per_thread as usize);

    let locations: HashSet<TupleId> = rows.iter().filter_map(|row| row.tuple_id()).collect();
    assert_eq!(locations.len(), rows.len());

    let values: HashSet<i32> = rows.iter().map(first_value).collect();
    assert_eq!(values.len(), rows.len());
    assert!(t.db.buffer_pool().cached_pages() <= 4);

    Ok(())
}

#[test]
fn test_committed_rows_reach_disk() -> Result<()> {
    let t = TestDb::new(8, 0)?;

    let txn = t.db.begin();
    for n in 0..30 {
        txn.insert(t.table_id, &mut t.row(n))?;
    }
    txn.commit()?;

    // read the pages straight from the file, bypassing the cache
    let mut on_disk = Vec::new();
    for page_no in 0..t.file.num_pages()? {
        let page = t.file.read_page(t.pid(page_no))?;
        assert_eq!(page.is_dirty(), None);
        on_disk.extend(page.iter().map(first_value));
    }
    assert_eq!(on_disk, (0..30).map(|n| n * 10).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn test_aborted_rows_are_invisible() -> Result<()> {
    let t = TestDb::new(8, 0)?;

    let setup = t.db.begin();
    let mut kept = t.row(1);
    setup.insert(t.table_id, &mut kept)?;
    setup.commit()?;

    let txn = t.db.begin();
    txn.insert(t.table_id, &mut t.row(2))?;
    txn.delete(&kept)?;
    // its own writes are visible to the writer
    let seen: Vec<i32> = txn
        .scan(&t.file)
        .map(|row| row.map(|row| first_value(&row)))
        .collect::<StorageResult<_>>()?;
    assert_eq!(seen, vec![20]);
    txn.abort()?;

    let rows = t.committed_rows()?;
    assert_eq!(rows, vec![kept]);

    let on_disk = t.file.read_page(t.pid(0))?;
    assert_eq!(on_disk.iter().map(first_value).collect::<Vec<_>>(), vec![10]);

    Ok(())
}

#[test]
fn test_dropped_transaction_rolls_back() -> Result<()> {
    let t = TestDb::new(8, 1)?;

    {
        let txn = t.db.begin();
        txn.insert(t.table_id, &mut t.row(5))?;
    }

    assert!(t.committed_rows()?.is_empty());
    Ok(())
}

#[test]
fn test_cache_never_exceeds_capacity() -> Result<()> {
    let t = TestDb::new(3, 12)?;
    let barrier = Arc::new(Barrier::new(3));

    let readers: Vec<_> = (0..3u32)
        .map(|offset| {
            let db = Arc::clone(&t.db);
            let barrier = Arc::clone(&barrier);
            let table_id = t.table_id;
            thread::spawn(move || -> StorageResult<()> {
                barrier.wait();
                for round in 0..60u32 {
                    let txn = db.begin();
                    let page_id = PageId::new(table_id, (round + offset * 4) % 12);
                    match txn.fetch_page(page_id, LockMode::Shared) {
                        Ok(_) | Err(StorageError::BufferPoolFull) => {}
                        Err(e) => return Err(e),
                    }
                    assert!(db.buffer_pool().cached_pages() <= 3);
                    txn.commit()?;
                }
                Ok(())
            })
        })
        .collect();

    for reader in readers {
        reader.join().unwrap()?;
    }
    assert!(t.db.buffer_pool().cached_pages() <= 3);
    Ok(())
}
