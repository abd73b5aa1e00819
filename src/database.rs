use crate::access::heap::HeapFile;
use crate::access::schema::Schema;
use crate::catalog::{Catalog, TableId};
use crate::config::Config;
use crate::storage::buffer::BufferPool;
use crate::transaction::{Transaction, TransactionManager};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::sync::Arc;

/// One engine instance: the catalog of open tables, the buffer pool with
/// its lock manager, and the transaction id source. Separate instances share
/// nothing, so each test can build its own.
pub struct Database {
    config: Config,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
    transactions: TransactionManager,
}

impl Database {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(Catalog::new());
        let buffer_pool = BufferPool::new(Arc::clone(&catalog), &config);
        let transactions = TransactionManager::new(buffer_pool.clone());

        Ok(Self {
            config,
            catalog,
            buffer_pool,
            transactions,
        })
    }

    /// Opens (or creates) the table file at `path` and registers it as
    /// `name`.
    pub fn open_table(
        &self,
        path: impl AsRef<Path>,
        schema: Schema,
        name: &str,
    ) -> Result<TableId> {
        let path = path.as_ref();
        let file = HeapFile::open(path, Arc::new(schema), self.config.page_size)
            .with_context(|| format!("Failed to open table file {}", path.display()))?;
        let table_id = self.catalog.add_table(file, name);
        info!("opened table '{}' ({}) at {}", name, table_id, path.display());
        Ok(table_id)
    }

    /// Looks a table up by name.
    pub fn table(&self, name: &str) -> Result<Arc<HeapFile>> {
        let table_id = self
            .catalog
            .table_id(name)
            .ok_or_else(|| anyhow::anyhow!("Table '{}' does not exist", name))?;
        Ok(self.catalog.table(table_id)?)
    }

    /// Writes the table's cached pages back, drops them from the pool and
    /// unregisters the table. Its file is left on disk.
    pub fn close_table(&self, name: &str) -> Result<()> {
        let table_id = self
            .catalog
            .table_id(name)
            .ok_or_else(|| anyhow::anyhow!("Table '{}' does not exist", name))?;
        self.buffer_pool
            .evict_table(table_id)
            .with_context(|| format!("Failed to flush table '{}'", name))?;
        self.catalog.remove_table(table_id);
        info!("closed table '{}' ({})", name, table_id);
        Ok(())
    }

    /// List all tables in the database
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .catalog
            .table_ids()
            .into_iter()
            .filter_map(|id| self.catalog.table_name(id))
            .collect();
        names.sort();
        names
    }

    pub fn begin(&self) -> Transaction {
        self.transactions.begin()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }
}
