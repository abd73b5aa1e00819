//! Registry of open tables.
//!
//! The catalog maps table ids (and names) to their [`HeapFile`]. The storage
//! core only ever reads from it: the buffer pool resolves a page's table
//! here to load or flush it, and pages take their row schema from it.

use crate::access::heap::HeapFile;
use crate::access::schema::Schema;
use crate::storage::error::{StorageError, StorageResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
pub struct Catalog {
    tables: DashMap<TableId, Arc<HeapFile>>,
    names: DashMap<String, TableId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` under `name`. A table already registered with the
    /// same name or the same id is replaced.
    pub fn add_table(&self, file: impl Into<Arc<HeapFile>>, name: &str) -> TableId {
        let file = file.into();
        let table_id = file.table_id();
        if let Some((_, old_id)) = self.names.remove(name) {
            self.tables.remove(&old_id);
        }
        self.names.retain(|_, id| *id != table_id);
        self.tables.insert(table_id, file);
        self.names.insert(name.to_string(), table_id);
        table_id
    }

    /// Unregisters a table and hands its file back.
    pub fn remove_table(&self, table_id: TableId) -> Option<Arc<HeapFile>> {
        self.names.retain(|_, id| *id != table_id);
        self.tables.remove(&table_id).map(|(_, file)| file)
    }

    pub fn table(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.tables
            .get(&table_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StorageError::NoSuchTable(table_id))
    }

    pub fn schema(&self, table_id: TableId) -> StorageResult<Arc<Schema>> {
        Ok(Arc::clone(self.table(table_id)?.schema()))
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).map(|entry| *entry.value())
    }

    pub fn table_name(&self, table_id: TableId) -> Option<String> {
        self.names
            .iter()
            .find(|entry| *entry.value() == table_id)
            .map(|entry| entry.key().clone())
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }
}
