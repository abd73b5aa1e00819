use crate::access::schema::Schema;
use crate::access::value::Value;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Location of a tuple: the page holding it and its slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleId {
    pub page_id: PageId,
    pub slot_id: u16,
}

impl TupleId {
    pub fn new(page_id: PageId, slot_id: u16) -> Self {
        Self { page_id, slot_id }
    }
}

impl PartialOrd for TupleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TupleId {
    fn cmp(&self, other: &Self) -> Ordering {
        // First compare by page_id, then by slot_id
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.slot_id.cmp(&other.slot_id),
            other => other,
        }
    }
}

/// Represents a row in the database. A tuple that has not been placed on a
/// page yet has no `tuple_id`.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
    tuple_id: Option<TupleId>,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> StorageResult<Self> {
        if values.len() != schema.num_columns() {
            return Err(StorageError::SchemaMismatch(format!(
                "value count {} doesn't match schema length {}",
                values.len(),
                schema.num_columns()
            )));
        }
        for (value, column) in values.iter().zip(schema.columns()) {
            if !value.is_compatible_with(column.data_type) {
                return Err(StorageError::SchemaMismatch(format!(
                    "value {:?} is not compatible with column {} of type {}",
                    value, column.name, column.data_type
                )));
            }
        }
        Ok(Self {
            schema,
            values,
            tuple_id: None,
        })
    }

    /// Reads one row of `schema` from its slot encoding.
    pub fn parse<R: Read>(
        schema: &Arc<Schema>,
        reader: &mut R,
        tuple_id: TupleId,
    ) -> io::Result<Self> {
        let mut values = Vec::with_capacity(schema.num_columns());
        for column in schema.columns() {
            values.push(column.data_type.parse(reader)?);
        }
        Ok(Self {
            schema: Arc::clone(schema),
            values,
            tuple_id: Some(tuple_id),
        })
    }

    /// Writes exactly `schema.row_width()` bytes.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for value in &self.values {
            value.serialize(writer)?;
        }
        Ok(())
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn tuple_id(&self) -> Option<TupleId> {
        self.tuple_id
    }

    pub fn set_tuple_id(&mut self, tuple_id: Option<TupleId>) {
        self.tuple_id = tuple_id;
    }
}

/// Tuples compare by content; their location is not part of equality.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("\t"))
    }
}
