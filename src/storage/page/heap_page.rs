//! Fixed-slot heap page.
//!
//! Byte layout, `page_size` bytes in total:
//!
//! ```text
//! | header: ceil(num_slots / 8) bytes | slot 0 | slot 1 | ... | zero padding |
//! ```
//!
//! Bit `i` of the header (LSB first within each byte) is set when slot `i`
//! holds a row. Every slot is `row_width` bytes wide; empty slots are zero.

use crate::access::schema::Schema;
use crate::access::tuple::{Tuple, TupleId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;

/// Number of rows of `row_width` bytes that fit on a page together with
/// their header bit.
pub fn slots_per_page(page_size: usize, row_width: usize) -> usize {
    (page_size * 8) / (row_width * 8 + 1)
}

/// Bytes needed for the occupancy bitmap of `num_slots` slots.
pub fn header_size(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// Contents of a freshly allocated page: all zeroes, no slot occupied.
pub fn empty_page_data(page_size: usize) -> Vec<u8> {
    vec![0u8; page_size]
}

#[derive(Debug)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
    /// Page bytes as of the last load or flush.
    before_image: Bytes,
}

impl HeapPage {
    /// Decodes a page from `data`, which must hold at least `page_size`
    /// bytes.
    pub fn new(
        page_id: PageId,
        schema: Arc<Schema>,
        data: &[u8],
        page_size: usize,
    ) -> StorageResult<Self> {
        if data.len() < page_size {
            return Err(StorageError::CorruptPage {
                page_id,
                reason: format!("expected {} bytes, got {}", page_size, data.len()),
            });
        }

        let row_width = schema.row_width();
        if row_width == 0 {
            return Err(StorageError::SchemaMismatch(
                "schema has no columns".to_string(),
            ));
        }
        let num_slots = slots_per_page(page_size, row_width);
        if num_slots == 0 {
            return Err(StorageError::SchemaMismatch(format!(
                "row of {} bytes does not fit in a page of {} bytes",
                row_width, page_size
            )));
        }
        if num_slots > u16::MAX as usize + 1 {
            return Err(StorageError::InvalidConfig(format!(
                "{} slots per page exceed the addressable slot range",
                num_slots
            )));
        }

        let header_len = header_size(num_slots);
        let header = data[..header_len].to_vec();

        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if !bit_is_set(&header, slot) {
                tuples.push(None);
                continue;
            }
            let offset = header_len + slot * row_width;
            let mut cursor = Cursor::new(&data[offset..offset + row_width]);
            let tuple = Tuple::parse(&schema, &mut cursor, TupleId::new(page_id, slot as u16))
                .map_err(|e| StorageError::CorruptPage {
                    page_id,
                    reason: format!("slot {}: {}", slot, e),
                })?;
            tuples.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            schema,
            page_size,
            header,
            tuples,
            dirtied_by: None,
            before_image: Bytes::copy_from_slice(&data[..page_size]),
        })
    }

    /// A page with no rows.
    pub fn empty(page_id: PageId, schema: Arc<Schema>, page_size: usize) -> StorageResult<Self> {
        Self::new(page_id, schema, &empty_page_data(page_size), page_size)
    }

    /// Encodes the page into exactly `page_size` bytes.
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        let row_width = self.schema.row_width();
        let mut data = Vec::with_capacity(self.page_size);
        data.extend_from_slice(&self.header);

        for (slot, tuple) in self.tuples.iter().enumerate() {
            match tuple {
                Some(tuple) if self.is_slot_used(slot) => tuple.serialize(&mut data)?,
                _ => data.resize(data.len() + row_width, 0),
            }
        }

        data.resize(self.page_size, 0);
        Ok(data)
    }

    /// Stores `tuple` in the first empty slot and records the new location
    /// on it.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> StorageResult<TupleId> {
        if **tuple.schema() != *self.schema {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple schema {} does not match page schema {}",
                tuple.schema(),
                self.schema
            )));
        }

        let slot = (0..self.num_slots())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(StorageError::PageFull(self.page_id))?;

        let tuple_id = TupleId::new(self.page_id, slot as u16);
        tuple.set_tuple_id(Some(tuple_id));
        self.tuples[slot] = Some(tuple.clone());
        self.mark_slot_used(slot, true);

        Ok(tuple_id)
    }

    /// Removes `tuple` from the slot its location names.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let not_on_page = || StorageError::NotOnPage {
            page_id: self.page_id,
            tuple_id: tuple.tuple_id(),
        };

        let tuple_id = tuple.tuple_id().ok_or_else(not_on_page)?;
        let slot = tuple_id.slot_id as usize;
        if tuple_id.page_id != self.page_id || slot >= self.num_slots() || !self.is_slot_used(slot)
        {
            return Err(not_on_page());
        }

        self.tuples[slot] = None;
        self.mark_slot_used(slot, false);
        Ok(())
    }

    /// Occupied tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.tuples
            .iter()
            .enumerate()
            .filter(move |(slot, _)| self.is_slot_used(*slot))
            .filter_map(|(_, tuple)| tuple.as_ref())
    }

    pub fn tuple(&self, slot: usize) -> Option<&Tuple> {
        if slot < self.num_slots() && self.is_slot_used(slot) {
            self.tuples[slot].as_ref()
        } else {
            None
        }
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && bit_is_set(&self.header, slot)
    }

    pub fn empty_slot_count(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn header_size(&self) -> usize {
        self.header.len()
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Tags the page with the transaction that modified it. Only the
    /// exclusive lock holder writes to a page, so one tag is enough.
    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirtied_by = if dirty { Some(tid) } else { None };
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    /// The page as it was at its last load or flush.
    pub fn before_image(&self) -> StorageResult<HeapPage> {
        HeapPage::new(
            self.page_id,
            Arc::clone(&self.schema),
            &self.before_image,
            self.page_size,
        )
    }

    /// Captures the current contents as the new before-image.
    pub fn set_before_image(&mut self) -> StorageResult<()> {
        self.before_image = Bytes::from(self.to_bytes()?);
        Ok(())
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }
}

fn bit_is_set(header: &[u8], slot: usize) -> bool {
    header[slot / 8] & (1 << (slot % 8)) != 0
}
