use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{PageError, TablePage};

#[derive(Error, Debug)]
pub enum HeapError {
    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Buffer pool exhausted")]
    PoolExhausted,
}

/// A table heap: a singly-linked chain of slotted pages holding tuple
/// byte-blobs addressed by stable `Rid`s.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    first_page_id: PageId,
    /// Tail of the chain; appends are serialized through this mutex
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    /// Create an empty heap with one initialized page
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, HeapError> {
        let mut pinned = buffer_pool
            .new_page_pinned()?
            .ok_or(HeapError::PoolExhausted)?;
        let page_id = pinned.id();
        {
            let mut guard = pinned.write();
            TablePage::init(&mut guard);
        }
        pinned.mark_dirty();

        Ok(Self {
            buffer_pool,
            first_page_id: page_id,
            last_page_id: Mutex::new(page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a tuple, growing the chain when the tail page is full
    pub fn insert_tuple(&self, data: &[u8]) -> Result<Rid, HeapError> {
        let mut last = self.last_page_id.lock();

        let mut pinned = self
            .buffer_pool
            .fetch_page_pinned(*last)?
            .ok_or(HeapError::PoolExhausted)?;

        let result = {
            let mut guard = pinned.write();
            TablePage::insert_record(&mut guard, data)
        };
        match result {
            Ok(slot) => {
                pinned.mark_dirty();
                return Ok(Rid::new(*last, slot));
            }
            Err(PageError::InsufficientSpace) => {}
            Err(e) => return Err(e.into()),
        }

        // Tail is full: chain a new page and insert there
        let mut new_pinned = self
            .buffer_pool
            .new_page_pinned()?
            .ok_or(HeapError::PoolExhausted)?;
        let new_page_id = new_pinned.id();
        {
            let mut guard = new_pinned.write();
            TablePage::init(&mut guard);
        }
        {
            let mut guard = pinned.write();
            TablePage::set_next_page_id(&mut guard, new_page_id);
        }
        pinned.mark_dirty();

        let slot = {
            let mut guard = new_pinned.write();
            TablePage::insert_record(&mut guard, data)?
        };
        new_pinned.mark_dirty();
        *last = new_page_id;

        Ok(Rid::new(new_page_id, slot))
    }

    /// Read a tuple; `Ok(None)` when the row has been deleted
    pub fn get_tuple(&self, rid: Rid) -> Result<Option<Vec<u8>>, HeapError> {
        let pinned = self
            .buffer_pool
            .fetch_page_pinned(rid.page_id)?
            .ok_or(HeapError::PoolExhausted)?;
        let guard = pinned.read();
        Ok(TablePage::get_record(&guard, rid.slot)?)
    }

    /// Tombstone a row. Returns false if it was already deleted.
    pub fn mark_delete(&self, rid: Rid) -> Result<bool, HeapError> {
        let mut pinned = self
            .buffer_pool
            .fetch_page_pinned(rid.page_id)?
            .ok_or(HeapError::PoolExhausted)?;
        let deleted = {
            let mut guard = pinned.write();
            TablePage::delete_record(&mut guard, rid.slot)?
        };
        if deleted {
            pinned.mark_dirty();
        }
        Ok(deleted)
    }

    /// Replace a row's bytes in place
    pub fn update_tuple(&self, rid: Rid, data: &[u8]) -> Result<(), HeapError> {
        let mut pinned = self
            .buffer_pool
            .fetch_page_pinned(rid.page_id)?
            .ok_or(HeapError::PoolExhausted)?;
        {
            let mut guard = pinned.write();
            TablePage::update_record(&mut guard, rid.slot, data)?;
        }
        pinned.mark_dirty();
        Ok(())
    }

    /// Rids of all live rows, in chain-then-slot order
    pub fn scan_rids(&self) -> Result<Vec<Rid>, HeapError> {
        let mut rids = Vec::new();
        let mut page_id = self.first_page_id;
        while page_id != INVALID_PAGE_ID {
            let pinned = self
                .buffer_pool
                .fetch_page_pinned(page_id)?
                .ok_or(HeapError::PoolExhausted)?;
            let guard = pinned.read();
            for slot in TablePage::live_slots(&guard) {
                rids.push(Rid::new(page_id, slot));
            }
            page_id = TablePage::header(&guard).next_page_id;
        }
        Ok(rids)
    }
}
