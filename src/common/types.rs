use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel page ID; never refers to a real page
pub const INVALID_PAGE_ID: PageId = 0;

/// The reserved page holding the (index name -> root page id) record table.
/// It is the first page of the database file, since 0 is the invalid sentinel.
pub const HEADER_PAGE_ID: PageId = 1;

/// Buffer pool frame ID type (index into the frame vector)
pub type FrameId = usize;

/// Transaction ID type
pub type TxnId = u32;

/// Table OID type
pub type TableOid = u32;

/// Row identifier: a (page, slot) pair that is stable for the life of the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub const INVALID: Rid = Rid { page_id: INVALID_PAGE_ID, slot: 0 };

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// A fixed-size page of raw bytes. The surrounding `RwLock` doubles as the
/// page latch; pin counts and dirty flags are frame metadata owned by the
/// buffer pool.
#[derive(Clone)]
pub struct Page {
    pub page_id: PageId,
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self { page_id, data: [0; PAGE_SIZE] }
    }

    /// Zero the buffer and rebind the page to a new id
    pub fn reset(&mut self, page_id: PageId) {
        self.page_id = page_id;
        self.data = [0; PAGE_SIZE];
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("page_id", &self.page_id).finish()
    }
}

/// Smart pointer to a page
pub type PagePtr = Arc<RwLock<Page>>;

/// Owned read latch on a page, independent of any borrow of the pool
pub type PageReadGuard = parking_lot::lock_api::ArcRwLockReadGuard<parking_lot::RawRwLock, Page>;

/// Owned write latch on a page
pub type PageWriteGuard = parking_lot::lock_api::ArcRwLockWriteGuard<parking_lot::RawRwLock, Page>;
