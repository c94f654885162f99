use std::sync::Arc;

use crate::common::types::{PageId, PagePtr, PageReadGuard, PageWriteGuard};
use crate::storage::buffer::manager::BufferPoolManager;

/// RAII wrapper around a pinned page: the pin is released exactly once, on
/// drop, on every exit path. Latching goes through `read`/`write`, which hand
/// out owned guards so callers can keep a latch across function boundaries.
///
/// Dirty state is sticky: once marked, the page is unpinned dirty.
pub struct PinnedPage {
    page_id: PageId,
    page: PagePtr,
    dirty: bool,
    bpm: Arc<BufferPoolManager>,
}

impl PinnedPage {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, page: PagePtr) -> Self {
        Self { page_id, page, dirty: false, bpm }
    }

    pub fn id(&self) -> PageId {
        self.page_id
    }

    /// Acquire the page's read latch
    pub fn read(&self) -> PageReadGuard {
        self.page.read_arc()
    }

    /// Acquire the page's write latch
    pub fn write(&self) -> PageWriteGuard {
        self.page.write_arc()
    }

    /// Record that the caller modified the page
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.dirty);
    }
}
