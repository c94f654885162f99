use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::page::error::PageError;

pub const TABLE_PAGE_HEADER_SIZE: usize = 16;
pub const SLOT_SIZE: usize = 8;

/// Header of a slotted heap page
#[derive(Debug, Clone, Copy)]
pub struct TablePageHeader {
    pub free_space_offset: u32,
    pub free_space_size: u32,
    pub slot_count: u32,
    pub next_page_id: PageId,
}

impl TablePageHeader {
    fn new() -> Self {
        Self {
            free_space_offset: TABLE_PAGE_HEADER_SIZE as u32,
            free_space_size: (PAGE_SIZE - TABLE_PAGE_HEADER_SIZE) as u32,
            slot_count: 0,
            next_page_id: INVALID_PAGE_ID,
        }
    }

    fn to_bytes(self) -> [u8; TABLE_PAGE_HEADER_SIZE] {
        let mut bytes = [0u8; TABLE_PAGE_HEADER_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.free_space_offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.free_space_size);
        LittleEndian::write_u32(&mut bytes[8..12], self.slot_count);
        LittleEndian::write_u32(&mut bytes[12..16], self.next_page_id);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            free_space_offset: LittleEndian::read_u32(&bytes[0..4]),
            free_space_size: LittleEndian::read_u32(&bytes[4..8]),
            slot_count: LittleEndian::read_u32(&bytes[8..12]),
            next_page_id: LittleEndian::read_u32(&bytes[12..16]),
        }
    }
}

/// A slot entry: record offset and length, stored from the page end.
/// A zero length marks a deleted record.
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u32,
    length: u32,
}

impl Slot {
    fn to_bytes(self) -> [u8; SLOT_SIZE] {
        let mut bytes = [0u8; SLOT_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.length);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            offset: LittleEndian::read_u32(&bytes[0..4]),
            length: LittleEndian::read_u32(&bytes[4..8]),
        }
    }
}

/// Codec for slotted heap pages: record data grows forward from the header,
/// the slot array grows backward from the page end.
pub struct TablePage;

impl TablePage {
    pub fn init(page: &mut Page) {
        let header = TablePageHeader::new();
        page.data[0..TABLE_PAGE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn header(page: &Page) -> TablePageHeader {
        TablePageHeader::from_bytes(&page.data[0..TABLE_PAGE_HEADER_SIZE])
    }

    pub fn set_next_page_id(page: &mut Page, next: PageId) {
        let mut header = Self::header(page);
        header.next_page_id = next;
        page.data[0..TABLE_PAGE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    fn slot_position(slot: u32) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot as usize + 1)
    }

    fn read_slot(page: &Page, slot: u32) -> Slot {
        let pos = Self::slot_position(slot);
        Slot::from_bytes(&page.data[pos..pos + SLOT_SIZE])
    }

    fn write_slot(page: &mut Page, slot: u32, entry: Slot) {
        let pos = Self::slot_position(slot);
        page.data[pos..pos + SLOT_SIZE].copy_from_slice(&entry.to_bytes());
    }

    /// Append a record and return its slot index
    pub fn insert_record(page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        if data.len() + SLOT_SIZE > PAGE_SIZE - TABLE_PAGE_HEADER_SIZE {
            return Err(PageError::TupleTooLarge(data.len()));
        }

        let mut header = Self::header(page);
        let needed = (data.len() + SLOT_SIZE) as u32;
        if header.free_space_size < needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.slot_count;
        let offset = header.free_space_offset;
        let data_end = offset as usize + data.len();
        page.data[offset as usize..data_end].copy_from_slice(data);
        Self::write_slot(page, slot, Slot { offset, length: data.len() as u32 });

        header.free_space_offset += data.len() as u32;
        header.free_space_size -= needed;
        header.slot_count += 1;
        page.data[0..TABLE_PAGE_HEADER_SIZE].copy_from_slice(&header.to_bytes());

        Ok(slot)
    }

    /// Read a live record; `Ok(None)` for a deleted one
    pub fn get_record(page: &Page, slot: u32) -> Result<Option<Vec<u8>>, PageError> {
        let header = Self::header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidSlot(slot));
        }
        let entry = Self::read_slot(page, slot);
        if entry.length == 0 {
            return Ok(None);
        }
        let start = entry.offset as usize;
        Ok(Some(page.data[start..start + entry.length as usize].to_vec()))
    }

    /// Tombstone a record. Returns false if it was already deleted.
    pub fn delete_record(page: &mut Page, slot: u32) -> Result<bool, PageError> {
        let header = Self::header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidSlot(slot));
        }
        let mut entry = Self::read_slot(page, slot);
        if entry.length == 0 {
            return Ok(false);
        }
        // The data bytes are left in place; only the slot is invalidated
        entry.length = 0;
        Self::write_slot(page, slot, entry);
        Ok(true)
    }

    /// Overwrite a record in place, relocating it within the page when the
    /// new payload is larger than the old one. The slot index is preserved.
    pub fn update_record(page: &mut Page, slot: u32, data: &[u8]) -> Result<(), PageError> {
        let mut header = Self::header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidSlot(slot));
        }
        let mut entry = Self::read_slot(page, slot);
        if entry.length == 0 {
            return Err(PageError::RecordNotFound);
        }

        let new_len = data.len() as u32;
        if new_len > entry.length {
            let growth = new_len - entry.length;
            if header.free_space_size < growth {
                return Err(PageError::InsufficientSpace);
            }
            let offset = header.free_space_offset;
            let end = offset as usize + data.len();
            page.data[offset as usize..end].copy_from_slice(data);
            Self::write_slot(page, slot, Slot { offset, length: new_len });

            header.free_space_offset += new_len;
            header.free_space_size -= growth;
            page.data[0..TABLE_PAGE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
            return Ok(());
        }

        let start = entry.offset as usize;
        page.data[start..start + data.len()].copy_from_slice(data);
        if new_len < entry.length {
            entry.length = new_len;
            Self::write_slot(page, slot, entry);
        }
        Ok(())
    }

    /// Slot indices of live records, in slot order
    pub fn live_slots(page: &Page) -> Vec<u32> {
        let header = Self::header(page);
        (0..header.slot_count)
            .filter(|&slot| Self::read_slot(page, slot).length > 0)
            .collect()
    }
}
