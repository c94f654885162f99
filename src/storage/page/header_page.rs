use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::error::PageError;

/// Codec for the reserved header page, which stores the
/// `(index_name -> root_page_id)` records used to locate index roots at
/// startup.
///
/// Layout: a u32 byte-length prefix followed by a bincode-encoded
/// `Vec<(String, PageId)>`. A zeroed page decodes as an empty record table.
pub struct HeaderPage;

impl HeaderPage {
    fn read_records(page: &Page) -> Result<Vec<(String, PageId)>, PageError> {
        let len = LittleEndian::read_u32(&page.data[0..4]) as usize;
        if len == 0 {
            return Ok(Vec::new());
        }
        if len + 4 > PAGE_SIZE {
            return Err(PageError::Deserialization(format!(
                "header record table length {} exceeds page size",
                len
            )));
        }
        bincode::deserialize(&page.data[4..4 + len])
            .map_err(|e| PageError::Deserialization(e.to_string()))
    }

    fn write_records(page: &mut Page, records: &[(String, PageId)]) -> Result<(), PageError> {
        let bytes = bincode::serialize(records)
            .map_err(|e| PageError::Serialization(e.to_string()))?;
        if bytes.len() + 4 > PAGE_SIZE {
            return Err(PageError::InsufficientSpace);
        }
        LittleEndian::write_u32(&mut page.data[0..4], bytes.len() as u32);
        page.data[4..4 + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// Look up the recorded root page of an index
    pub fn get_root(page: &Page, index_name: &str) -> Result<Option<PageId>, PageError> {
        let records = Self::read_records(page)?;
        Ok(records
            .iter()
            .find(|(name, _)| name == index_name)
            .map(|(_, root)| *root))
    }

    /// Insert or update the record for an index
    pub fn set_root(page: &mut Page, index_name: &str, root: PageId) -> Result<(), PageError> {
        let mut records = Self::read_records(page)?;
        match records.iter_mut().find(|(name, _)| name == index_name) {
            Some(record) => record.1 = root,
            None => records.push((index_name.to_string(), root)),
        }
        Self::write_records(page, &records)
    }

    /// Drop the record for an index
    pub fn remove(page: &mut Page, index_name: &str) -> Result<bool, PageError> {
        let mut records = Self::read_records(page)?;
        let before = records.len();
        records.retain(|(name, _)| name != index_name);
        let removed = records.len() != before;
        if removed {
            Self::write_records(page, &records)?;
        }
        Ok(removed)
    }
}
