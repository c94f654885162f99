use byteorder::{ByteOrder, LittleEndian};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Page, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;

/// Encode a node into the raw page buffer, behind a u32 byte-length prefix
pub fn serialize_node<K: Serialize>(node: &BTreeNode<K>, page: &mut Page) -> Result<(), BTreeError> {
    let bytes = bincode::serialize(node).map_err(|e| BTreeError::Serialization(e.to_string()))?;
    if bytes.len() + 4 > PAGE_SIZE {
        return Err(BTreeError::NodeTooLarge);
    }
    LittleEndian::write_u32(&mut page.data[0..4], bytes.len() as u32);
    page.data[4..4 + bytes.len()].copy_from_slice(&bytes);
    Ok(())
}

/// Decode the node stored in a page buffer
pub fn deserialize_node<K: DeserializeOwned>(page: &Page) -> Result<BTreeNode<K>, BTreeError> {
    let len = LittleEndian::read_u32(&page.data[0..4]) as usize;
    if len == 0 || len + 4 > PAGE_SIZE {
        return Err(BTreeError::Deserialization(format!(
            "page {} does not hold a node (payload length {})",
            page.page_id, len
        )));
    }
    bincode::deserialize(&page.data[4..4 + len]).map_err(|e| BTreeError::Deserialization(e.to_string()))
}
