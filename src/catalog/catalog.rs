use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::RwLock;
use thiserror::Error;

use crate::common::types::TableOid;
use crate::index::btree::BTreeError;
use crate::index::BPlusTree;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::{HeapError, TableHeap};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("Index error: {0}")]
    Index(#[from] BTreeError),
}

/// Tuples are opaque byte blobs to the storage core; by convention the first
/// eight bytes are the row's key column, a little-endian i64, and that is
/// what the indexes are built over.
pub fn leading_key(data: &[u8]) -> i64 {
    if data.len() < 8 {
        return 0;
    }
    LittleEndian::read_i64(&data[0..8])
}

/// A secondary index over a table's leading key column
pub struct IndexInfo {
    pub name: String,
    pub index: BPlusTree<i64>,
}

/// A registered table: its heap plus any indexes
pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub heap: Arc<TableHeap>,
    indexes: RwLock<Vec<Arc<IndexInfo>>>,
}

impl TableInfo {
    pub fn indexes(&self) -> Vec<Arc<IndexInfo>> {
        self.indexes.read().clone()
    }

    pub fn index(&self, name: &str) -> Option<Arc<IndexInfo>> {
        self.indexes.read().iter().find(|i| i.name == name).cloned()
    }
}

/// Minimal table registry: oid and name to heap and indexes. The SQL-facing
/// catalog (schemas, column metadata) lives outside the storage core.
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    tables: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    names: RwLock<HashMap<String, TableOid>>,
    next_oid: AtomicU32,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl Catalog {
    pub fn new(
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        Self {
            buffer_pool,
            tables: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
            next_oid: AtomicU32::new(0),
            leaf_max_size,
            internal_max_size,
        }
    }

    pub fn create_table(&self, name: &str) -> Result<Arc<TableInfo>, CatalogError> {
        if self.names.read().contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }
        let heap = Arc::new(TableHeap::new(Arc::clone(&self.buffer_pool))?);
        let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
        let info = Arc::new(TableInfo {
            oid,
            name: name.to_string(),
            heap,
            indexes: RwLock::new(Vec::new()),
        });
        self.tables.write().insert(oid, Arc::clone(&info));
        self.names.write().insert(name.to_string(), oid);
        log::debug!("created table {} (oid {})", name, oid);
        Ok(info)
    }

    /// Create an index over a table's leading key column and backfill it
    /// from the existing rows
    pub fn create_index(
        &self,
        table_name: &str,
        index_name: &str,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let table = self
            .table_by_name(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;
        if table.index(index_name).is_some() {
            return Err(CatalogError::IndexExists(index_name.to_string()));
        }

        let index = BPlusTree::new(
            index_name,
            Arc::clone(&self.buffer_pool),
            self.leaf_max_size,
            self.internal_max_size,
        )?;
        for rid in table.heap.scan_rids()? {
            if let Some(tuple) = table.heap.get_tuple(rid)? {
                index.insert(leading_key(&tuple), rid)?;
            }
        }

        let info = Arc::new(IndexInfo { name: index_name.to_string(), index });
        table.indexes.write().push(Arc::clone(&info));
        log::debug!("created index {} on table {}", index_name, table_name);
        Ok(info)
    }

    pub fn table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.read().get(&oid).cloned()
    }

    pub fn table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = *self.names.read().get(name)?;
        self.table(oid)
    }
}
