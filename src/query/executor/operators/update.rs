use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::catalog::{leading_key, TableInfo};
use crate::common::types::{Rid, TableOid};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::error::ExecutionError;
use crate::query::executor::operators::count_tuple;
use crate::query::executor::{Executor, Tuple};
use crate::transaction::concurrency::{IndexWriteRecord, LockMode, WriteType};

/// Rewrites child rows in place: each assignment stores an i64 at a byte
/// offset of the tuple.
///
/// Lock discipline matches insert/delete: IX on the table, X per row. When
/// an update moves the row's key, the index entry is migrated and the write
/// logged for rollback.
pub struct UpdateExecutor {
    ctx: ExecutorContext,
    table_oid: TableOid,
    child: Box<dyn Executor>,
    assignments: Vec<(usize, i64)>,
    table: Option<Arc<TableInfo>>,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        ctx: ExecutorContext,
        table_oid: TableOid,
        child: Box<dyn Executor>,
        assignments: Vec<(usize, i64)>,
    ) -> Self {
        Self { ctx, table_oid, child, assignments, table: None, done: false }
    }

    fn apply(&self, tuple: &[u8]) -> Tuple {
        let mut updated = tuple.to_vec();
        for &(offset, value) in &self.assignments {
            if offset + 8 <= updated.len() {
                LittleEndian::write_i64(&mut updated[offset..offset + 8], value);
            }
        }
        updated
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.child.init()?;
        let table = self
            .ctx
            .catalog()
            .table(self.table_oid)
            .ok_or_else(|| ExecutionError::TableNotFound(self.table_oid.to_string()))?;
        self.ctx.lock_table(LockMode::IntentionExclusive, self.table_oid)?;
        self.table = Some(table);
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let Some(table) = self.table.clone() else {
            return Ok(None);
        };

        let mut count = 0i64;
        while let Some((tuple, rid)) = self.child.next()? {
            self.ctx.lock_row(LockMode::Exclusive, self.table_oid, rid)?;

            let updated = self.apply(&tuple);
            table.heap.update_tuple(rid, &updated)?;

            let old_key = leading_key(&tuple);
            let new_key = leading_key(&updated);
            if old_key != new_key {
                for info in table.indexes() {
                    info.index.remove(&old_key)?;
                    info.index.insert(new_key, rid)?;
                    self.ctx.txn().append_index_write_record(IndexWriteRecord {
                        rid,
                        table_oid: self.table_oid,
                        wtype: WriteType::Update,
                        index_name: info.name.clone(),
                        key: new_key,
                        old_key: Some(old_key),
                    });
                }
            }
            count += 1;
        }

        Ok(Some((count_tuple(count), Rid::INVALID)))
    }
}
