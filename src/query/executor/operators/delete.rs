use std::sync::Arc;

use crate::catalog::{leading_key, TableInfo};
use crate::common::types::{Rid, TableOid};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::error::ExecutionError;
use crate::query::executor::operators::count_tuple;
use crate::query::executor::{Executor, Tuple};
use crate::transaction::concurrency::{IndexWriteRecord, LockMode, WriteType};

/// Tombstones every child row and removes its index entries.
///
/// Lock discipline: IX on the table at init, X on each row before the heap
/// or any index is touched.
pub struct DeleteExecutor {
    ctx: ExecutorContext,
    table_oid: TableOid,
    child: Box<dyn Executor>,
    table: Option<Arc<TableInfo>>,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(ctx: ExecutorContext, table_oid: TableOid, child: Box<dyn Executor>) -> Self {
        Self { ctx, table_oid, child, table: None, done: false }
    }
}

impl Executor for DeleteExecutor {
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

            if table.heap.mark_delete(rid)? {
                let key = leading_key(&tuple);
                for info in table.indexes() {
                    if info.index.remove(&key)? {
                        self.ctx.txn().append_index_write_record(IndexWriteRecord {
                            rid,
                            table_oid: self.table_oid,
                            wtype: WriteType::Delete,
                            index_name: info.name.clone(),
                            key,
                            old_key: None,
                        });
                    }
                }
                count += 1;
            }
        }

        Ok(Some((count_tuple(count), Rid::INVALID)))
    }
}
