use std::sync::Arc;

use crate::catalog::TableInfo;
use crate::common::types::{Rid, TableOid};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::error::ExecutionError;
use crate::query::executor::{Executor, Tuple};
use crate::transaction::concurrency::{IsolationLevel, LockMode};

/// Full-table scan over the heap.
///
/// Lock discipline: IS on the table at init (skipped at READ_UNCOMMITTED,
/// and when the transaction already holds IX for its own writes), S on each
/// row produced unless already locked. Under READ_COMMITTED every lock this
/// scan took is released at end-of-scan.
pub struct SeqScanExecutor {
    ctx: ExecutorContext,
    table_oid: TableOid,
    table: Option<Arc<TableInfo>>,
    rids: Vec<Rid>,
    cursor: usize,
    locked_rows: Vec<Rid>,
    took_table_lock: bool,
    finished: bool,
}

impl SeqScanExecutor {
    pub fn new(ctx: ExecutorContext, table_oid: TableOid) -> Self {
        Self {
            ctx,
            table_oid,
            table: None,
            rids: Vec::new(),
            cursor: 0,
            locked_rows: Vec::new(),
            took_table_lock: false,
            finished: false,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        let table = self
            .ctx
            .catalog()
            .table(self.table_oid)
            .ok_or_else(|| ExecutionError::TableNotFound(self.table_oid.to_string()))?;

        let txn = self.ctx.txn();
        if txn.isolation_level() != IsolationLevel::ReadUncommitted
            && !txn.is_table_intention_exclusive_locked(self.table_oid)
        {
            self.ctx.lock_table(LockMode::IntentionShared, self.table_oid)?;
            self.took_table_lock = true;
        }

        self.rids = table.heap.scan_rids()?;
        self.cursor = 0;
        self.locked_rows.clear();
        self.finished = false;
        self.table = Some(table);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        if self.finished {
            return Ok(None);
        }
        let Some(table) = self.table.clone() else {
            return Ok(None);
        };

        while self.cursor < self.rids.len() {
            let rid = self.rids[self.cursor];
            self.cursor += 1;

            let txn = self.ctx.txn();
            if txn.isolation_level() != IsolationLevel::ReadUncommitted
                && !txn.is_row_shared_locked(self.table_oid, rid)
                && !txn.is_row_exclusive_locked(self.table_oid, rid)
            {
                self.ctx.lock_row(LockMode::Shared, self.table_oid, rid)?;
                self.locked_rows.push(rid);
            }

            match table.heap.get_tuple(rid)? {
                Some(tuple) => return Ok(Some((tuple, rid))),
                // Deleted between snapshot and read
                None => continue,
            }
        }

        self.finished = true;
        if self.ctx.txn().isolation_level() == IsolationLevel::ReadCommitted {
            for rid in self.locked_rows.drain(..) {
                self.ctx.unlock_row(self.table_oid, rid)?;
            }
            if self.took_table_lock {
                self.ctx.unlock_table(self.table_oid)?;
                self.took_table_lock = false;
            }
        }
        Ok(None)
    }
}
