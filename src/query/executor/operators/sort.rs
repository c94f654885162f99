use std::cmp::Ordering;

use crate::common::types::Rid;
use crate::query::executor::error::ExecutionError;
use crate::query::executor::operators::sort_key;
use crate::query::executor::{Executor, Tuple};
use crate::query::planner::physical_plan::OrderByExpr;

/// Full in-memory sort: drains the child at init, emits in order
pub struct SortExecutor {
    child: Box<dyn Executor>,
    order_by: Vec<OrderByExpr>,
    buffer: Vec<(Tuple, Rid)>,
    cursor: usize,
}

pub(crate) fn compare_tuples(a: &[u8], b: &[u8], order_by: &[OrderByExpr]) -> Ordering {
    for expr in order_by {
        let ka = sort_key(a, expr.offset);
        let kb = sort_key(b, expr.offset);
        let ord = if expr.desc { kb.cmp(&ka) } else { ka.cmp(&kb) };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<OrderByExpr>) -> Self {
        Self { child, order_by, buffer: Vec::new(), cursor: 0 }
    }
}

impl Executor for SortExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.child.init()?;
        self.buffer.clear();
        self.cursor = 0;
        while let Some(row) = self.child.next()? {
            self.buffer.push(row);
        }
        let order_by = self.order_by.clone();
        self.buffer.sort_by(|a, b| compare_tuples(&a.0, &b.0, &order_by));
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        if self.cursor >= self.buffer.len() {
            return Ok(None);
        }
        let row = self.buffer[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }
}
