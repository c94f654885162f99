use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::common::types::Rid;
use crate::query::executor::error::ExecutionError;
use crate::query::executor::operators::sort::compare_tuples;
use crate::query::executor::{Executor, Tuple};
use crate::query::planner::physical_plan::OrderByExpr;

/// What `Limit` over `Sort` rewrites into: keeps only the best N rows in a
/// bounded heap instead of sorting the whole input
pub struct TopNExecutor {
    child: Box<dyn Executor>,
    order_by: Vec<OrderByExpr>,
    limit: usize,
    buffer: Vec<(Tuple, Rid)>,
    cursor: usize,
}

/// Heap entry ordered by the sort expressions; the max-heap keeps the worst
/// retained row on top, ready to be displaced
struct HeapItem {
    tuple: Tuple,
    rid: Rid,
    order_by: Vec<OrderByExpr>,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_tuples(&self.tuple, &other.tuple, &self.order_by)
    }
}

impl TopNExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<OrderByExpr>, limit: usize) -> Self {
        Self { child, order_by, limit, buffer: Vec::new(), cursor: 0 }
    }
}

impl Executor for TopNExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.child.init()?;
        self.buffer.clear();
        self.cursor = 0;
        if self.limit == 0 {
            while self.child.next()?.is_some() {}
            return Ok(());
        }

        let mut heap: BinaryHeap<HeapItem> = BinaryHeap::with_capacity(self.limit + 1);
        while let Some((tuple, rid)) = self.child.next()? {
            let item = HeapItem { tuple, rid, order_by: self.order_by.clone() };
            if heap.len() < self.limit {
                heap.push(item);
            } else if let Some(worst) = heap.peek() {
                if item.cmp(worst) == Ordering::Less {
                    heap.pop();
                    heap.push(item);
                }
            }
        }

        self.buffer = heap
            .into_sorted_vec()
            .into_iter()
            .map(|item| (item.tuple, item.rid))
            .collect();
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
