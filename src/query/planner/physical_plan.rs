/// One sort expression: the tuple's i64 column at a byte offset, ascending
/// or descending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByExpr {
    pub offset: usize,
    pub desc: bool,
}

impl OrderByExpr {
    pub fn asc(offset: usize) -> Self {
        Self { offset, desc: false }
    }

    pub fn desc(offset: usize) -> Self {
        Self { offset, desc: true }
    }
}

/// Physical query plan over the storage core's operators. Plans are plain
/// data; `build_executor` turns them into operator trees.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalPlan {
    /// Full-table scan
    SeqScan { table: String },
    /// Point lookup through an index
    IndexScan { table: String, index: String, key: i64 },
    /// Literal rows
    Values { rows: Vec<Vec<u8>> },
    /// Insert child rows into a table
    Insert { table: String, input: Box<PhysicalPlan> },
    /// Delete child rows from a table
    Delete { table: String, input: Box<PhysicalPlan> },
    /// Store an i64 at each (offset, value) assignment in child rows
    Update {
        table: String,
        input: Box<PhysicalPlan>,
        assignments: Vec<(usize, i64)>,
    },
    /// Full sort of the child
    Sort {
        input: Box<PhysicalPlan>,
        order_by: Vec<OrderByExpr>,
    },
    /// First N child rows
    Limit { input: Box<PhysicalPlan>, limit: usize },
    /// Best N child rows by sort order; produced by the optimizer from
    /// Limit over Sort
    TopN {
        input: Box<PhysicalPlan>,
        order_by: Vec<OrderByExpr>,
        limit: usize,
    },
}
