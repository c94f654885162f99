use crate::common::types::Rid;
use crate::query::executor::error::ExecutionError;
use crate::query::executor::{Executor, Tuple};

/// Emits a fixed list of tuples; the usual child of a DML plan
pub struct ValuesExecutor {
    rows: Vec<Tuple>,
    cursor: usize,
}

impl ValuesExecutor {
    pub fn new(rows: Vec<Tuple>) -> Self {
        Self { rows, cursor: 0 }
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((row, Rid::INVALID)))
    }
}
