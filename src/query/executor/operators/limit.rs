use crate::common::types::Rid;
use crate::query::executor::error::ExecutionError;
use crate::query::executor::{Executor, Tuple};

/// Passes through at most `limit` child rows
pub struct LimitExecutor {
    child: Box<dyn Executor>,
    limit: usize,
    emitted: usize,
}

impl LimitExecutor {
    pub fn new(child: Box<dyn Executor>, limit: usize) -> Self {
        Self { child, limit, emitted: 0 }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.emitted = 0;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(row) => {
                self.emitted += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}
