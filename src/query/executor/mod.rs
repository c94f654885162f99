pub mod context;
pub mod error;
pub mod operators;

pub use context::ExecutorContext;
pub use error::ExecutionError;

use crate::common::types::Rid;
use crate::query::planner::physical_plan::PhysicalPlan;
use operators::delete::DeleteExecutor;
use operators::index_scan::IndexScanExecutor;
use operators::insert::InsertExecutor;
use operators::limit::LimitExecutor;
use operators::seq_scan::SeqScanExecutor;
use operators::sort::SortExecutor;
use operators::top_n::TopNExecutor;
use operators::update::UpdateExecutor;
use operators::values::ValuesExecutor;

/// Tuples are opaque byte blobs at this layer; interpretation belongs to
/// the type system above the storage core
pub type Tuple = Vec<u8>;

/// Pull-style operator: `init` sets up (and takes table locks where the
/// operator's contract says so), `next` produces one row at a time
pub trait Executor {
    fn init(&mut self) -> Result<(), ExecutionError>;
    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError>;
}

/// Instantiate the executor tree for a physical plan
pub fn build_executor(
    ctx: &ExecutorContext,
    plan: &PhysicalPlan,
) -> Result<Box<dyn Executor>, ExecutionError> {
    match plan {
        PhysicalPlan::SeqScan { table } => {
            let info = ctx
                .catalog()
                .table_by_name(table)
                .ok_or_else(|| ExecutionError::TableNotFound(table.clone()))?;
            Ok(Box::new(SeqScanExecutor::new(ctx.clone(), info.oid)))
        }
        PhysicalPlan::IndexScan { table, index, key } => {
            let info = ctx
                .catalog()
                .table_by_name(table)
                .ok_or_else(|| ExecutionError::TableNotFound(table.clone()))?;
            Ok(Box::new(IndexScanExecutor::new(ctx.clone(), info.oid, index.clone(), *key)))
        }
        PhysicalPlan::Values { rows } => Ok(Box::new(ValuesExecutor::new(rows.clone()))),
        PhysicalPlan::Insert { table, input } => {
            let info = ctx
                .catalog()
                .table_by_name(table)
                .ok_or_else(|| ExecutionError::TableNotFound(table.clone()))?;
            let child = build_executor(ctx, input)?;
            Ok(Box::new(InsertExecutor::new(ctx.clone(), info.oid, child)))
        }
        PhysicalPlan::Delete { table, input } => {
            let info = ctx
                .catalog()
                .table_by_name(table)
                .ok_or_else(|| ExecutionError::TableNotFound(table.clone()))?;
            let child = build_executor(ctx, input)?;
            Ok(Box::new(DeleteExecutor::new(ctx.clone(), info.oid, child)))
        }
        PhysicalPlan::Update { table, input, assignments } => {
            let info = ctx
                .catalog()
                .table_by_name(table)
                .ok_or_else(|| ExecutionError::TableNotFound(table.clone()))?;
            let child = build_executor(ctx, input)?;
            Ok(Box::new(UpdateExecutor::new(ctx.clone(), info.oid, child, assignments.clone())))
        }
        PhysicalPlan::Sort { input, order_by } => {
            let child = build_executor(ctx, input)?;
            Ok(Box::new(SortExecutor::new(child, order_by.clone())))
        }
        PhysicalPlan::Limit { input, limit } => {
            let child = build_executor(ctx, input)?;
            Ok(Box::new(LimitExecutor::new(child, *limit)))
        }
        PhysicalPlan::TopN { input, order_by, limit } => {
            let child = build_executor(ctx, input)?;
            Ok(Box::new(TopNExecutor::new(child, order_by.clone(), *limit)))
        }
    }
}
