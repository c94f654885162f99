use crate::query::planner::physical_plan::PhysicalPlan;

/// Bottom-up physical plan rewrites. The single rule here replaces a
/// `Limit` directly over a `Sort` with a `TopN`, which keeps a bounded heap
/// instead of materializing and sorting the whole input.
#[derive(Default)]
pub struct PhysicalOptimizer;

impl PhysicalOptimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn optimize(&self, plan: PhysicalPlan) -> PhysicalPlan {
        self.sort_limit_as_top_n(plan)
    }

    fn sort_limit_as_top_n(&self, plan: PhysicalPlan) -> PhysicalPlan {
        use PhysicalPlan::*;

        // Rewrite the children first
        let plan = match plan {
            SeqScan { .. } | IndexScan { .. } | Values { .. } => plan,
            Insert { table, input } => Insert {
                table,
                input: Box::new(self.sort_limit_as_top_n(*input)),
            },
            Delete { table, input } => Delete {
                table,
                input: Box::new(self.sort_limit_as_top_n(*input)),
            },
            Update { table, input, assignments } => Update {
                table,
                input: Box::new(self.sort_limit_as_top_n(*input)),
                assignments,
            },
            Sort { input, order_by } => Sort {
                input: Box::new(self.sort_limit_as_top_n(*input)),
                order_by,
            },
            Limit { input, limit } => Limit {
                input: Box::new(self.sort_limit_as_top_n(*input)),
                limit,
            },
            TopN { input, order_by, limit } => TopN {
                input: Box::new(self.sort_limit_as_top_n(*input)),
                order_by,
                limit,
            },
        };

        match plan {
            Limit { input, limit } => match *input {
                Sort { input: sort_input, order_by } => TopN {
                    input: sort_input,
                    order_by,
                    limit,
                },
                other => Limit { input: Box::new(other), limit },
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::planner::physical_plan::OrderByExpr;
    use PhysicalPlan::*;

    #[test]
    fn test_limit_over_sort_becomes_top_n() {
        let plan = Limit {
            input: Box::new(Sort {
                input: Box::new(SeqScan { table: "t".into() }),
                order_by: vec![OrderByExpr::desc(0)],
            }),
            limit: 10,
        };
        let optimized = PhysicalOptimizer::new().optimize(plan);
        assert_eq!(
            optimized,
            TopN {
                input: Box::new(SeqScan { table: "t".into() }),
                order_by: vec![OrderByExpr::desc(0)],
                limit: 10,
            }
        );
    }

    #[test]
    fn test_rewrite_applies_below_other_operators() {
        let plan = Insert {
            table: "t".into(),
            input: Box::new(Limit {
                input: Box::new(Sort {
                    input: Box::new(SeqScan { table: "s".into() }),
                    order_by: vec![OrderByExpr::asc(8)],
                }),
                limit: 3,
            }),
        };
        let optimized = PhysicalOptimizer::new().optimize(plan);
        let Insert { input, .. } = optimized else {
            panic!("expected insert at the top");
        };
        assert!(matches!(*input, TopN { limit: 3, .. }));
    }

    #[test]
    fn test_lone_limit_and_lone_sort_untouched() {
        let limit = Limit {
            input: Box::new(SeqScan { table: "t".into() }),
            limit: 5,
        };
        assert_eq!(PhysicalOptimizer::new().optimize(limit.clone()), limit);

        let sort = Sort {
            input: Box::new(SeqScan { table: "t".into() }),
            order_by: vec![OrderByExpr::asc(0)],
        };
        assert_eq!(PhysicalOptimizer::new().optimize(sort.clone()), sort);
    }
}
