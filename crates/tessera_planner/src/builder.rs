//! Plan builder state shared by the expression rewriter and the component that
//! plans `SELECT` bodies.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tessera_error::Result;
use tessera_types::field_type::NOT_NULL_FLAG;
use tessera_types::{Datum, FieldType};

use crate::ast::{NodeId, SelectStmt};
use crate::config::{SessionConfig, SystemVariables};
use crate::expr::eval::EvalContext;
use crate::expr::{Column, Expression, Schema, bool_type};
use crate::logical::logical_aggregate::{AggFuncDesc, AggKind, LogicalAggregation};
use crate::logical::logical_filter::LogicalSelection;
use crate::logical::logical_join::{JoinType, LogicalApply, LogicalJoin};
use crate::logical::logical_max_one_row::LogicalMaxOneRow;
use crate::logical::logical_project::LogicalProjection;
use crate::logical::logical_scan::LogicalTableDual;
use crate::logical::{LogicalOperator, Node};

/// Optimizer passes requested by rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptFlags(u32);

impl OptFlags {
    pub const NONE: OptFlags = OptFlags(0);
    pub const PRUNE_COLUMNS: OptFlags = OptFlags(1 << 0);
    pub const DECORRELATE: OptFlags = OptFlags(1 << 1);
    pub const ELIMINATE_AGG: OptFlags = OptFlags(1 << 2);
    pub const ELIMINATE_PROJECTION: OptFlags = OptFlags(1 << 3);
    pub const JOIN_REORDER: OptFlags = OptFlags(1 << 4);

    pub const fn contains(&self, other: OptFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }
}

impl BitOr for OptFlags {
    type Output = OptFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        OptFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OptFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

/// Clause currently being planned. Used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clause {
    #[default]
    FieldList,
    WhereClause,
    GroupBy,
    Having,
    OnClause,
    OrderBy,
    GlobalOrderBy,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FieldList => "field list",
            Self::WhereClause => "where clause",
            Self::GroupBy => "group statement",
            Self::Having => "having clause",
            Self::OnClause => "on clause",
            Self::OrderBy => "order clause",
            Self::GlobalOrderBy => "global ORDER clause",
        };
        write!(f, "{s}")
    }
}

/// Default of a table column as reported by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Value(Datum),
    /// `DEFAULT CURRENT_TIMESTAMP`.
    CurrentTimestamp,
    /// Column has no default.
    None,
}

/// Target of an `INSERT ... ON DUPLICATE KEY UPDATE` being planned.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub table_name: String,
    /// Every column of the target table, indexed by table offset.
    pub table_schema: Schema,
}

/// Collaborator that plans and runs nested queries.
///
/// The rewriter hands subquery bodies to this and asks it to evaluate
/// uncorrelated subqueries eagerly.
pub trait SubqueryBuilder {
    /// Plan a `SELECT` body. Column references that don't resolve locally
    /// should resolve against `builder.outer_schemas` through the rewriter.
    fn build_result_set_node(
        &self,
        builder: &mut PlanBuilder<'_>,
        query: &SelectStmt,
    ) -> Result<LogicalOperator>;

    /// Run optimizer passes in `flags` over `plan`.
    fn optimize(&self, flags: OptFlags, plan: LogicalOperator) -> Result<LogicalOperator>;

    /// Execute an uncorrelated plan to completion.
    fn eval_subquery(&self, ctx: &EvalContext, plan: &LogicalOperator) -> Result<Vec<Vec<Datum>>>;

    fn column_default(&self, db: &str, table: &str, column: &str) -> Result<ColumnDefault>;
}

pub struct PlanBuilder<'a> {
    pub session: &'a SessionConfig,
    pub vars: &'a dyn SystemVariables,
    subquery_builder: &'a dyn SubqueryBuilder,
    /// Schemas of enclosing queries, innermost last.
    pub outer_schemas: Vec<Schema>,
    /// Column references already resolved to an offset in the current
    /// schema.
    pub col_mapper: HashMap<NodeId, usize>,
    pub opt_flags: OptFlags,
    pub cur_clause: Clause,
    next_col_id: u64,
    /// Expression stacks returned by finished rewrites.
    stack_pool: Vec<Vec<Expression>>,
}

impl fmt::Debug for PlanBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanBuilder")
            .field("outer_schemas", &self.outer_schemas.len())
            .field("opt_flags", &self.opt_flags)
            .field("cur_clause", &self.cur_clause)
            .field("next_col_id", &self.next_col_id)
            .finish_non_exhaustive()
    }
}

impl<'a> PlanBuilder<'a> {
    pub fn new(
        session: &'a SessionConfig,
        vars: &'a dyn SystemVariables,
        subquery_builder: &'a dyn SubqueryBuilder,
    ) -> Self {
        PlanBuilder {
            session,
            vars,
            subquery_builder,
            outer_schemas: Vec::new(),
            col_mapper: HashMap::new(),
            opt_flags: OptFlags::NONE,
            cur_clause: Clause::FieldList,
            next_col_id: 1,
            stack_pool: Vec::new(),
        }
    }

    pub fn subquery_builder(&self) -> &'a dyn SubqueryBuilder {
        self.subquery_builder
    }

    pub fn eval_context(&self) -> EvalContext<'_> {
        EvalContext {
            time_zone: self.session.time_zone,
            vars: Some(self.vars),
            params: &self.session.prepared_params,
            insert_row: None,
        }
    }

    pub fn alloc_column_id(&mut self) -> u64 {
        let id = self.next_col_id;
        self.next_col_id += 1;
        id
    }

    pub fn new_column(&mut self, name: impl Into<String>, ret_type: FieldType) -> Column {
        Column::new(self.alloc_column_id(), name, ret_type)
    }

    pub(crate) fn take_stack(&mut self) -> Vec<Expression> {
        self.stack_pool.pop().unwrap_or_default()
    }

    pub(crate) fn return_stack(&mut self, mut stack: Vec<Expression>) {
        stack.clear();
        self.stack_pool.push(stack);
    }

    pub fn build_table_dual(&self, row_count: usize) -> LogicalOperator {
        LogicalOperator::TableDual(Node::new(
            LogicalTableDual { row_count },
            Schema::empty(),
            Vec::new(),
        ))
    }

    pub fn build_selection(
        &self,
        child: LogicalOperator,
        conditions: Vec<Expression>,
    ) -> LogicalOperator {
        let schema = child.schema().clone();
        LogicalOperator::Selection(Node::new(
            LogicalSelection { conditions },
            schema,
            vec![child],
        ))
    }

    pub fn build_projection(
        &self,
        child: LogicalOperator,
        exprs: Vec<Expression>,
        schema: Schema,
    ) -> LogicalOperator {
        LogicalOperator::Projection(Node::new(LogicalProjection { exprs }, schema, vec![child]))
    }

    pub fn build_max_one_row(&self, child: LogicalOperator) -> LogicalOperator {
        let schema = child.schema().clone();
        LogicalOperator::MaxOneRow(Node::new(LogicalMaxOneRow, schema, vec![child]))
    }

    /// Aggregation with one named output column per aggregate.
    pub fn build_aggregation(
        &mut self,
        child: LogicalOperator,
        aggs: Vec<(&str, AggFuncDesc)>,
        group_by: Vec<Expression>,
    ) -> LogicalOperator {
        let mut schema = Schema::empty();
        let mut agg_funcs = Vec::with_capacity(aggs.len());
        for (name, agg) in aggs {
            schema.append(self.new_column(name, agg.ret_type.clone()));
            agg_funcs.push(agg);
        }
        LogicalOperator::Aggregation(Node::new(
            LogicalAggregation {
                agg_funcs,
                group_by,
            },
            schema,
            vec![child],
        ))
    }

    /// Remove duplicates over the first `len` output columns of `child`.
    ///
    /// The output columns keep the unique ids of the input columns so
    /// expressions built against `child` still resolve.
    pub fn build_distinct(&mut self, child: LogicalOperator, len: usize) -> Result<LogicalOperator> {
        let columns: Vec<Column> = child.schema().columns.iter().take(len).cloned().collect();
        let mut agg_funcs = Vec::with_capacity(columns.len());
        for col in &columns {
            agg_funcs.push(AggFuncDesc::new(
                AggKind::FirstRow,
                vec![col.clone().into()],
                false,
            )?);
        }
        let group_by = columns.iter().cloned().map(Expression::Column).collect();
        Ok(LogicalOperator::Aggregation(Node::new(
            LogicalAggregation {
                agg_funcs,
                group_by,
            },
            Schema::new(columns),
            vec![child],
        )))
    }

    pub fn build_join(
        &self,
        left: LogicalOperator,
        right: LogicalOperator,
        join_type: JoinType,
        conditions: Vec<Expression>,
    ) -> LogicalOperator {
        let schema = join_schema(left.schema(), right.schema(), join_type);
        LogicalOperator::Join(Node::new(
            LogicalJoin {
                join_type,
                conditions,
            },
            schema,
            vec![left, right],
        ))
    }

    /// Apply `inner` to every row of `outer`. The output schema is both
    /// sides' columns.
    pub fn build_apply_with_join_type(
        &self,
        outer: LogicalOperator,
        inner: LogicalOperator,
        join_type: JoinType,
    ) -> LogicalOperator {
        let schema = join_schema(outer.schema(), inner.schema(), join_type);
        let correlated_columns = inner.extract_correlated_columns_by_schema(outer.schema());
        LogicalOperator::Apply(Node::new(
            LogicalApply {
                join: LogicalJoin {
                    join_type,
                    conditions: Vec::new(),
                },
                correlated_columns,
            },
            schema,
            vec![outer, inner],
        ))
    }

    /// Semi join of `outer` against `inner` as an apply.
    ///
    /// With `as_scalar` the output keeps every outer row and appends a
    /// boolean column holding the match result. Otherwise only matching (or,
    /// with `not`, non-matching) outer rows are produced.
    pub fn build_semi_apply(
        &mut self,
        outer: LogicalOperator,
        inner: LogicalOperator,
        conditions: Vec<Expression>,
        as_scalar: bool,
        not: bool,
    ) -> Result<LogicalOperator> {
        let join_type = match (as_scalar, not) {
            (true, false) => JoinType::LeftOuterSemi,
            (true, true) => JoinType::AntiLeftOuterSemi,
            (false, false) => JoinType::Semi,
            (false, true) => JoinType::AntiSemi,
        };
        let mut schema = outer.schema().clone();
        if as_scalar {
            let aux = self.new_column("aux_col", bool_type());
            schema.append(aux);
        }
        let correlated_columns = inner.extract_correlated_columns_by_schema(outer.schema());
        Ok(LogicalOperator::Apply(Node::new(
            LogicalApply {
                join: LogicalJoin {
                    join_type,
                    conditions,
                },
                correlated_columns,
            },
            schema,
            vec![outer, inner],
        )))
    }
}

fn join_schema(left: &Schema, right: &Schema, join_type: JoinType) -> Schema {
    if join_type.is_semi() {
        return left.clone();
    }
    let nullable = |schema: &Schema| {
        schema
            .columns
            .iter()
            .cloned()
            .map(|mut col| {
                col.ret_type.flag &= !NOT_NULL_FLAG;
                col
            })
            .collect::<Vec<_>>()
    };
    let mut columns = match join_type {
        JoinType::RightOuter => nullable(left),
        _ => left.columns.clone(),
    };
    match join_type {
        JoinType::LeftOuter => columns.extend(nullable(right)),
        _ => columns.extend(right.columns.iter().cloned()),
    }
    Schema::new(columns)
}
