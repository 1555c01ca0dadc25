//! In-memory catalog, `SELECT` planner and row executor used to run rewritten
//! plans end to end.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;

use tessera_error::{DbError, OptionExt, Result};
use tessera_planner::ast::build::subquery;
use tessera_planner::ast::{BinaryOp, ExprNode, NodeId, SelectField, SelectStmt};
use tessera_planner::builder::{Clause, ColumnDefault, OptFlags, PlanBuilder, SubqueryBuilder};
use tessera_planner::config::{InMemoryVariables, SessionConfig};
use tessera_planner::expr::eval::{EvalContext, SchemaRow};
use tessera_planner::expr::{Expression, Schema, split_cnf_items};
use tessera_planner::logical::logical_aggregate::{AggFuncDesc, AggKind};
use tessera_planner::logical::logical_join::JoinType;
use tessera_planner::logical::logical_limit::LogicalLimit;
use tessera_planner::logical::logical_order::{ByItem, LogicalSort};
use tessera_planner::logical::logical_scan::LogicalDataSource;
use tessera_planner::logical::{LogicalOperator, Node};
use tessera_planner::rewriter::{RewriteMaps, eval_ast_expr, rewrite, rewrite_with_maps};
use tessera_types::{Datum, FieldType, MysqlType};

pub fn int_type() -> FieldType {
    FieldType::new(MysqlType::LongLong)
}

pub fn int_not_null() -> FieldType {
    FieldType::new(MysqlType::LongLong).not_null()
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub columns: Vec<(String, FieldType, ColumnDefault)>,
    pub rows: Vec<Vec<Datum>>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    pub db: String,
    pub tables: HashMap<String, TableDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            db: "test".to_string(),
            tables: HashMap::new(),
        }
    }

    /// Add a table of columns with no defaults.
    pub fn table(mut self, name: &str, columns: &[(&str, FieldType)], rows: Vec<Vec<Datum>>) -> Self {
        let columns = columns
            .iter()
            .map(|(n, ty)| (n.to_string(), ty.clone(), ColumnDefault::None))
            .collect();
        self.tables.insert(name.to_string(), TableDef { columns, rows });
        self
    }

    pub fn table_with_defaults(
        mut self,
        name: &str,
        columns: Vec<(&str, FieldType, ColumnDefault)>,
    ) -> Self {
        let columns = columns
            .into_iter()
            .map(|(n, ty, d)| (n.to_string(), ty, d))
            .collect();
        self.tables.insert(
            name.to_string(),
            TableDef {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }
}

/// Plans `SELECT` bodies by driving the rewriter the way a full planner
/// would.
#[derive(Debug)]
pub struct MockPlanner<'c> {
    pub catalog: &'c Catalog,
}

impl MockPlanner<'_> {
    pub fn scan(&self, builder: &mut PlanBuilder<'_>, table: &str) -> Result<LogicalOperator> {
        let def = self
            .catalog
            .tables
            .get(table)
            .ok_or_else(|| DbError::new(format!("Table '{table}' doesn't exist")))?;
        let columns = def
            .columns
            .iter()
            .enumerate()
            .map(|(idx, (name, ty, _))| {
                let mut col = builder
                    .new_column(name.clone(), ty.clone())
                    .with_table(table)
                    .with_index(idx);
                col.db = Some(self.catalog.db.clone());
                col
            })
            .collect();
        Ok(LogicalOperator::DataSource(Node::new(
            LogicalDataSource {
                table: table.to_string(),
            },
            Schema::new(columns),
            Vec::new(),
        )))
    }

    fn build_select(
        &self,
        builder: &mut PlanBuilder<'_>,
        query: &SelectStmt,
    ) -> Result<LogicalOperator> {
        let mut plan = match &query.from {
            Some(table) => self.scan(builder, table)?,
            None => builder.build_table_dual(1),
        };

        if let Some(filter) = &query.where_clause {
            builder.cur_clause = Clause::WhereClause;
            let (cond, p) = rewrite(builder, filter, plan, false)?;
            plan = p;
            if let Some(cond) = cond {
                plan = builder.build_selection(plan, split_cnf_items(cond));
            }
        }

        let has_agg = query
            .fields
            .iter()
            .any(|f| matches!(f.expr, ExprNode::Aggregate { .. }));
        let mut agg_map = HashMap::new();
        if has_agg || !query.group_by.is_empty() {
            builder.cur_clause = Clause::GroupBy;
            let mut group_by = Vec::new();
            for item in &query.group_by {
                let (expr, p) = rewrite(builder, item, plan, true)?;
                plan = p;
                group_by.push(expr.required("group by item")?);
            }
            builder.cur_clause = Clause::FieldList;
            let mut aggs = Vec::new();
            for field in &query.fields {
                let ExprNode::Aggregate { id, name, args } = &field.expr else {
                    continue;
                };
                let kind = AggKind::from_name(name)
                    .ok_or_else(|| DbError::new(format!("Unknown aggregate '{name}'")))?;
                let mut rewritten = Vec::with_capacity(args.len());
                for arg in args {
                    let (expr, p) = rewrite(builder, arg, plan, true)?;
                    plan = p;
                    rewritten.push(expr.required("aggregate argument")?);
                }
                agg_map.insert(*id, aggs.len());
                aggs.push((name.as_str(), AggFuncDesc::new(kind, rewritten, false)?));
            }
            let mut agg_plan = builder.build_aggregation(plan, aggs, group_by.clone());
            // Grouping columns stay visible above the aggregation.
            if let LogicalOperator::Aggregation(node) = &mut agg_plan {
                for item in group_by {
                    if let Expression::Column(col) = &item {
                        node.node.agg_funcs.push(AggFuncDesc::new(
                            AggKind::FirstRow,
                            vec![item.clone()],
                            false,
                        )?);
                        node.schema.append(col.clone());
                    }
                }
            }
            plan = agg_plan;
        }

        builder.cur_clause = Clause::FieldList;
        let maps = RewriteMaps {
            aggregates: Some(&agg_map),
            windows: None,
        };
        let mut exprs = Vec::with_capacity(query.fields.len());
        let mut columns = Vec::with_capacity(query.fields.len());
        for field in &query.fields {
            let (expr, p) = rewrite_with_maps(builder, &field.expr, plan, maps, true)?;
            plan = p;
            let expr = expr.required("select field")?;
            let col = match (&expr, &field.alias) {
                (Expression::Column(col), None) => col.clone(),
                (_, alias) => {
                    let name = alias.clone().unwrap_or_else(|| expr.to_string());
                    builder.new_column(name, expr.ret_type().clone())
                }
            };
            exprs.push(expr);
            columns.push(col);
        }
        let len = columns.len();
        plan = builder.build_projection(plan, exprs, Schema::new(columns));

        if query.distinct {
            plan = builder.build_distinct(plan, len)?;
        }

        if !query.order_by.is_empty() {
            builder.cur_clause = Clause::OrderBy;
            let mut by = Vec::with_capacity(query.order_by.len());
            for item in &query.order_by {
                let (expr, p) = rewrite(builder, item, plan, true)?;
                plan = p;
                by.push(ByItem {
                    expr: expr.required("order by item")?,
                    desc: false,
                });
            }
            let schema = plan.schema().clone();
            plan = LogicalOperator::Sort(Node::new(LogicalSort { by }, schema, vec![plan]));
        }

        if let Some(count) = query.limit {
            let schema = plan.schema().clone();
            plan = LogicalOperator::Limit(Node::new(
                LogicalLimit { offset: 0, count },
                schema,
                vec![plan],
            ));
        }

        builder.cur_clause = Clause::FieldList;
        Ok(plan)
    }
}

impl SubqueryBuilder for MockPlanner<'_> {
    fn build_result_set_node(
        &self,
        builder: &mut PlanBuilder<'_>,
        query: &SelectStmt,
    ) -> Result<LogicalOperator> {
        // Clause tracking belongs to the enclosing query.
        let clause = builder.cur_clause;
        let result = self.build_select(builder, query);
        builder.cur_clause = clause;
        result
    }

    fn optimize(&self, _flags: OptFlags, plan: LogicalOperator) -> Result<LogicalOperator> {
        Ok(plan)
    }

    fn eval_subquery(&self, ctx: &EvalContext, plan: &LogicalOperator) -> Result<Vec<Vec<Datum>>> {
        execute(plan, self.catalog, ctx)
    }

    fn column_default(&self, db: &str, table: &str, column: &str) -> Result<ColumnDefault> {
        if db != self.catalog.db {
            return Err(DbError::new(format!("Unknown database '{db}'")));
        }
        let def = self
            .catalog
            .tables
            .get(table)
            .ok_or_else(|| DbError::new(format!("Table '{db}.{table}' doesn't exist")))?;
        def.columns
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, _, default)| default.clone())
            .ok_or_else(|| DbError::unknown_column(column, "field list"))
    }
}

/// Catalog plus session state for running queries.
#[derive(Debug)]
pub struct TestDb {
    pub catalog: Catalog,
    pub session: SessionConfig,
    pub vars: InMemoryVariables,
}

impl TestDb {
    pub fn new(catalog: Catalog) -> Self {
        logutil::init_test();
        let session = SessionConfig {
            current_db: catalog.db.clone(),
            ..Default::default()
        };
        TestDb {
            catalog,
            session,
            vars: InMemoryVariables::new(),
        }
    }

    pub fn plan(&self, query: &SelectStmt) -> Result<LogicalOperator> {
        let planner = MockPlanner {
            catalog: &self.catalog,
        };
        let mut builder = PlanBuilder::new(&self.session, &self.vars, &planner);
        planner.build_result_set_node(&mut builder, query)
    }

    pub fn query(&self, query: &SelectStmt) -> Result<Vec<Vec<Datum>>> {
        let planner = MockPlanner {
            catalog: &self.catalog,
        };
        let mut builder = PlanBuilder::new(&self.session, &self.vars, &planner);
        let plan = planner.build_result_set_node(&mut builder, query)?;
        execute(&plan, &self.catalog, &builder.eval_context())
    }

    /// Single column of a query's output.
    pub fn query_column(&self, query: &SelectStmt) -> Result<Vec<Datum>> {
        Ok(self
            .query(query)?
            .into_iter()
            .map(|mut row| row.swap_remove(0))
            .collect())
    }

    pub fn eval(&self, expr: &ExprNode) -> Result<Datum> {
        let planner = MockPlanner {
            catalog: &self.catalog,
        };
        let mut builder = PlanBuilder::new(&self.session, &self.vars, &planner);
        eval_ast_expr(&mut builder, expr)
    }
}

pub fn select(fields: Vec<ExprNode>) -> SelectStmt {
    SelectStmt {
        fields: fields
            .into_iter()
            .map(|expr| SelectField { expr, alias: None })
            .collect(),
        ..Default::default()
    }
}

pub fn select_from(fields: Vec<ExprNode>, table: &str) -> SelectStmt {
    SelectStmt {
        from: Some(table.to_string()),
        ..select(fields)
    }
}

pub fn select_where(fields: Vec<ExprNode>, table: &str, filter: ExprNode) -> SelectStmt {
    SelectStmt {
        where_clause: Some(filter),
        ..select_from(fields, table)
    }
}

pub fn agg(id: u32, name: &str, args: Vec<ExprNode>) -> ExprNode {
    ExprNode::Aggregate {
        id: NodeId(id),
        name: name.to_string(),
        args,
    }
}

pub fn scalar(query: SelectStmt) -> ExprNode {
    ExprNode::Subquery(subquery(query))
}

pub fn quantified(left: ExprNode, op: BinaryOp, query: SelectStmt, all: bool) -> ExprNode {
    ExprNode::CompareSubquery {
        left: Box::new(left),
        op,
        right: Box::new(scalar(query)),
        all,
    }
}

pub fn exists(query: SelectStmt, not: bool) -> ExprNode {
    ExprNode::Exists {
        sel: Box::new(scalar(query)),
        not,
    }
}

pub fn in_subquery(left: ExprNode, query: SelectStmt, not: bool) -> ExprNode {
    ExprNode::In {
        expr: Box::new(left),
        list: Vec::new(),
        sel: Some(subquery(query)),
        not,
    }
}

pub fn in_list(left: ExprNode, list: Vec<ExprNode>, not: bool) -> ExprNode {
    ExprNode::In {
        expr: Box::new(left),
        list,
        sel: None,
        not,
    }
}

/// Run a plan to completion.
pub fn execute(plan: &LogicalOperator, catalog: &Catalog, ctx: &EvalContext) -> Result<Vec<Vec<Datum>>> {
    match plan {
        LogicalOperator::Invalid => Err(DbError::new("Cannot execute invalid operator")),
        LogicalOperator::TableDual(node) => Ok(vec![Vec::new(); node.node.row_count]),
        LogicalOperator::DataSource(node) => Ok(catalog
            .tables
            .get(&node.node.table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()),
        LogicalOperator::Selection(node) => {
            let child = node.get_one_child_exact()?;
            let mut out = Vec::new();
            for row in execute(child, catalog, ctx)? {
                let src = SchemaRow {
                    schema: child.schema(),
                    values: &row,
                };
                let mut keep = true;
                for cond in &node.node.conditions {
                    if cond.eval_bool(ctx, &src)? != Some(true) {
                        keep = false;
                        break;
                    }
                }
                if keep {
                    out.push(row);
                }
            }
            Ok(out)
        }
        LogicalOperator::Projection(node) => {
            let child = node.get_one_child_exact()?;
            let mut out = Vec::new();
            for row in execute(child, catalog, ctx)? {
                let src = SchemaRow {
                    schema: child.schema(),
                    values: &row,
                };
                let values = node
                    .node
                    .exprs
                    .iter()
                    .map(|e| e.eval(ctx, &src))
                    .collect::<Result<Vec<_>>>()?;
                out.push(values);
            }
            Ok(out)
        }
        LogicalOperator::Aggregation(node) => {
            let child = node.get_one_child_exact()?;
            let rows = execute(child, catalog, ctx)?;
            let schema = child.schema();

            let mut groups: Vec<(Vec<Datum>, Vec<Vec<Datum>>)> = Vec::new();
            if node.node.group_by.is_empty() {
                groups.push((Vec::new(), rows));
            } else {
                for row in rows {
                    let src = SchemaRow {
                        schema,
                        values: &row,
                    };
                    let key = node
                        .node
                        .group_by
                        .iter()
                        .map(|e| e.eval(ctx, &src))
                        .collect::<Result<Vec<_>>>()?;
                    let mut found = None;
                    for (idx, (k, _)) in groups.iter().enumerate() {
                        if datums_equal(k, &key)? {
                            found = Some(idx);
                            break;
                        }
                    }
                    match found {
                        Some(idx) => groups[idx].1.push(row),
                        None => groups.push((key, vec![row])),
                    }
                }
            }

            let mut out = Vec::with_capacity(groups.len());
            for (_, rows) in groups {
                let mut values = Vec::with_capacity(node.node.agg_funcs.len());
                for agg in &node.node.agg_funcs {
                    values.push(eval_agg(agg, schema, &rows, ctx)?);
                }
                out.push(values);
            }
            Ok(out)
        }
        LogicalOperator::Join(node) => {
            let left = node.get_nth_child(0)?;
            let right = node.get_nth_child(1)?;
            let right_rows = execute(right, catalog, ctx)?;
            let mut out = Vec::new();
            for row in execute(left, catalog, ctx)? {
                join_one(
                    node.node.join_type,
                    &node.node.conditions,
                    left.schema(),
                    right.schema(),
                    row,
                    &right_rows,
                    ctx,
                    &mut out,
                )?;
            }
            Ok(out)
        }
        LogicalOperator::Apply(node) => {
            let outer = node.get_nth_child(0)?;
            let inner = node.get_nth_child(1)?;
            let mut out = Vec::new();
            for row in execute(outer, catalog, ctx)? {
                for corr in &node.node.correlated_columns {
                    let idx = outer
                        .schema()
                        .column_index(corr.column.unique_id)
                        .ok_or_else(|| DbError::new("Correlated column not in outer schema"))?;
                    corr.set(row[idx].clone());
                }
                let inner_rows = execute(inner, catalog, ctx)?;
                join_one(
                    node.node.join.join_type,
                    &node.node.join.conditions,
                    outer.schema(),
                    inner.schema(),
                    row,
                    &inner_rows,
                    ctx,
                    &mut out,
                )?;
            }
            Ok(out)
        }
        LogicalOperator::MaxOneRow(node) => {
            let child = node.get_one_child_exact()?;
            let rows = execute(child, catalog, ctx)?;
            match rows.len() {
                0 => Ok(vec![vec![Datum::Null; child.schema().len()]]),
                1 => Ok(rows),
                _ => Err(DbError::new("Subquery returns more than 1 row")),
            }
        }
        LogicalOperator::Sort(node) => {
            let child = node.get_one_child_exact()?;
            let mut keyed = Vec::new();
            for row in execute(child, catalog, ctx)? {
                let src = SchemaRow {
                    schema: child.schema(),
                    values: &row,
                };
                let key = node
                    .node
                    .by
                    .iter()
                    .map(|item| item.expr.eval(ctx, &src))
                    .collect::<Result<Vec<_>>>()?;
                keyed.push((key, row));
            }
            keyed.sort_by(|(a, _), (b, _)| {
                a.iter()
                    .zip(b)
                    .map(|(a, b)| a.compare(b).unwrap_or(Ordering::Equal))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
            Ok(keyed.into_iter().map(|(_, row)| row).collect())
        }
        LogicalOperator::Limit(node) => {
            let child = node.get_one_child_exact()?;
            Ok(execute(child, catalog, ctx)?
                .into_iter()
                .skip(node.node.offset as usize)
                .take(node.node.count as usize)
                .collect())
        }
        LogicalOperator::UnionAll(node) => {
            let mut out = Vec::new();
            for child in &node.children {
                out.extend(execute(child, catalog, ctx)?);
            }
            Ok(out)
        }
    }
}

fn datums_equal(a: &[Datum], b: &[Datum]) -> Result<bool> {
    for (a, b) in a.iter().zip(b) {
        if a.compare(b)? != Ordering::Equal {
            return Ok(false);
        }
    }
    Ok(a.len() == b.len())
}

fn eval_agg(agg: &AggFuncDesc, schema: &Schema, rows: &[Vec<Datum>], ctx: &EvalContext) -> Result<Datum> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let src = SchemaRow {
            schema,
            values: row,
        };
        let mut any_null = false;
        let mut first = Datum::Null;
        for (idx, arg) in agg.args.iter().enumerate() {
            let v = arg.eval(ctx, &src)?;
            any_null |= v.is_null();
            if idx == 0 {
                first = v;
            }
        }
        if agg.kind == AggKind::FirstRow || !any_null {
            values.push(first);
        }
    }

    if agg.distinct {
        let mut distinct: Vec<Datum> = Vec::new();
        for v in values {
            let mut seen = false;
            for d in &distinct {
                if d.compare(&v)? == Ordering::Equal {
                    seen = true;
                    break;
                }
            }
            if !seen {
                distinct.push(v);
            }
        }
        values = distinct;
    }

    Ok(match agg.kind {
        AggKind::Count => Datum::Int64(values.len() as i64),
        AggKind::FirstRow => values.into_iter().next().unwrap_or(Datum::Null),
        AggKind::Sum => {
            let mut iter = values.into_iter();
            let Some(first) = iter.next() else {
                return Ok(Datum::Null);
            };
            let mut sum = first.to_decimal()?;
            for v in iter {
                sum = sum
                    .checked_add(&v.to_decimal()?)
                    .ok_or_else(|| DbError::new("Sum overflow"))?;
            }
            Datum::Decimal(sum)
        }
        AggKind::Max | AggKind::Min => {
            let mut best: Option<Datum> = None;
            for v in values {
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let ord = v.compare(&b)?;
                        let better = if agg.kind == AggKind::Max {
                            ord.is_gt()
                        } else {
                            ord.is_lt()
                        };
                        if better { v } else { b }
                    }
                });
            }
            best.unwrap_or(Datum::Null)
        }
    })
}

/// Join one outer row against the inner rows.
#[allow(clippy::too_many_arguments)]
fn join_one(
    join_type: JoinType,
    conditions: &[Expression],
    outer_schema: &Schema,
    inner_schema: &Schema,
    outer_row: Vec<Datum>,
    inner_rows: &[Vec<Datum>],
    ctx: &EvalContext,
    out: &mut Vec<Vec<Datum>>,
) -> Result<()> {
    let schema = outer_schema.merge(inner_schema);
    let mut matched = false;
    let mut unknown = false;
    for inner_row in inner_rows {
        let mut combined = outer_row.clone();
        combined.extend(inner_row.iter().cloned());
        let src = SchemaRow {
            schema: &schema,
            values: &combined,
        };
        let mut result = Some(true);
        for cond in conditions {
            match cond.eval_bool(ctx, &src)? {
                Some(true) => (),
                Some(false) => {
                    result = Some(false);
                    break;
                }
                None => result = None,
            }
        }
        match result {
            Some(true) => {
                matched = true;
                if matches!(join_type, JoinType::Inner | JoinType::LeftOuter) {
                    out.push(combined);
                }
            }
            Some(false) => (),
            None => unknown = true,
        }
    }

    let flag = |hit: Datum, miss: Datum| {
        if matched {
            hit
        } else if unknown {
            Datum::Null
        } else {
            miss
        }
    };
    match join_type {
        JoinType::Inner => (),
        JoinType::LeftOuter => {
            if !matched {
                let mut row = outer_row;
                row.extend(std::iter::repeat_n(Datum::Null, inner_schema.len()));
                out.push(row);
            }
        }
        JoinType::Semi => {
            if matched {
                out.push(outer_row);
            }
        }
        JoinType::AntiSemi => {
            if !matched && !unknown {
                out.push(outer_row);
            }
        }
        JoinType::LeftOuterSemi => {
            let aux = flag(Datum::Int64(1), Datum::Int64(0));
            let mut row = outer_row;
            row.push(aux);
            out.push(row);
        }
        JoinType::AntiLeftOuterSemi => {
            let aux = flag(Datum::Int64(0), Datum::Int64(1));
            let mut row = outer_row;
            row.push(aux);
            out.push(row);
        }
        JoinType::RightOuter => return Err(DbError::new("Right outer join not supported here")),
    }
    Ok(())
}
