use tessera_error::{DbError, Result};
use tessera_types::{Datum, FieldType, MysqlType};
use tracing::debug;

use super::ExpressionRewriter;
use super::operators::comparison_func_name;
use crate::ast::{BinaryOp, ExprNode, SubqueryExpr};
use crate::builder::OptFlags;
use crate::expr::eval::constant;
use crate::expr::function::{FuncName, new_function};
use crate::expr::{
    Column,
    Expression,
    Schema,
    bool_type,
    compose_cnf,
    compose_dnf,
    null,
    one,
    split_cnf_items,
    zero,
};
use crate::logical::LogicalOperator;
use crate::logical::logical_aggregate::{AggFuncDesc, AggKind};
use crate::logical::logical_join::JoinType;
use crate::logical::logical_scan::LogicalTableDual;
use crate::logical::Node;

/// Mark the inner side of an `IN`-like comparison so a NULL match isn't
/// treated as a plain miss, unless both sides are NOT NULL columns.
fn mark_in_operand(lexpr: &Expression, rexpr: &mut Expression) {
    let Expression::Column(r_col) = rexpr else {
        return;
    };
    let both_not_null = r_col.ret_type.has_not_null_flag()
        && lexpr
            .as_column()
            .is_some_and(|l| l.ret_type.has_not_null_flag());
    r_col.in_operand = !both_not_null;
}

impl ExpressionRewriter<'_, '_> {
    /// Plan a subquery body with the current schema visible as an outer
    /// scope.
    fn build_subquery(&mut self, subq: &SubqueryExpr) -> Result<LogicalOperator> {
        self.builder.outer_schemas.push(self.schema.clone());
        let subquery_builder = self.builder.subquery_builder();
        let result = subquery_builder.build_result_set_node(self.builder, &subq.query);
        self.builder.outer_schemas.pop();
        result
    }

    fn subquery_of<'n>(&self, node: &'n ExprNode, what: &str) -> Result<&'n SubqueryExpr> {
        match node {
            ExprNode::Subquery(subq) => Ok(subq),
            ExprNode::Parentheses(inner) => self.subquery_of(inner, what),
            other => Err(DbError::new(format!("Unknown {what} type {other:?}"))),
        }
    }

    /// The subquery's output as a single expression: its only column, or a
    /// row of all of them.
    fn subquery_output(&self, schema: &Schema) -> Result<Expression> {
        match schema.columns.as_slice() {
            [] => Err(DbError::new("Subquery has no output columns")),
            [only] => Ok(Expression::Column(only.clone())),
            cols => {
                let args: Vec<Expression> = cols.iter().cloned().map(Expression::Column).collect();
                let ret_type = args[0].ret_type().clone();
                self.new_function(FuncName::Row, ret_type, args)
            }
        }
    }

    /// Run an uncorrelated subquery now.
    fn eval_subquery(&mut self, plan: LogicalOperator) -> Result<Vec<Vec<Datum>>> {
        let subquery_builder = self.builder.subquery_builder();
        let plan = subquery_builder.optimize(self.builder.opt_flags, plan)?;
        subquery_builder.eval_subquery(&self.builder.eval_context(), &plan)
    }

    pub(super) fn handle_compare_subquery(
        &mut self,
        left: &ExprNode,
        op: BinaryOp,
        right: &ExprNode,
        all: bool,
    ) -> Result<()> {
        // The left operand is always a value. Whether the comparison result
        // is needed is decided by the enclosing context.
        let as_scalar = self.as_scalar;
        self.as_scalar = true;
        left.accept(self)?;
        self.as_scalar = as_scalar;

        let lexpr = self.top()?.clone();
        let subq = self.subquery_of(right, "compare")?;
        let np = self.build_subquery(subq)?;

        // Only (a, b) = ANY (...) and (a, b) != ALL (...) take rows.
        let can_multi_col = (!all && op == BinaryOp::Eq) || (all && op == BinaryOp::NotEq);
        if !can_multi_col && (lexpr.row_len() != 1 || np.schema().len() != 1) {
            return Err(DbError::operand_columns(1));
        }
        let l_len = lexpr.row_len();
        if l_len != np.schema().len() {
            return Err(DbError::operand_columns(l_len));
        }
        let rexpr = self.subquery_output(np.schema())?;

        match (op, all) {
            // `a = ANY (subq)` is `a IN (subq)`.
            (BinaryOp::Eq, false) => self.build_semi_apply_from_equal_subq(np, lexpr, rexpr, false)?,
            (BinaryOp::Eq, true) => self.handle_eq_all(lexpr, rexpr, np)?,
            // `a != ALL (subq)` is `a NOT IN (subq)`.
            (BinaryOp::NotEq, true) => self.build_semi_apply_from_equal_subq(np, lexpr, rexpr, true)?,
            (BinaryOp::NotEq, false) => self.handle_ne_any(lexpr, rexpr, np)?,
            (BinaryOp::NullEq, _) => {
                return Err(DbError::unsupported("We don't support <=> all or <=> any now"));
            }
            _ => {
                // `< ALL` and `> ANY` compare against the minimum, the rest
                // against the maximum.
                let use_min = (matches!(op, BinaryOp::Lt | BinaryOp::LtEq) && all)
                    || (matches!(op, BinaryOp::Gt | BinaryOp::GtEq) && !all);
                let cmp = comparison_func_name(op)?;
                self.handle_other_comparable_subq(lexpr, rexpr, np, use_min, cmp, all)?;
            }
        }

        if self.as_scalar {
            // The match result is the last column of the rewritten plan.
            let col = self.last_plan_column()?;
            self.set_top(col)?;
        } else {
            self.pop()?;
        }
        Ok(())
    }

    fn build_semi_apply_from_equal_subq(
        &mut self,
        np: LogicalOperator,
        lexpr: Expression,
        mut rexpr: Expression,
        not: bool,
    ) -> Result<()> {
        if self.as_scalar || not {
            mark_in_operand(&lexpr, &mut rexpr);
        }
        let cond = self.construct_binary_op_function(lexpr, rexpr, FuncName::Eq)?;
        let outer = self.plan.take();
        self.plan = self
            .builder
            .build_semi_apply(outer, np, vec![cond], self.as_scalar, not)?;
        Ok(())
    }

    /// `a < ANY (subq)` becomes `a < max(subq)` with NULL and empty-set
    /// handling.
    fn handle_other_comparable_subq(
        &mut self,
        lexpr: Expression,
        rexpr: Expression,
        np: LogicalOperator,
        use_min: bool,
        cmp: FuncName,
        all: bool,
    ) -> Result<()> {
        let kind = if use_min { AggKind::Min } else { AggKind::Max };
        let agg = AggFuncDesc::new(kind, vec![rexpr.clone()], false)?;
        let agg_plan = self.builder.build_aggregation(np, vec![("agg_col_0", agg)], Vec::new());
        let agg_col = agg_plan
            .schema()
            .last()
            .cloned()
            .ok_or_else(|| DbError::new("Missing aggregate column"))?;

        let cond = new_function(cmp, bool_type(), vec![lexpr.clone(), agg_col.into()])?;
        self.build_quantifier_plan(agg_plan, cond, lexpr, rexpr, all)
    }

    /// Wrap `cond` with checks for NULLs on either side and for an empty
    /// subquery, then attach the aggregate plan to the outer plan.
    fn build_quantifier_plan(
        &mut self,
        mut agg_plan: LogicalOperator,
        cond: Expression,
        lexpr: Expression,
        rexpr: Expression,
        all: bool,
    ) -> Result<()> {
        let inner_is_null = new_function(FuncName::IsNull, bool_type(), vec![rexpr])?;
        let outer_is_null = new_function(FuncName::IsNull, bool_type(), vec![lexpr])?;

        let sum = AggFuncDesc::new(AggKind::Sum, vec![inner_is_null], false)?;
        let count = AggFuncDesc::new(AggKind::Count, vec![one()], false)?;
        let sum_col = self.builder.new_column("agg_col_sum", sum.ret_type.clone());
        let count_col = self.builder.new_column("agg_col_cnt", count.ret_type.clone());
        let LogicalOperator::Aggregation(agg) = &mut agg_plan else {
            return Err(DbError::new("Quantified comparison expects an aggregation"));
        };
        agg.node.agg_funcs.push(sum);
        agg.node.agg_funcs.push(count);
        agg.schema.append(sum_col.clone());
        agg.schema.append(count_col.clone());

        let inner_has_null = new_function(FuncName::Ne, bool_type(), vec![sum_col.into(), zero()])?;
        let cond = if all {
            // Any NULL in the subquery makes a passing comparison unknown.
            let inner_null_check =
                new_function(FuncName::If, bool_type(), vec![inner_has_null, null(), one()])?;
            let cond = compose_cnf(vec![cond, inner_null_check])?;
            // Empty subquery is true. NULL on the left of a non-empty
            // subquery is unknown.
            let empty_check =
                new_function(FuncName::Eq, bool_type(), vec![count_col.into(), zero()])?;
            let outer_null_check =
                new_function(FuncName::If, bool_type(), vec![outer_is_null, null(), zero()])?;
            compose_dnf(vec![cond, empty_check, outer_null_check])?
        } else {
            // Any NULL in the subquery makes a failing comparison unknown.
            let inner_null_check =
                new_function(FuncName::If, bool_type(), vec![inner_has_null, null(), zero()])?;
            let cond = compose_dnf(vec![cond, inner_null_check])?;
            // Empty subquery is false.
            let empty_check =
                new_function(FuncName::Ne, bool_type(), vec![count_col.into(), zero()])?;
            let outer_null_check =
                new_function(FuncName::If, bool_type(), vec![outer_is_null, null(), one()])?;
            compose_cnf(vec![cond, empty_check, outer_null_check])?
        };

        let outer = self.plan.take();
        if !self.as_scalar {
            // FALSE and NULL both reject the row, so the condition can sit
            // on the semi join directly.
            self.plan = self
                .builder
                .build_semi_apply(outer, agg_plan, vec![cond], false, false)?;
            return Ok(());
        }

        // Keep the outer columns and append the condition as a value.
        let outer_len = outer.schema().len();
        let apply = self
            .builder
            .build_apply_with_join_type(outer, agg_plan, JoinType::Inner);
        let outer_cols: Vec<Column> = apply.schema().columns[..outer_len].to_vec();
        let mut exprs: Vec<Expression> = outer_cols.iter().cloned().map(Expression::Column).collect();
        let mut aux = self.builder.new_column("aux_col", cond.ret_type().clone());
        aux.is_referenced = true;
        exprs.push(cond);
        let mut schema = Schema::new(outer_cols);
        schema.append(aux);
        self.plan = self.builder.build_projection(apply, exprs, schema);
        Ok(())
    }

    /// `a != ANY (subq)` holds if the subquery has two distinct values or its
    /// only value differs from `a`.
    fn handle_ne_any(&mut self, lexpr: Expression, rexpr: Expression, np: LogicalOperator) -> Result<()> {
        let first_row = AggFuncDesc::new(AggKind::FirstRow, vec![rexpr.clone()], false)?;
        let count = AggFuncDesc::new(AggKind::Count, vec![rexpr.clone()], true)?;
        let agg_plan = self.builder.build_aggregation(
            np,
            vec![("col_firstRow", first_row), ("col_count", count)],
            Vec::new(),
        );
        let [first_row_col, count_col] = agg_cols(&agg_plan)?;

        let gt = new_function(FuncName::Gt, bool_type(), vec![count_col.into(), one()])?;
        let ne = new_function(FuncName::Ne, bool_type(), vec![lexpr.clone(), first_row_col.into()])?;
        let cond = compose_dnf(vec![gt, ne])?;
        self.build_quantifier_plan(agg_plan, cond, lexpr, rexpr, false)
    }

    /// `a = ALL (subq)` holds if the subquery has at most one distinct value
    /// and it equals `a`.
    fn handle_eq_all(&mut self, lexpr: Expression, rexpr: Expression, np: LogicalOperator) -> Result<()> {
        let first_row = AggFuncDesc::new(AggKind::FirstRow, vec![rexpr.clone()], false)?;
        let count = AggFuncDesc::new(AggKind::Count, vec![rexpr.clone()], true)?;
        let agg_plan = self.builder.build_aggregation(
            np,
            vec![("col_firstRow", first_row), ("col_count", count)],
            Vec::new(),
        );
        let [first_row_col, count_col] = agg_cols(&agg_plan)?;

        let le = new_function(FuncName::Le, bool_type(), vec![count_col.into(), one()])?;
        let eq = new_function(FuncName::Eq, bool_type(), vec![lexpr.clone(), first_row_col.into()])?;
        let cond = compose_cnf(vec![le, eq])?;
        self.build_quantifier_plan(agg_plan, cond, lexpr, rexpr, true)
    }

    pub(super) fn handle_exists_subquery(&mut self, sel: &ExprNode, not: bool) -> Result<()> {
        let subq = self.subquery_of(sel, "exists")?;
        let np = self.build_subquery(subq)?;
        let np = pop_exists_sub_plan(np)?;

        if !np.extract_correlated_columns().is_empty() {
            let outer = self.plan.take();
            self.plan = self
                .builder
                .build_semi_apply(outer, np, Vec::new(), self.as_scalar, not)?;
            if self.as_scalar {
                let col = self.last_plan_column()?;
                self.push(col);
            }
            return Ok(());
        }

        let rows = self.eval_subquery(np)?;
        debug!(rows = rows.len(), not, "evaluated uncorrelated exists subquery");
        if rows.is_empty() == not {
            self.push(one());
        } else {
            self.push(zero());
        }
        Ok(())
    }

    pub(super) fn handle_in_subquery(
        &mut self,
        left: &ExprNode,
        subq: &SubqueryExpr,
        not: bool,
    ) -> Result<()> {
        let as_scalar = self.as_scalar;
        self.as_scalar = true;
        left.accept(self)?;
        self.as_scalar = as_scalar;

        let lexpr = self.top()?.clone();
        let np = self.build_subquery(subq)?;
        let l_len = lexpr.row_len();
        if l_len != np.schema().len() {
            return Err(DbError::operand_columns(l_len));
        }
        let mut rexpr = self.subquery_output(np.schema())?;
        // Anti and left outer semi joins can't treat a NULL match as a miss.
        if not || as_scalar {
            mark_in_operand(&lexpr, &mut rexpr);
        }
        let cond = self.construct_binary_op_function(lexpr, rexpr, FuncName::Eq)?;

        // Correlation with enclosing queries doesn't prevent the join since
        // those act as constants here.
        let correlated_here = !np
            .extract_correlated_columns_by_schema(self.plan.schema())
            .is_empty();
        let outer = self.plan.take();
        if self.builder.session.allow_in_subquery_to_join_and_agg
            && !not
            && !as_scalar
            && !correlated_here
        {
            self.builder.opt_flags |=
                OptFlags::ELIMINATE_AGG | OptFlags::ELIMINATE_PROJECTION | OptFlags::JOIN_REORDER;
            let inner_len = np.schema().len();
            let mut agg = self.builder.build_distinct(np, inner_len)?;
            if let Some(schema) = agg.schema_mut() {
                for col in &mut schema.columns {
                    col.is_referenced = true;
                }
            }
            debug!("rewriting IN subquery as inner join over distinct values");
            self.plan = self
                .builder
                .build_join(outer, agg, JoinType::Inner, split_cnf_items(cond));
        } else {
            self.plan = self.builder.build_semi_apply(
                outer,
                np,
                split_cnf_items(cond),
                as_scalar,
                not,
            )?;
        }

        if as_scalar {
            let col = self.last_plan_column()?;
            self.set_top(col)?;
        } else {
            self.pop()?;
        }
        Ok(())
    }

    pub(super) fn handle_scalar_subquery(&mut self, subq: &SubqueryExpr) -> Result<()> {
        let np = self.build_subquery(subq)?;
        let np = self.builder.build_max_one_row(np);
        let np_schema = np.schema().clone();

        if !np.extract_correlated_columns().is_empty() {
            let outer = self.plan.take();
            self.plan = self
                .builder
                .build_apply_with_join_type(outer, np, JoinType::LeftOuter);
            if np_schema.len() > 1 {
                let row = self.subquery_output(&np_schema)?;
                self.push(row);
            } else {
                let col = self.last_plan_column()?;
                self.push(col);
            }
            return Ok(());
        }

        let rows = self.eval_subquery(np)?;
        debug!(rows = rows.len(), "evaluated uncorrelated scalar subquery");
        // Empty input yields a NULL row.
        let row = rows.into_iter().next().unwrap_or_default();
        let mut values: Vec<Expression> = np_schema
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                constant(
                    row.get(idx).cloned().unwrap_or(Datum::Null),
                    col.ret_type.clone(),
                )
            })
            .collect();
        let expr = if values.len() > 1 {
            let ret_type = values[0].ret_type().clone();
            self.new_function(FuncName::Row, ret_type, values)?
        } else {
            values
                .pop()
                .unwrap_or_else(|| constant(Datum::Null, FieldType::new(MysqlType::Null)))
        };
        self.push(expr);
        Ok(())
    }
}

fn agg_cols(plan: &LogicalOperator) -> Result<[Column; 2]> {
    match plan.schema().columns.as_slice() {
        [a, b] => Ok([a.clone(), b.clone()]),
        other => Err(DbError::new(format!(
            "Expected two aggregate columns, got {}",
            other.len()
        ))),
    }
}

/// Strip operators that can't change whether an `EXISTS` subquery returns
/// rows.
fn pop_exists_sub_plan(mut plan: LogicalOperator) -> Result<LogicalOperator> {
    loop {
        plan = match plan {
            LogicalOperator::Projection(mut node) => node.take_one_child_exact()?,
            LogicalOperator::Sort(mut node) => node.take_one_child_exact()?,
            // An aggregate without grouping always returns one row.
            LogicalOperator::Aggregation(node) if node.node.group_by.is_empty() => {
                return Ok(LogicalOperator::TableDual(Node::new(
                    LogicalTableDual { row_count: 1 },
                    Schema::empty(),
                    Vec::new(),
                )));
            }
            LogicalOperator::Aggregation(mut node) => node.take_one_child_exact()?,
            other => return Ok(other),
        }
    }
}
