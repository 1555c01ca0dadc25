//! Rewrites AST expressions into typed [`Expression`]s, turning subqueries
//! into apply and join operators on the plan being built.
//!
//! The rewriter walks the AST with an explicit value stack: `enter` handles
//! nodes that consume their own children (aggregates, subqueries, mapped
//! columns), `leave` pops a node's operands and pushes its result.

mod operators;
mod subquery;

use std::collections::HashMap;

use tessera_error::{DbError, Result};
use tessera_types::Datum;

use crate::ast::{ExprNode, NodeId, Recurse, Visitor};
use crate::builder::{InsertPlan, PlanBuilder};
use crate::expr::eval::EmptyRow;
use crate::expr::function::{self, FuncName};
use crate::expr::{Expression, Schema};
use crate::logical::LogicalOperator;

/// Offsets into the current schema for aggregate and window calls that an
/// earlier planning step already produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteMaps<'r> {
    pub aggregates: Option<&'r HashMap<NodeId, usize>>,
    pub windows: Option<&'r HashMap<NodeId, usize>>,
}

/// Rewrite `expr` against `plan`.
///
/// Returns the rewritten expression along with the plan, which may have
/// gained apply or join operators for subqueries. When `as_scalar` is false
/// and the expression was fully absorbed into the plan (for example
/// `WHERE x IN (SELECT ...)` becoming a semi join), no expression is
/// returned.
pub fn rewrite(
    builder: &mut PlanBuilder<'_>,
    expr: &ExprNode,
    plan: LogicalOperator,
    as_scalar: bool,
) -> Result<(Option<Expression>, LogicalOperator)> {
    rewrite_with_maps(builder, expr, plan, RewriteMaps::default(), as_scalar)
}

pub fn rewrite_with_maps(
    builder: &mut PlanBuilder<'_>,
    expr: &ExprNode,
    plan: LogicalOperator,
    maps: RewriteMaps<'_>,
    as_scalar: bool,
) -> Result<(Option<Expression>, LogicalOperator)> {
    let rewriter = ExpressionRewriter::new(builder, plan, maps, None, as_scalar);
    rewriter.run(expr, as_scalar)
}

/// Rewrite an assignment of `INSERT ... ON DUPLICATE KEY UPDATE`, where
/// `VALUES(col)` refers to the insert target's columns.
pub fn rewrite_insert_on_duplicate_update(
    builder: &mut PlanBuilder<'_>,
    expr: &ExprNode,
    mock_plan: LogicalOperator,
    insert_plan: &InsertPlan,
) -> Result<Expression> {
    let rewriter = ExpressionRewriter::new(
        builder,
        mock_plan,
        RewriteMaps::default(),
        Some(insert_plan),
        true,
    );
    let (expr, _) = rewriter.run(expr, true)?;
    expr.ok_or_else(|| DbError::new("Rewrite produced no expression"))
}

/// Evaluate a standalone expression such as a `SET` value or a `LIMIT`
/// argument.
pub fn eval_ast_expr(builder: &mut PlanBuilder<'_>, expr: &ExprNode) -> Result<Datum> {
    let dual = builder.build_table_dual(1);
    let (rewritten, _) = rewrite(builder, expr, dual, true)?;
    let rewritten = rewritten.ok_or_else(|| DbError::new("Rewrite produced no expression"))?;
    rewritten.eval(&builder.eval_context(), &EmptyRow)
}

pub(crate) struct ExpressionRewriter<'r, 'a> {
    builder: &'r mut PlanBuilder<'a>,
    stack: Vec<Expression>,
    /// Plan being extended with subquery operators.
    plan: LogicalOperator,
    /// Schema of the plan as it was when the rewrite started. Column
    /// references resolve against this, not against columns added for
    /// subqueries.
    schema: Schema,
    maps: RewriteMaps<'r>,
    insert_plan: Option<&'r InsertPlan>,
    /// Whether the value of the expression being visited is needed, as
    /// opposed to only filtering rows.
    as_scalar: bool,
    disable_fold_counter: usize,
}

impl<'r, 'a> ExpressionRewriter<'r, 'a> {
    fn new(
        builder: &'r mut PlanBuilder<'a>,
        plan: LogicalOperator,
        maps: RewriteMaps<'r>,
        insert_plan: Option<&'r InsertPlan>,
        as_scalar: bool,
    ) -> Self {
        let stack = builder.take_stack();
        let schema = plan.schema().clone();
        ExpressionRewriter {
            builder,
            stack,
            plan,
            schema,
            maps,
            insert_plan,
            as_scalar,
            disable_fold_counter: 0,
        }
    }

    fn run(
        mut self,
        expr: &ExprNode,
        as_scalar: bool,
    ) -> Result<(Option<Expression>, LogicalOperator)> {
        expr.accept(&mut self)?;

        let ExpressionRewriter {
            builder,
            mut stack,
            plan,
            ..
        } = self;

        if !as_scalar && stack.is_empty() {
            builder.return_stack(stack);
            return Ok((None, plan));
        }
        if stack.len() != 1 {
            return Err(DbError::new(format!(
                "context len {} is invalid",
                stack.len()
            )));
        }
        let result = stack.pop().ok_or_else(|| DbError::new("Empty expression stack"))?;
        builder.return_stack(stack);
        result.check_not_multi_column_row()?;
        Ok((Some(result), plan))
    }

    fn push(&mut self, expr: Expression) {
        self.stack.push(expr);
    }

    fn pop(&mut self) -> Result<Expression> {
        self.stack
            .pop()
            .ok_or_else(|| DbError::new("Expression stack underflow"))
    }

    /// Pop the top `n` expressions, in push order.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Expression>> {
        if self.stack.len() < n {
            return Err(DbError::new(format!(
                "Expression stack underflow, need {n}, have {}",
                self.stack.len()
            )));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn top(&self) -> Result<&Expression> {
        self.stack
            .last()
            .ok_or_else(|| DbError::new("Expression stack underflow"))
    }

    fn set_top(&mut self, expr: Expression) -> Result<()> {
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| DbError::new("Expression stack underflow"))?;
        *top = expr;
        Ok(())
    }

    /// Build a function, skipping constant folding while inside a function
    /// that must observe every evaluation of its arguments.
    fn new_function(
        &self,
        name: FuncName,
        ret_type: tessera_types::FieldType,
        args: Vec<Expression>,
    ) -> Result<Expression> {
        if self.disable_fold_counter > 0 {
            function::new_function_base(name, ret_type, args)
        } else {
            function::new_function(name, ret_type, args)
        }
    }

    fn new_function_inferred(&self, name: FuncName, args: Vec<Expression>) -> Result<Expression> {
        let ret_type = function::infer_return_type(name, &args);
        self.new_function(name, ret_type, args)
    }

    fn schema_column(&self, idx: usize) -> Result<Expression> {
        self.schema
            .columns
            .get(idx)
            .cloned()
            .map(Expression::Column)
            .ok_or_else(|| {
                DbError::new(format!(
                    "Column offset {idx} out of range for schema of {} columns",
                    self.schema.len()
                ))
            })
    }

    /// Last output column of the current plan. Subquery rewrites that need a
    /// scalar result leave it there.
    fn last_plan_column(&self) -> Result<Expression> {
        self.plan
            .schema()
            .last()
            .cloned()
            .map(Expression::Column)
            .ok_or_else(|| DbError::new("Plan has no output columns"))
    }
}

impl Visitor for ExpressionRewriter<'_, '_> {
    fn enter(&mut self, node: &ExprNode) -> Result<Recurse> {
        match node {
            ExprNode::Aggregate { id, .. } => {
                let idx = self
                    .maps
                    .aggregates
                    .and_then(|m| m.get(id))
                    .copied()
                    .ok_or_else(DbError::invalid_group_func_use)?;
                let col = self.schema_column(idx)?;
                self.push(col);
                Ok(Recurse::Skip)
            }
            ExprNode::Window { id, name } => {
                let idx = self
                    .maps
                    .windows
                    .and_then(|m| m.get(id))
                    .copied()
                    .ok_or_else(|| {
                        DbError::with_kind(
                            tessera_error::ErrorKind::InvalidWindowFuncUse,
                            format!("You cannot use the window function '{name}' in this context"),
                        )
                    })?;
                let col = self.schema_column(idx)?;
                self.push(col);
                Ok(Recurse::Skip)
            }
            ExprNode::Column { id, .. } => {
                if let Some(idx) = self.builder.col_mapper.get(id).copied() {
                    let col = self.schema_column(idx)?;
                    self.push(col);
                    return Ok(Recurse::Skip);
                }
                Ok(Recurse::Children)
            }
            ExprNode::CompareSubquery {
                left,
                op,
                right,
                all,
            } => {
                self.handle_compare_subquery(left, *op, right, *all)?;
                Ok(Recurse::Skip)
            }
            ExprNode::Exists { sel, not } => {
                self.handle_exists_subquery(sel, *not)?;
                Ok(Recurse::Skip)
            }
            ExprNode::In { expr, not, .. } => match node.in_subquery() {
                Some(subq) => {
                    self.handle_in_subquery(expr, subq, *not)?;
                    Ok(Recurse::Skip)
                }
                None => Ok(Recurse::Children),
            },
            ExprNode::Subquery(subq) => {
                self.handle_scalar_subquery(subq)?;
                Ok(Recurse::Skip)
            }
            ExprNode::Values { column } => {
                self.handle_values(column)?;
                Ok(Recurse::Skip)
            }
            ExprNode::FuncCall { name, .. } => {
                if FuncName::from_name(name).is_some_and(|f| f.disables_folding()) {
                    self.disable_fold_counter += 1;
                }
                Ok(Recurse::Children)
            }
            ExprNode::Parentheses(_) => Ok(Recurse::Children),
            _ => {
                self.as_scalar = true;
                Ok(Recurse::Children)
            }
        }
    }

    fn leave(&mut self, node: &ExprNode) -> Result<()> {
        match node {
            ExprNode::Aggregate { .. }
            | ExprNode::Window { .. }
            | ExprNode::Parentheses(_)
            | ExprNode::Subquery(_)
            | ExprNode::Exists { .. }
            | ExprNode::CompareSubquery { .. }
            | ExprNode::Values { .. } => Ok(()),
            ExprNode::Column { id, name } => {
                if self.builder.col_mapper.contains_key(id) {
                    return Ok(());
                }
                self.to_column(name)
            }
            ExprNode::Value { value, ty } => {
                self.push(crate::expr::eval::constant(value.clone(), ty.clone()));
                Ok(())
            }
            ExprNode::ParamMarker { order } => self.param_marker(*order),
            ExprNode::Variable(var) => self.rewrite_variable(var),
            ExprNode::FuncCall { name, args } => {
                let res = self.func_call_to_expression(name, args.len());
                if FuncName::from_name(name).is_some_and(|f| f.disables_folding()) {
                    self.disable_fold_counter = self.disable_fold_counter.saturating_sub(1);
                }
                res
            }
            ExprNode::Unary { op, .. } => self.unary_op_to_expression(*op),
            ExprNode::Binary { op, .. } => self.binary_op_to_expression(*op),
            ExprNode::Between { not, .. } => self.between_to_expression(*not),
            ExprNode::Case {
                value,
                whens,
                else_clause,
            } => self.case_to_expression(value.is_some(), whens.len(), else_clause.is_some()),
            ExprNode::Cast { target, .. } => self.cast_to_expression(target),
            ExprNode::Like { escape, not, .. } => self.like_to_expression(*escape, *not),
            ExprNode::Regexp { not, .. } => self.regexp_to_expression(*not),
            ExprNode::Row(values) => self.row_to_expression(values.len()),
            ExprNode::In { list, not, .. } => {
                if node.in_subquery().is_some() {
                    return Ok(());
                }
                self.in_to_expression(list.len(), *not)
            }
            ExprNode::Position { n, param } => self.position_to_column(*n, param.is_some()),
            ExprNode::IsNull { not, .. } => self.is_null_to_expression(*not),
            ExprNode::IsTruth { truth, not, .. } => self.is_truth_to_expression(*truth, *not),
            ExprNode::Default { name } => self.eval_default_expr(name.as_ref()),
        }
    }
}
