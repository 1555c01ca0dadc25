use std::fmt::{self, Write as _};

use tessera_error::{DbError, Result};

use super::logical_aggregate::LogicalAggregation;
use super::logical_filter::LogicalSelection;
use super::logical_join::{LogicalApply, LogicalJoin};
use super::logical_limit::LogicalLimit;
use super::logical_max_one_row::LogicalMaxOneRow;
use super::logical_order::LogicalSort;
use super::logical_project::LogicalProjection;
use super::logical_scan::{LogicalDataSource, LogicalTableDual};
use super::logical_setop::LogicalUnionAll;
use crate::expr::{CorrelatedColumn, Expression, Schema};

/// Common operations across all logical nodes in a plan.
///
/// For individual operators, this should be implemented on `Node<T>` and not
/// `T`.
pub trait LogicalNode {
    /// Name of the operator.
    fn name(&self) -> &'static str;

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>;
}

/// Wrapper around nodes in the logical plan to hold the output schema and
/// inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<N> {
    /// Node specific logic.
    pub node: N,
    /// Output columns of this node.
    pub schema: Schema,
    /// Inputs to this node.
    pub children: Vec<LogicalOperator>,
}

impl<N> Node<N> {
    pub fn new(node: N, schema: Schema, children: Vec<LogicalOperator>) -> Self {
        Node {
            node,
            schema,
            children,
        }
    }

    pub fn take_one_child_exact(&mut self) -> Result<LogicalOperator> {
        if self.children.len() != 1 {
            return Err(DbError::new(format!(
                "Expected 1 child to operator, have {}",
                self.children.len()
            )));
        }
        self.children
            .pop()
            .ok_or_else(|| DbError::new("Missing child"))
    }

    pub fn get_one_child_exact(&self) -> Result<&LogicalOperator> {
        if self.children.len() != 1 {
            return Err(DbError::new(format!(
                "Expected 1 child to operator, have {}",
                self.children.len()
            )));
        }
        Ok(&self.children[0])
    }

    pub fn get_nth_child(&self, n: usize) -> Result<&LogicalOperator> {
        self.children.get(n).ok_or_else(|| {
            DbError::new(format!(
                "Expected at least {} children, got {}",
                n + 1,
                self.children.len()
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperator {
    Invalid,
    TableDual(Node<LogicalTableDual>),
    DataSource(Node<LogicalDataSource>),
    Projection(Node<LogicalProjection>),
    Selection(Node<LogicalSelection>),
    Aggregation(Node<LogicalAggregation>),
    Join(Node<LogicalJoin>),
    Apply(Node<LogicalApply>),
    MaxOneRow(Node<LogicalMaxOneRow>),
    Sort(Node<LogicalSort>),
    Limit(Node<LogicalLimit>),
    UnionAll(Node<LogicalUnionAll>),
}

static EMPTY_SCHEMA: Schema = Schema {
    columns: Vec::new(),
};

macro_rules! dispatch {
    ($op:expr, $node:ident => $body:expr, invalid => $invalid:expr) => {
        match $op {
            LogicalOperator::Invalid => $invalid,
            LogicalOperator::TableDual($node) => $body,
            LogicalOperator::DataSource($node) => $body,
            LogicalOperator::Projection($node) => $body,
            LogicalOperator::Selection($node) => $body,
            LogicalOperator::Aggregation($node) => $body,
            LogicalOperator::Join($node) => $body,
            LogicalOperator::Apply($node) => $body,
            LogicalOperator::MaxOneRow($node) => $body,
            LogicalOperator::Sort($node) => $body,
            LogicalOperator::Limit($node) => $body,
            LogicalOperator::UnionAll($node) => $body,
        }
    };
}

impl LogicalOperator {
    /// Replace self with `Invalid`, returning the original operator.
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::Invalid)
    }

    pub fn schema(&self) -> &Schema {
        dispatch!(self, n => &n.schema, invalid => &EMPTY_SCHEMA)
    }

    pub fn schema_mut(&mut self) -> Option<&mut Schema> {
        dispatch!(self, n => Some(&mut n.schema), invalid => None)
    }

    pub fn children(&self) -> &[LogicalOperator] {
        dispatch!(self, n => &n.children, invalid => &[])
    }

    /// Correlated columns referenced anywhere in this plan that are not
    /// provided by an apply inside it.
    pub fn extract_correlated_columns(&self) -> Vec<CorrelatedColumn> {
        let mut cols = Vec::new();
        let _ = self.for_each_expr(&mut |expr| {
            expr.collect_correlated(&mut cols);
            Ok(())
        });
        for child in self.children() {
            cols.extend(child.extract_correlated_columns());
        }
        if let Self::Apply(apply) = self {
            if let Some(outer) = apply.children.first() {
                let outer = outer.schema();
                cols.retain(|c| !outer.contains(c.column.unique_id));
            }
        }
        cols
    }

    /// Correlated columns of this plan that refer to columns in `schema`.
    pub fn extract_correlated_columns_by_schema(&self, schema: &Schema) -> Vec<CorrelatedColumn> {
        let mut cols = self.extract_correlated_columns();
        cols.retain(|c| schema.contains(c.column.unique_id));
        cols
    }

    /// Indented tree rendering, one operator per line.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_inner(0, &mut out);
        out
    }

    fn explain_inner(&self, depth: usize, out: &mut String) {
        let _ = writeln!(out, "{:indent$}{self}", "", indent = depth * 2);
        for child in self.children() {
            child.explain_inner(depth + 1, out);
        }
    }
}

impl LogicalNode for LogicalOperator {
    fn name(&self) -> &'static str {
        dispatch!(self, n => n.name(), invalid => "Invalid")
    }

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        dispatch!(self, n => n.for_each_expr(func), invalid => Ok(()))
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, n => write!(f, "{}{}", n.name(), n.node), invalid => write!(f, "Invalid"))
    }
}

/// Write `items` as a bracketed, comma separated list. Writes nothing for an
/// empty list.
pub(crate) fn fmt_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    write!(f, " [")?;
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}
