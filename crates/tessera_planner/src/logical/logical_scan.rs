use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node};
use crate::expr::Expression;

/// Produces `row_count` rows with no columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalTableDual {
    pub row_count: usize,
}

impl fmt::Display for LogicalTableDual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(rows={})", self.row_count)
    }
}

impl LogicalNode for Node<LogicalTableDual> {
    fn name(&self) -> &'static str {
        "TableDual"
    }

    fn for_each_expr<F>(&self, _func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        Ok(())
    }
}

/// Full read of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalDataSource {
    pub table: String,
}

impl fmt::Display for LogicalDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.table)
    }
}

impl LogicalNode for Node<LogicalDataSource> {
    fn name(&self) -> &'static str {
        "DataSource"
    }

    fn for_each_expr<F>(&self, _func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        Ok(())
    }
}
