use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node};
use crate::expr::Expression;

/// Errors if the input produces more than one row, and produces a single
/// all-NULL row for empty input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalMaxOneRow;

impl fmt::Display for LogicalMaxOneRow {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl LogicalNode for Node<LogicalMaxOneRow> {
    fn name(&self) -> &'static str {
        "MaxOneRow"
    }

    fn for_each_expr<F>(&self, _func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        Ok(())
    }
}
