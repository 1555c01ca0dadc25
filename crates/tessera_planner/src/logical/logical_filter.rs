use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node, fmt_list};
use crate::expr::Expression;

/// Keeps rows for which every condition is true.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalSelection {
    pub conditions: Vec<Expression>,
}

impl fmt::Display for LogicalSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_list(f, &self.conditions)
    }
}

impl LogicalNode for Node<LogicalSelection> {
    fn name(&self) -> &'static str {
        "Selection"
    }

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        self.node.conditions.iter().try_for_each(func)
    }
}
