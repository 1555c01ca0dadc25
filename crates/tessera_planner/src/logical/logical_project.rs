use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node, fmt_list};
use crate::expr::Expression;

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalProjection {
    pub exprs: Vec<Expression>,
}

impl fmt::Display for LogicalProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_list(f, &self.exprs)
    }
}

impl LogicalNode for Node<LogicalProjection> {
    fn name(&self) -> &'static str {
        "Projection"
    }

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        self.node.exprs.iter().try_for_each(func)
    }
}
