use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node, fmt_list};
use crate::expr::Expression;

#[derive(Debug, Clone, PartialEq)]
pub struct ByItem {
    pub expr: Expression,
    pub desc: bool,
}

impl fmt::Display for ByItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.desc {
            write!(f, "{} DESC", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalSort {
    pub by: Vec<ByItem>,
}

impl fmt::Display for LogicalSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_list(f, &self.by)
    }
}

impl LogicalNode for Node<LogicalSort> {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        self.node.by.iter().try_for_each(|item| func(&item.expr))
    }
}
