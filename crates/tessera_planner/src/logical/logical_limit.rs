use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node};
use crate::expr::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalLimit {
    pub offset: u64,
    pub count: u64,
}

impl fmt::Display for LogicalLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(offset={}, count={})", self.offset, self.count)
    }
}

impl LogicalNode for Node<LogicalLimit> {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn for_each_expr<F>(&self, _func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        Ok(())
    }
}
