use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node};
use crate::expr::Expression;

/// Concatenation of all children's rows. Output columns take their names
/// from the first child and carry no table qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalUnionAll;

impl fmt::Display for LogicalUnionAll {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl LogicalNode for Node<LogicalUnionAll> {
    fn name(&self) -> &'static str {
        "UnionAll"
    }

    fn for_each_expr<F>(&self, _func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        Ok(())
    }
}
