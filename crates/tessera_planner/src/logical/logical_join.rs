use std::fmt;

use tessera_error::Result;

use super::operator::{LogicalNode, Node, fmt_list};
use crate::expr::{CorrelatedColumn, Expression};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    /// Outer rows with at least one match.
    Semi,
    /// Outer rows with no match. A NULL comparison result counts as neither.
    AntiSemi,
    /// Every outer row plus a boolean column: 1 on match, NULL if some
    /// comparison was NULL, 0 otherwise.
    LeftOuterSemi,
    /// Negated form of `LeftOuterSemi`.
    AntiLeftOuterSemi,
}

impl JoinType {
    /// Whether the output carries only the outer side's columns (plus an aux
    /// column for the left outer semi variants).
    pub const fn is_semi(&self) -> bool {
        matches!(
            self,
            Self::Semi | Self::AntiSemi | Self::LeftOuterSemi | Self::AntiLeftOuterSemi
        )
    }

    pub const fn has_aux_column(&self) -> bool {
        matches!(self, Self::LeftOuterSemi | Self::AntiLeftOuterSemi)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::LeftOuter => write!(f, "LEFT OUTER"),
            Self::RightOuter => write!(f, "RIGHT OUTER"),
            Self::Semi => write!(f, "SEMI"),
            Self::AntiSemi => write!(f, "ANTI SEMI"),
            Self::LeftOuterSemi => write!(f, "LEFT OUTER SEMI"),
            Self::AntiLeftOuterSemi => write!(f, "ANTI LEFT OUTER SEMI"),
        }
    }
}

/// Join of two children on a conjunction of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalJoin {
    pub join_type: JoinType,
    pub conditions: Vec<Expression>,
}

impl fmt::Display for LogicalJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.join_type)?;
        fmt_list(f, &self.conditions)
    }
}

impl LogicalNode for Node<LogicalJoin> {
    fn name(&self) -> &'static str {
        "Join"
    }

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        self.node.conditions.iter().try_for_each(func)
    }
}

/// Join where the inner child is re-evaluated for every outer row.
///
/// Before each evaluation the correlated columns are loaded with the current
/// outer row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalApply {
    pub join: LogicalJoin,
    /// Correlated columns of the inner child that refer to the outer child.
    pub correlated_columns: Vec<CorrelatedColumn>,
}

impl fmt::Display for LogicalApply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.join)
    }
}

impl LogicalNode for Node<LogicalApply> {
    fn name(&self) -> &'static str {
        "Apply"
    }

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        self.node.join.conditions.iter().try_for_each(func)
    }
}
