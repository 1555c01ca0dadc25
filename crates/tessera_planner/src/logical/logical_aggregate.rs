use std::fmt;

use tessera_error::{DbError, Result};
use tessera_types::field_type::NOT_NULL_FLAG;
use tessera_types::{EvalType, FieldType, MysqlType};

use super::operator::{LogicalNode, Node, fmt_list};
use crate::expr::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKind {
    Max,
    Min,
    Sum,
    Count,
    /// Value from the first row of the group.
    FirstRow,
}

impl AggKind {
    pub fn from_name(name: &str) -> Option<AggKind> {
        Some(match name.to_ascii_lowercase().as_str() {
            "max" => Self::Max,
            "min" => Self::Min,
            "sum" => Self::Sum,
            "count" => Self::Count,
            "firstrow" | "any_value" => Self::FirstRow,
            _ => return None,
        })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::FirstRow => "firstrow",
        }
    }
}

/// An aggregate call in an aggregation node.
#[derive(Debug, Clone, PartialEq)]
pub struct AggFuncDesc {
    pub kind: AggKind,
    pub args: Vec<Expression>,
    pub distinct: bool,
    pub ret_type: FieldType,
}

impl AggFuncDesc {
    pub fn new(kind: AggKind, args: Vec<Expression>, distinct: bool) -> Result<Self> {
        let first = args
            .first()
            .ok_or_else(|| DbError::new(format!("Aggregate '{}' requires an argument", kind.as_str())))?;
        let ret_type = match kind {
            AggKind::Count => FieldType::new(MysqlType::LongLong)
                .with_flen(21)
                .with_flag(NOT_NULL_FLAG),
            AggKind::Sum => match first.ret_type().eval_type() {
                EvalType::Int | EvalType::Decimal => FieldType::new(MysqlType::NewDecimal),
                _ => FieldType::new(MysqlType::Double),
            },
            AggKind::Max | AggKind::Min | AggKind::FirstRow => {
                let mut ty = first.ret_type().clone();
                // Empty input gives NULL regardless of the argument.
                ty.flag &= !NOT_NULL_FLAG;
                ty
            }
        };
        Ok(AggFuncDesc {
            kind,
            args,
            distinct,
            ret_type,
        })
    }
}

impl fmt::Display for AggFuncDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.as_str())?;
        if self.distinct {
            write!(f, "distinct ")?;
        }
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Output schema holds one column per aggregate, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalAggregation {
    pub agg_funcs: Vec<AggFuncDesc>,
    pub group_by: Vec<Expression>,
}

impl fmt::Display for LogicalAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_list(f, &self.agg_funcs)?;
        if !self.group_by.is_empty() {
            write!(f, " group by")?;
            fmt_list(f, &self.group_by)?;
        }
        Ok(())
    }
}

impl LogicalNode for Node<LogicalAggregation> {
    fn name(&self) -> &'static str {
        "Aggregation"
    }

    fn for_each_expr<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        for agg in &self.node.agg_funcs {
            agg.args.iter().try_for_each(&mut *func)?;
        }
        self.node.group_by.iter().try_for_each(func)
    }
}
