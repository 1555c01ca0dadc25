//! Parsed expression tree consumed by the rewriter.
//!
//! Parsing itself happens elsewhere. This is the narrow shape the rewriter
//! needs: a closed set of expression nodes and a minimal `SELECT` used as the
//! body of subqueries.

use std::fmt;

use tessera_error::Result;
use tessera_types::{Datum, FieldType};

/// Identifies an AST node that an outer planning step has already resolved to
/// an output column (aggregates, window functions, mapped column refs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Possibly qualified column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ColumnName {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub name: String,
}

impl ColumnName {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnName {
            schema: None,
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        ColumnName {
            schema: None,
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        if let Some(table) = &self.table {
            write!(f, "{table}.")?;
        }
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNeg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    LogicAnd,
    LogicOr,
    LogicXor,
    Eq,
    NotEq,
    NullEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Mul,
    Div,
    IntDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::NullEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LogicAnd => "AND",
            Self::LogicOr => "OR",
            Self::LogicXor => "XOR",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::NullEq => "<=>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::IntDiv => "DIV",
            Self::Mod => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
        };
        write!(f, "{s}")
    }
}

/// `@name`, `@@name`, `@@global.name` or `@@session.name`, optionally being
/// assigned (`@name := expr`).
#[derive(Debug, Clone, PartialEq)]
pub struct VariableExpr {
    pub name: String,
    pub is_system: bool,
    pub is_global: bool,
    /// Scope was written out (`@@global.` or `@@session.`).
    pub explicit_scope: bool,
    pub value: Option<Box<ExprNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub when: ExprNode,
    pub then: ExprNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpr {
    pub query: Box<SelectStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    /// Literal value with its inferred type.
    Value { value: Datum, ty: FieldType },
    /// `?` in a prepared statement.
    ParamMarker { order: usize },
    Variable(VariableExpr),
    FuncCall { name: String, args: Vec<ExprNode> },
    /// Aggregate call, resolved through the aggregate map.
    Aggregate { id: NodeId, name: String, args: Vec<ExprNode> },
    /// Window call, resolved through the window map.
    Window { id: NodeId, name: String },
    Column { id: NodeId, name: ColumnName },
    Unary { op: UnaryOp, expr: Box<ExprNode> },
    Binary { op: BinaryOp, left: Box<ExprNode>, right: Box<ExprNode> },
    Between { expr: Box<ExprNode>, low: Box<ExprNode>, high: Box<ExprNode>, not: bool },
    Case { value: Option<Box<ExprNode>>, whens: Vec<WhenClause>, else_clause: Option<Box<ExprNode>> },
    Cast { expr: Box<ExprNode>, target: FieldType },
    Like { expr: Box<ExprNode>, pattern: Box<ExprNode>, escape: char, not: bool },
    Regexp { expr: Box<ExprNode>, pattern: Box<ExprNode>, not: bool },
    Row(Vec<ExprNode>),
    /// `expr [NOT] IN (list)` or `expr [NOT] IN (subquery)`.
    In { expr: Box<ExprNode>, list: Vec<ExprNode>, sel: Option<SubqueryExpr>, not: bool },
    /// `ORDER BY 2` or `ORDER BY ?`.
    Position { n: usize, param: Option<Box<ExprNode>> },
    IsNull { expr: Box<ExprNode>, not: bool },
    IsTruth { expr: Box<ExprNode>, truth: bool, not: bool },
    Default { name: Option<ColumnName> },
    Values { column: ColumnName },
    Parentheses(Box<ExprNode>),
    Subquery(SubqueryExpr),
    Exists { sel: Box<ExprNode>, not: bool },
    CompareSubquery { left: Box<ExprNode>, op: BinaryOp, right: Box<ExprNode>, all: bool },
}

/// Minimal query shape used as a subquery body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStmt {
    pub distinct: bool,
    pub fields: Vec<SelectField>,
    /// Table to read from. `None` reads a single row with no columns.
    pub from: Option<String>,
    pub where_clause: Option<ExprNode>,
    pub group_by: Vec<ExprNode>,
    pub order_by: Vec<ExprNode>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectField {
    pub expr: ExprNode,
    pub alias: Option<String>,
}

/// Result of [`Visitor::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurse {
    Children,
    /// Don't visit children. `leave` is still called for the node.
    Skip,
}

/// Pre-order `enter`, post-order `leave` traversal over expression nodes.
pub trait Visitor {
    fn enter(&mut self, node: &ExprNode) -> Result<Recurse>;
    fn leave(&mut self, node: &ExprNode) -> Result<()>;
}

impl ExprNode {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        if visitor.enter(self)? == Recurse::Children {
            self.for_each_child(&mut |child| child.accept(visitor))?;
        }
        visitor.leave(self)
    }

    /// Children in evaluation order, matching the order `leave` expects them
    /// on the expression stack.
    pub fn for_each_child<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&ExprNode) -> Result<()>,
    {
        match self {
            Self::Value { .. }
            | Self::ParamMarker { .. }
            | Self::Window { .. }
            | Self::Column { .. }
            | Self::Values { .. }
            | Self::Subquery(_)
            | Self::Default { name: None } => Ok(()),
            Self::Variable(v) => match &v.value {
                Some(value) => func(value),
                None => Ok(()),
            },
            Self::FuncCall { args, .. } | Self::Aggregate { args, .. } | Self::Row(args) => {
                args.iter().try_for_each(func)
            }
            Self::Unary { expr, .. }
            | Self::Cast { expr, .. }
            | Self::IsNull { expr, .. }
            | Self::IsTruth { expr, .. }
            | Self::Parentheses(expr) => func(expr),
            Self::Binary { left, right, .. } | Self::CompareSubquery { left, right, .. } => {
                func(left)?;
                func(right)
            }
            Self::Between { expr, low, high, .. } => {
                func(expr)?;
                func(low)?;
                func(high)
            }
            Self::Case {
                value,
                whens,
                else_clause,
            } => {
                if let Some(value) = value {
                    func(value)?;
                }
                for when in whens {
                    func(&when.when)?;
                    func(&when.then)?;
                }
                match else_clause {
                    Some(e) => func(e),
                    None => Ok(()),
                }
            }
            Self::Like { expr, pattern, .. } | Self::Regexp { expr, pattern, .. } => {
                func(expr)?;
                func(pattern)
            }
            Self::In { expr, list, .. } => {
                func(expr)?;
                list.iter().try_for_each(func)
            }
            Self::Position { param, .. } => match param {
                Some(p) => func(p),
                None => Ok(()),
            },
            Self::Default { name: Some(name) } => func(&ExprNode::Column {
                id: NodeId(u32::MAX),
                name: name.clone(),
            }),
            Self::Exists { sel, .. } => func(sel),
        }
    }

    /// The subquery of an `IN`, including `x IN ((SELECT ...))` where the
    /// subquery is the only list element.
    pub fn in_subquery(&self) -> Option<&SubqueryExpr> {
        let Self::In { list, sel, .. } = self else {
            return None;
        };
        if let Some(sel) = sel {
            return Some(sel);
        }
        let [only] = list.as_slice() else {
            return None;
        };
        let mut node = only;
        loop {
            match node {
                Self::Subquery(subq) => return Some(subq),
                Self::Parentheses(inner) => node = inner,
                _ => return None,
            }
        }
    }
}

/// Shorthands for building trees in tests and callers.
pub mod build {
    use super::*;

    pub fn lit(value: impl Into<Datum>) -> ExprNode {
        let value = value.into();
        let ty = default_type_for_value(&value);
        ExprNode::Value { value, ty }
    }

    pub fn null() -> ExprNode {
        ExprNode::Value {
            value: Datum::Null,
            ty: FieldType::new(tessera_types::MysqlType::Null),
        }
    }

    pub fn col(name: &str) -> ExprNode {
        let name = match name.split_once('.') {
            Some((table, col)) => ColumnName::qualified(table, col),
            None => ColumnName::new(name),
        };
        ExprNode::Column {
            id: NodeId(0),
            name,
        }
    }

    pub fn binary(op: BinaryOp, left: ExprNode, right: ExprNode) -> ExprNode {
        ExprNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn func(name: &str, args: Vec<ExprNode>) -> ExprNode {
        ExprNode::FuncCall {
            name: name.to_string(),
            args,
        }
    }

    pub fn subquery(query: SelectStmt) -> SubqueryExpr {
        SubqueryExpr {
            query: Box::new(query),
        }
    }

    /// Type a literal would get from the parser.
    pub fn default_type_for_value(value: &Datum) -> FieldType {
        use tessera_types::MysqlType;
        use tessera_types::field_type::UNSIGNED_FLAG;

        match value {
            Datum::Null => FieldType::new(MysqlType::Null),
            Datum::Int64(_) => FieldType::new(MysqlType::LongLong),
            Datum::Uint64(_) => FieldType::new(MysqlType::LongLong).with_flag(UNSIGNED_FLAG),
            Datum::Float32(_) => FieldType::new(MysqlType::Float),
            Datum::Float64(_) => FieldType::new(MysqlType::Double),
            Datum::String(s) => FieldType::new(MysqlType::VarString).with_flen(s.len() as i32),
            Datum::Bytes(b) => FieldType::new(MysqlType::Blob).with_flen(b.len() as i32),
            Datum::Decimal(d) => FieldType::new(MysqlType::NewDecimal)
                .with_flen(d.precision() as i32)
                .with_decimal(d.scale() as i32),
            Datum::Time(t) => FieldType::new(t.tp()).with_decimal(t.fsp() as i32),
            Datum::Duration(d) => FieldType::new(MysqlType::Duration).with_decimal(d.fsp() as i32),
            Datum::Enum(_) => FieldType::new(MysqlType::Enum),
            Datum::Set(_) => FieldType::new(MysqlType::Set),
            Datum::BinaryLiteral(_) => FieldType::new(MysqlType::Bit),
            Datum::MinNotNull | Datum::MaxValue => FieldType::new(MysqlType::Unspecified),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;

    #[derive(Default)]
    struct Trace {
        events: Vec<String>,
    }

    impl Visitor for Trace {
        fn enter(&mut self, node: &ExprNode) -> Result<Recurse> {
            self.events.push(format!("enter {}", short(node)));
            Ok(Recurse::Children)
        }

        fn leave(&mut self, node: &ExprNode) -> Result<()> {
            self.events.push(format!("leave {}", short(node)));
            Ok(())
        }
    }

    fn short(node: &ExprNode) -> String {
        match node {
            ExprNode::Value { value, .. } => value.to_string(),
            ExprNode::Column { name, .. } => name.to_string(),
            ExprNode::Binary { op, .. } => op.to_string(),
            _ => "?".to_string(),
        }
    }

    #[test]
    fn pre_and_post_order() {
        let expr = binary(BinaryOp::Plus, col("a"), lit(1_i64));
        let mut trace = Trace::default();
        expr.accept(&mut trace).unwrap();
        assert_eq!(
            vec!["enter +", "enter a", "leave a", "enter 1", "leave 1", "leave +"],
            trace.events
        );
    }

    #[test]
    fn in_subquery_through_parens() {
        let sub = ExprNode::Subquery(subquery(SelectStmt::default()));
        let expr = ExprNode::In {
            expr: Box::new(lit(1_i64)),
            list: vec![ExprNode::Parentheses(Box::new(sub))],
            sel: None,
            not: false,
        };
        assert!(expr.in_subquery().is_some());

        let list = ExprNode::In {
            expr: Box::new(lit(1_i64)),
            list: vec![lit(1_i64), lit(2_i64)],
            sel: None,
            not: false,
        };
        assert!(list.in_subquery().is_none());
    }
}
