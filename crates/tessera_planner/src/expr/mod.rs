//! Typed scalar expressions produced by the rewriter.

pub mod eval;
pub mod function;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_error::{DbError, Result};
use tessera_types::{Datum, FieldType, MysqlType};

pub use self::function::{FuncName, ScalarFunction};
pub use self::schema::Schema;

/// Reference to an output column of a plan node.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Plan-wide unique id, allocated by the plan builder.
    pub unique_id: u64,
    /// Offset in the table this column was read from.
    pub index: usize,
    pub name: String,
    pub table: Option<String>,
    pub db: Option<String>,
    /// Source table and column when this column maps directly to storage.
    pub orig_table: Option<String>,
    pub orig_name: Option<String>,
    pub ret_type: FieldType,
    /// Inner operand of an `IN`/quantified comparison, where a NULL match
    /// must not be treated as a plain non-match.
    pub in_operand: bool,
    pub is_referenced: bool,
}

impl Column {
    pub fn new(unique_id: u64, name: impl Into<String>, ret_type: FieldType) -> Self {
        Column {
            unique_id,
            index: 0,
            name: name.into(),
            table: None,
            db: None,
            orig_table: None,
            orig_name: None,
            ret_type,
            in_operand: false,
            is_referenced: false,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        self.orig_table = Some(table.clone());
        self.orig_name = Some(self.name.clone());
        self.table = Some(table);
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Column of an enclosing query referenced from inside a subquery.
///
/// The data slot is filled in for every outer row before the inner plan is
/// evaluated.
#[derive(Debug, Clone)]
pub struct CorrelatedColumn {
    pub column: Column,
    pub data: Arc<Mutex<Datum>>,
}

impl CorrelatedColumn {
    pub fn new(column: Column) -> Self {
        CorrelatedColumn {
            column,
            data: Arc::new(Mutex::new(Datum::Null)),
        }
    }

    pub fn set(&self, value: Datum) {
        *self.data.lock() = value;
    }
}

impl PartialEq for CorrelatedColumn {
    fn eq(&self, other: &Self) -> bool {
        self.column == other.column
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Datum,
    pub ret_type: FieldType,
    /// Expression evaluated in place of `value` on every execution. Set for
    /// functions like `NOW()` when the plan may be cached.
    pub deferred: Option<Box<Expression>>,
}

impl Constant {
    pub fn new(value: Datum, ret_type: FieldType) -> Self {
        Constant {
            value,
            ret_type,
            deferred: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(Column),
    CorrelatedColumn(CorrelatedColumn),
    Constant(Constant),
    ScalarFunction(ScalarFunction),
}

/// Boolean-ish result type used for comparisons and predicates.
pub fn bool_type() -> FieldType {
    FieldType::new(MysqlType::Tiny).with_flen(1)
}

pub fn one() -> Expression {
    Expression::Constant(Constant::new(Datum::Int64(1), bool_type()))
}

pub fn zero() -> Expression {
    Expression::Constant(Constant::new(Datum::Int64(0), bool_type()))
}

pub fn null() -> Expression {
    Expression::Constant(Constant::new(Datum::Null, FieldType::new(MysqlType::Null)))
}

impl Expression {
    pub fn ret_type(&self) -> &FieldType {
        match self {
            Self::Column(c) => &c.ret_type,
            Self::CorrelatedColumn(c) => &c.column.ret_type,
            Self::Constant(c) => &c.ret_type,
            Self::ScalarFunction(f) => &f.ret_type,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Self::Column(c) => Some(c),
            _ => None,
        }
    }

    /// Constant without a deferred expression.
    pub fn as_plain_constant(&self) -> Option<&Datum> {
        match self {
            Self::Constant(c) if c.deferred.is_none() => Some(&c.value),
            _ => None,
        }
    }

    /// Number of columns for a row constructor, 1 for everything else.
    pub fn row_len(&self) -> usize {
        match self {
            Self::ScalarFunction(f) if f.name == FuncName::Row => f.args.len(),
            _ => 1,
        }
    }

    /// The `idx`th element of a row constructor, or the expression itself.
    pub fn row_arg(&self, idx: usize) -> Result<&Expression> {
        match self {
            Self::ScalarFunction(f) if f.name == FuncName::Row => f
                .args
                .get(idx)
                .ok_or_else(|| DbError::new(format!("Row has no element at {idx}"))),
            _ if idx == 0 => Ok(self),
            _ => Err(DbError::new(format!("Scalar has no row element at {idx}"))),
        }
    }

    /// Drop the first element of a row constructor. A two element row
    /// collapses to its remaining element.
    pub fn pop_row_first_arg(self) -> Result<Expression> {
        match self {
            Self::ScalarFunction(mut f) if f.name == FuncName::Row => {
                if f.args.len() < 2 {
                    return Err(DbError::new("Cannot pop the only element of a row"));
                }
                f.args.remove(0);
                if f.args.len() == 1 {
                    return Ok(f.args.remove(0));
                }
                f.ret_type = f.args[0].ret_type().clone();
                Ok(Self::ScalarFunction(f))
            }
            other => Err(DbError::new(format!("Expected a row expression, got {other}"))),
        }
    }

    pub fn for_each_child<F>(&self, func: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        match self {
            Self::ScalarFunction(f) => f.args.iter().try_for_each(func),
            Self::Constant(Constant {
                deferred: Some(deferred),
                ..
            }) => func(deferred),
            _ => Ok(()),
        }
    }

    /// All correlated columns in this expression, outermost first.
    pub fn correlated_columns(&self) -> Vec<CorrelatedColumn> {
        let mut cols = Vec::new();
        self.collect_correlated(&mut cols);
        cols
    }

    pub(crate) fn collect_correlated(&self, out: &mut Vec<CorrelatedColumn>) {
        if let Self::CorrelatedColumn(c) = self {
            out.push(c.clone());
            return;
        }
        let _ = self.for_each_child(&mut |child| {
            child.collect_correlated(out);
            Ok(())
        });
    }

    /// Row constructors are only valid as comparison operands.
    pub fn check_not_multi_column_row(&self) -> Result<()> {
        if self.row_len() != 1 {
            return Err(DbError::operand_columns(1));
        }
        Ok(())
    }
}

pub fn check_args_not_multi_column_row(args: &[Expression]) -> Result<()> {
    args.iter().try_for_each(|a| a.check_not_multi_column_row())
}

/// Fold `items` into a left-deep chain of `AND`s.
pub fn compose_cnf(items: Vec<Expression>) -> Result<Expression> {
    compose(FuncName::LogicAnd, items)
}

/// Fold `items` into a left-deep chain of `OR`s.
pub fn compose_dnf(items: Vec<Expression>) -> Result<Expression> {
    compose(FuncName::LogicOr, items)
}

fn compose(name: FuncName, items: Vec<Expression>) -> Result<Expression> {
    let mut iter = items.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| DbError::new(format!("Cannot compose empty {name} condition")))?;
    iter.try_fold(first, |acc, item| {
        function::new_function(name, bool_type(), vec![acc, item])
    })
}

/// Split a conjunction into its terms.
pub fn split_cnf_items(expr: Expression) -> Vec<Expression> {
    match expr {
        Expression::ScalarFunction(f) if f.name == FuncName::LogicAnd => {
            f.args.into_iter().flat_map(split_cnf_items).collect()
        }
        other => vec![other],
    }
}

impl From<Column> for Expression {
    fn from(col: Column) -> Self {
        Expression::Column(col)
    }
}

impl From<Constant> for Expression {
    fn from(c: Constant) -> Self {
        Expression::Constant(c)
    }
}

impl From<ScalarFunction> for Expression {
    fn from(f: ScalarFunction) -> Self {
        Expression::ScalarFunction(f)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(c) => write!(f, "{c}"),
            Self::CorrelatedColumn(c) => write!(f, "outer({})", c.column),
            Self::Constant(c) => match &c.deferred {
                Some(deferred) => write!(f, "deferred({deferred})"),
                None => match &c.value {
                    Datum::String(s) => write!(f, "'{s}'"),
                    other => write!(f, "{other}"),
                },
            },
            Self::ScalarFunction(func) => {
                write!(f, "{}(", func.name)?;
                for (idx, arg) in func.args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_col(id: u64, name: &str) -> Expression {
        Column::new(id, name, FieldType::new(MysqlType::LongLong)).into()
    }

    #[test]
    fn split_nested_and() {
        let a = int_col(1, "a");
        let b = int_col(2, "b");
        let c = int_col(3, "c");
        let cnf = compose_cnf(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!("and(and(a, b), c)", cnf.to_string());
        assert_eq!(vec![a, b, c], split_cnf_items(cnf));
    }

    #[test]
    fn row_helpers() {
        let row = function::new_function_base(
            FuncName::Row,
            FieldType::new(MysqlType::LongLong),
            vec![int_col(1, "a"), int_col(2, "b"), int_col(3, "c")],
        )
        .unwrap();
        assert_eq!(3, row.row_len());
        assert_eq!("b", row.row_arg(1).unwrap().to_string());
        assert!(row.check_not_multi_column_row().is_err());

        let popped = row.pop_row_first_arg().unwrap();
        assert_eq!("row(b, c)", popped.to_string());
        let last = popped.pop_row_first_arg().unwrap();
        assert_eq!("c", last.to_string());
        assert!(last.pop_row_first_arg().is_err());
    }

    #[test]
    fn correlated_columns_found_in_args() {
        let outer = CorrelatedColumn::new(Column::new(9, "o", FieldType::new(MysqlType::LongLong)));
        let expr = function::new_function_base(
            FuncName::Eq,
            bool_type(),
            vec![int_col(1, "a"), Expression::CorrelatedColumn(outer.clone())],
        )
        .unwrap();
        let found = expr.correlated_columns();
        assert_eq!(1, found.len());
        assert_eq!(9, found[0].column.unique_id);
    }
}
