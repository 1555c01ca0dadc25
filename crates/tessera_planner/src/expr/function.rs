use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use tessera_error::{DbError, ErrorKind, Result};
use tessera_types::field_type::UNSIGNED_FLAG;
use tessera_types::{EvalType, FieldType, MysqlType};
use tracing::trace;

use super::eval::{EmptyRow, EvalContext};
use super::{Constant, Expression, bool_type};

/// Scalar functions the rewriter can produce or resolve by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncName {
    LogicAnd,
    LogicOr,
    LogicXor,
    UnaryNot,
    UnaryMinus,
    BitNeg,
    Eq,
    Ne,
    NullEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Mul,
    Div,
    IntDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    IsNull,
    IsTrue,
    IsFalse,
    If,
    Ifnull,
    Nullif,
    Coalesce,
    Case,
    In,
    Like,
    Regexp,
    Cast,
    Row,
    GetVar,
    SetVar,
    GetParam,
    Values,
    Benchmark,
    Now,
    CurrentTimestamp,
    Curdate,
    CurrentDate,
    Abs,
    Lower,
    Upper,
    Concat,
    Length,
}

impl FuncName {
    pub const ALL: &[FuncName] = &[
        Self::LogicAnd,
        Self::LogicOr,
        Self::LogicXor,
        Self::UnaryNot,
        Self::UnaryMinus,
        Self::BitNeg,
        Self::Eq,
        Self::Ne,
        Self::NullEq,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::Plus,
        Self::Minus,
        Self::Mul,
        Self::Div,
        Self::IntDiv,
        Self::Mod,
        Self::BitAnd,
        Self::BitOr,
        Self::BitXor,
        Self::IsNull,
        Self::IsTrue,
        Self::IsFalse,
        Self::If,
        Self::Ifnull,
        Self::Nullif,
        Self::Coalesce,
        Self::Case,
        Self::In,
        Self::Like,
        Self::Regexp,
        Self::Cast,
        Self::Row,
        Self::GetVar,
        Self::SetVar,
        Self::GetParam,
        Self::Values,
        Self::Benchmark,
        Self::Now,
        Self::CurrentTimestamp,
        Self::Curdate,
        Self::CurrentDate,
        Self::Abs,
        Self::Lower,
        Self::Upper,
        Self::Concat,
        Self::Length,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LogicAnd => "and",
            Self::LogicOr => "or",
            Self::LogicXor => "xor",
            Self::UnaryNot => "not",
            Self::UnaryMinus => "unaryminus",
            Self::BitNeg => "bitneg",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::NullEq => "nulleq",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Plus => "plus",
            Self::Minus => "minus",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::IntDiv => "intdiv",
            Self::Mod => "mod",
            Self::BitAnd => "bitand",
            Self::BitOr => "bitor",
            Self::BitXor => "bitxor",
            Self::IsNull => "isnull",
            Self::IsTrue => "istrue",
            Self::IsFalse => "isfalse",
            Self::If => "if",
            Self::Ifnull => "ifnull",
            Self::Nullif => "nullif",
            Self::Coalesce => "coalesce",
            Self::Case => "case",
            Self::In => "in",
            Self::Like => "like",
            Self::Regexp => "regexp",
            Self::Cast => "cast",
            Self::Row => "row",
            Self::GetVar => "getvar",
            Self::SetVar => "setvar",
            Self::GetParam => "getparam",
            Self::Values => "values",
            Self::Benchmark => "benchmark",
            Self::Now => "now",
            Self::CurrentTimestamp => "current_timestamp",
            Self::Curdate => "curdate",
            Self::CurrentDate => "current_date",
            Self::Abs => "abs",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Concat => "concat",
            Self::Length => "length",
        }
    }

    /// Look up a function by its SQL name, case insensitive.
    pub fn from_name(name: &str) -> Option<FuncName> {
        FUNCTIONS.get(name.to_ascii_lowercase().as_str()).copied()
    }

    /// Inclusive min and max argument counts. `None` max means variadic.
    pub const fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Self::Now | Self::CurrentTimestamp => (0, Some(1)),
            Self::Curdate | Self::CurrentDate => (0, Some(0)),
            Self::UnaryNot
            | Self::UnaryMinus
            | Self::BitNeg
            | Self::IsNull
            | Self::IsTrue
            | Self::IsFalse
            | Self::Cast
            | Self::GetVar
            | Self::GetParam
            | Self::Values
            | Self::Abs
            | Self::Lower
            | Self::Upper
            | Self::Length => (1, Some(1)),
            Self::Like => (3, Some(3)),
            Self::If => (3, Some(3)),
            Self::Coalesce | Self::Concat | Self::Case => (1, None),
            Self::Row | Self::In => (2, None),
            _ => (2, Some(2)),
        }
    }

    /// Functions evaluated once per execution rather than once per plan.
    /// A cached plan keeps them as deferred constants.
    pub const fn is_deferred(&self) -> bool {
        matches!(
            self,
            Self::Now | Self::CurrentTimestamp | Self::Curdate | Self::CurrentDate
        )
    }

    /// Functions whose arguments must stay symbolic while rewriting.
    pub const fn disables_folding(&self) -> bool {
        matches!(self, Self::Benchmark)
    }

    /// Whether a call with constant arguments may be replaced by its value.
    pub const fn is_foldable(&self) -> bool {
        !matches!(
            self,
            Self::GetVar
                | Self::SetVar
                | Self::GetParam
                | Self::Values
                | Self::Benchmark
                | Self::Row
        ) && !self.is_deferred()
    }
}

impl fmt::Display for FuncName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static FUNCTIONS: LazyLock<HashMap<&'static str, FuncName>> = LazyLock::new(|| {
    let mut map: HashMap<_, _> = FuncName::ALL.iter().map(|f| (f.as_str(), *f)).collect();
    // SQL spellings that differ from the internal names.
    map.insert("ucase", FuncName::Upper);
    map.insert("lcase", FuncName::Lower);
    map.insert("rlike", FuncName::Regexp);
    map.insert("localtime", FuncName::Now);
    map.insert("localtimestamp", FuncName::Now);
    map
});

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFunction {
    pub name: FuncName,
    pub args: Vec<Expression>,
    pub ret_type: FieldType,
}

fn check_arity(name: FuncName, num_args: usize) -> Result<()> {
    let (min, max) = name.arity();
    if num_args < min || max.is_some_and(|max| num_args > max) {
        return Err(DbError::with_kind(
            ErrorKind::IncorrectParameterCount,
            format!("Incorrect parameter count in the call to native function '{name}'"),
        )
        .with_field("got", num_args));
    }
    Ok(())
}

/// Build a scalar function without attempting to fold it.
pub fn new_function_base(
    name: FuncName,
    ret_type: FieldType,
    args: Vec<Expression>,
) -> Result<Expression> {
    check_arity(name, args.len())?;
    Ok(Expression::ScalarFunction(ScalarFunction {
        name,
        args,
        ret_type,
    }))
}

/// Build a scalar function, replacing it with a constant when every argument
/// is a constant and the function is foldable.
///
/// Errors during folding keep the unfolded function so the error surfaces at
/// execution, where it belongs to the row that triggered it.
pub fn new_function(name: FuncName, ret_type: FieldType, args: Vec<Expression>) -> Result<Expression> {
    let func = new_function_base(name, ret_type, args)?;
    fold_constant(func)
}

/// [`new_function`] with the return type inferred from the arguments.
pub fn new_function_inferred(name: FuncName, args: Vec<Expression>) -> Result<Expression> {
    let ret_type = infer_return_type(name, &args);
    new_function(name, ret_type, args)
}

pub fn fold_constant(expr: Expression) -> Result<Expression> {
    let Expression::ScalarFunction(func) = &expr else {
        return Ok(expr);
    };
    if !func.name.is_foldable() || !func.args.iter().all(|a| a.as_plain_constant().is_some()) {
        return Ok(expr);
    }
    match expr.eval(&EvalContext::default(), &EmptyRow) {
        Ok(value) => Ok(Expression::Constant(Constant::new(value, func.ret_type.clone()))),
        Err(e) => {
            trace!(%expr, %e, "skipping constant fold");
            Ok(expr)
        }
    }
}

/// Result type for `name` applied to `args`.
pub fn infer_return_type(name: FuncName, args: &[Expression]) -> FieldType {
    use FuncName::*;

    let arg_type = |idx: usize| {
        args.get(idx)
            .map(|a| a.ret_type().clone())
            .unwrap_or_else(|| FieldType::new(MysqlType::Null))
    };

    match name {
        LogicAnd | LogicOr | LogicXor | UnaryNot | Eq | Ne | NullEq | Lt | Le | Gt | Ge
        | IsNull | IsTrue | IsFalse | In | Like | Regexp => bool_type(),
        Plus | Minus | Mul | Mod => arithmetic_type(args),
        Div => match arithmetic_type(args).eval_type() {
            EvalType::Real => FieldType::new(MysqlType::Double),
            _ => FieldType::new(MysqlType::NewDecimal),
        },
        IntDiv => FieldType::new(MysqlType::LongLong),
        BitAnd | BitOr | BitXor | BitNeg => {
            FieldType::new(MysqlType::LongLong).with_flag(UNSIGNED_FLAG)
        }
        UnaryMinus | Abs => {
            let ty = arg_type(0);
            match ty.eval_type() {
                EvalType::Int | EvalType::Real | EvalType::Decimal => ty,
                _ => FieldType::new(MysqlType::Double),
            }
        }
        If => arg_type(1),
        Ifnull | Nullif | Coalesce | Row | Cast => arg_type(0),
        Case => {
            // Searched form: then clauses at odd positions, optional else last.
            args.get(1)
                .or_else(|| args.first())
                .map(|a| a.ret_type().clone())
                .unwrap_or_else(|| FieldType::new(MysqlType::Null))
        }
        GetVar | SetVar | GetParam | Values | Lower | Upper | Concat => {
            FieldType::new(MysqlType::VarString)
        }
        Benchmark | Length => FieldType::new(MysqlType::LongLong),
        Now | CurrentTimestamp => FieldType::new(MysqlType::Datetime),
        Curdate | CurrentDate => FieldType::new(MysqlType::Date),
    }
}

fn arithmetic_type(args: &[Expression]) -> FieldType {
    let evals: Vec<_> = args.iter().map(|a| a.ret_type().eval_type()).collect();
    if evals
        .iter()
        .any(|e| matches!(e, EvalType::Real | EvalType::String | EvalType::Json))
    {
        return FieldType::new(MysqlType::Double);
    }
    if evals.iter().any(|e| *e != EvalType::Int) {
        return FieldType::new(MysqlType::NewDecimal);
    }
    let ty = FieldType::new(MysqlType::LongLong);
    if args.iter().any(|a| a.ret_type().is_unsigned()) {
        return ty.with_flag(UNSIGNED_FLAG);
    }
    ty
}
