//! Row-at-a-time evaluation with SQL three-valued logic.
//!
//! Used for constant folding, eager evaluation of uncorrelated subqueries and
//! by plan executors in tests. Booleans are `Int64(0)`/`Int64(1)`, unknown is
//! `Null`.

use std::cmp::Ordering;

use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use tessera_error::{DbError, ErrorKind, OptionExt, Result, ResultExt};
use tessera_types::field_type::MAX_FSP;
use tessera_types::{Datum, Decimal, FieldType, MysqlType, Time};

use super::{Column, Expression, FuncName, ScalarFunction, Schema};
use crate::config::SystemVariables;

/// Supplies column values for the row being evaluated.
pub trait RowSource {
    fn value(&self, col: &Column) -> Result<Datum>;
}

/// Row with no columns. Any column reference is an error.
#[derive(Debug, Clone, Copy)]
pub struct EmptyRow;

impl RowSource for EmptyRow {
    fn value(&self, col: &Column) -> Result<Datum> {
        Err(DbError::new(format!("Column {col} referenced without an input row")))
    }
}

/// Values laid out according to a schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaRow<'a> {
    pub schema: &'a Schema,
    pub values: &'a [Datum],
}

impl RowSource for SchemaRow<'_> {
    fn value(&self, col: &Column) -> Result<Datum> {
        let idx = self
            .schema
            .column_index(col.unique_id)
            .ok_or_else(|| DbError::new(format!("Column {col} not in input schema")))?;
        self.values
            .get(idx)
            .cloned()
            .ok_or_else(|| DbError::new(format!("Input row missing column {col}")))
    }
}

/// Session state visible to expression evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub time_zone: Tz,
    pub vars: Option<&'a dyn SystemVariables>,
    /// Values bound to `?` markers.
    pub params: &'a [Datum],
    /// Row being inserted, read by `VALUES(col)`.
    pub insert_row: Option<&'a [Datum]>,
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        EvalContext {
            time_zone: Tz::UTC,
            vars: None,
            params: &[],
            insert_row: None,
        }
    }
}

fn bool_datum(b: bool) -> Datum {
    Datum::Int64(b as i64)
}

fn to_string_lossy(d: &Datum) -> String {
    match d {
        Datum::String(s) => s.clone(),
        Datum::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => other.to_string(),
    }
}

impl Expression {
    pub fn eval(&self, ctx: &EvalContext, row: &dyn RowSource) -> Result<Datum> {
        match self {
            Self::Column(col) => row.value(col),
            Self::CorrelatedColumn(col) => Ok(col.data.lock().clone()),
            Self::Constant(c) => match &c.deferred {
                Some(deferred) => deferred.eval(ctx, row),
                None => Ok(c.value.clone()),
            },
            Self::ScalarFunction(f) => f.eval(ctx, row),
        }
    }

    /// Evaluate in a boolean context. `None` for NULL.
    pub fn eval_bool(&self, ctx: &EvalContext, row: &dyn RowSource) -> Result<Option<bool>> {
        self.eval(ctx, row)?.to_bool()
    }
}

impl ScalarFunction {
    fn arg(&self, idx: usize, ctx: &EvalContext, row: &dyn RowSource) -> Result<Datum> {
        self.args
            .get(idx)
            .ok_or_else(|| DbError::new(format!("Missing argument {idx} for {}", self.name)))?
            .eval(ctx, row)
    }

    pub fn eval(&self, ctx: &EvalContext, row: &dyn RowSource) -> Result<Datum> {
        use FuncName::*;

        match self.name {
            LogicAnd => {
                let a = self.arg(0, ctx, row)?.to_bool()?;
                if a == Some(false) {
                    return Ok(bool_datum(false));
                }
                let b = self.arg(1, ctx, row)?.to_bool()?;
                Ok(match (a, b) {
                    (_, Some(false)) => bool_datum(false),
                    (Some(true), Some(true)) => bool_datum(true),
                    _ => Datum::Null,
                })
            }
            LogicOr => {
                let a = self.arg(0, ctx, row)?.to_bool()?;
                if a == Some(true) {
                    return Ok(bool_datum(true));
                }
                let b = self.arg(1, ctx, row)?.to_bool()?;
                Ok(match (a, b) {
                    (_, Some(true)) => bool_datum(true),
                    (Some(false), Some(false)) => bool_datum(false),
                    _ => Datum::Null,
                })
            }
            LogicXor => {
                let a = self.arg(0, ctx, row)?.to_bool()?;
                let b = self.arg(1, ctx, row)?.to_bool()?;
                Ok(match (a, b) {
                    (Some(a), Some(b)) => bool_datum(a != b),
                    _ => Datum::Null,
                })
            }
            UnaryNot => Ok(match self.arg(0, ctx, row)?.to_bool()? {
                Some(b) => bool_datum(!b),
                None => Datum::Null,
            }),
            UnaryMinus => negate(&self.arg(0, ctx, row)?),
            Abs => abs(&self.arg(0, ctx, row)?),
            BitNeg => {
                let v = self.arg(0, ctx, row)?;
                if v.is_null() {
                    return Ok(Datum::Null);
                }
                Ok(Datum::Uint64(!v.to_u64()?))
            }
            Eq | Ne | NullEq | Lt | Le | Gt | Ge => {
                compare(self.name, &self.arg(0, ctx, row)?, &self.arg(1, ctx, row)?)
            }
            Plus | Minus | Mul | Div | Mod | IntDiv => {
                let a = self.arg(0, ctx, row)?;
                let b = self.arg(1, ctx, row)?;
                if a.is_null() || b.is_null() {
                    return Ok(Datum::Null);
                }
                arithmetic(self.name, &a, &b, self.ret_type.is_unsigned())
            }
            BitAnd | BitOr | BitXor => {
                let a = self.arg(0, ctx, row)?;
                let b = self.arg(1, ctx, row)?;
                if a.is_null() || b.is_null() {
                    return Ok(Datum::Null);
                }
                let (a, b) = (a.to_u64()?, b.to_u64()?);
                Ok(Datum::Uint64(match self.name {
                    BitAnd => a & b,
                    BitOr => a | b,
                    _ => a ^ b,
                }))
            }
            IsNull => Ok(bool_datum(self.arg(0, ctx, row)?.is_null())),
            IsTrue => Ok(bool_datum(self.arg(0, ctx, row)?.to_bool()? == Some(true))),
            IsFalse => Ok(bool_datum(self.arg(0, ctx, row)?.to_bool()? == Some(false))),
            If => {
                if self.arg(0, ctx, row)?.to_bool()? == Some(true) {
                    self.arg(1, ctx, row)
                } else {
                    self.arg(2, ctx, row)
                }
            }
            Ifnull | Coalesce => {
                for arg in &self.args {
                    let v = arg.eval(ctx, row)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Datum::Null)
            }
            Nullif => {
                let a = self.arg(0, ctx, row)?;
                let b = self.arg(1, ctx, row)?;
                if !a.is_null() && !b.is_null() && a.compare(&b)? == Ordering::Equal {
                    return Ok(Datum::Null);
                }
                Ok(a)
            }
            Case => {
                let mut pairs = self.args.chunks_exact(2);
                for pair in pairs.by_ref() {
                    if pair[0].eval_bool(ctx, row)? == Some(true) {
                        return pair[1].eval(ctx, row);
                    }
                }
                match pairs.remainder() {
                    [else_expr] => else_expr.eval(ctx, row),
                    _ => Ok(Datum::Null),
                }
            }
            In => {
                let target = self.arg(0, ctx, row)?;
                if target.is_null() {
                    return Ok(Datum::Null);
                }
                let mut has_null = false;
                for arg in &self.args[1..] {
                    let v = arg.eval(ctx, row)?;
                    if v.is_null() {
                        has_null = true;
                    } else if target.compare(&v)? == Ordering::Equal {
                        return Ok(bool_datum(true));
                    }
                }
                Ok(if has_null {
                    Datum::Null
                } else {
                    bool_datum(false)
                })
            }
            Like => {
                let s = self.arg(0, ctx, row)?;
                let pattern = self.arg(1, ctx, row)?;
                if s.is_null() || pattern.is_null() {
                    return Ok(Datum::Null);
                }
                let escape = u32::try_from(self.arg(2, ctx, row)?.to_i64()?)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\\');
                let re = like_to_regex(&to_string_lossy(&pattern), escape)?;
                Ok(bool_datum(re.is_match(&to_string_lossy(&s))))
            }
            Regexp => {
                let s = self.arg(0, ctx, row)?;
                let pattern = self.arg(1, ctx, row)?;
                if s.is_null() || pattern.is_null() {
                    return Ok(Datum::Null);
                }
                let re = Regex::new(&to_string_lossy(&pattern))
                    .context("Invalid regular expression")?;
                Ok(bool_datum(re.is_match(&to_string_lossy(&s))))
            }
            Cast => self.arg(0, ctx, row)?.convert_to(&self.ret_type),
            Row => Err(DbError::operand_columns(1)),
            GetVar => {
                let name = to_string_lossy(&self.arg(0, ctx, row)?);
                let vars = ctx.vars.required("session variables")?;
                Ok(vars.user_var(&name).unwrap_or(Datum::Null))
            }
            SetVar => {
                let name = to_string_lossy(&self.arg(0, ctx, row)?);
                let value = self.arg(1, ctx, row)?;
                let vars = ctx.vars.required("session variables")?;
                vars.set_user_var(&name, value.clone());
                Ok(value)
            }
            GetParam => {
                let idx = self.arg(0, ctx, row)?.to_i64()?;
                usize::try_from(idx)
                    .ok()
                    .and_then(|idx| ctx.params.get(idx))
                    .cloned()
                    .ok_or_else(|| {
                        DbError::with_kind(
                            ErrorKind::IncorrectParameterCount,
                            "Incorrect arguments to EXECUTE",
                        )
                        .with_field("param", idx)
                    })
            }
            Values => {
                let offset = self.arg(0, ctx, row)?.to_i64()?;
                Ok(ctx
                    .insert_row
                    .zip(usize::try_from(offset).ok())
                    .and_then(|(row, idx)| row.get(idx))
                    .cloned()
                    .unwrap_or(Datum::Null))
            }
            Benchmark => {
                let count = self.arg(0, ctx, row)?.to_i64()?;
                for _ in 0..count.max(0) {
                    self.arg(1, ctx, row)?;
                }
                Ok(Datum::Int64(0))
            }
            Now | CurrentTimestamp => {
                let fsp = match self.args.first() {
                    Some(arg) => arg.eval(ctx, row)?.to_i64()?,
                    None => 0,
                };
                if !(0..=MAX_FSP as i64).contains(&fsp) {
                    return Err(DbError::with_kind(
                        ErrorKind::TooBigPrecision,
                        format!("Too-big precision {fsp} specified for '{}'. Maximum is {MAX_FSP}", self.name),
                    ));
                }
                let now = Utc::now().with_timezone(&ctx.time_zone).naive_local();
                Ok(Datum::Time(Time::from_naive(now, MysqlType::Datetime, fsp as i8)?))
            }
            Curdate | CurrentDate => {
                let today = Utc::now()
                    .with_timezone(&ctx.time_zone)
                    .date_naive()
                    .and_time(NaiveTime::MIN);
                Ok(Datum::Time(Time::from_naive(today, MysqlType::Date, 0)?))
            }
            Lower | Upper | Length => {
                let v = self.arg(0, ctx, row)?;
                if v.is_null() {
                    return Ok(Datum::Null);
                }
                let s = to_string_lossy(&v);
                Ok(match self.name {
                    Lower => Datum::String(s.to_lowercase()),
                    Upper => Datum::String(s.to_uppercase()),
                    _ => Datum::Int64(s.len() as i64),
                })
            }
            Concat => {
                let mut out = String::new();
                for arg in &self.args {
                    let v = arg.eval(ctx, row)?;
                    if v.is_null() {
                        return Ok(Datum::Null);
                    }
                    out.push_str(&to_string_lossy(&v));
                }
                Ok(Datum::String(out))
            }
        }
    }
}

fn compare(op: FuncName, a: &Datum, b: &Datum) -> Result<Datum> {
    if op == FuncName::NullEq {
        return Ok(bool_datum(match (a.is_null(), b.is_null()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => a.compare(b)? == Ordering::Equal,
        }));
    }
    if a.is_null() || b.is_null() {
        return Ok(Datum::Null);
    }
    let ord = a.compare(b)?;
    Ok(bool_datum(match op {
        FuncName::Eq => ord.is_eq(),
        FuncName::Ne => ord.is_ne(),
        FuncName::Lt => ord.is_lt(),
        FuncName::Le => ord.is_le(),
        FuncName::Gt => ord.is_gt(),
        FuncName::Ge => ord.is_ge(),
        other => return Err(DbError::new(format!("{other} is not a comparison"))),
    }))
}

fn is_real(d: &Datum) -> bool {
    matches!(
        d,
        Datum::Float32(_) | Datum::Float64(_) | Datum::String(_) | Datum::Bytes(_)
    )
}

fn to_i128(d: &Datum) -> Result<i128> {
    match d {
        Datum::Uint64(v) => Ok(*v as i128),
        other => Ok(other.to_i64()? as i128),
    }
}

fn out_of_range(kind: &str, op: FuncName, a: &Datum, b: &Datum) -> DbError {
    DbError::new(format!("{kind} value is out of range in '{op}({a}, {b})'"))
}

fn int_result(v: i128, unsigned: bool, op: FuncName, a: &Datum, b: &Datum) -> Result<Datum> {
    if unsigned {
        return u64::try_from(v)
            .map(Datum::Uint64)
            .map_err(|_| out_of_range("BIGINT UNSIGNED", op, a, b));
    }
    i64::try_from(v)
        .map(Datum::Int64)
        .map_err(|_| out_of_range("BIGINT", op, a, b))
}

fn decimal_mod(a: &Decimal, b: &Decimal) -> Option<Decimal> {
    let scale = a.scale().max(b.scale());
    let a = a.rescale(scale).ok()?;
    let b = b.rescale(scale).ok()?;
    Decimal::try_new(a.mantissa() % b.mantissa(), scale).ok()
}

fn arithmetic(op: FuncName, a: &Datum, b: &Datum, unsigned: bool) -> Result<Datum> {
    use FuncName::*;

    if is_real(a) || is_real(b) {
        let (x, y) = (a.to_f64()?, b.to_f64()?);
        if matches!(op, Div | Mod | IntDiv) && y == 0.0 {
            return Ok(Datum::Null);
        }
        return Ok(match op {
            Plus => Datum::Float64(x + y),
            Minus => Datum::Float64(x - y),
            Mul => Datum::Float64(x * y),
            Div => Datum::Float64(x / y),
            Mod => Datum::Float64(x % y),
            _ => Datum::Int64((x / y).trunc() as i64),
        });
    }

    let is_decimal = matches!(a, Datum::Decimal(_)) || matches!(b, Datum::Decimal(_));
    if is_decimal || op == Div {
        let (x, y) = (a.to_decimal()?, b.to_decimal()?);
        if matches!(op, Div | Mod | IntDiv) && y.is_zero() {
            return Ok(Datum::Null);
        }
        let result = match op {
            Plus => x.checked_add(&y),
            Minus => x.checked_sub(&y),
            Mul => x.checked_mul(&y),
            Div => x.checked_div(&y),
            Mod => decimal_mod(&x, &y),
            _ => {
                let q = x
                    .checked_div(&y)
                    .ok_or_else(|| out_of_range("DECIMAL", op, a, b))?;
                // Truncate toward zero.
                let truncated = q.mantissa() / 10_i128.pow(q.scale() as u32);
                return i64::try_from(truncated)
                    .map(Datum::Int64)
                    .map_err(|_| out_of_range("BIGINT", op, a, b));
            }
        };
        return result
            .map(Datum::Decimal)
            .ok_or_else(|| out_of_range("DECIMAL", op, a, b));
    }

    let (x, y) = (to_i128(a)?, to_i128(b)?);
    let v = match op {
        Plus => x + y,
        Minus => x - y,
        Mul => x
            .checked_mul(y)
            .ok_or_else(|| out_of_range("BIGINT", op, a, b))?,
        Mod | IntDiv if y == 0 => return Ok(Datum::Null),
        Mod => x % y,
        _ => x / y,
    };
    int_result(v, unsigned, op, a, b)
}

fn negate(v: &Datum) -> Result<Datum> {
    Ok(match v {
        Datum::Null => Datum::Null,
        Datum::Int64(i) => match i.checked_neg() {
            Some(n) => Datum::Int64(n),
            None => Datum::Decimal(Decimal::try_new(-(*i as i128), 0)?),
        },
        Datum::Uint64(u) => match i64::try_from(-(*u as i128)) {
            Ok(n) => Datum::Int64(n),
            Err(_) => Datum::Decimal(Decimal::try_new(-(*u as i128), 0)?),
        },
        Datum::Decimal(d) => Datum::Decimal(d.neg()),
        other => Datum::Float64(-other.to_f64()?),
    })
}

fn abs(v: &Datum) -> Result<Datum> {
    Ok(match v {
        Datum::Null | Datum::Uint64(_) => v.clone(),
        Datum::Int64(i) => match i.checked_abs() {
            Some(n) => Datum::Int64(n),
            None => Datum::Uint64(i.unsigned_abs()),
        },
        Datum::Decimal(d) if d.is_negative() => Datum::Decimal(d.neg()),
        Datum::Decimal(_) => v.clone(),
        other => Datum::Float64(other.to_f64()?.abs()),
    })
}

/// Translate a `LIKE` pattern into an anchored regex.
pub fn like_to_regex(pattern: &str, escape: char) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut chars = pattern.chars();
    let mut buf = [0; 4];
    while let Some(c) = chars.next() {
        if c == escape {
            let literal = chars.next().unwrap_or(c);
            re.push_str(&regex::escape(literal.encode_utf8(&mut buf)));
            continue;
        }
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    re.push('$');
    Regex::new(&re).context("Invalid LIKE pattern")
}

/// Whether `pattern` has no wildcards, so `LIKE` is plain equality.
///
/// Returns the pattern with escapes removed.
pub fn like_exact_pattern(pattern: &str, escape: char) -> Option<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == escape {
            out.push(chars.next().unwrap_or(c));
            continue;
        }
        if c == '%' || c == '_' {
            return None;
        }
        out.push(c);
    }
    Some(out)
}

/// Shorthand for a constant of the given type, used by callers that build
/// expressions from evaluated values.
pub fn constant(value: Datum, ret_type: FieldType) -> Expression {
    Expression::Constant(super::Constant::new(value, ret_type))
}
