use std::cmp::Ordering;
use std::fmt;

use tessera_error::{DbError, ErrorKind, Result};

use crate::decimal::Decimal;
use crate::field_type::{EvalType, FieldType, MysqlType, UNSPECIFIED_LENGTH};
use crate::mysql_types::{BinaryLiteral, Enum, Set};
use crate::time::{Duration, Time};

/// A single scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Time(Time),
    Duration(Duration),
    Enum(Enum),
    Set(Set),
    BinaryLiteral(BinaryLiteral),
    /// Smaller than every non-null value. Only used for range bounds.
    MinNotNull,
    /// Larger than every value. Only used for range bounds.
    MaxValue,
}

impl Datum {
    pub const fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Int64(_) => "int64",
            Datum::Uint64(_) => "uint64",
            Datum::Float32(_) => "float32",
            Datum::Float64(_) => "float64",
            Datum::String(_) => "string",
            Datum::Bytes(_) => "bytes",
            Datum::Decimal(_) => "decimal",
            Datum::Time(_) => "time",
            Datum::Duration(_) => "duration",
            Datum::Enum(_) => "enum",
            Datum::Set(_) => "set",
            Datum::BinaryLiteral(_) => "binary_literal",
            Datum::MinNotNull => "min_not_null",
            Datum::MaxValue => "max_value",
        }
    }

    const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Datum::Int64(_) | Datum::Uint64(_) | Datum::Float32(_) | Datum::Float64(_) | Datum::Decimal(_)
        )
    }

    /// Raw string or bytes payload.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Datum::String(s) => Some(s.as_bytes()),
            Datum::Bytes(b) => Some(b),
            _ => None,
        }
    }

    fn cast_error(&self, target: &str) -> DbError {
        DbError::new(format!("Cannot convert {} to {target}", self.kind_name()))
            .with_field("value", self)
    }

    pub fn to_i64(&self) -> Result<i64> {
        match self {
            Datum::Int64(v) => Ok(*v),
            Datum::Uint64(v) => i64::try_from(*v).map_err(|_| self.cast_error("BIGINT")),
            Datum::Float32(v) => float_to_i64(*v as f64).ok_or_else(|| self.cast_error("BIGINT")),
            Datum::Float64(v) => float_to_i64(*v).ok_or_else(|| self.cast_error("BIGINT")),
            Datum::Decimal(d) => d.to_i64(),
            Datum::String(_) | Datum::Bytes(_) => {
                let s = String::from_utf8_lossy(self.as_bytes().unwrap_or_default());
                match s.trim().parse::<i64>() {
                    Ok(v) => Ok(v),
                    Err(_) => float_to_i64(parse_float_prefix(&s))
                        .ok_or_else(|| self.cast_error("BIGINT")),
                }
            }
            Datum::Time(t) => Ok(time_to_number(t)),
            Datum::Duration(d) => Ok(duration_to_number(d)),
            Datum::Enum(e) => Ok(e.value as i64),
            Datum::Set(s) => Ok(s.value as i64),
            Datum::BinaryLiteral(b) => {
                let v = b.to_u64()?;
                i64::try_from(v).map_err(|_| self.cast_error("BIGINT"))
            }
            _ => Err(self.cast_error("BIGINT")),
        }
    }

    pub fn to_u64(&self) -> Result<u64> {
        match self {
            Datum::Uint64(v) => Ok(*v),
            Datum::BinaryLiteral(b) => b.to_u64(),
            Datum::Enum(e) => Ok(e.value),
            Datum::Set(s) => Ok(s.value),
            // Negative values wrap the way a MySQL cast does.
            _ => self.to_i64().map(|v| v as u64),
        }
    }

    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Datum::Int64(v) => Ok(*v as f64),
            Datum::Uint64(v) => Ok(*v as f64),
            Datum::Float32(v) => Ok(*v as f64),
            Datum::Float64(v) => Ok(*v),
            Datum::Decimal(d) => Ok(d.to_f64()),
            Datum::String(_) | Datum::Bytes(_) => {
                let s = String::from_utf8_lossy(self.as_bytes().unwrap_or_default());
                Ok(parse_float_prefix(&s))
            }
            Datum::Time(t) => Ok(time_to_number(t) as f64),
            Datum::Duration(d) => Ok(duration_to_number(d) as f64),
            Datum::Enum(e) => Ok(e.value as f64),
            Datum::Set(s) => Ok(s.value as f64),
            Datum::BinaryLiteral(b) => Ok(b.to_u64()? as f64),
            _ => Err(self.cast_error("DOUBLE")),
        }
    }

    pub fn to_decimal(&self) -> Result<Decimal> {
        match self {
            Datum::Decimal(d) => Ok(*d),
            Datum::Int64(v) => Ok(Decimal::from_i64(*v)),
            Datum::Uint64(v) => Ok(Decimal::from_u64(*v)),
            Datum::Float32(v) => Decimal::from_f64(*v as f64),
            Datum::Float64(v) => Decimal::from_f64(*v),
            Datum::String(_) | Datum::Bytes(_) => {
                let s = String::from_utf8_lossy(self.as_bytes().unwrap_or_default());
                s.parse::<Decimal>()
                    .or_else(|_| Decimal::from_f64(parse_float_prefix(&s)))
            }
            _ => Ok(Decimal::from_i64(self.to_i64()?)),
        }
    }

    /// Truthiness for boolean contexts. `None` for NULL.
    pub fn to_bool(&self) -> Result<Option<bool>> {
        Ok(match self {
            Datum::Null => None,
            Datum::Int64(v) => Some(*v != 0),
            Datum::Uint64(v) => Some(*v != 0),
            Datum::Decimal(d) => Some(!d.is_zero()),
            Datum::Time(t) => Some(!t.is_zero()),
            Datum::Duration(d) => Some(d.nanos() != 0),
            _ => Some(self.to_f64()? != 0.0),
        })
    }

    /// Convert to the representation for a column of type `ft`.
    pub fn convert_to(&self, ft: &FieldType) -> Result<Datum> {
        if self.is_null() {
            return Ok(Datum::Null);
        }
        match ft.tp {
            MysqlType::Bit => {
                let bytes = if ft.flen > 0 {
                    Some((ft.flen as usize).div_ceil(8))
                } else {
                    None
                };
                return Ok(Datum::BinaryLiteral(BinaryLiteral::from_u64(
                    self.to_u64()?,
                    bytes,
                )));
            }
            MysqlType::Enum => {
                return Ok(Datum::Enum(match self {
                    Datum::String(s) => Enum::parse_with_name(&ft.elems, s)?,
                    Datum::Enum(e) => Enum::parse_with_name(&ft.elems, &e.name)?,
                    _ => Enum::parse_with_value(&ft.elems, self.to_u64()?)?,
                }));
            }
            MysqlType::Set => {
                return Ok(Datum::Set(match self {
                    Datum::String(s) => Set::parse_with_name(&ft.elems, s)?,
                    Datum::Set(v) => Set::parse_with_name(&ft.elems, &v.name)?,
                    _ => Set::parse_with_value(&ft.elems, self.to_u64()?)?,
                }));
            }
            MysqlType::Float => return Ok(Datum::Float32(self.to_f64()? as f32)),
            _ => (),
        }

        match ft.eval_type() {
            EvalType::Int if ft.is_unsigned() => Ok(Datum::Uint64(self.to_u64()?)),
            EvalType::Int => Ok(Datum::Int64(self.to_i64()?)),
            EvalType::Real => Ok(Datum::Float64(self.to_f64()?)),
            EvalType::Decimal => {
                let d = self.to_decimal()?;
                if ft.decimal != UNSPECIFIED_LENGTH && ft.decimal >= 0 {
                    Ok(Datum::Decimal(d.rescale(ft.decimal as u8)?))
                } else {
                    Ok(Datum::Decimal(d))
                }
            }
            EvalType::Datetime => {
                let fsp = ft.decimal.max(0) as i8;
                match self {
                    Datum::Time(t) => {
                        let mut t = *t;
                        t.set_tp(ft.tp);
                        t.set_fsp(fsp);
                        Ok(Datum::Time(t))
                    }
                    Datum::String(_) | Datum::Bytes(_) => {
                        let s = String::from_utf8_lossy(self.as_bytes().unwrap_or_default());
                        Ok(Datum::Time(Time::parse(&s, ft.tp, fsp)?))
                    }
                    _ => Err(self.cast_error(&ft.tp.to_string())),
                }
            }
            EvalType::Duration => {
                let fsp = ft.decimal.max(0) as i8;
                match self {
                    Datum::Duration(d) => Ok(Datum::Duration(Duration::from_nanos(d.nanos(), fsp)?)),
                    Datum::String(_) | Datum::Bytes(_) => {
                        let s = String::from_utf8_lossy(self.as_bytes().unwrap_or_default());
                        Ok(Datum::Duration(Duration::parse(&s, fsp)?))
                    }
                    _ => Err(self.cast_error("TIME")),
                }
            }
            EvalType::String | EvalType::Json => match self {
                Datum::Bytes(b) if ft.charset == crate::field_type::CHARSET_BIN => {
                    Ok(Datum::Bytes(b.clone()))
                }
                Datum::Bytes(b) => Ok(Datum::String(String::from_utf8_lossy(b).into_owned())),
                Datum::String(s) => Ok(Datum::String(s.clone())),
                other => Ok(Datum::String(other.to_string())),
            },
        }
    }

    /// Compare two datums using SQL comparison rules.
    ///
    /// NULL sorts before everything. Mixed numeric types are coerced, strings
    /// compared with numbers are read as doubles.
    pub fn compare(&self, other: &Datum) -> Result<Ordering> {
        match (self, other) {
            (Datum::Null, Datum::Null) | (Datum::MinNotNull, Datum::MinNotNull) | (Datum::MaxValue, Datum::MaxValue) => {
                return Ok(Ordering::Equal);
            }
            (Datum::Null, _) => return Ok(Ordering::Less),
            (_, Datum::Null) => return Ok(Ordering::Greater),
            (Datum::MinNotNull, _) | (_, Datum::MaxValue) => return Ok(Ordering::Less),
            (_, Datum::MinNotNull) | (Datum::MaxValue, _) => return Ok(Ordering::Greater),
            _ => (),
        }

        Ok(match (self, other) {
            (Datum::Int64(a), Datum::Int64(b)) => a.cmp(b),
            (Datum::Uint64(a), Datum::Uint64(b)) => a.cmp(b),
            (Datum::Int64(a), Datum::Uint64(b)) => compare_i64_u64(*a, *b),
            (Datum::Uint64(a), Datum::Int64(b)) => compare_i64_u64(*b, *a).reverse(),
            (Datum::Decimal(_), Datum::Float32(_) | Datum::Float64(_)) | (Datum::Float32(_) | Datum::Float64(_), Datum::Decimal(_)) => {
                compare_f64(self.to_f64()?, other.to_f64()?)
            }
            (Datum::Decimal(_), _) if other.is_numeric() => self.to_decimal()?.cmp(&other.to_decimal()?),
            (_, Datum::Decimal(_)) if self.is_numeric() => self.to_decimal()?.cmp(&other.to_decimal()?),
            (a, b) if a.is_numeric() && b.is_numeric() => compare_f64(a.to_f64()?, b.to_f64()?),

            (Datum::String(_) | Datum::Bytes(_), Datum::String(_) | Datum::Bytes(_)) => {
                self.as_bytes().cmp(&other.as_bytes())
            }

            (Datum::Time(a), Datum::Time(b)) => a.cmp(b),
            (Datum::Time(a), Datum::String(s)) => a.cmp(&Time::parse(s, a.tp(), a.fsp())?),
            (Datum::String(s), Datum::Time(b)) => Time::parse(s, b.tp(), b.fsp())?.cmp(b),
            (Datum::Duration(a), Datum::Duration(b)) => a.nanos().cmp(&b.nanos()),
            (Datum::Duration(a), Datum::String(s)) => a.nanos().cmp(&Duration::parse(s, a.fsp())?.nanos()),
            (Datum::String(s), Datum::Duration(b)) => Duration::parse(s, b.fsp())?.nanos().cmp(&b.nanos()),

            (Datum::Enum(a), Datum::String(s)) => a.name.as_str().cmp(s.as_str()),
            (Datum::String(s), Datum::Enum(b)) => s.as_str().cmp(b.name.as_str()),
            (Datum::Set(a), Datum::String(s)) => a.name.as_str().cmp(s.as_str()),
            (Datum::String(s), Datum::Set(b)) => s.as_str().cmp(b.name.as_str()),
            (Datum::Enum(a), Datum::Enum(b)) => a.value.cmp(&b.value),
            (Datum::Set(a), Datum::Set(b)) => a.value.cmp(&b.value),

            (Datum::BinaryLiteral(a), Datum::BinaryLiteral(b)) => a.cmp(b),
            (Datum::BinaryLiteral(a), Datum::String(_) | Datum::Bytes(_)) => {
                a.0.as_slice().cmp(other.as_bytes().unwrap_or_default())
            }
            (Datum::String(_) | Datum::Bytes(_), Datum::BinaryLiteral(b)) => {
                self.as_bytes().unwrap_or_default().cmp(b.0.as_slice())
            }

            (Datum::String(_) | Datum::Bytes(_), _) | (_, Datum::String(_) | Datum::Bytes(_)) => {
                compare_f64(self.to_f64()?, other.to_f64()?)
            }
            (Datum::Enum(_) | Datum::Set(_) | Datum::BinaryLiteral(_), _) | (_, Datum::Enum(_) | Datum::Set(_) | Datum::BinaryLiteral(_)) => {
                compare_f64(self.to_f64()?, other.to_f64()?)
            }
            _ => {
                return Err(DbError::with_kind(
                    ErrorKind::Internal,
                    format!(
                        "Cannot compare {} with {}",
                        self.kind_name(),
                        other.kind_name()
                    ),
                ));
            }
        })
    }
}

/// Free function form of [`Datum::compare`].
pub fn compare_datum(a: &Datum, b: &Datum) -> Result<Ordering> {
    a.compare(b)
}

fn compare_i64_u64(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn float_to_i64(v: f64) -> Option<i64> {
    let r = v.round();
    if r >= i64::MIN as f64 && r < i64::MAX as f64 {
        Some(r as i64)
    } else {
        None
    }
}

/// Parse the longest numeric prefix of `s`, zero if there is none.
fn parse_float_prefix(s: &str) -> f64 {
    let s = s.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    while end < bytes.len() {
        let b = bytes[end];
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => (),
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }
    // Back off a dangling exponent or sign.
    while end > 0 {
        if let Ok(v) = s[..end].parse::<f64>() {
            return v;
        }
        end -= 1;
    }
    0.0
}

fn time_to_number(t: &Time) -> i64 {
    let c = t.core();
    let date = c.year as i64 * 10000 + c.month as i64 * 100 + c.day as i64;
    if t.tp() == MysqlType::Date {
        return date;
    }
    date * 1_000_000 + c.hour as i64 * 10000 + c.minute as i64 * 100 + c.second as i64
}

fn duration_to_number(d: &Duration) -> i64 {
    let secs = d.nanos() / 1_000_000_000;
    let sign = secs.signum();
    let secs = secs.abs();
    sign * ((secs / 3600) * 10000 + ((secs / 60) % 60) * 100 + secs % 60)
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Int64(v) => write!(f, "{v}"),
            Datum::Uint64(v) => write!(f, "{v}"),
            Datum::Float32(v) => write!(f, "{v}"),
            Datum::Float64(v) => write!(f, "{v}"),
            Datum::String(v) => write!(f, "{v}"),
            Datum::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            Datum::Decimal(v) => write!(f, "{v}"),
            Datum::Time(v) => write!(f, "{v}"),
            Datum::Duration(v) => write!(f, "{v}"),
            Datum::Enum(v) => write!(f, "{v}"),
            Datum::Set(v) => write!(f, "{v}"),
            Datum::BinaryLiteral(v) => write!(f, "{v}"),
            Datum::MinNotNull => write!(f, "-inf"),
            Datum::MaxValue => write!(f, "+inf"),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int64(v)
    }
}

impl From<u64> for Datum {
    fn from(v: u64) -> Self {
        Datum::Uint64(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Float64(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::String(v)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(v: Vec<u8>) -> Self {
        Datum::Bytes(v)
    }
}

impl From<Decimal> for Datum {
    fn from(v: Decimal) -> Self {
        Datum::Decimal(v)
    }
}

impl From<Time> for Datum {
    fn from(v: Time) -> Self {
        Datum::Time(v)
    }
}

impl From<Duration> for Datum {
    fn from(v: Duration) -> Self {
        Datum::Duration(v)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Datum::Null)
    }
}
