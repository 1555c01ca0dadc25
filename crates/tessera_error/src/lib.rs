//! Error type shared by every crate in the workspace.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Broad category of an error.
///
/// Callers match on the kind, never on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// Malformed or truncated key bytes.
    #[error("invalid key")]
    InvalidKey,
    /// Corrupt or type-mismatched encoded value.
    #[error("decode error")]
    Decode,
    /// Value count doesn't line up with column count.
    #[error("column count mismatch")]
    ColumnCountMismatch,
    /// Row-valued expression arity mismatch.
    #[error("operand columns")]
    OperandColumns,
    #[error("unknown column")]
    UnknownColumn,
    #[error("ambiguous column")]
    AmbiguousColumn,
    /// A construct that parses but has no planning support (e.g. `<=> ALL`).
    #[error("unsupported construct")]
    UnsupportedConstruct,
    #[error("invalid use of group function")]
    InvalidGroupFuncUse,
    #[error("invalid use of window function")]
    InvalidWindowFuncUse,
    #[error("incorrect parameter count")]
    IncorrectParameterCount,
    #[error("precision too big")]
    TooBigPrecision,
    #[error("unknown system variable")]
    UnknownSystemVariable,
    #[error("no default value")]
    NoDefaultValue,
    #[error("function does not exist")]
    FunctionNotExists,
    #[error("table name not allowed here")]
    TablenameNotAllowedHere,
    #[error("not implemented")]
    NotImplemented,
    #[error("internal")]
    Internal,
}

#[derive(Debug, thiserror::Error)]
#[error("{msg}{}", FieldsDisplay(.fields))]
pub struct DbError {
    kind: ErrorKind,
    msg: String,
    fields: Vec<(String, String)>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl DbError {
    /// Create a new internal error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        DbError {
            kind,
            msg: msg.into(),
            fields: Vec::new(),
            source: None,
        }
    }

    pub fn with_source(
        msg: impl Into<String>,
        source: Box<dyn StdError + Send + Sync + 'static>,
    ) -> Self {
        DbError {
            kind: ErrorKind::Internal,
            msg: msg.into(),
            fields: Vec::new(),
            source: Some(source),
        }
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::InvalidKey, msg)
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Decode, msg)
    }

    /// "Operand should contain N column(s)".
    pub fn operand_columns(expected: usize) -> Self {
        Self::with_kind(
            ErrorKind::OperandColumns,
            format!("Operand should contain {expected} column(s)"),
        )
    }

    pub fn unknown_column(name: impl fmt::Display, clause: &str) -> Self {
        Self::with_kind(
            ErrorKind::UnknownColumn,
            format!("Unknown column '{name}' in '{clause}'"),
        )
    }

    pub fn ambiguous_column(name: impl fmt::Display, clause: &str) -> Self {
        Self::with_kind(
            ErrorKind::AmbiguousColumn,
            format!("Column '{name}' in {clause} is ambiguous"),
        )
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::UnsupportedConstruct, msg)
    }

    pub fn invalid_group_func_use() -> Self {
        Self::with_kind(ErrorKind::InvalidGroupFuncUse, "Invalid use of group function")
    }

    /// Attach a key/value pair that is printed after the message.
    pub fn with_field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

struct FieldsDisplay<'a>(&'a [(String, String)]);

impl fmt::Display for FieldsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.0 {
            write!(f, "\n  {key}: {value}")?;
        }
        Ok(())
    }
}

/// Return early with a `NotImplemented` error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)+) => {
        return Err($crate::DbError::with_kind(
            $crate::ErrorKind::NotImplemented,
            format!("Not yet implemented: {}", format!($($arg)+)),
        ))
    };
}

pub trait ResultExt<T, E> {
    /// Wrap the error with a message, keeping the original as the source.
    fn context(self, msg: &str) -> Result<T>;

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| DbError::with_source(msg, Box::new(e)))
    }

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| DbError::with_source(f(), Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Error if the value is `None`, naming what was missing.
    fn required(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, what: &str) -> Result<T> {
        self.ok_or_else(|| DbError::new(format!("Missing required value: {what}")))
    }
}
