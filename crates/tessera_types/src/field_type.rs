use std::fmt;

/// Storage-level column type tags.
///
/// Discriminants match the MySQL protocol type codes since they're persisted
/// in table metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MysqlType {
    Unspecified = 0,
    Tiny = 1,
    Short = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Null = 6,
    Timestamp = 7,
    LongLong = 8,
    Int24 = 9,
    Date = 10,
    Duration = 11,
    Datetime = 12,
    Year = 13,
    Varchar = 15,
    Bit = 16,
    Json = 0xf5,
    NewDecimal = 0xf6,
    Enum = 0xf7,
    Set = 0xf8,
    Blob = 0xfc,
    VarString = 0xfd,
    String = 0xfe,
}

impl MysqlType {
    pub const fn is_string_kind(&self) -> bool {
        matches!(
            self,
            Self::Varchar | Self::VarString | Self::String | Self::Blob
        )
    }

    pub const fn is_time_kind(&self) -> bool {
        matches!(self, Self::Date | Self::Datetime | Self::Timestamp)
    }

    pub const fn is_integer_kind(&self) -> bool {
        matches!(
            self,
            Self::Tiny | Self::Short | Self::Int24 | Self::Long | Self::LongLong | Self::Year
        )
    }
}

impl fmt::Display for MysqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unspecified => "unspecified",
            Self::Tiny => "tinyint",
            Self::Short => "smallint",
            Self::Long => "int",
            Self::Float => "float",
            Self::Double => "double",
            Self::Null => "null",
            Self::Timestamp => "timestamp",
            Self::LongLong => "bigint",
            Self::Int24 => "mediumint",
            Self::Date => "date",
            Self::Duration => "time",
            Self::Datetime => "datetime",
            Self::Year => "year",
            Self::Varchar => "varchar",
            Self::Bit => "bit",
            Self::Json => "json",
            Self::NewDecimal => "decimal",
            Self::Enum => "enum",
            Self::Set => "set",
            Self::Blob => "blob",
            Self::VarString => "var_string",
            Self::String => "char",
        };
        write!(f, "{s}")
    }
}

/// Type used when evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalType {
    Int,
    Real,
    Decimal,
    String,
    Datetime,
    Duration,
    Json,
}

impl EvalType {
    pub const fn is_string_kind(&self) -> bool {
        matches!(self, Self::String | Self::Datetime | Self::Duration | Self::Json)
    }
}

impl fmt::Display for EvalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "Int"),
            Self::Real => write!(f, "Real"),
            Self::Decimal => write!(f, "Decimal"),
            Self::String => write!(f, "String"),
            Self::Datetime => write!(f, "Datetime"),
            Self::Duration => write!(f, "Duration"),
            Self::Json => write!(f, "Json"),
        }
    }
}

pub const NOT_NULL_FLAG: u32 = 1;
pub const PRI_KEY_FLAG: u32 = 1 << 1;
pub const UNSIGNED_FLAG: u32 = 1 << 5;
pub const BINARY_FLAG: u32 = 1 << 7;

pub const UNSPECIFIED_LENGTH: i32 = -1;

/// Max fractional seconds precision.
pub const MAX_FSP: i32 = 6;

pub const CHARSET_BIN: &str = "binary";
pub const COLLATION_BIN: &str = "binary";
pub const DEFAULT_CHARSET: &str = "utf8mb4";
pub const DEFAULT_COLLATION: &str = "utf8mb4_bin";

/// Column or expression type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub tp: MysqlType,
    pub flag: u32,
    pub flen: i32,
    /// Decimal digits for decimals, fsp for time types.
    pub decimal: i32,
    pub charset: String,
    pub collate: String,
    /// Members of enum and set types.
    pub elems: Vec<String>,
}

impl FieldType {
    pub fn new(tp: MysqlType) -> Self {
        let (flen, decimal) = default_length_and_decimal(tp);
        let (charset, collate) = if tp.is_string_kind() {
            (DEFAULT_CHARSET, DEFAULT_COLLATION)
        } else {
            (CHARSET_BIN, COLLATION_BIN)
        };
        FieldType {
            tp,
            flag: 0,
            flen,
            decimal,
            charset: charset.to_string(),
            collate: collate.to_string(),
            elems: Vec::new(),
        }
    }

    pub fn with_elems(tp: MysqlType, elems: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut ft = Self::new(tp);
        ft.elems = elems.into_iter().map(Into::into).collect();
        ft
    }

    pub fn with_flen(mut self, flen: i32) -> Self {
        self.flen = flen;
        self
    }

    pub fn with_decimal(mut self, decimal: i32) -> Self {
        self.decimal = decimal;
        self
    }

    pub fn with_flag(mut self, flag: u32) -> Self {
        self.flag |= flag;
        self
    }

    pub fn not_null(self) -> Self {
        self.with_flag(NOT_NULL_FLAG)
    }

    pub fn has_not_null_flag(&self) -> bool {
        self.flag & NOT_NULL_FLAG != 0
    }

    pub fn is_unsigned(&self) -> bool {
        self.flag & UNSIGNED_FLAG != 0
    }

    pub fn eval_type(&self) -> EvalType {
        match self.tp {
            MysqlType::Tiny
            | MysqlType::Short
            | MysqlType::Int24
            | MysqlType::Long
            | MysqlType::LongLong
            | MysqlType::Bit
            | MysqlType::Year => EvalType::Int,
            MysqlType::Float | MysqlType::Double => EvalType::Real,
            MysqlType::NewDecimal => EvalType::Decimal,
            MysqlType::Date | MysqlType::Datetime | MysqlType::Timestamp => EvalType::Datetime,
            MysqlType::Duration => EvalType::Duration,
            MysqlType::Json => EvalType::Json,
            _ => EvalType::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tp)?;
        match self.tp {
            MysqlType::NewDecimal => write!(f, "({},{})", self.flen, self.decimal)?,
            MysqlType::Enum | MysqlType::Set => write!(f, "({})", self.elems.join(","))?,
            _ if self.flen != UNSPECIFIED_LENGTH && self.tp.is_string_kind() => {
                write!(f, "({})", self.flen)?
            }
            _ => (),
        }
        if self.is_unsigned() {
            write!(f, " unsigned")?;
        }
        Ok(())
    }
}

/// Default display length and decimal digits for a type.
pub const fn default_length_and_decimal(tp: MysqlType) -> (i32, i32) {
    match tp {
        MysqlType::Tiny => (4, 0),
        MysqlType::Short => (6, 0),
        MysqlType::Int24 => (9, 0),
        MysqlType::Long => (11, 0),
        MysqlType::LongLong => (20, 0),
        MysqlType::Float => (12, UNSPECIFIED_LENGTH),
        MysqlType::Double => (22, UNSPECIFIED_LENGTH),
        MysqlType::NewDecimal => (11, 0),
        MysqlType::Date => (10, 0),
        MysqlType::Datetime | MysqlType::Timestamp => (19, 0),
        MysqlType::Duration => (10, 0),
        MysqlType::Year => (4, 0),
        MysqlType::Bit => (1, 0),
        MysqlType::Null => (0, 0),
        _ => (UNSPECIFIED_LENGTH, UNSPECIFIED_LENGTH),
    }
}
