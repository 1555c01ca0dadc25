//! Scalar values and type descriptors shared by the codec and the planner.

pub mod datum;
pub mod decimal;
pub mod field_type;
pub mod mysql_types;
pub mod time;

pub use datum::{Datum, compare_datum};
pub use decimal::Decimal;
pub use field_type::{EvalType, FieldType, MysqlType};
pub use mysql_types::{BinaryLiteral, Enum, Set};
pub use time::{CoreTime, Duration, Time};
