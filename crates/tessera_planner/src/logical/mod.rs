//! Logical plan nodes built while rewriting subqueries.

pub mod logical_aggregate;
pub mod logical_filter;
pub mod logical_join;
pub mod logical_limit;
pub mod logical_max_one_row;
pub mod logical_order;
pub mod logical_project;
pub mod logical_scan;
pub mod logical_setop;
pub mod operator;

pub use self::operator::{LogicalNode, LogicalOperator, Node};
