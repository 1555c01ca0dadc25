//! Rewrites parsed SQL expressions into typed expressions, turning subqueries
//! into apply and join operators of a logical plan.

pub mod ast;
pub mod builder;
pub mod config;
pub mod expr;
pub mod logical;
pub mod rewriter;
