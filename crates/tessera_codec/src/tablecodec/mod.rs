//! Table data layout: record keys, index keys and row values.
//!
//! Record keys are `t{table_id}_r{handle}` and index keys are
//! `t{table_id}_i{index_id}{encoded values}`, with ids in the
//! sign-flipped big-endian comparable form.

pub mod index;
pub mod key;
pub mod row;
pub mod rowcodec;

pub use index::*;
pub use key::*;
pub use row::*;
