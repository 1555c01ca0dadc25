//! Key and value encodings for table rows and indexes on an ordered
//! key-value store.

pub mod codec;
pub mod tablecodec;
