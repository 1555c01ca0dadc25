//! Table record and index key layout.
//!
//! ```text
//! record key: t{table_id}_r{handle}
//! index key:  t{table_id}_i{index_id}{encoded index values}
//! ```
//!
//! Ids are written as 8 byte big-endian integers with the sign bit flipped,
//! so byte order of keys matches the numeric order of their ids.

use tessera_error::{DbError, Result};

use crate::codec::number::{decode_int, encode_int};

pub const TABLE_PREFIX: &[u8] = b"t";
pub const RECORD_PREFIX_SEP: &[u8] = b"_r";
pub const INDEX_PREFIX_SEP: &[u8] = b"_i";

pub(crate) const ID_LEN: usize = 8;
pub(crate) const PREFIX_LEN: usize = TABLE_PREFIX.len() + ID_LEN + RECORD_PREFIX_SEP.len();

/// Length of a record key: prefix and an 8 byte handle.
pub const RECORD_ROW_KEY_LEN: usize = PREFIX_LEN + ID_LEN;
/// Length of `t{table_id}`.
pub const TABLE_PREFIX_LENGTH: usize = TABLE_PREFIX.len() + ID_LEN;

pub fn table_prefix() -> &'static [u8] {
    TABLE_PREFIX
}

/// `t{table_id}`.
pub fn encode_table_prefix(table_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(TABLE_PREFIX_LENGTH);
    key.extend_from_slice(TABLE_PREFIX);
    encode_int(&mut key, table_id);
    key
}

/// Same as [`encode_table_prefix`].
pub fn gen_table_prefix(table_id: i64) -> Vec<u8> {
    encode_table_prefix(table_id)
}

/// `t{table_id}_r`.
pub fn gen_table_record_prefix(table_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_LEN);
    key.extend_from_slice(TABLE_PREFIX);
    encode_int(&mut key, table_id);
    key.extend_from_slice(RECORD_PREFIX_SEP);
    key
}

/// `t{table_id}_i`.
pub fn gen_table_index_prefix(table_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_LEN);
    key.extend_from_slice(TABLE_PREFIX);
    encode_int(&mut key, table_id);
    key.extend_from_slice(INDEX_PREFIX_SEP);
    key
}

/// `t{table_id}_i{index_id}`.
pub fn encode_table_index_prefix(table_id: i64, index_id: i64) -> Vec<u8> {
    let mut key = gen_table_index_prefix(table_id);
    encode_int(&mut key, index_id);
    key
}

/// Append a handle to a record prefix from [`gen_table_record_prefix`].
pub fn encode_record_key(record_prefix: &[u8], handle: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(record_prefix.len() + ID_LEN);
    key.extend_from_slice(record_prefix);
    encode_int(&mut key, handle);
    key
}

/// Record key from an already encoded handle.
pub fn encode_row_key(table_id: i64, encoded_handle: &[u8]) -> Vec<u8> {
    let mut key = gen_table_record_prefix(table_id);
    key.extend_from_slice(encoded_handle);
    key
}

pub fn encode_row_key_with_handle(table_id: i64, handle: i64) -> Vec<u8> {
    encode_record_key(&gen_table_record_prefix(table_id), handle)
}

/// `t{table_id}_i{index_id}` followed by already encoded index values.
pub fn encode_index_seek_key(table_id: i64, index_id: i64, encoded_value: &[u8]) -> Vec<u8> {
    let mut key = encode_table_index_prefix(table_id, index_id);
    key.extend_from_slice(encoded_value);
    key
}

/// Decoded `t{table_id}_{r|i}` header of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHead {
    pub table_id: i64,
    /// Index id for index keys, zero for record keys.
    pub index_id: i64,
    pub is_record_key: bool,
}

/// Decode the table id and key kind of a record or index key.
pub fn decode_key_head(key: &[u8]) -> Result<KeyHead> {
    if key.len() < PREFIX_LEN {
        return Err(DbError::invalid_key("Key too short for a table key").with_field("len", key.len()));
    }
    let rest = key
        .strip_prefix(TABLE_PREFIX)
        .ok_or_else(|| DbError::invalid_key("Missing table prefix"))?;
    let (rest, table_id) = decode_int(rest)?;

    if rest.starts_with(RECORD_PREFIX_SEP) {
        return Ok(KeyHead {
            table_id,
            index_id: 0,
            is_record_key: true,
        });
    }
    let rest = rest
        .strip_prefix(INDEX_PREFIX_SEP)
        .ok_or_else(|| DbError::invalid_key("Missing record or index separator"))?;
    let (_, index_id) = decode_int(rest).map_err(|_| {
        DbError::invalid_key("Index key too short for an index id").with_field("len", key.len())
    })?;
    Ok(KeyHead {
        table_id,
        index_id,
        is_record_key: false,
    })
}

/// Decode `(table_id, handle)` from a record key.
pub fn decode_record_key(key: &[u8]) -> Result<(i64, i64)> {
    if key.len() != RECORD_ROW_KEY_LEN {
        return Err(DbError::invalid_key("Invalid record key length")
            .with_field("len", key.len())
            .with_field("expected", RECORD_ROW_KEY_LEN));
    }
    let rest = key
        .strip_prefix(TABLE_PREFIX)
        .ok_or_else(|| DbError::invalid_key("Missing table prefix"))?;
    let (rest, table_id) = decode_int(rest)?;
    let rest = rest
        .strip_prefix(RECORD_PREFIX_SEP)
        .ok_or_else(|| DbError::invalid_key("Missing record separator"))?;
    let (_, handle) = decode_int(rest)?;
    Ok((table_id, handle))
}

/// Decode the handle of a record key.
pub fn decode_row_key(key: &[u8]) -> Result<i64> {
    decode_record_key(key).map(|(_, handle)| handle)
}

/// Table id of any table key, zero when the key isn't one.
pub fn decode_table_id(key: &[u8]) -> i64 {
    let Some(rest) = key.strip_prefix(TABLE_PREFIX) else {
        return 0;
    };
    decode_int(rest).map(|(_, id)| id).unwrap_or(0)
}

/// Truncate to the record key length if longer.
pub fn truncate_to_row_key_len(key: &[u8]) -> &[u8] {
    &key[..key.len().min(RECORD_ROW_KEY_LEN)]
}

/// Rewrite the table id of a record key, leaving the rest untouched.
pub fn replace_record_key_table_id(key: &[u8], table_id: i64) -> Result<Vec<u8>> {
    if key.len() < TABLE_PREFIX_LENGTH || !key.starts_with(TABLE_PREFIX) {
        return Err(DbError::invalid_key("Not a table key").with_field("len", key.len()));
    }
    let mut out = Vec::with_capacity(key.len());
    out.extend_from_slice(TABLE_PREFIX);
    encode_int(&mut out, table_id);
    out.extend_from_slice(&key[TABLE_PREFIX_LENGTH..]);
    Ok(out)
}

/// Strip `t{table_id}_r` or `t{table_id}_i`.
pub fn cut_row_key_prefix(key: &[u8]) -> &[u8] {
    key.get(PREFIX_LEN..).unwrap_or_default()
}

/// Strip `t{table_id}_i{index_id}`, leaving the encoded index values.
pub fn cut_index_prefix(key: &[u8]) -> &[u8] {
    key.get(PREFIX_LEN + ID_LEN..).unwrap_or_default()
}

pub fn has_table_prefix(key: &[u8]) -> bool {
    key.starts_with(TABLE_PREFIX)
}

pub fn is_record_key(key: &[u8]) -> bool {
    key.len() >= PREFIX_LEN && key[TABLE_PREFIX_LENGTH..PREFIX_LEN] == *RECORD_PREFIX_SEP
}

pub fn is_index_key(key: &[u8]) -> bool {
    key.len() >= PREFIX_LEN && key[TABLE_PREFIX_LENGTH..PREFIX_LEN] == *INDEX_PREFIX_SEP
}

/// Smallest key greater than every key prefixed by `prefix`.
pub fn prefix_next(prefix: &[u8]) -> Vec<u8> {
    let mut next = prefix.to_vec();
    for idx in (0..next.len()).rev() {
        if next[idx] != u8::MAX {
            next[idx] += 1;
            next.truncate(idx + 1);
            return next;
        }
    }
    // All 0xFF, append instead.
    let mut next = prefix.to_vec();
    next.push(0);
    next
}

/// Half-open `[start, end)` range covering every record of a table.
pub fn get_table_handle_key_range(table_id: i64) -> (Vec<u8>, Vec<u8>) {
    let start = gen_table_record_prefix(table_id);
    let end = prefix_next(&start);
    (start, end)
}

/// Half-open `[start, end)` range covering every entry of an index.
///
/// `end` is the index prefix followed by `0xFF`, above every encoded value
/// flag, so it stays strictly below the next index's prefix.
pub fn get_table_index_key_range(table_id: i64, index_id: i64) -> (Vec<u8>, Vec<u8>) {
    let start = encode_table_index_prefix(table_id, index_id);
    let mut end = start.clone();
    end.push(u8::MAX);
    (start, end)
}
