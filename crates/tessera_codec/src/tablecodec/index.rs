//! Index key extraction and region split keys.

use std::collections::HashMap;

use tessera_error::{DbError, Result};
use tessera_types::Datum;

use super::key::{
    INDEX_PREFIX_SEP, TABLE_PREFIX, cut_index_prefix, decode_key_head, encode_index_seek_key,
    encode_record_key, encode_table_index_prefix, encode_table_prefix, gen_table_record_prefix,
};
use crate::codec::number::decode_int;
use crate::codec::{self, cut_one, decode_one};

/// Split an index key into per-column encoded values and the handle bytes.
///
/// Values map to the column ids in `col_ids` by position. Whatever follows
/// the last column is returned as the handle.
pub fn cut_index_key<'a>(key: &'a [u8], col_ids: &[i64]) -> Result<(HashMap<i64, &'a [u8]>, &'a [u8])> {
    let mut rest = cut_index_prefix(key);
    let mut values = HashMap::with_capacity(col_ids.len());
    for &id in col_ids {
        let (value, remaining) = cut_one(rest)?;
        values.insert(id, value);
        rest = remaining;
    }
    Ok((values, rest))
}

/// Positional form of [`cut_index_key`] for the first `num_cols` columns.
pub fn cut_index_key_new(key: &[u8], num_cols: usize) -> Result<(Vec<&[u8]>, &[u8])> {
    let mut rest = cut_index_prefix(key);
    let mut values = Vec::with_capacity(num_cols);
    for _ in 0..num_cols {
        let (value, remaining) = cut_one(rest)?;
        values.push(value);
        rest = remaining;
    }
    Ok((values, rest))
}

/// Decode an index key into table id, index id and display strings for
/// each encoded value.
pub fn decode_index_key(key: &[u8]) -> Result<(i64, i64, Vec<String>)> {
    let head = decode_key_head(key)?;
    if head.is_record_key {
        return Err(DbError::invalid_key("Record key passed where an index key was expected"));
    }
    let mut rest = cut_index_prefix(key);
    let mut values = Vec::new();
    while !rest.is_empty() {
        let (remaining, datum) = decode_one(rest)?;
        values.push(datum.to_string());
        rest = remaining;
    }
    Ok((head.table_id, head.index_id, values))
}

/// Handle of an index entry.
///
/// Unique index entries store the handle in the value as a big-endian i64.
/// Non-unique entries append it to the key after `num_cols` columns.
pub fn decode_index_handle(key: &[u8], value: &[u8], num_cols: usize) -> Result<i64> {
    if value.len() >= 8 {
        let mut handle = [0; 8];
        handle.copy_from_slice(&value[..8]);
        return Ok(i64::from_be_bytes(handle));
    }
    let (_, handle_bytes) = cut_index_key_new(key, num_cols)?;
    match decode_one(handle_bytes)? {
        (_, Datum::Int64(h)) => Ok(h),
        (_, Datum::Uint64(h)) => Ok(h as i64),
        (_, other) => Err(DbError::decode("Invalid handle in index key").with_field("kind", other.kind_name())),
    }
}

/// Index key used as a region split point for `values`.
///
/// The handle is `i64::MIN` so the key sorts before every real entry with
/// the same values.
pub fn gen_index_split_key(table_id: i64, index_id: i64, values: &[Datum]) -> Result<Vec<u8>> {
    let mut datums = values.to_vec();
    datums.push(Datum::Int64(i64::MIN));
    let encoded = codec::encode_key(&datums)?;
    Ok(encode_index_seek_key(table_id, index_id, &encoded))
}

/// Smallest step between evenly spaced record split keys.
pub const MIN_REGION_STEP: u64 = 1000;

/// Record keys splitting `[lower, upper)` into `num` evenly sized regions.
///
/// Handles of tables with an unsigned primary key are compared as unsigned.
pub fn gen_table_record_split_keys(
    table_id: i64,
    lower: i64,
    upper: i64,
    num: usize,
    unsigned: bool,
) -> Result<Vec<Vec<u8>>> {
    if num == 0 {
        return Err(DbError::new("Split region number must be positive"));
    }
    let span = if unsigned {
        let (lo, hi) = (lower as u64, upper as u64);
        if hi <= lo {
            return Err(DbError::new(format!(
                "Split table region lower value {lo} should less than the upper value {hi}"
            )));
        }
        hi - lo
    } else {
        if upper <= lower {
            return Err(DbError::new(format!(
                "Split table region lower value {lower} should less than the upper value {upper}"
            )));
        }
        upper.wrapping_sub(lower) as u64
    };
    let step = span / num as u64;
    if step < MIN_REGION_STEP {
        return Err(DbError::new(format!(
            "Split table region step value should more than {MIN_REGION_STEP}, step {step} is invalid"
        )));
    }

    let prefix = gen_table_record_prefix(table_id);
    let mut keys = Vec::with_capacity(num.saturating_sub(1));
    let mut handle = lower;
    for _ in 1..num {
        handle = handle.wrapping_add(step as i64);
        keys.push(encode_record_key(&prefix, handle));
    }
    Ok(keys)
}

/// Human readable form of a region boundary key, relative to a table and
/// optionally one of its indexes.
///
/// Produces `t_{table}_r_{handle}`, `t_{table}_i_{index}_{hex}` and similar
/// forms, falling back to hex for anything unrecognized.
pub fn decode_region_key(key: &[u8], table_id: i64, index_id: Option<i64>) -> String {
    let table_prefix = encode_table_prefix(table_id);
    let record_prefix = gen_table_record_prefix(table_id);

    if let Some(index_id) = index_id {
        let index_prefix = encode_table_index_prefix(table_id, index_id);
        if let Some(rest) = key.strip_prefix(index_prefix.as_slice()) {
            return format!("t_{table_id}_i_{index_id}_{}", hex(rest));
        }
    }
    if let Some(rest) = key.strip_prefix(record_prefix.as_slice()) {
        if let Ok((_, handle)) = decode_int(rest) {
            return format!("t_{table_id}_r_{handle}");
        }
    }
    if let Some(rest) = key.strip_prefix(table_prefix.as_slice()) {
        let Some(rest) = rest.strip_prefix(INDEX_PREFIX_SEP) else {
            return format!("t_{table_id}_{}", hex(rest));
        };
        if let Ok((tail, index_id)) = decode_int(rest) {
            return format!("t_{table_id}_i_{index_id}_{}", hex(tail));
        }
        return format!("t_{table_id}_i__{}", hex(rest));
    }
    if let Some(rest) = key.strip_prefix(TABLE_PREFIX) {
        if let Ok((tail, other_table)) = decode_int(rest) {
            return format!("t_{other_table}_{}", hex(tail));
        }
        return format!("t_{}", hex(rest));
    }
    hex(key)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
