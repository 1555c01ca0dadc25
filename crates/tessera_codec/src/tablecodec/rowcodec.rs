//! Compact row format.
//!
//! ```text
//! | version | flags | not_null_count: u16 | null_count: u16 |
//! | column ids (not-null ascending, then null ascending)   |
//! | end offsets of not-null values                          |
//! | value data                                              |
//! ```
//!
//! Column ids are `u8` and offsets `u16` unless the `LARGE` flag is set, in
//! which case both are `u32`. All integers are little-endian. Values are not
//! self-describing, decoding needs the column's field type.

use chrono_tz::Tz;
use tessera_error::{DbError, ErrorKind, Result};
use tessera_types::field_type::CHARSET_BIN;
use tessera_types::{BinaryLiteral, Datum, Duration, Enum, FieldType, MysqlType, Set, Time};

use crate::codec::decimal::{decode_decimal, encode_decimal};
use crate::codec::number::{
    decode_compact_int, decode_compact_uint, decode_float, encode_compact_int,
    encode_compact_uint, encode_float,
};

/// First byte of every row in this format.
pub const CODEC_VER: u8 = 128;

const FLAG_LARGE: u8 = 1;

/// Encode a row. Values are paired with `col_ids` by position.
pub fn encode(tz: &Tz, col_ids: &[i64], values: &[Datum]) -> Result<Vec<u8>> {
    if col_ids.len() != values.len() {
        return Err(DbError::with_kind(
            ErrorKind::ColumnCountMismatch,
            format!(
                "Column count {} doesn't match value count {}",
                col_ids.len(),
                values.len()
            ),
        ));
    }

    let mut cols: Vec<(u32, &Datum)> = Vec::with_capacity(col_ids.len());
    for (&id, value) in col_ids.iter().zip(values) {
        let id = u32::try_from(id)
            .map_err(|_| DbError::new("Column id out of range for row encoding").with_field("id", id))?;
        cols.push((id, value));
    }
    cols.sort_by_key(|(id, _)| *id);

    let mut not_null_ids = Vec::new();
    let mut null_ids = Vec::new();
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for (id, value) in cols {
        if value.is_null() {
            null_ids.push(id);
            continue;
        }
        encode_datum(&mut data, value, tz)?;
        not_null_ids.push(id);
        offsets.push(data.len());
    }

    let large = not_null_ids.iter().chain(&null_ids).any(|&id| id > u8::MAX as u32)
        || data.len() > u16::MAX as usize;
    if not_null_ids.len() > u16::MAX as usize || null_ids.len() > u16::MAX as usize {
        return Err(DbError::new("Too many columns for row encoding"));
    }

    let mut buf = Vec::with_capacity(6 + data.len() + offsets.len() * 4 + col_ids.len() * 4);
    buf.push(CODEC_VER);
    buf.push(if large { FLAG_LARGE } else { 0 });
    buf.extend_from_slice(&(not_null_ids.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(null_ids.len() as u16).to_le_bytes());
    for &id in not_null_ids.iter().chain(&null_ids) {
        if large {
            buf.extend_from_slice(&id.to_le_bytes());
        } else {
            buf.push(id as u8);
        }
    }
    for &offset in &offsets {
        if large {
            buf.extend_from_slice(&(offset as u32).to_le_bytes());
        } else {
            buf.extend_from_slice(&(offset as u16).to_le_bytes());
        }
    }
    buf.extend_from_slice(&data);
    Ok(buf)
}

fn encode_datum(buf: &mut Vec<u8>, datum: &Datum, tz: &Tz) -> Result<()> {
    match datum {
        Datum::Int64(v) => encode_compact_int(buf, *v),
        Datum::Uint64(v) => encode_compact_uint(buf, *v),
        Datum::Float32(v) => encode_float(buf, *v as f64),
        Datum::Float64(v) => encode_float(buf, *v),
        Datum::String(s) => buf.extend_from_slice(s.as_bytes()),
        Datum::Bytes(b) => buf.extend_from_slice(b),
        Datum::Decimal(d) => encode_decimal(buf, d, 0, 0)?,
        Datum::Time(t) => {
            let t = if t.tp() == MysqlType::Timestamp && !t.is_zero() {
                t.convert_time_zone(tz, &chrono_tz::UTC)?
            } else {
                *t
            };
            encode_compact_uint(buf, t.to_packed_u64())
        }
        Datum::Duration(d) => encode_compact_int(buf, d.nanos()),
        Datum::Enum(e) => encode_compact_uint(buf, e.value),
        Datum::Set(s) => encode_compact_uint(buf, s.value),
        Datum::BinaryLiteral(b) => encode_compact_uint(buf, b.to_u64()?),
        other => {
            return Err(DbError::new(format!(
                "Cannot store {} in a row",
                other.kind_name()
            )));
        }
    }
    Ok(())
}

/// Parsed header of a compact row, borrowing the row bytes.
#[derive(Debug)]
pub struct CompactRow<'a> {
    large: bool,
    num_not_null: usize,
    num_null: usize,
    col_ids: &'a [u8],
    offsets: &'a [u8],
    data: &'a [u8],
}

impl<'a> CompactRow<'a> {
    pub fn parse(row: &'a [u8]) -> Result<Self> {
        if row.len() < 6 {
            return Err(DbError::decode("Row too short for compact row header"));
        }
        if row[0] != CODEC_VER {
            return Err(DbError::decode("Invalid row codec version").with_field("version", row[0]));
        }
        let large = row[1] & FLAG_LARGE != 0;
        let num_not_null = u16::from_le_bytes([row[2], row[3]]) as usize;
        let num_null = u16::from_le_bytes([row[4], row[5]]) as usize;
        let (id_width, offset_width) = if large { (4, 4) } else { (1, 2) };

        let rest = &row[6..];
        let ids_len = (num_not_null + num_null) * id_width;
        let (col_ids, rest) = rest
            .split_at_checked(ids_len)
            .ok_or_else(|| DbError::decode("Row truncated in column ids"))?;
        let (offsets, data) = rest
            .split_at_checked(num_not_null * offset_width)
            .ok_or_else(|| DbError::decode("Row truncated in offsets"))?;

        let parsed = CompactRow {
            large,
            num_not_null,
            num_null,
            col_ids,
            offsets,
            data,
        };
        if num_not_null > 0 && parsed.end_offset(num_not_null - 1) > data.len() {
            return Err(DbError::decode("Row value data truncated"));
        }
        Ok(parsed)
    }

    fn col_id(&self, idx: usize) -> u32 {
        if self.large {
            let b = &self.col_ids[idx * 4..idx * 4 + 4];
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            self.col_ids[idx] as u32
        }
    }

    fn end_offset(&self, idx: usize) -> usize {
        if self.large {
            let b = &self.offsets[idx * 4..idx * 4 + 4];
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
        } else {
            let b = &self.offsets[idx * 2..idx * 2 + 2];
            u16::from_le_bytes([b[0], b[1]]) as usize
        }
    }

    /// Binary search ids in `[lo, hi)`.
    fn search(&self, mut lo: usize, mut hi: usize, id: u32) -> Option<usize> {
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.col_id(mid).cmp(&id) {
                std::cmp::Ordering::Equal => return Some(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    /// Raw value bytes of a not-null column.
    pub fn value(&self, col_id: i64) -> Result<Option<&'a [u8]>> {
        let Ok(id) = u32::try_from(col_id) else {
            return Ok(None);
        };
        let Some(idx) = self.search(0, self.num_not_null, id) else {
            return Ok(None);
        };
        let start = if idx == 0 { 0 } else { self.end_offset(idx - 1) };
        let end = self.end_offset(idx);
        self.data
            .get(start..end)
            .map(Some)
            .ok_or_else(|| DbError::decode("Invalid value offsets in row").with_field("col_id", col_id))
    }

    pub fn is_null(&self, col_id: i64) -> bool {
        let Ok(id) = u32::try_from(col_id) else {
            return false;
        };
        self.search(self.num_not_null, self.num_not_null + self.num_null, id)
            .is_some()
    }

    /// Decode a column. `None` when the row doesn't contain it.
    pub fn datum(&self, col_id: i64, ft: &FieldType, tz: &Tz) -> Result<Option<Datum>> {
        if let Some(val) = self.value(col_id)? {
            return decode_value(val, ft, tz).map(Some);
        }
        if self.is_null(col_id) {
            return Ok(Some(Datum::Null));
        }
        Ok(None)
    }
}

/// Decode one compact-encoded value.
pub fn decode_value(val: &[u8], ft: &FieldType, tz: &Tz) -> Result<Datum> {
    let fsp = ft.decimal.clamp(0, 6) as i8;
    Ok(match ft.tp {
        MysqlType::Null => Datum::Null,
        MysqlType::Tiny
        | MysqlType::Short
        | MysqlType::Int24
        | MysqlType::Long
        | MysqlType::LongLong
        | MysqlType::Year => {
            if ft.is_unsigned() {
                Datum::Uint64(decode_compact_uint(val)?)
            } else {
                Datum::Int64(decode_compact_int(val)?)
            }
        }
        MysqlType::Float => Datum::Float32(decode_exact_float(val)? as f32),
        MysqlType::Double => Datum::Float64(decode_exact_float(val)?),
        MysqlType::NewDecimal => {
            let (rest, dec, _, _) = decode_decimal(val)?;
            if !rest.is_empty() {
                return Err(DbError::decode("Trailing bytes after decimal"));
            }
            Datum::Decimal(dec)
        }
        MysqlType::Date | MysqlType::Datetime | MysqlType::Timestamp => {
            let t = Time::from_packed_u64(decode_compact_uint(val)?, ft.tp, fsp)?;
            if ft.tp == MysqlType::Timestamp && !t.is_zero() {
                Datum::Time(t.convert_time_zone(&chrono_tz::UTC, tz)?)
            } else {
                Datum::Time(t)
            }
        }
        MysqlType::Duration => Datum::Duration(Duration::from_nanos(decode_compact_int(val)?, fsp)?),
        MysqlType::Enum => Datum::Enum(Enum::parse_with_value(&ft.elems, decode_compact_uint(val)?)?),
        MysqlType::Set => Datum::Set(Set::parse_with_value(&ft.elems, decode_compact_uint(val)?)?),
        MysqlType::Bit => {
            let byte_size = ((ft.flen.max(1) as usize) + 7) >> 3;
            Datum::BinaryLiteral(BinaryLiteral::from_u64(
                decode_compact_uint(val)?,
                Some(byte_size),
            ))
        }
        _ if ft.charset == CHARSET_BIN => Datum::Bytes(val.to_vec()),
        _ => Datum::String(
            std::str::from_utf8(val)
                .map_err(|_| DbError::decode("Invalid utf8 in string column"))?
                .to_string(),
        ),
    })
}

fn decode_exact_float(val: &[u8]) -> Result<f64> {
    let (rest, v) = decode_float(val)?;
    if !rest.is_empty() {
        return Err(DbError::decode("Trailing bytes after float"));
    }
    Ok(v)
}
