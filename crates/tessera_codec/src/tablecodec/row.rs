//! Row value encoding.
//!
//! The legacy format is a flat sequence of `(column id, value)` pairs using
//! the self-describing value codec, sorted by column id. An empty row is a
//! single `NIL_FLAG` byte. The compact format lives in [`super::rowcodec`],
//! decoding dispatches on the first byte.

use std::collections::HashMap;

use chrono_tz::Tz;
use tessera_error::{DbError, ErrorKind, Result};
use tessera_types::field_type::CHARSET_BIN;
use tessera_types::{BinaryLiteral, Datum, Duration, Enum, FieldType, MysqlType, Set, Time};
use tracing::trace;

use super::rowcodec::{self, CODEC_VER, CompactRow};
use crate::codec::{self, NIL_FLAG};

/// Which on-disk row layout to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFormat {
    /// Flat `(column id, value)` pairs.
    #[default]
    Legacy,
    /// Header with column ids and offsets followed by a value block.
    Compact,
}

/// Encode a row of `values` for the columns `col_ids`.
///
/// Timestamps are converted from `tz` to UTC before being stored.
pub fn encode_row(tz: &Tz, values: &[Datum], col_ids: &[i64], format: RowFormat) -> Result<Vec<u8>> {
    if values.len() != col_ids.len() {
        return Err(DbError::with_kind(
            ErrorKind::ColumnCountMismatch,
            format!(
                "Column count {} doesn't match value count {}",
                col_ids.len(),
                values.len()
            ),
        ));
    }
    if format == RowFormat::Compact {
        return rowcodec::encode(tz, col_ids, values);
    }
    if values.is_empty() {
        // Distinguishes an empty row from a missing one.
        return Ok(vec![NIL_FLAG]);
    }

    let mut cols: Vec<(i64, &Datum)> = col_ids.iter().copied().zip(values).collect();
    cols.sort_by_key(|(id, _)| *id);

    let mut flat = Vec::with_capacity(cols.len() * 2);
    for (id, value) in cols {
        flat.push(Datum::Int64(id));
        flat.push(flatten_datum(tz, value)?);
    }
    codec::encode_value(&flat)
}

/// Encode a single column value the way [`encode_row`] stores it.
pub fn encode_value(tz: &Tz, datum: &Datum) -> Result<Vec<u8>> {
    codec::encode_value(&[flatten_datum(tz, datum)?])
}

/// Convert datums to their stored representation.
pub fn flatten_datums(tz: &Tz, datums: &[Datum]) -> Result<Vec<Datum>> {
    datums.iter().map(|d| flatten_datum(tz, d)).collect()
}

fn flatten_datum(tz: &Tz, datum: &Datum) -> Result<Datum> {
    Ok(match datum {
        Datum::Time(t) => {
            let t = if t.tp() == MysqlType::Timestamp && !t.is_zero() && *tz != chrono_tz::UTC {
                t.convert_time_zone(tz, &chrono_tz::UTC)?
            } else {
                *t
            };
            Datum::Uint64(t.to_packed_u64())
        }
        Datum::Duration(d) => Datum::Int64(d.nanos()),
        Datum::Enum(e) => Datum::Uint64(e.value),
        Datum::Set(s) => Datum::Uint64(s.value),
        Datum::BinaryLiteral(b) => Datum::Uint64(b.to_u64()?),
        other => other.clone(),
    })
}

/// Convert stored datums back to their logical types.
pub fn unflatten_datums(datums: &[Datum], fts: &[FieldType], tz: &Tz) -> Result<Vec<Datum>> {
    if datums.len() != fts.len() {
        return Err(DbError::with_kind(
            ErrorKind::ColumnCountMismatch,
            format!("{} datums for {} field types", datums.len(), fts.len()),
        ));
    }
    datums
        .iter()
        .zip(fts)
        .map(|(d, ft)| unflatten_datum(d.clone(), ft, tz))
        .collect()
}

fn unflatten_datum(datum: Datum, ft: &FieldType, tz: &Tz) -> Result<Datum> {
    if datum.is_null() {
        return Ok(datum);
    }
    let fsp = ft.decimal.clamp(0, 6) as i8;
    let wrong_type = |datum: &Datum| {
        DbError::decode(format!(
            "Stored {} value does not match column type {}",
            datum.kind_name(),
            ft.tp
        ))
    };

    Ok(match ft.tp {
        MysqlType::Float => Datum::Float32(datum.to_f64()? as f32),
        MysqlType::Date | MysqlType::Datetime | MysqlType::Timestamp => {
            let Datum::Uint64(packed) = datum else {
                return Err(wrong_type(&datum));
            };
            let t = Time::from_packed_u64(packed, ft.tp, fsp)?;
            if ft.tp == MysqlType::Timestamp && !t.is_zero() {
                Datum::Time(t.convert_time_zone(&chrono_tz::UTC, tz)?)
            } else {
                Datum::Time(t)
            }
        }
        MysqlType::Duration => {
            let Datum::Int64(nanos) = datum else {
                return Err(wrong_type(&datum));
            };
            Datum::Duration(Duration::from_nanos(nanos, fsp)?)
        }
        MysqlType::Enum => Datum::Enum(Enum::parse_with_value(&ft.elems, datum.to_u64()?)?),
        MysqlType::Set => Datum::Set(Set::parse_with_value(&ft.elems, datum.to_u64()?)?),
        MysqlType::Bit => {
            let byte_size = ((ft.flen.max(1) as usize) + 7) >> 3;
            Datum::BinaryLiteral(BinaryLiteral::from_u64(datum.to_u64()?, Some(byte_size)))
        }
        MysqlType::Varchar | MysqlType::VarString | MysqlType::String | MysqlType::Blob
            if ft.charset != CHARSET_BIN =>
        {
            match datum {
                Datum::Bytes(b) => Datum::String(
                    String::from_utf8(b).map_err(|_| DbError::decode("Invalid utf8 in string column"))?,
                ),
                other => other,
            }
        }
        _ => datum,
    })
}

/// Decode a single stored column value.
pub fn decode_column_value(data: &[u8], ft: &FieldType, tz: &Tz) -> Result<Datum> {
    let (_, datum) = codec::decode_one(data)?;
    unflatten_datum(datum, ft, tz)
}

/// Decode the requested columns of a row.
///
/// Requested columns missing from the row are left out of the result,
/// encoded columns that weren't requested are skipped.
pub fn decode_row(data: &[u8], cols: &HashMap<i64, FieldType>, tz: &Tz) -> Result<HashMap<i64, Datum>> {
    let mut row = HashMap::with_capacity(cols.len());
    decode_row_with_map(data, cols, tz, &mut row)?;
    Ok(row)
}

/// Like [`decode_row`], but writes into `row`, reusing its allocation.
pub fn decode_row_with_map(
    data: &[u8],
    cols: &HashMap<i64, FieldType>,
    tz: &Tz,
    row: &mut HashMap<i64, Datum>,
) -> Result<()> {
    row.clear();
    if data.is_empty() || data == [NIL_FLAG] || cols.is_empty() {
        return Ok(());
    }

    if data[0] == CODEC_VER {
        let compact = CompactRow::parse(data)?;
        for (&id, ft) in cols {
            if let Some(datum) = compact.datum(id, ft, tz)? {
                row.insert(id, datum);
            }
        }
        return Ok(());
    }

    let mut rest = data;
    while !rest.is_empty() {
        let (remaining, id) = codec::decode_one(rest)?;
        let Datum::Int64(id) = id else {
            return Err(DbError::decode("Expected column id in row").with_field("got", id.kind_name()));
        };
        let (value, remaining) = codec::cut_one(remaining)?;
        rest = remaining;

        if let Some(ft) = cols.get(&id) {
            row.insert(id, decode_column_value(value, ft, tz)?);
            if row.len() == cols.len() {
                break;
            }
        } else {
            trace!(col_id = id, "skipping unrequested column");
        }
    }
    Ok(())
}

/// Decode `cols` in order, NULL for columns the row doesn't contain.
pub fn row_with_cols(data: &[u8], cols: &[(i64, FieldType)], tz: &Tz) -> Result<Vec<Datum>> {
    let types: HashMap<i64, FieldType> = cols.iter().cloned().collect();
    let mut row = decode_row(data, &types, tz)?;
    Ok(cols
        .iter()
        .map(|(id, _)| row.remove(id).unwrap_or(Datum::Null))
        .collect())
}

/// Cut the raw encoded values of the requested columns without decoding.
///
/// `col_offsets` maps a column id to its position in the output. Missing
/// columns are `None`. Legacy rows yield self-describing values including
/// the flag byte, compact rows yield the compact value bytes.
pub fn cut_row<'a>(data: &'a [u8], col_offsets: &HashMap<i64, usize>) -> Result<Vec<Option<&'a [u8]>>> {
    let mut out: Vec<Option<&[u8]>> = vec![None; col_offsets.len()];
    if data.is_empty() || data == [NIL_FLAG] {
        return Ok(out);
    }
    let mut slot = |offset: usize, value: &'a [u8]| -> Result<()> {
        let entry = out
            .get_mut(offset)
            .ok_or_else(|| DbError::new("Column offset out of range").with_field("offset", offset))?;
        *entry = Some(value);
        Ok(())
    };

    if data[0] == CODEC_VER {
        let compact = CompactRow::parse(data)?;
        for (&id, &offset) in col_offsets {
            if let Some(value) = compact.value(id)? {
                slot(offset, value)?;
            }
        }
        return Ok(out);
    }

    let mut rest = data;
    let mut found = 0;
    while !rest.is_empty() && found < col_offsets.len() {
        let (id, remaining) = codec::cut_one(rest)?;
        let (value, remaining) = codec::cut_one(remaining)?;
        rest = remaining;
        let (_, id) = codec::decode_one(id)?;
        let Datum::Int64(id) = id else {
            return Err(DbError::decode("Expected column id in row"));
        };
        if let Some(&offset) = col_offsets.get(&id) {
            slot(offset, value)?;
            found += 1;
        }
    }
    Ok(out)
}
