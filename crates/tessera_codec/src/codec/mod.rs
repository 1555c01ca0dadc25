//! Self-describing datum encodings.
//!
//! Every encoded datum starts with a flag byte naming its wire form. The
//! "key" encoding is memcomparable so multi-column keys sort correctly, the
//! "value" encoding is compact and only needs to round trip.

pub mod bytes;
pub mod decimal;
pub mod number;

use tessera_error::{DbError, Result};
use tessera_types::{Datum, Duration};
use tracing::debug;

use self::bytes::{
    decode_bytes, decode_compact_bytes, encode_bytes, encode_compact_bytes, peek_bytes_len,
    peek_compact_bytes_len,
};
use self::decimal::{ENCODED_DECIMAL_LEN, decode_decimal, encode_decimal};
use self::number::{
    MAX_VARINT_LEN, decode_float, decode_int, decode_uint, decode_uvarint, decode_varint,
    encode_float, encode_int, encode_uint, encode_uvarint, encode_varint,
};

pub const NIL_FLAG: u8 = 0;
pub const BYTES_FLAG: u8 = 1;
pub const COMPACT_BYTES_FLAG: u8 = 2;
pub const INT_FLAG: u8 = 3;
pub const UINT_FLAG: u8 = 4;
pub const FLOAT_FLAG: u8 = 5;
pub const DECIMAL_FLAG: u8 = 6;
pub const DURATION_FLAG: u8 = 7;
pub const VARINT_FLAG: u8 = 8;
pub const UVARINT_FLAG: u8 = 9;
pub const MAX_FLAG: u8 = 250;

/// Encode datums in the memcomparable form.
pub fn encode_key(datums: &[Datum]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(&mut buf, datums, true)?;
    Ok(buf)
}

/// Encode datums in the compact, non-comparable form.
pub fn encode_value(datums: &[Datum]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(&mut buf, datums, false)?;
    Ok(buf)
}

/// Append encoded datums to `buf`.
///
/// Timestamps must already be converted to UTC by the caller.
pub fn encode_into(buf: &mut Vec<u8>, datums: &[Datum], comparable: bool) -> Result<()> {
    for datum in datums {
        match datum {
            Datum::Null => buf.push(NIL_FLAG),
            Datum::Int64(v) => encode_signed(buf, *v, comparable),
            Datum::Uint64(v) => encode_unsigned(buf, *v, comparable),
            Datum::Float32(v) => {
                buf.push(FLOAT_FLAG);
                encode_float(buf, *v as f64);
            }
            Datum::Float64(v) => {
                buf.push(FLOAT_FLAG);
                encode_float(buf, *v);
            }
            Datum::String(s) => encode_byte_string(buf, s.as_bytes(), comparable),
            Datum::Bytes(b) => encode_byte_string(buf, b, comparable),
            Datum::Decimal(d) => {
                buf.push(DECIMAL_FLAG);
                encode_decimal(buf, d, 0, 0)?;
            }
            Datum::Time(t) => encode_unsigned(buf, t.to_packed_u64(), comparable),
            Datum::Duration(d) => {
                buf.push(DURATION_FLAG);
                encode_int(buf, d.nanos());
            }
            Datum::Enum(e) => encode_unsigned(buf, e.value, comparable),
            Datum::Set(s) => encode_unsigned(buf, s.value, comparable),
            Datum::BinaryLiteral(b) => encode_unsigned(buf, b.to_u64()?, comparable),
            Datum::MinNotNull => buf.push(BYTES_FLAG),
            Datum::MaxValue => buf.push(MAX_FLAG),
        }
    }
    Ok(())
}

fn encode_signed(buf: &mut Vec<u8>, v: i64, comparable: bool) {
    if comparable {
        buf.push(INT_FLAG);
        encode_int(buf, v);
    } else {
        buf.push(VARINT_FLAG);
        encode_varint(buf, v);
    }
}

fn encode_unsigned(buf: &mut Vec<u8>, v: u64, comparable: bool) {
    if comparable {
        buf.push(UINT_FLAG);
        encode_uint(buf, v);
    } else {
        buf.push(UVARINT_FLAG);
        encode_uvarint(buf, v);
    }
}

fn encode_byte_string(buf: &mut Vec<u8>, data: &[u8], comparable: bool) {
    if comparable {
        buf.push(BYTES_FLAG);
        encode_bytes(buf, data);
    } else {
        buf.push(COMPACT_BYTES_FLAG);
        encode_compact_bytes(buf, data);
    }
}

/// Decode the first datum in `buf`, returning the remaining bytes.
///
/// The result is the raw wire type: unsigned values stay `Uint64` and byte
/// strings stay `Bytes` until converted with a field type.
pub fn decode_one(buf: &[u8]) -> Result<(&[u8], Datum)> {
    let (&flag, buf) = buf
        .split_first()
        .ok_or_else(|| DbError::decode("Invalid encoded key: empty input"))?;
    match flag {
        NIL_FLAG => Ok((buf, Datum::Null)),
        INT_FLAG => decode_int(buf).map(|(rest, v)| (rest, Datum::Int64(v))),
        UINT_FLAG => decode_uint(buf).map(|(rest, v)| (rest, Datum::Uint64(v))),
        VARINT_FLAG => decode_varint(buf).map(|(rest, v)| (rest, Datum::Int64(v))),
        UVARINT_FLAG => decode_uvarint(buf).map(|(rest, v)| (rest, Datum::Uint64(v))),
        FLOAT_FLAG => decode_float(buf).map(|(rest, v)| (rest, Datum::Float64(v))),
        BYTES_FLAG => decode_bytes(buf).map(|(rest, v)| (rest, Datum::Bytes(v))),
        COMPACT_BYTES_FLAG => decode_compact_bytes(buf).map(|(rest, v)| (rest, Datum::Bytes(v))),
        DECIMAL_FLAG => decode_decimal(buf).map(|(rest, v, _, _)| (rest, Datum::Decimal(v))),
        DURATION_FLAG => {
            let (rest, nanos) = decode_int(buf)?;
            Ok((rest, Datum::Duration(Duration::from_nanos(nanos, 0)?)))
        }
        MAX_FLAG => Ok((buf, Datum::MaxValue)),
        other => {
            debug!(flag = other, "unknown value flag");
            Err(DbError::decode("Invalid encoded key flag").with_field("flag", other))
        }
    }
}

/// Length in bytes of the first encoded datum, flag included.
pub fn peek(buf: &[u8]) -> Result<usize> {
    let (&flag, rest) = buf
        .split_first()
        .ok_or_else(|| DbError::decode("Invalid encoded key: empty input"))?;
    let len = match flag {
        NIL_FLAG | MAX_FLAG => 0,
        INT_FLAG | UINT_FLAG | FLOAT_FLAG | DURATION_FLAG => 8,
        BYTES_FLAG => peek_bytes_len(rest)?,
        COMPACT_BYTES_FLAG => peek_compact_bytes_len(rest)?,
        DECIMAL_FLAG => ENCODED_DECIMAL_LEN,
        VARINT_FLAG | UVARINT_FLAG => peek_uvarint_len(rest)?,
        other => {
            debug!(flag = other, "unknown value flag");
            return Err(DbError::decode("Invalid encoded key flag").with_field("flag", other));
        }
    };
    if rest.len() < len {
        return Err(DbError::decode("Insufficient bytes to decode value")
            .with_field("flag", flag)
            .with_field("need", len)
            .with_field("have", rest.len()));
    }
    Ok(len + 1)
}

fn peek_uvarint_len(buf: &[u8]) -> Result<usize> {
    buf.iter()
        .take(MAX_VARINT_LEN)
        .position(|&b| b < 0x80)
        .map(|idx| idx + 1)
        .ok_or_else(|| DbError::decode("Invalid varint"))
}

/// Split off the first encoded datum without decoding it.
///
/// Returns `(datum_bytes, remaining)`.
pub fn cut_one(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    let len = peek(buf)?;
    Ok(buf.split_at(len))
}

/// Decode every datum in a range boundary key.
///
/// A trailing lone flag byte is a boundary marker: `NIL_FLAG` decodes to
/// NULL, `BYTES_FLAG` to the min-not-null marker and `MAX_FLAG` (or the
/// byte after it, produced by prefix-next) to the max-value marker.
pub fn decode_range(mut buf: &[u8], size_hint: usize) -> Result<Vec<Datum>> {
    if buf.is_empty() {
        return Err(DbError::invalid_key("Invalid encoded key: length of key is zero"));
    }
    let mut values = Vec::with_capacity(size_hint);
    while buf.len() > 1 {
        let (rest, datum) = decode_one(buf)?;
        values.push(datum);
        buf = rest;
    }
    if let [flag] = buf {
        match *flag {
            NIL_FLAG => values.push(Datum::Null),
            BYTES_FLAG => values.push(Datum::MinNotNull),
            MAX_FLAG | 251 => values.push(Datum::MaxValue),
            other => {
                return Err(DbError::invalid_key("Invalid encoded key flag").with_field("flag", other));
            }
        }
    }
    Ok(values)
}

/// Decode all datums in `buf`.
pub fn decode_all(mut buf: &[u8]) -> Result<Vec<Datum>> {
    let mut values = Vec::new();
    while !buf.is_empty() {
        let (rest, datum) = decode_one(buf)?;
        values.push(datum);
        buf = rest;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use tessera_types::{Decimal, Enum};

    use super::*;

    fn sample() -> Vec<Datum> {
        vec![
            Datum::Int64(-7),
            Datum::Uint64(7),
            Datum::Float64(5.5),
            Datum::Bytes(b"abc".to_vec()),
            Datum::Decimal("12.34".parse::<Decimal>().unwrap()),
            Datum::Null,
            Datum::Duration(Duration::from_nanos(1_000_000_000, 0).unwrap()),
        ]
    }

    #[test]
    fn key_and_value_round_trip() {
        for buf in [encode_key(&sample()).unwrap(), encode_value(&sample()).unwrap()] {
            assert_eq!(sample(), decode_all(&buf).unwrap());
        }
    }

    #[test]
    fn enum_encodes_as_unsigned() {
        let e = Datum::Enum(Enum {
            name: "a".to_string(),
            value: 1,
        });
        let buf = encode_value(&[e]).unwrap();
        assert_eq!(vec![UVARINT_FLAG, 1], buf);
        assert_eq!(Datum::Uint64(1), decode_one(&buf).unwrap().1);
    }

    #[test]
    fn cut_one_splits_values() {
        let buf = encode_key(&sample()).unwrap();
        let mut rest = buf.as_slice();
        let mut count = 0;
        while !rest.is_empty() {
            let (one, remaining) = cut_one(rest).unwrap();
            assert_eq!(sample()[count], decode_one(one).unwrap().1);
            rest = remaining;
            count += 1;
        }
        assert_eq!(sample().len(), count);
    }

    #[test]
    fn peek_rejects_truncated() {
        let buf = encode_key(&[Datum::Int64(1)]).unwrap();
        assert!(peek(&buf[..5]).is_err());
        assert!(peek(&[]).is_err());
        assert!(peek(&[42]).is_err());
    }

    #[test]
    fn range_markers() {
        let mut buf = encode_key(&[Datum::Int64(1)]).unwrap();
        buf.push(MAX_FLAG);
        assert_eq!(
            vec![Datum::Int64(1), Datum::MaxValue],
            decode_range(&buf, 2).unwrap()
        );

        let buf = encode_key(&[Datum::Int64(1), Datum::MinNotNull]).unwrap();
        assert_eq!(
            vec![Datum::Int64(1), Datum::MinNotNull],
            decode_range(&buf, 2).unwrap()
        );

        assert!(decode_range(&[], 0).is_err());
        assert!(decode_range(&[77], 1).is_err());
    }
}
