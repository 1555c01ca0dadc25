//! Fixed width and variable width integer and float encodings.
//!
//! The fixed width forms are big-endian with the sign bit flipped so that
//! memcmp order matches numeric order. Varints use zigzag + LEB128.

use tessera_error::{DbError, Result};

const SIGN_MASK: u64 = 0x8000_0000_0000_0000;

/// Max bytes a 64-bit varint can take.
pub const MAX_VARINT_LEN: usize = 10;

#[inline]
pub fn encode_int_to_cmp_uint(v: i64) -> u64 {
    (v as u64) ^ SIGN_MASK
}

#[inline]
pub fn decode_cmp_uint_to_int(u: u64) -> i64 {
    (u ^ SIGN_MASK) as i64
}

/// Append a comparable i64.
pub fn encode_int(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&encode_int_to_cmp_uint(v).to_be_bytes());
}

/// Append a comparable i64 that sorts in descending order.
pub fn encode_int_desc(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&(!encode_int_to_cmp_uint(v)).to_be_bytes());
}

pub fn encode_uint(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn read_u64_be(buf: &[u8]) -> Result<(&[u8], u64)> {
    let (head, rest) = buf
        .split_first_chunk::<8>()
        .ok_or_else(|| DbError::decode(format!("Insufficient bytes to decode value, got {}", buf.len())))?;
    Ok((rest, u64::from_be_bytes(*head)))
}

pub fn decode_int(buf: &[u8]) -> Result<(&[u8], i64)> {
    let (rest, u) = read_u64_be(buf)?;
    Ok((rest, decode_cmp_uint_to_int(u)))
}

pub fn decode_int_desc(buf: &[u8]) -> Result<(&[u8], i64)> {
    let (rest, u) = read_u64_be(buf)?;
    Ok((rest, decode_cmp_uint_to_int(!u)))
}

pub fn decode_uint(buf: &[u8]) -> Result<(&[u8], u64)> {
    read_u64_be(buf)
}

/// Map float bits so that the unsigned order matches float order.
///
/// Non-negative values get the sign bit set, negative values are inverted.
/// Negative zero is treated as zero.
#[inline]
pub fn encode_float_to_cmp_uint(f: f64) -> u64 {
    let mut u = f.to_bits();
    if f >= 0.0 {
        u |= SIGN_MASK;
    } else {
        u = !u;
    }
    u
}

#[inline]
pub fn decode_cmp_uint_to_float(u: u64) -> f64 {
    let u = if u & SIGN_MASK != 0 { u & !SIGN_MASK } else { !u };
    f64::from_bits(u)
}

pub fn encode_float(buf: &mut Vec<u8>, f: f64) {
    encode_uint(buf, encode_float_to_cmp_uint(f));
}

pub fn decode_float(buf: &[u8]) -> Result<(&[u8], f64)> {
    let (rest, u) = read_u64_be(buf)?;
    Ok((rest, decode_cmp_uint_to_float(u)))
}

pub fn encode_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

pub fn encode_varint(buf: &mut Vec<u8>, v: i64) {
    // Zigzag so small negative numbers stay small.
    let ux = ((v as u64) << 1) ^ ((v >> 63) as u64);
    encode_uvarint(buf, ux)
}

pub fn decode_uvarint(buf: &[u8]) -> Result<(&[u8], u64)> {
    let mut v: u64 = 0;
    for (idx, &b) in buf.iter().enumerate() {
        if idx == MAX_VARINT_LEN || (idx == MAX_VARINT_LEN - 1 && b > 1) {
            return Err(DbError::decode("Value larger than 64 bits"));
        }
        v |= ((b & 0x7f) as u64) << (7 * idx);
        if b < 0x80 {
            return Ok((&buf[idx + 1..], v));
        }
    }
    Err(DbError::decode("Insufficient bytes to decode varint"))
}

pub fn decode_varint(buf: &[u8]) -> Result<(&[u8], i64)> {
    let (rest, ux) = decode_uvarint(buf)?;
    let v = ((ux >> 1) as i64) ^ -((ux & 1) as i64);
    Ok((rest, v))
}

/// Little-endian integer using the fewest of 1, 2, 4 or 8 bytes.
pub fn encode_compact_int(buf: &mut Vec<u8>, v: i64) {
    if let Ok(v) = i8::try_from(v) {
        buf.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i16::try_from(v) {
        buf.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i32::try_from(v) {
        buf.extend_from_slice(&v.to_le_bytes());
    } else {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

pub fn encode_compact_uint(buf: &mut Vec<u8>, v: u64) {
    if let Ok(v) = u8::try_from(v) {
        buf.push(v);
    } else if let Ok(v) = u16::try_from(v) {
        buf.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = u32::try_from(v) {
        buf.extend_from_slice(&v.to_le_bytes());
    } else {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

/// Decode a value written by [`encode_compact_int`], the whole slice is the
/// value.
pub fn decode_compact_int(val: &[u8]) -> Result<i64> {
    Ok(match val.len() {
        1 => val[0] as i8 as i64,
        2 => i16::from_le_bytes([val[0], val[1]]) as i64,
        4 => i32::from_le_bytes([val[0], val[1], val[2], val[3]]) as i64,
        8 => i64::from_le_bytes(val.try_into().map_err(|_| DbError::decode("Bad int"))?),
        n => return Err(DbError::decode(format!("Invalid compact int length {n}"))),
    })
}

pub fn decode_compact_uint(val: &[u8]) -> Result<u64> {
    Ok(match val.len() {
        1 => val[0] as u64,
        2 => u16::from_le_bytes([val[0], val[1]]) as u64,
        4 => u32::from_le_bytes([val[0], val[1], val[2], val[3]]) as u64,
        8 => u64::from_le_bytes(val.try_into().map_err(|_| DbError::decode("Bad uint"))?),
        n => return Err(DbError::decode(format!("Invalid compact uint length {n}"))),
    })
}
