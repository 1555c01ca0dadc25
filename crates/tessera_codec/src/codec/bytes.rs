//! Byte string encodings.
//!
//! The comparable form splits the input into 8 byte groups, each followed by
//! a marker byte. A full group is marked with `0xFF`, the final group is
//! zero padded and marked with `0xFF - pad_len`. For example:
//!
//! ```text
//! []                  -> [0, 0, 0, 0, 0, 0, 0, 0, 247]
//! [1, 2, 3]           -> [1, 2, 3, 0, 0, 0, 0, 0, 250]
//! [1, 2, 3, 0]        -> [1, 2, 3, 0, 0, 0, 0, 0, 251]
//! [1, 2, 3, 4, 5, 6, 7, 8]
//!   -> [1, 2, 3, 4, 5, 6, 7, 8, 255, 0, 0, 0, 0, 0, 0, 0, 0, 247]
//! ```

use tessera_error::{DbError, Result};

use super::number::{decode_varint, encode_varint};

const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xFF;
const ENC_PAD: u8 = 0x00;

/// Append the memcomparable form of `data`.
pub fn encode_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    let groups = data.len() / ENC_GROUP_SIZE + 1;
    buf.reserve(groups * (ENC_GROUP_SIZE + 1));

    let mut chunks = data.chunks_exact(ENC_GROUP_SIZE);
    for chunk in &mut chunks {
        buf.extend_from_slice(chunk);
        buf.push(ENC_MARKER);
    }
    let rem = chunks.remainder();
    let pad = ENC_GROUP_SIZE - rem.len();
    buf.extend_from_slice(rem);
    buf.extend(std::iter::repeat_n(ENC_PAD, pad));
    buf.push(ENC_MARKER - pad as u8);
}

/// Number of bytes the comparable encoding of `data` occupies.
pub fn encoded_bytes_len(data_len: usize) -> usize {
    (data_len / ENC_GROUP_SIZE + 1) * (ENC_GROUP_SIZE + 1)
}

/// Decode a memcomparable byte string, returning the remaining input.
pub fn decode_bytes(mut buf: &[u8]) -> Result<(&[u8], Vec<u8>)> {
    let mut data = Vec::with_capacity(buf.len());
    loop {
        let Some((group, rest)) = buf.split_at_checked(ENC_GROUP_SIZE + 1) else {
            return Err(DbError::decode("Insufficient bytes to decode value"));
        };
        let marker = group[ENC_GROUP_SIZE];
        let pad = (ENC_MARKER - marker) as usize;
        if pad > ENC_GROUP_SIZE {
            return Err(DbError::decode("Invalid marker byte").with_field("marker", marker));
        }
        let real = ENC_GROUP_SIZE - pad;
        data.extend_from_slice(&group[..real]);
        buf = rest;

        if pad != 0 {
            if group[real..ENC_GROUP_SIZE].iter().any(|&b| b != ENC_PAD) {
                return Err(DbError::decode("Invalid padding byte"));
            }
            return Ok((buf, data));
        }
    }
}

/// Length of the comparable encoding at the start of `buf`, without copying.
pub fn peek_bytes_len(buf: &[u8]) -> Result<usize> {
    let mut offset = 0;
    loop {
        let marker = *buf
            .get(offset + ENC_GROUP_SIZE)
            .ok_or_else(|| DbError::decode("Insufficient bytes to decode value"))?;
        offset += ENC_GROUP_SIZE + 1;
        let pad = (ENC_MARKER - marker) as usize;
        if pad > ENC_GROUP_SIZE {
            return Err(DbError::decode("Invalid marker byte").with_field("marker", marker));
        }
        if pad != 0 {
            return Ok(offset);
        }
    }
}

/// Append a length-prefixed byte string. Not order preserving.
pub fn encode_compact_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    encode_varint(buf, data.len() as i64);
    buf.extend_from_slice(data);
}

pub fn decode_compact_bytes(buf: &[u8]) -> Result<(&[u8], Vec<u8>)> {
    let (rest, len) = decode_varint(buf)?;
    let len = usize::try_from(len)
        .map_err(|_| DbError::decode(format!("Invalid compact bytes length {len}")))?;
    let (data, rest) = rest
        .split_at_checked(len)
        .ok_or_else(|| DbError::decode("Insufficient bytes to decode value"))?;
    Ok((rest, data.to_vec()))
}

/// Total length of a compact byte string at the start of `buf`.
pub fn peek_compact_bytes_len(buf: &[u8]) -> Result<usize> {
    let (rest, len) = decode_varint(buf)?;
    let prefix = buf.len() - rest.len();
    let len = usize::try_from(len)
        .map_err(|_| DbError::decode(format!("Invalid compact bytes length {len}")))?;
    if rest.len() < len {
        return Err(DbError::decode("Insufficient bytes to decode value"));
    }
    Ok(prefix + len)
}
