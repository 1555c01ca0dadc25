use tessera_error::{DbError, Result};
use tessera_types::Decimal;
use tessera_types::decimal::{MAX_DECIMAL_PRECISION, MAX_DECIMAL_SCALE};

/// Encoded length: head byte, 16 byte mantissa, precision byte, frac byte.
pub const ENCODED_DECIMAL_LEN: usize = 1 + 16 + 2;

const ZERO_HEAD: u8 = 0x80;
const POSITIVE_BASE: i32 = 0xC0;
const NEGATIVE_BASE: i32 = 0x3F;

fn pow10(exp: u32) -> Option<u128> {
    10_u128.checked_pow(exp)
}

/// Append a decimal as `[head, mantissa, precision, frac]`.
///
/// The head byte holds the sign and the decimal exponent, the mantissa is
/// the significant digits left aligned to `MAX_DECIMAL_PRECISION` digits.
/// Both are inverted for negative values, so encoded bytes sort by value
/// regardless of scale. Equal values with different scales are ordered by
/// the trailing precision and frac.
///
/// A zero `precision` uses the value's own precision and scale. Otherwise
/// the value is rescaled to `frac`.
pub fn encode_decimal(buf: &mut Vec<u8>, dec: &Decimal, precision: u8, frac: u8) -> Result<()> {
    let (dec, precision) = if precision == 0 {
        (*dec, dec.precision())
    } else {
        (dec.rescale(frac)?, precision)
    };
    if dec.precision() > precision {
        return Err(DbError::new(format!(
            "Decimal {dec} does not fit in precision {precision}"
        )));
    }

    let (head, body) = normalize(&dec)?;
    buf.push(head);
    buf.extend_from_slice(&body.to_be_bytes());
    buf.push(precision);
    buf.push(dec.scale());
    Ok(())
}

fn normalize(dec: &Decimal) -> Result<(u8, u128)> {
    let mantissa = dec.mantissa();
    if mantissa == 0 {
        return Ok((ZERO_HEAD, 0));
    }
    let mut abs = mantissa.unsigned_abs();
    let mut scale = dec.scale() as i32;
    while abs % 10 == 0 {
        abs /= 10;
        scale -= 1;
    }
    let digits = abs.ilog10() as i32 + 1;
    let exp = digits - scale;
    let body = pow10((MAX_DECIMAL_PRECISION as i32 - digits) as u32)
        .and_then(|mul| abs.checked_mul(mul))
        .ok_or_else(|| DbError::new(format!("Decimal {dec} exceeds max precision")))?;

    if mantissa > 0 {
        Ok(((POSITIVE_BASE + exp) as u8, body))
    } else {
        Ok(((NEGATIVE_BASE - exp) as u8, !body))
    }
}

/// Decode a decimal, returning it with its stored precision and frac.
pub fn decode_decimal(buf: &[u8]) -> Result<(&[u8], Decimal, u8, u8)> {
    let Some((encoded, rest)) = buf.split_at_checked(ENCODED_DECIMAL_LEN) else {
        return Err(DbError::decode("Insufficient bytes to decode decimal"));
    };
    let head = encoded[0];
    let mut body = [0; 16];
    body.copy_from_slice(&encoded[1..17]);
    let body = u128::from_be_bytes(body);
    let precision = encoded[17];
    let frac = encoded[18];

    if precision == 0 || precision > MAX_DECIMAL_PRECISION {
        return Err(DbError::decode("Invalid decimal precision").with_field("precision", precision));
    }
    if frac > MAX_DECIMAL_SCALE || frac > precision {
        return Err(DbError::decode("Invalid decimal frac")
            .with_field("precision", precision)
            .with_field("frac", frac));
    }

    let mantissa = match head {
        ZERO_HEAD if body == 0 => 0,
        ZERO_HEAD => return Err(DbError::decode("Non-zero mantissa for zero decimal")),
        h if h > ZERO_HEAD => denormalize(body, h as i32 - POSITIVE_BASE, frac)?,
        h => -denormalize(!body, NEGATIVE_BASE - h as i32, frac)?,
    };

    let dec = Decimal::try_new(mantissa, frac)
        .map_err(|e| DbError::decode(format!("Corrupt decimal: {e}")))?;
    if dec.precision() > precision {
        return Err(DbError::decode("Decimal mantissa wider than its precision")
            .with_field("precision", precision)
            .with_field("value", dec));
    }
    Ok((rest, dec, precision, frac))
}

/// Scale a left aligned mantissa with exponent `exp` back to `frac` digits.
fn denormalize(body: u128, exp: i32, frac: u8) -> Result<i128> {
    let width = MAX_DECIMAL_PRECISION as u32;
    let (lo, hi) = (pow10(width - 1), pow10(width));
    if lo.is_none_or(|lo| body < lo) || hi.is_none_or(|hi| body >= hi) {
        return Err(DbError::decode("Decimal mantissa not normalized"));
    }

    let shift = width as i32 - exp - frac as i32;
    let abs = if shift >= 0 {
        let div = pow10(shift as u32)
            .ok_or_else(|| DbError::decode("Decimal exponent out of range").with_field("exp", exp))?;
        if body % div != 0 {
            return Err(DbError::decode("Decimal digits exceed frac").with_field("frac", frac));
        }
        body / div
    } else {
        pow10(shift.unsigned_abs())
            .and_then(|mul| body.checked_mul(mul))
            .ok_or_else(|| DbError::decode("Decimal exponent out of range").with_field("exp", exp))?
    };
    i128::try_from(abs).map_err(|_| DbError::decode("Decimal mantissa overflow"))
}
