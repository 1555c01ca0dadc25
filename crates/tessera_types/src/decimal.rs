use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use num_traits::{Signed, Zero, checked_pow};
use tessera_error::{DbError, Result};

/// Max total digits a decimal may hold.
pub const MAX_DECIMAL_PRECISION: u8 = 38;
/// Max digits after the decimal point.
pub const MAX_DECIMAL_SCALE: u8 = 30;
/// Extra fractional digits produced by division.
pub const DIV_PRECISION_INCREMENT: u8 = 4;

/// Fixed point decimal stored as a scaled 128-bit integer.
///
/// `value = mantissa * 10^-scale`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

fn pow10(exp: u8) -> Option<i128> {
    checked_pow(10_i128, exp as usize)
}

fn digit_count(v: i128) -> u8 {
    let mut v = v.unsigned_abs();
    let mut n = 1;
    while v >= 10 {
        v /= 10;
        n += 1;
    }
    n
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    pub fn try_new(mantissa: i128, scale: u8) -> Result<Self> {
        if scale > MAX_DECIMAL_SCALE {
            return Err(DbError::new(format!(
                "Decimal scale {scale} exceeds max of {MAX_DECIMAL_SCALE}"
            )));
        }
        let dec = Decimal { mantissa, scale };
        if dec.precision() > MAX_DECIMAL_PRECISION {
            return Err(DbError::new(format!(
                "Decimal precision {} exceeds max of {MAX_DECIMAL_PRECISION}",
                dec.precision()
            )));
        }
        Ok(dec)
    }

    pub fn from_i64(v: i64) -> Self {
        Decimal {
            mantissa: v as i128,
            scale: 0,
        }
    }

    pub fn from_u64(v: u64) -> Self {
        Decimal {
            mantissa: v as i128,
            scale: 0,
        }
    }

    /// Convert from a float, keeping at most `MAX_DECIMAL_SCALE` digits.
    pub fn from_f64(v: f64) -> Result<Self> {
        if !v.is_finite() {
            return Err(DbError::new(format!("Cannot convert {v} to decimal")));
        }
        // Shortest representation that round trips.
        format!("{v}").parse()
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Total number of significant digits, counting the fractional part.
    pub fn precision(&self) -> u8 {
        digit_count(self.mantissa).max(self.scale).max(1)
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa.is_negative()
    }

    /// Change the scale, rounding half away from zero when reducing it.
    pub fn rescale(&self, scale: u8) -> Result<Self> {
        match scale.cmp(&self.scale) {
            Ordering::Equal => Ok(*self),
            Ordering::Greater => {
                let mul = pow10(scale - self.scale)
                    .ok_or_else(|| DbError::new("Decimal rescale overflow"))?;
                let mantissa = self
                    .mantissa
                    .checked_mul(mul)
                    .ok_or_else(|| DbError::new("Decimal rescale overflow"))?;
                Self::try_new(mantissa, scale)
            }
            Ordering::Less => {
                let div = pow10(self.scale - scale)
                    .ok_or_else(|| DbError::new("Decimal rescale overflow"))?;
                let mut q = self.mantissa / div;
                let r = self.mantissa % div;
                if r.abs() * 2 >= div {
                    q += self.mantissa.signum();
                }
                Self::try_new(q, scale)
            }
        }
    }

    /// Integer and fractional parts, fractional part scaled to `scale`.
    fn split(&self, scale: u8) -> (i128, i128) {
        // Scale is at most 30 and always >= self.scale here.
        let div = pow10(self.scale).unwrap_or(1);
        let int = self.mantissa / div;
        let frac = self.mantissa % div;
        let frac = frac * pow10(scale - self.scale).unwrap_or(1);
        (int, frac)
    }

    pub fn checked_add(&self, other: &Decimal) -> Option<Decimal> {
        let scale = self.scale.max(other.scale);
        let a = self.rescale(scale).ok()?;
        let b = other.rescale(scale).ok()?;
        Decimal::try_new(a.mantissa.checked_add(b.mantissa)?, scale).ok()
    }

    pub fn checked_sub(&self, other: &Decimal) -> Option<Decimal> {
        self.checked_add(&other.neg())
    }

    pub fn checked_mul(&self, other: &Decimal) -> Option<Decimal> {
        let mantissa = self.mantissa.checked_mul(other.mantissa)?;
        let scale = self.scale + other.scale;
        let dec = Decimal { mantissa, scale };
        if scale > MAX_DECIMAL_SCALE {
            return dec.rescale(MAX_DECIMAL_SCALE).ok();
        }
        Decimal::try_new(mantissa, scale).ok()
    }

    /// Division, `None` when dividing by zero or on overflow.
    pub fn checked_div(&self, other: &Decimal) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        let scale = (self.scale + DIV_PRECISION_INCREMENT).min(MAX_DECIMAL_SCALE);
        // a/10^sa / (b/10^sb) = (a * 10^(scale - sa + sb) / b) / 10^scale
        let shift = (scale + other.scale).checked_sub(self.scale)?;
        // One extra digit for rounding.
        let num = self.mantissa.checked_mul(pow10(shift + 1)?)?;
        let q = num / other.mantissa;
        let rounded = (q + 5 * q.signum()) / 10;
        Decimal::try_new(rounded, scale).ok()
    }

    pub fn neg(&self) -> Decimal {
        Decimal {
            mantissa: -self.mantissa,
            scale: self.scale,
        }
    }

    pub fn to_f64(&self) -> f64 {
        // Go through the string form to avoid accumulated error.
        self.to_string().parse().unwrap_or(0.0)
    }

    /// Truncate toward zero. Errors if the integer part doesn't fit.
    pub fn to_i64(&self) -> Result<i64> {
        let rounded = self.rescale(0)?;
        i64::try_from(rounded.mantissa)
            .map_err(|_| DbError::new(format!("Decimal {self} out of range for BIGINT")))
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        let (ai, af) = self.split(scale);
        let (bi, bf) = other.split(scale);
        ai.cmp(&bi).then(af.cmp(&bf))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{sign}{abs}");
        }
        let div = 10_u128.pow(self.scale as u32);
        let int = abs / div;
        let frac = abs % div;
        write!(
            f,
            "{sign}{int}.{frac:0width$}",
            width = self.scale as usize
        )
    }
}

impl FromStr for Decimal {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let err = || DbError::new(format!("Invalid decimal string: '{s}'"));

        let (mantissa_str, exp) = match s.find(['e', 'E']) {
            Some(idx) => {
                let exp: i32 = s[idx + 1..].parse().map_err(|_| err())?;
                (&s[..idx], exp)
            }
            None => (s, 0),
        };

        let (neg, digits) = match mantissa_str.as_bytes().first() {
            Some(b'-') => (true, &mantissa_str[1..]),
            Some(b'+') => (false, &mantissa_str[1..]),
            _ => (false, mantissa_str),
        };

        let (int_part, frac_part) = match digits.find('.') {
            Some(idx) => (&digits[..idx], &digits[idx + 1..]),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }

        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            if !b.is_ascii_digit() {
                return Err(err());
            }
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add((b - b'0') as i128))
                .ok_or_else(err)?;
        }
        if neg {
            mantissa = -mantissa;
        }

        let mut scale = frac_part.len() as i32 - exp;
        if scale < 0 {
            let mul = pow10((-scale) as u8).ok_or_else(err)?;
            mantissa = mantissa.checked_mul(mul).ok_or_else(err)?;
            scale = 0;
        }

        let dec = Decimal {
            mantissa,
            scale: scale.min(u8::MAX as i32) as u8,
        };
        if dec.scale > MAX_DECIMAL_SCALE {
            return dec.rescale(MAX_DECIMAL_SCALE);
        }
        Decimal::try_new(dec.mantissa, dec.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("-12.345", dec("-12.345").to_string());
        assert_eq!("0.111", dec("0.111").to_string());
        assert_eq!("1000", dec("1e3").to_string());
        assert_eq!("0.05", dec("5e-2").to_string());
        assert_eq!("0", dec("0").to_string());
    }

    #[test]
    fn parse_invalid() {
        assert!("".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
    }

    #[test]
    fn equal_across_scales() {
        assert_eq!(dec("1.0"), dec("1.00"));
        assert!(dec("-0.5") < dec("0.1"));
        assert!(dec("10.01") > dec("10.001"));
    }

    #[test]
    fn precision() {
        assert_eq!(3, dec("0.111").precision());
        assert_eq!(5, dec("123.45").precision());
        assert_eq!(1, Decimal::ZERO.precision());
    }

    #[test]
    fn rescale_rounds() {
        assert_eq!("1.24", dec("1.235").rescale(2).unwrap().to_string());
        assert_eq!("-1.24", dec("-1.235").rescale(2).unwrap().to_string());
        assert_eq!("1.2000", dec("1.2").rescale(4).unwrap().to_string());
    }

    #[test]
    fn arithmetic() {
        assert_eq!(dec("3.75"), dec("1.5").checked_add(&dec("2.25")).unwrap());
        assert_eq!(dec("-0.75"), dec("1.5").checked_sub(&dec("2.25")).unwrap());
        assert_eq!(dec("3.375"), dec("1.5").checked_mul(&dec("2.25")).unwrap());
        assert_eq!(
            "0.3333",
            Decimal::from_i64(1)
                .checked_div(&Decimal::from_i64(3))
                .unwrap()
                .to_string()
        );
        assert!(dec("1").checked_div(&Decimal::ZERO).is_none());
    }

    #[test]
    fn too_precise() {
        assert!(Decimal::try_new(i128::MAX, 0).is_err());
        assert!(Decimal::try_new(1, 31).is_err());
    }

    #[test]
    fn from_float() {
        assert_eq!(dec("123.45"), Decimal::from_f64(123.45).unwrap());
        assert!(Decimal::from_f64(f64::NAN).is_err());
    }
}
