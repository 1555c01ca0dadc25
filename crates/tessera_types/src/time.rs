use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use tessera_error::{DbError, ErrorKind, Result};

use crate::field_type::{MAX_FSP, MysqlType};

/// Calendar fields of a date or datetime.
///
/// Kept as raw fields instead of a chrono type so the zero date
/// (`0000-00-00`) can be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CoreTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

impl CoreTime {
    fn to_naive(self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?;
        let time = NaiveTime::from_hms_micro_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
            self.microsecond,
        )?;
        Some(NaiveDateTime::new(date, time))
    }

    fn from_naive(dt: NaiveDateTime) -> Self {
        CoreTime {
            year: dt.year() as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
            microsecond: dt.nanosecond() / 1000,
        }
    }
}

/// A DATE, DATETIME or TIMESTAMP value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Time {
    core: CoreTime,
    tp: MysqlType,
    fsp: i8,
}

impl Time {
    pub fn new(core: CoreTime, tp: MysqlType, fsp: i8) -> Result<Self> {
        if !tp.is_time_kind() {
            return Err(DbError::new(format!("{tp} is not a time type")));
        }
        if core != CoreTime::default() && core.to_naive().is_none() {
            return Err(DbError::new(format!("Invalid time value: {core:?}")));
        }
        let mut t = Time {
            core,
            tp,
            fsp: check_fsp(fsp as i32)?,
        };
        if tp == MysqlType::Date {
            t.truncate_to_date();
        }
        Ok(t)
    }

    pub fn zero(tp: MysqlType) -> Self {
        Time {
            core: CoreTime::default(),
            tp,
            fsp: 0,
        }
    }

    pub fn from_naive(dt: NaiveDateTime, tp: MysqlType, fsp: i8) -> Result<Self> {
        Time::new(CoreTime::from_naive(dt), tp, fsp)
    }

    /// Parse `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`.
    pub fn parse(s: &str, tp: MysqlType, fsp: i8) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("0000-00-00") {
            return Ok(Time::zero(tp));
        }
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
            })
            .map_err(|_| {
                DbError::with_kind(ErrorKind::Decode, format!("Incorrect time value: '{s}'"))
            })?;
        let mut t = Time::from_naive(naive, tp, fsp)?;
        t.round_to_fsp();
        Ok(t)
    }

    pub fn core(&self) -> CoreTime {
        self.core
    }

    pub fn tp(&self) -> MysqlType {
        self.tp
    }

    pub fn fsp(&self) -> i8 {
        self.fsp
    }

    pub fn set_tp(&mut self, tp: MysqlType) {
        self.tp = tp;
        if tp == MysqlType::Date {
            self.truncate_to_date();
        }
    }

    pub fn set_fsp(&mut self, fsp: i8) {
        self.fsp = fsp.clamp(0, MAX_FSP as i8);
        self.round_to_fsp();
    }

    pub fn is_zero(&self) -> bool {
        self.core == CoreTime::default()
    }

    fn truncate_to_date(&mut self) {
        self.core.hour = 0;
        self.core.minute = 0;
        self.core.second = 0;
        self.core.microsecond = 0;
        self.fsp = 0;
    }

    fn round_to_fsp(&mut self) {
        let unit = 10_u32.pow((MAX_FSP - self.fsp as i32) as u32);
        self.core.microsecond -= self.core.microsecond % unit;
    }

    /// Pack into a u64 that orders the same way as the time.
    ///
    /// Layout from high to low bits: `(year*13+month)<<5 | day`, 17 bits of
    /// `hour<<12 | minute<<6 | second`, 24 bits of microseconds.
    pub fn to_packed_u64(&self) -> u64 {
        let c = &self.core;
        let ymd = (((c.year as u64) * 13 + c.month as u64) << 5) | c.day as u64;
        let hms = ((c.hour as u64) << 12) | ((c.minute as u64) << 6) | c.second as u64;
        (((ymd << 17) | hms) << 24) | c.microsecond as u64
    }

    pub fn from_packed_u64(packed: u64, tp: MysqlType, fsp: i8) -> Result<Self> {
        if packed == 0 {
            let mut t = Time::zero(tp);
            t.fsp = check_fsp(fsp as i32)?;
            return Ok(t);
        }
        let microsecond = (packed & ((1 << 24) - 1)) as u32;
        let ymdhms = packed >> 24;
        let ymd = ymdhms >> 17;
        let hms = ymdhms & ((1 << 17) - 1);
        let ym = ymd >> 5;
        let core = CoreTime {
            year: (ym / 13) as u16,
            month: (ym % 13) as u8,
            day: (ymd & ((1 << 5) - 1)) as u8,
            hour: (hms >> 12) as u8,
            minute: ((hms >> 6) & ((1 << 6) - 1)) as u8,
            second: (hms & ((1 << 6) - 1)) as u8,
            microsecond,
        };
        Time::new(core, tp, fsp)
            .map_err(|e| DbError::decode(format!("Invalid packed time {packed}: {e}")))
    }

    /// Reinterpret the wall clock time in `from` as wall clock time in `to`.
    ///
    /// Zero times are left untouched.
    pub fn convert_time_zone(&self, from: &Tz, to: &Tz) -> Result<Self> {
        if self.is_zero() || from == to {
            return Ok(*self);
        }
        let naive = self
            .core
            .to_naive()
            .ok_or_else(|| DbError::new("Invalid time for zone conversion"))?;
        let local = from
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| {
                DbError::new(format!("Time '{naive}' does not exist in time zone {from}"))
            })?;
        let converted = local.with_timezone(to).naive_local();
        Ok(Time {
            core: CoreTime::from_naive(converted),
            tp: self.tp,
            fsp: self.fsp,
        })
    }
}

fn check_fsp(fsp: i32) -> Result<i8> {
    if !(0..=MAX_FSP).contains(&fsp) {
        return Err(DbError::with_kind(
            ErrorKind::TooBigPrecision,
            format!("Too-big precision {fsp} specified. Maximum is {MAX_FSP}."),
        ));
    }
    Ok(fsp as i8)
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.core.cmp(&other.core)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.core;
        write!(f, "{:04}-{:02}-{:02}", c.year, c.month, c.day)?;
        if self.tp == MysqlType::Date {
            return Ok(());
        }
        write!(f, " {:02}:{:02}:{:02}", c.hour, c.minute, c.second)?;
        write_frac(f, c.microsecond, self.fsp)
    }
}

fn write_frac(f: &mut fmt::Formatter<'_>, micros: u32, fsp: i8) -> fmt::Result {
    if fsp <= 0 {
        return Ok(());
    }
    let frac = format!("{micros:06}");
    write!(f, ".{}", &frac[..fsp as usize])
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A TIME value, stored as a signed nanosecond count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Duration {
    nanos: i64,
    fsp: i8,
}

impl Duration {
    pub fn from_nanos(nanos: i64, fsp: i8) -> Result<Self> {
        Ok(Duration {
            nanos,
            fsp: check_fsp(fsp as i32)?,
        })
    }

    pub fn nanos(&self) -> i64 {
        self.nanos
    }

    pub fn fsp(&self) -> i8 {
        self.fsp
    }

    /// Parse `[-]HH:MM:SS[.ffffff]`.
    pub fn parse(s: &str, fsp: i8) -> Result<Self> {
        let s = s.trim();
        let err = || DbError::decode(format!("Incorrect time value: '{s}'"));
        let (neg, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (hms, frac) = match body.split_once('.') {
            Some((hms, frac)) => (hms, frac),
            None => (body, ""),
        };
        let mut parts = hms.split(':');
        let mut next = || -> Result<i64> {
            parts
                .next()
                .ok_or_else(err)?
                .parse::<i64>()
                .map_err(|_| err())
        };
        let (h, m, sec) = (next()?, next()?, next()?);
        if !(0..60).contains(&m) || !(0..60).contains(&sec) {
            return Err(err());
        }
        let mut micros = 0_i64;
        for (i, b) in frac.bytes().take(MAX_FSP as usize).enumerate() {
            if !b.is_ascii_digit() {
                return Err(err());
            }
            micros += (b - b'0') as i64 * 10_i64.pow(5 - i as u32);
        }
        let mut nanos = ((h * 3600 + m * 60 + sec) * 1_000_000 + micros) * 1000;
        if neg {
            nanos = -nanos;
        }
        Duration::from_nanos(nanos, fsp)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos < 0 {
            write!(f, "-")?;
        }
        let abs = self.nanos.unsigned_abs();
        let secs = abs / NANOS_PER_SEC as u64;
        let micros = ((abs % NANOS_PER_SEC as u64) / 1000) as u32;
        write!(
            f,
            "{:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        )?;
        write_frac(f, micros, self.fsp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_round_trip() {
        let t = Time::parse("2019-12-31 23:59:58.123456", MysqlType::Datetime, 6).unwrap();
        let packed = t.to_packed_u64();
        let got = Time::from_packed_u64(packed, MysqlType::Datetime, 6).unwrap();
        assert_eq!(t, got);
        assert_eq!("2019-12-31 23:59:58.123456", got.to_string());
    }

    #[test]
    fn packed_preserves_order() {
        let a = Time::parse("2001-01-01 00:00:00", MysqlType::Datetime, 0).unwrap();
        let b = Time::parse("2001-01-01 00:00:01", MysqlType::Datetime, 0).unwrap();
        assert!(a < b);
        assert!(a.to_packed_u64() < b.to_packed_u64());
    }

    #[test]
    fn zero_time() {
        let t = Time::parse("0000-00-00 00:00:00", MysqlType::Datetime, 0).unwrap();
        assert!(t.is_zero());
        assert_eq!(0, t.to_packed_u64());
        assert_eq!("0000-00-00 00:00:00", t.to_string());
    }

    #[test]
    fn date_truncates() {
        let t = Time::parse("2020-02-29 10:11:12", MysqlType::Date, 0).unwrap();
        assert_eq!("2020-02-29", t.to_string());
        assert_eq!(0, t.core().hour);
    }

    #[test]
    fn invalid_date() {
        assert!(Time::parse("2021-02-30", MysqlType::Date, 0).is_err());
        assert!(Time::parse("2021-02-03", MysqlType::Date, 7).is_err());
    }

    #[test]
    fn time_zone_conversion() {
        let t = Time::parse("2020-06-01 12:00:00", MysqlType::Timestamp, 0).unwrap();
        let shanghai: Tz = "Asia/Shanghai".parse().unwrap();
        let utc = t.convert_time_zone(&shanghai, &chrono_tz::UTC).unwrap();
        assert_eq!("2020-06-01 04:00:00", utc.to_string());
        let back = utc.convert_time_zone(&chrono_tz::UTC, &shanghai).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn fsp_display() {
        let t = Time::parse("2020-06-01 12:00:00.5", MysqlType::Datetime, 2).unwrap();
        assert_eq!("2020-06-01 12:00:00.50", t.to_string());
    }

    #[test]
    fn duration_parse_display() {
        let d = Duration::parse("-838:59:59.5", 1).unwrap();
        assert_eq!("-838:59:59.5", d.to_string());
        let d = Duration::parse("01:02:03", 0).unwrap();
        assert_eq!(3723 * NANOS_PER_SEC, d.nanos());
        assert!(Duration::parse("01:61:00", 0).is_err());
    }
}
