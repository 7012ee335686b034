//! Calendar date and timestamp values.
//!
//! Both travel as plain calendar fields rather than epoch offsets. A
//! timestamp carries a trailing precision field which is always 3
//! (milliseconds).

use crate::error::ProtocolError;
use crate::frame::WireRead;
use bytes::BufMut;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Fractional-second digits carried by every timestamp.
pub const DATETIME_PRECISION: i32 = 3;

/// A calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: i32,
    /// 1 through 12.
    pub month: i32,
    pub day: i32,
}

impl Date {
    pub fn new(year: i32, month: i32, day: i32) -> Result<Self, ProtocolError> {
        let date = Self { year, month, day };
        date.to_naive()?;
        Ok(date)
    }

    pub fn to_naive(&self) -> Result<NaiveDate, ProtocolError> {
        let month = u32::try_from(self.month).ok();
        let day = u32::try_from(self.day).ok();
        month
            .zip(day)
            .and_then(|(m, d)| NaiveDate::from_ymd_opt(self.year, m, d))
            .ok_or_else(|| ProtocolError::InvalidDate(self.to_string()))
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.year);
        buf.put_i32(self.month);
        buf.put_i32(self.day);
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let year = reader.read_i32_wire()?;
        let month = reader.read_i32_wire()?;
        let day = reader.read_i32_wire()?;
        Self::new(year, month, day)
    }
}

impl From<NaiveDate> for Date {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month() as i32,
            day: date.day() as i32,
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for Date {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Date::from)
            .map_err(|_| ProtocolError::InvalidDate(s.to_string()))
    }
}

/// A timestamp with millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    pub date: Date,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    pub millisecond: i32,
}

impl DateTime {
    pub fn new(
        date: Date,
        hour: i32,
        minute: i32,
        second: i32,
        millisecond: i32,
    ) -> Result<Self, ProtocolError> {
        let value = Self {
            date,
            hour,
            minute,
            second,
            millisecond,
        };
        value.to_naive()?;
        Ok(value)
    }

    pub fn to_naive(&self) -> Result<NaiveDateTime, ProtocolError> {
        let date = self.date.to_naive()?;
        let fields = [self.hour, self.minute, self.second, self.millisecond];
        let time = if fields.iter().all(|v| *v >= 0) {
            NaiveTime::from_hms_milli_opt(
                self.hour as u32,
                self.minute as u32,
                self.second as u32,
                self.millisecond as u32,
            )
        } else {
            None
        };
        // Leap-second milliseconds are representable in chrono but not here.
        match time {
            Some(time) if self.millisecond < 1000 => Ok(date.and_time(time)),
            _ => Err(ProtocolError::InvalidDate(self.to_string())),
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        self.date.encode(buf);
        buf.put_i32(self.hour);
        buf.put_i32(self.minute);
        buf.put_i32(self.second);
        buf.put_i32(self.millisecond);
        buf.put_i32(DATETIME_PRECISION);
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let date = Date::decode(reader)?;
        let hour = reader.read_i32_wire()?;
        let minute = reader.read_i32_wire()?;
        let second = reader.read_i32_wire()?;
        let millisecond = reader.read_i32_wire()?;
        // The precision field is fixed; its value carries no information.
        let _precision = reader.read_i32_wire()?;
        Self::new(date, hour, minute, second, millisecond)
    }
}

impl From<NaiveDateTime> for DateTime {
    fn from(value: NaiveDateTime) -> Self {
        Self {
            date: value.date().into(),
            hour: value.hour() as i32,
            minute: value.minute() as i32,
            second: value.second() as i32,
            millisecond: (value.nanosecond() / 1_000_000).min(999) as i32,
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}.{:03}",
            self.date, self.hour, self.minute, self.second, self.millisecond
        )
    }
}

impl FromStr for DateTime {
    type Err = ProtocolError;

    /// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
            .map(DateTime::from)
            .map_err(|_| ProtocolError::InvalidDate(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::io::Cursor;

    #[test]
    fn test_date_fields_on_wire() {
        let date = Date::new(2024, 2, 29).unwrap();
        let mut buf = BytesMut::new();
        date.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 7, 232, 0, 0, 0, 2, 0, 0, 0, 29]);
        assert_eq!(Date::decode(&mut Cursor::new(buf.to_vec())).unwrap(), date);
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert!(Date::new(2023, 2, 29).is_err());
        assert!(Date::new(2023, 13, 1).is_err());
        assert!(Date::new(2023, 0, 1).is_err());
    }

    #[test]
    fn test_datetime_trailing_precision() {
        let value: DateTime = "2021-07-04 12:30:45.250".parse().unwrap();
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), 8 * 4);
        assert_eq!(&buf[28..], &DATETIME_PRECISION.to_be_bytes());

        let decoded = DateTime::decode(&mut Cursor::new(buf.to_vec())).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.millisecond, 250);
        assert_eq!(decoded.to_string(), "2021-07-04 12:30:45.250");
    }

    #[test]
    fn test_datetime_rejects_out_of_range_fields() {
        let date = Date::new(2021, 1, 1).unwrap();
        assert!(DateTime::new(date, 24, 0, 0, 0).is_err());
        assert!(DateTime::new(date, 0, 0, 0, 1000).is_err());
        assert!(DateTime::new(date, -1, 0, 0, 0).is_err());
    }

    #[test]
    fn test_chrono_conversion() {
        let naive = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap();
        let value = DateTime::from(naive);
        assert_eq!(value.to_naive().unwrap(), naive);
    }
}
