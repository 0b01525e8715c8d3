// Copyright 2022-2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Datum holds a single typed value.

use std::{convert::TryFrom, fmt};

use snafu::{Backtrace, Snafu};

use crate::time::Timestamp;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unknown datum kind, value:{}.\nBacktrace:\n{}", value, backtrace))]
    UnknownKind { value: u8, backtrace: Backtrace },

    #[snafu(display(
        "Invalid date, year:{}, month:{}, day:{}.\nBacktrace:\n{}",
        year,
        month,
        day,
        backtrace
    ))]
    InvalidDate {
        year: i32,
        month: u32,
        day: u32,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Date packed into an i32: `(year - 1900) << 16 | (month - 1) << 8 | day`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(i32);

impl Date {
    /// Build a date, checking `1900 <= year <= 9999`, `1 <= month <= 12`,
    /// `1 <= day <= 31`.
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self> {
        if !(1900..=9999).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day)
        {
            return InvalidDate { year, month, day }.fail();
        }
        Ok(Self(((year - 1900) << 16) | (((month - 1) as i32) << 8) | day as i32))
    }

    pub const fn from_raw(packed: i32) -> Self {
        Self(packed)
    }

    #[inline]
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    #[inline]
    pub fn year(&self) -> i32 {
        (self.0 >> 16) + 1900
    }

    #[inline]
    pub fn month(&self) -> u32 {
        (((self.0 >> 8) & 0xff) + 1) as u32
    }

    #[inline]
    pub fn day(&self) -> u32 {
        (self.0 & 0xff) as u32
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

/// The kind of a datum, also used as the declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumKind {
    Null = 0,
    Boolean,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Timestamp,
    Date,
    Varchar,
    String,
}

impl DatumKind {
    /// Whether values of this kind are stored inline in the fixed field
    /// area of an encoded row.
    pub fn is_fixed_sized(&self) -> bool {
        !matches!(self, DatumKind::Varchar | DatumKind::String)
    }

    /// Byte size of this kind in the fixed field area, 0 for var-len kinds.
    pub fn fixed_size(&self) -> usize {
        match self {
            DatumKind::Null => 0,
            DatumKind::Boolean => 1,
            DatumKind::Int16 => 2,
            DatumKind::Int32 => 4,
            DatumKind::Int64 => 8,
            DatumKind::Float => 4,
            DatumKind::Double => 8,
            DatumKind::Timestamp => 8,
            DatumKind::Date => 4,
            DatumKind::Varchar | DatumKind::String => 0,
        }
    }

    pub fn into_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for DatumKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        let kind = match value {
            0 => DatumKind::Null,
            1 => DatumKind::Boolean,
            2 => DatumKind::Int16,
            3 => DatumKind::Int32,
            4 => DatumKind::Int64,
            5 => DatumKind::Float,
            6 => DatumKind::Double,
            7 => DatumKind::Timestamp,
            8 => DatumKind::Date,
            9 => DatumKind::Varchar,
            10 => DatumKind::String,
            _ => return UnknownKind { value }.fail(),
        };
        Ok(kind)
    }
}

impl fmt::Display for DatumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatumKind::Null => "null",
            DatumKind::Boolean => "boolean",
            DatumKind::Int16 => "int16",
            DatumKind::Int32 => "int32",
            DatumKind::Int64 => "int64",
            DatumKind::Float => "float",
            DatumKind::Double => "double",
            DatumKind::Timestamp => "timestamp",
            DatumKind::Date => "date",
            DatumKind::Varchar => "varchar",
            DatumKind::String => "string",
        };
        f.write_str(name)
    }
}

/// An owned single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Timestamp(Timestamp),
    Date(Date),
    Varchar(String),
    String(String),
}

impl Datum {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn kind(&self) -> DatumKind {
        match self {
            Datum::Null => DatumKind::Null,
            Datum::Boolean(_) => DatumKind::Boolean,
            Datum::Int16(_) => DatumKind::Int16,
            Datum::Int32(_) => DatumKind::Int32,
            Datum::Int64(_) => DatumKind::Int64,
            Datum::Float(_) => DatumKind::Float,
            Datum::Double(_) => DatumKind::Double,
            Datum::Timestamp(_) => DatumKind::Timestamp,
            Datum::Date(_) => DatumKind::Date,
            Datum::Varchar(_) => DatumKind::Varchar,
            Datum::String(_) => DatumKind::String,
        }
    }

    /// Byte size of the var-len payload, 0 for fixed-size datums.
    pub fn var_size(&self) -> usize {
        match self {
            Datum::Varchar(v) | Datum::String(v) => v.len(),
            _ => 0,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Varchar(v) | Datum::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_view(&self) -> DatumView<'_> {
        match self {
            Datum::Null => DatumView::Null,
            Datum::Boolean(v) => DatumView::Boolean(*v),
            Datum::Int16(v) => DatumView::Int16(*v),
            Datum::Int32(v) => DatumView::Int32(*v),
            Datum::Int64(v) => DatumView::Int64(*v),
            Datum::Float(v) => DatumView::Float(*v),
            Datum::Double(v) => DatumView::Double(*v),
            Datum::Timestamp(v) => DatumView::Timestamp(*v),
            Datum::Date(v) => DatumView::Date(*v),
            Datum::Varchar(v) => DatumView::Varchar(v),
            Datum::String(v) => DatumView::String(v),
        }
    }
}

/// A borrowed single value referencing an encoded row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DatumView<'a> {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Timestamp(Timestamp),
    Date(Date),
    Varchar(&'a str),
    String(&'a str),
}

impl<'a> DatumView<'a> {
    pub fn to_datum(&self) -> Datum {
        match self {
            DatumView::Null => Datum::Null,
            DatumView::Boolean(v) => Datum::Boolean(*v),
            DatumView::Int16(v) => Datum::Int16(*v),
            DatumView::Int32(v) => Datum::Int32(*v),
            DatumView::Int64(v) => Datum::Int64(*v),
            DatumView::Float(v) => Datum::Float(*v),
            DatumView::Double(v) => Datum::Double(*v),
            DatumView::Timestamp(v) => Datum::Timestamp(*v),
            DatumView::Date(v) => Datum::Date(*v),
            DatumView::Varchar(v) => Datum::Varchar(v.to_string()),
            DatumView::String(v) => Datum::String(v.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_pack() {
        let date = Date::new(2020, 5, 27).unwrap();
        assert_eq!(date.as_i32(), (120 << 16) | (4 << 8) | 27);
        assert_eq!(date.year(), 2020);
        assert_eq!(date.month(), 5);
        assert_eq!(date.day(), 27);
        assert_eq!(date.to_string(), "2020-05-27");

        assert!(Date::new(1899, 1, 1).is_err());
        assert!(Date::new(2020, 13, 1).is_err());
        assert!(Date::new(2020, 1, 32).is_err());
        assert!(Date::new(1900, 1, 1).is_ok());
        assert!(Date::new(9999, 12, 31).is_ok());
    }

    #[test]
    fn test_kind_round_trip() {
        for v in 0..=10u8 {
            let kind = DatumKind::try_from(v).unwrap();
            assert_eq!(kind.into_u8(), v);
        }
        assert!(DatumKind::try_from(11).is_err());
    }

    #[test]
    fn test_view_round_trip() {
        let datums = vec![
            Datum::Null,
            Datum::Boolean(true),
            Datum::Int16(-3),
            Datum::Int32(42),
            Datum::Int64(i64::MIN),
            Datum::Float(1.5),
            Datum::Double(-2.25),
            Datum::Timestamp(Timestamp::new(1000)),
            Datum::Date(Date::new(2021, 1, 2).unwrap()),
            Datum::Varchar("hello".to_string()),
            Datum::String(String::new()),
        ];
        for datum in datums {
            assert_eq!(datum.as_view().to_datum(), datum);
        }
    }
}
