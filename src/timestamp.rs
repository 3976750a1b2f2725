//! Event timestamp rules.
//!
//! Every `start_time` in the lake comes from [`start_time`]: epoch
//! milliseconds are split into seconds plus a sub-second part, placed in the
//! configured timezone and rendered as an ISO-8601 local date-time without
//! offset. The calendar fields of both `time` and `songplays` are parsed back
//! out of that text by [`CalendarFields::parse`], so the two tables cannot
//! disagree.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, Int32Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, Timelike};
use rayon::prelude::*;
use serde::Deserialize;
use thiserror::Error;

const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const START_TIME_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ============================================================================
// Timezone
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timezone {0:?}: expected \"UTC\", \"local\" or an offset such as \"+05:30\"")]
pub struct InvalidTimezone(pub String);

/// Zone that event timestamps are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Timezone {
    #[default]
    Utc,
    /// The zone of the host running the job.
    Local,
    Fixed(FixedOffset),
}

impl Timezone {
    fn localize(self, instant: DateTime<chrono::Utc>) -> NaiveDateTime {
        match self {
            Timezone::Utc => instant.naive_utc(),
            Timezone::Local => instant.with_timezone(&Local).naive_local(),
            Timezone::Fixed(offset) => instant.with_timezone(&offset).naive_local(),
        }
    }
}

impl FromStr for Timezone {
    type Err = InvalidTimezone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "utc" | "z" | "gmt" => return Ok(Timezone::Utc),
            "local" => return Ok(Timezone::Local),
            _ => {}
        }
        parse_offset(trimmed)
            .map(Timezone::Fixed)
            .ok_or_else(|| InvalidTimezone(s.to_string()))
    }
}

impl TryFrom<String> for Timezone {
    type Error = InvalidTimezone;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timezone::Utc => f.write_str("UTC"),
            Timezone::Local => f.write_str("local"),
            Timezone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// `+HH:MM`, `-HH:MM`, `+HHMM` or `+HH`.
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ============================================================================
// Scalar Rules
// ============================================================================

/// Render epoch milliseconds as a local `start_time`. Returns `None` for
/// instants chrono cannot represent.
pub fn start_time(epoch_ms: i64, tz: Timezone) -> Option<String> {
    start_time_micros(epoch_ms.checked_mul(1000)?, tz)
}

/// Fractional milliseconds keep their sub-millisecond part, rounded to the
/// microsecond.
pub fn start_time_fractional(epoch_ms: f64, tz: Timezone) -> Option<String> {
    let micros = (epoch_ms * 1000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    start_time_micros(micros as i64, tz)
}

fn start_time_micros(epoch_us: i64, tz: Timezone) -> Option<String> {
    let seconds = epoch_us.div_euclid(1_000_000);
    let nanos = (epoch_us.rem_euclid(1_000_000) * 1000) as u32;
    let instant = DateTime::from_timestamp(seconds, nanos)?;
    Some(format_start_time(&tz.localize(instant)))
}

fn format_start_time(dt: &NaiveDateTime) -> String {
    let mut text = dt.format(START_TIME_FORMAT).to_string();
    let micros = dt.nanosecond() / 1000;
    if micros != 0 {
        text.push_str(&format!(".{micros:06}"));
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub year: i32,
    pub month: i32,
    /// ISO-8601 week of the ISO week-based year.
    pub week: i32,
    /// Sunday = 1 … Saturday = 7.
    pub weekday: i32,
    pub day: i32,
    pub hour: i32,
}

impl CalendarFields {
    pub fn from_naive(dt: &NaiveDateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month() as i32,
            week: dt.iso_week().week() as i32,
            weekday: dt.weekday().number_from_sunday() as i32,
            day: dt.day() as i32,
            hour: dt.hour() as i32,
        }
    }

    /// Decompose a `start_time` string.
    pub fn parse(start_time: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(start_time, START_TIME_PARSE_FORMAT)
            .ok()
            .map(|dt| Self::from_naive(&dt))
    }
}

// ============================================================================
// Column Rules
// ============================================================================

/// Derive the `start_time` column from an epoch-millisecond column of any
/// type castable to Int64. Float columns keep sub-millisecond precision.
/// Uncastable and null inputs give null.
pub fn start_time_column(epoch_ms: &ArrayRef, tz: Timezone) -> sluice::Result<ArrayRef> {
    let rendered: Vec<Option<String>> = if epoch_ms.data_type().is_floating() {
        let floats = cast(epoch_ms, &DataType::Float64)?;
        let values: Vec<Option<f64>> = floats.as_primitive::<Float64Type>().iter().collect();
        values
            .par_iter()
            .map(|v| v.and_then(|ms| start_time_fractional(ms, tz)))
            .collect()
    } else {
        let ints = cast(epoch_ms, &DataType::Int64)?;
        let values: Vec<Option<i64>> = ints.as_primitive::<Int64Type>().iter().collect();
        values
            .par_iter()
            .map(|v| v.and_then(|ms| start_time(ms, tz)))
            .collect()
    };
    Ok(Arc::new(StringArray::from(rendered)))
}

fn decompose(start_time: &ArrayRef) -> sluice::Result<Vec<Option<CalendarFields>>> {
    let text = cast(start_time, &DataType::Utf8)?;
    let text = text.as_string::<i32>();
    let values: Vec<Option<&str>> = text.iter().collect();
    Ok(values
        .par_iter()
        .map(|v| v.and_then(CalendarFields::parse))
        .collect())
}

fn int_column(fields: &[Option<CalendarFields>], get: fn(&CalendarFields) -> i32) -> ArrayRef {
    Arc::new(Int32Array::from_iter(
        fields.iter().map(|f| f.as_ref().map(get)),
    ))
}

/// Calendar columns `year, month, week, weekday, day, hour` (all Int32),
/// decomposed from a `start_time` column.
pub fn calendar_columns(start_time: &ArrayRef) -> sluice::Result<Vec<(&'static str, ArrayRef)>> {
    let fields = decompose(start_time)?;
    Ok(vec![
        ("year", int_column(&fields, |f| f.year)),
        ("month", int_column(&fields, |f| f.month)),
        ("week", int_column(&fields, |f| f.week)),
        ("weekday", int_column(&fields, |f| f.weekday)),
        ("day", int_column(&fields, |f| f.day)),
        ("hour", int_column(&fields, |f| f.hour)),
    ])
}

/// Only the `year` and `month` calendar columns.
pub fn year_month_columns(start_time: &ArrayRef) -> sluice::Result<(ArrayRef, ArrayRef)> {
    let fields = decompose(start_time)?;
    Ok((
        int_column(&fields, |f| f.year),
        int_column(&fields, |f| f.month),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array};
    use arrow::datatypes::Int32Type;

    const SCENARIO_TS: i64 = 1_542_242_826_796;

    #[test]
    fn test_start_time_utc() {
        assert_eq!(
            start_time(SCENARIO_TS, Timezone::Utc).as_deref(),
            Some("2018-11-15T00:47:06.796000")
        );
        assert_eq!(
            start_time(1_542_242_826_000, Timezone::Utc).as_deref(),
            Some("2018-11-15T00:47:06")
        );
        assert_eq!(start_time(0, Timezone::Utc).as_deref(), Some("1970-01-01T00:00:00"));
    }

    #[test]
    fn test_start_time_negative_epoch() {
        assert_eq!(
            start_time(-1, Timezone::Utc).as_deref(),
            Some("1969-12-31T23:59:59.999000")
        );
    }

    #[test]
    fn test_start_time_fixed_offset() {
        let tz: Timezone = "-08:00".parse().unwrap();
        assert_eq!(
            start_time(SCENARIO_TS, tz).as_deref(),
            Some("2018-11-14T16:47:06.796000")
        );
    }

    #[test]
    fn test_calendar_fields() {
        let text = start_time(SCENARIO_TS, Timezone::Utc).unwrap();
        let fields = CalendarFields::parse(&text).unwrap();
        assert_eq!(
            fields,
            CalendarFields {
                year: 2018,
                month: 11,
                week: 46,
                weekday: 5,
                day: 15,
                hour: 0,
            }
        );
    }

    #[test]
    fn test_weekday_starts_on_sunday() {
        // 2018-11-11 was a Sunday, 2018-11-17 a Saturday.
        assert_eq!(CalendarFields::parse("2018-11-11T12:00:00").unwrap().weekday, 1);
        assert_eq!(CalendarFields::parse("2018-11-17T12:00:00").unwrap().weekday, 7);
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2018-12-31 belongs to ISO week 1 of 2019; the calendar year stays 2018.
        let f = CalendarFields::parse("2018-12-31T08:00:00").unwrap();
        assert_eq!((f.year, f.week), (2018, 1));
        // 2021-01-01 belongs to ISO week 53 of 2020.
        assert_eq!(CalendarFields::parse("2021-01-01T00:00:00").unwrap().week, 53);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CalendarFields::parse("").is_none());
        assert!(CalendarFields::parse("yesterday").is_none());
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!("UTC".parse::<Timezone>().unwrap(), Timezone::Utc);
        assert_eq!(" utc ".parse::<Timezone>().unwrap(), Timezone::Utc);
        assert_eq!("local".parse::<Timezone>().unwrap(), Timezone::Local);
        assert_eq!(
            "+05:30".parse::<Timezone>().unwrap(),
            Timezone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(
            "-0800".parse::<Timezone>().unwrap(),
            Timezone::Fixed(FixedOffset::west_opt(8 * 3600).unwrap())
        );
        assert!("Mars/Olympus".parse::<Timezone>().is_err());
        assert!("+25:00".parse::<Timezone>().is_err());
        assert!("+5".parse::<Timezone>().is_err());
    }

    #[test]
    fn test_start_time_column_nulls_bad_input() {
        let ts: ArrayRef = Arc::new(Int64Array::from(vec![Some(SCENARIO_TS), None, Some(0)]));
        let out = start_time_column(&ts, Timezone::Utc).unwrap();
        let out = out.as_string::<i32>();
        assert_eq!(out.value(0), "2018-11-15T00:47:06.796000");
        assert!(out.is_null(1));
        assert_eq!(out.value(2), "1970-01-01T00:00:00");

        let text: ArrayRef = Arc::new(StringArray::from(vec!["1542242826796", "soon"]));
        let out = start_time_column(&text, Timezone::Utc).unwrap();
        assert_eq!(out.as_string::<i32>().value(0), "2018-11-15T00:47:06.796000");
        assert!(out.is_null(1));

        let floats: ArrayRef = Arc::new(Float64Array::from(vec![1_542_242_826_796.0]));
        let out = start_time_column(&floats, Timezone::Utc).unwrap();
        assert_eq!(out.as_string::<i32>().value(0), "2018-11-15T00:47:06.796000");
    }

    #[test]
    fn test_fractional_milliseconds_keep_microseconds() {
        assert_eq!(
            start_time_fractional(1_542_242_826_796.25, Timezone::Utc).as_deref(),
            Some("2018-11-15T00:47:06.796250")
        );
        assert!(start_time_fractional(f64::NAN, Timezone::Utc).is_none());

        let floats: ArrayRef = Arc::new(Float64Array::from(vec![Some(1_542_242_826_796.5), None]));
        let out = start_time_column(&floats, Timezone::Utc).unwrap();
        let out = out.as_string::<i32>();
        assert_eq!(out.value(0), "2018-11-15T00:47:06.796500");
        assert!(out.is_null(1));
    }

    #[test]
    fn test_calendar_columns() {
        let st: ArrayRef = Arc::new(StringArray::from(vec![
            Some("2018-11-15T00:47:06.796000"),
            None,
        ]));
        let columns = calendar_columns(&st).unwrap();
        let names: Vec<&str> = columns.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["year", "month", "week", "weekday", "day", "hour"]);
        let week = columns[2].1.as_primitive::<Int32Type>();
        assert_eq!(week.value(0), 46);
        assert!(week.is_null(1));

        let (year, month) = year_month_columns(&st).unwrap();
        assert_eq!(year.as_primitive::<Int32Type>().value(0), 2018);
        assert_eq!(month.as_primitive::<Int32Type>().value(0), 11);
    }
}
