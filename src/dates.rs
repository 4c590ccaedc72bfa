//! Index label parsing and CF time encoding of the date axis.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use num_traits::ToPrimitive;
use std::fmt;

/// Date-only label formats.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Date-time label formats. `%.f` also accepts a missing fraction.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Parses an index label as a calendar date, optionally with a time of day.
///
/// Accepts ISO-style dates (`2000-01-01`, `2000/01/01`), date-times with a
/// space or `T` separator, and RFC 3339 timestamps (converted to UTC).
pub fn parse_label(label: &str) -> Option<NaiveDateTime> {
    let label = label.trim();
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(label, fmt).ok())
    {
        return Some(date.and_time(NaiveTime::MIN));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(label, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(label).ok().map(|dt| dt.naive_utc()))
}

/// Formats a timestamp as a canonical index label.
///
/// Midnight timestamps are written as `YYYY-MM-DD`, others as
/// `YYYY-MM-DD HH:MM:SS` with a fractional part only when present.
pub fn format_label(dt: &NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

/// Whether `dt` carries a fraction of a second finer than a microsecond,
/// which no [`TimeEncoding`] can store.
pub(crate) fn has_sub_micros(dt: &NaiveDateTime) -> bool {
    dt.and_utc().timestamp_subsec_nanos() % 1_000 != 0
}

/// Unit of a CF `"<unit> since <reference>"` time axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    /// Days of 86400 seconds.
    Days,
    /// Hours.
    Hours,
    /// Minutes.
    Minutes,
    /// Seconds.
    Seconds,
    /// Milliseconds.
    Milliseconds,
    /// Microseconds.
    Microseconds,
}

impl TimeUnit {
    fn micros(self) -> i64 {
        match self {
            Self::Days => 86_400_000_000,
            Self::Hours => 3_600_000_000,
            Self::Minutes => 60_000_000,
            Self::Seconds => 1_000_000,
            Self::Milliseconds => 1_000,
            Self::Microseconds => 1,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => Self::Days,
            "hours" | "hour" | "hr" | "h" => Self::Hours,
            "minutes" | "minute" | "min" => Self::Minutes,
            "seconds" | "second" | "sec" | "s" => Self::Seconds,
            "milliseconds" | "millisecond" | "msec" | "ms" => Self::Milliseconds,
            "microseconds" | "microsecond" | "usec" | "us" => Self::Microseconds,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
            Self::Milliseconds => "milliseconds",
            Self::Microseconds => "microseconds",
        }
    }
}

/// Encoding of timestamps as numeric offsets from a reference instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeEncoding {
    /// Unit of the stored offsets.
    pub unit: TimeUnit,
    /// Instant that offset zero refers to.
    pub reference: NaiveDateTime,
}

impl TimeEncoding {
    /// Picks the coarsest unit that represents every timestamp exactly.
    ///
    /// Offsets count from the Unix epoch, except for microseconds, which
    /// count from midnight of the earliest date to stay within the exact
    /// integer range of `f64`. Sub-microsecond parts are not representable.
    pub fn for_dates(dates: &[NaiveDateTime]) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH.naive_utc();
        let nanos = |d: &NaiveDateTime| d.and_utc().timestamp_subsec_nanos();
        let unit = if dates.iter().all(|d| d.time() == NaiveTime::MIN) {
            TimeUnit::Days
        } else if dates.iter().all(|d| nanos(d) == 0) {
            TimeUnit::Seconds
        } else if dates.iter().all(|d| nanos(d) % 1_000_000 == 0) {
            TimeUnit::Milliseconds
        } else {
            TimeUnit::Microseconds
        };
        let reference = match (unit, dates.iter().min()) {
            (TimeUnit::Microseconds, Some(first)) => first.date().and_time(NaiveTime::MIN),
            _ => epoch,
        };
        Self { unit, reference }
    }

    /// Parses a CF `units` attribute such as `days since 1970-01-01`.
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, reference) = units.trim().split_once(" since ")?;
        let unit = TimeUnit::parse(unit.trim())?;
        let reference = reference.trim();
        let reference = parse_label(reference)
            .or_else(|| parse_label(reference.trim_end_matches(" UTC").trim_end_matches('Z')))
            .or_else(|| {
                // Drop a trailing zone offset such as `+00:00`.
                let (head, _) = reference.rsplit_once(' ')?;
                parse_label(head)
            })?;
        Some(Self { unit, reference })
    }

    /// Encodes a timestamp as an offset in this encoding's unit.
    ///
    /// Whole multiples of the unit are divided exactly; anything finer than
    /// a microsecond is truncated.
    pub fn encode(&self, dt: &NaiveDateTime) -> f64 {
        let unit = self.unit.micros();
        match (*dt - self.reference).num_microseconds() {
            Some(us) if us % unit == 0 => (us / unit).to_f64().unwrap_or(f64::NAN),
            Some(us) => us as f64 / unit as f64,
            None => f64::NAN,
        }
    }

    /// Decodes an offset, rounding to the nearest microsecond.
    ///
    /// Returns `None` for non-finite values and out-of-range results.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        if !value.is_finite() {
            return None;
        }
        let unit = self.unit.micros();
        let micros = if value.fract() == 0.0 {
            value.to_i64()?.checked_mul(unit)?
        } else {
            (value * unit as f64).round().to_i64()?
        };
        self.reference.checked_add_signed(TimeDelta::microseconds(micros))
    }
}

impl fmt::Display for TimeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.unit {
            TimeUnit::Days => write!(f, "days since {}", self.reference.format("%Y-%m-%d")),
            unit => write!(
                f,
                "{} since {}",
                unit.as_str(),
                self.reference.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}
