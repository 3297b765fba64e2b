//! Calendar-day bucketing for source timestamps (always UTC).

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime, UtcOffset};

/// A "YYYY-MM-DD" day with no time component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Day {
    pub year: i32,
    pub month: u8, // 1..=12
    pub day: u8,   // 1..=31
}

impl Day {
    /// Panics on an impossible calendar date; use `from_str` for untrusted input.
    pub fn new(year: i32, month: u8, day: u8) -> Self {
        let d = to_date(year, month, day).expect("valid calendar date");
        d.into()
    }

    pub fn next(self) -> Option<Self> {
        to_date(self.year, self.month, self.day)?.next_day().map(Into::into)
    }

    pub fn from_epoch_millis(ms: i64) -> Option<Self> {
        let nanos = (ms as i128).checked_mul(1_000_000)?;
        let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
        Some(dt.to_offset(UtcOffset::UTC).date().into())
    }

    pub fn from_rfc3339(s: &str) -> Option<Self> {
        let dt = OffsetDateTime::parse(s.trim(), &Rfc3339).ok()?;
        Some(dt.to_offset(UtcOffset::UTC).date().into())
    }
}

fn to_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let m = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, m, day).ok()
}

impl From<Date> for Day {
    fn from(d: Date) -> Self {
        Self { year: d.year(), month: d.month() as u8, day: d.day() }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for Day {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.trim().split('-').collect();
        if parts.len() != 3 {
            return Err("expected YYYY-MM-DD".into());
        }
        let year: i32 = parts[0].parse().map_err(|_| "invalid year")?;
        let month: u8 = parts[1].parse().map_err(|_| "invalid month")?;
        let day: u8 = parts[2].parse().map_err(|_| "invalid day")?;
        to_date(year, month, day)
            .map(Into::into)
            .ok_or_else(|| format!("{s} is not a calendar date"))
    }
}

impl Serialize for Day {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Day of an extended-JSON date value.
///
/// Recognized shapes:
///   - `{"$date": "2024-01-05T10:00:00Z"}`
///   - `{"$date": 1704448800000}`
///   - `{"$date": {"$numberLong": "1704448800000"}}`
///
/// Null, plain strings and plain numbers are not dates and yield `None`.
pub fn day_from_extended_json(v: &Value) -> Option<Day> {
    let inner = v.as_object()?.get("$date")?;
    match inner {
        Value::String(s) => Day::from_rfc3339(s),
        Value::Number(n) => n.as_i64().and_then(Day::from_epoch_millis),
        Value::Object(o) => o
            .get("$numberLong")
            .and_then(|x| x.as_str())
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(Day::from_epoch_millis),
        _ => None,
    }
}

/// Inclusive iteration from `start` to `end` (if `start` <= `end`), else empty.
pub fn iter_days(start: Day, end: Day) -> impl Iterator<Item = Day> {
    let mut curr = if start <= end { Some(start) } else { None };
    std::iter::from_fn(move || {
        let ret = curr?;
        curr = ret.next().filter(|n| *n <= end);
        Some(ret)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extended_json_shapes() {
        let d = Day::new(2024, 1, 5);
        assert_eq!(day_from_extended_json(&json!({"$date": "2024-01-05T23:59:59Z"})), Some(d));
        assert_eq!(day_from_extended_json(&json!({"$date": "2024-01-05T10:00:00.123Z"})), Some(d));
        assert_eq!(day_from_extended_json(&json!({"$date": 1704448800000i64})), Some(d));
        assert_eq!(day_from_extended_json(&json!({"$date": {"$numberLong": "1704448800000"}})), Some(d));
    }

    #[test]
    fn non_dates_are_rejected() {
        assert_eq!(day_from_extended_json(&Value::Null), None);
        assert_eq!(day_from_extended_json(&json!("2024-01-05T10:00:00Z")), None);
        assert_eq!(day_from_extended_json(&json!(1704448800000i64)), None);
        assert_eq!(day_from_extended_json(&json!({"$date": "yesterday"})), None);
    }

    #[test]
    fn offsets_truncate_in_utc() {
        // 01:30 at +02:00 is still the previous day in UTC.
        assert_eq!(Day::from_rfc3339("2024-01-06T01:30:00+02:00"), Some(Day::new(2024, 1, 5)));
    }

    #[test]
    fn display_parse_and_iterate() {
        let d: Day = "2024-02-28".parse().unwrap();
        assert_eq!(d.to_string(), "2024-02-28");
        assert!("2023-02-29".parse::<Day>().is_err());
        let days: Vec<String> = iter_days(d, Day::new(2024, 3, 1)).map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2024-02-28", "2024-02-29", "2024-03-01"]);
        assert_eq!(iter_days(Day::new(2024, 3, 1), d).count(), 0);
    }
}
