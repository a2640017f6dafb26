//! Interval strategies map a timestamp to the partition bucket holding it.
//!
//! Bucket keys are canonical UTC instants (`2021-01-01T00:00:00Z`), so they sort lexically
//! in chronological order and parse back into the instant they name.

use chrono::{DateTime, Datelike, Months, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub trait IntervalStrategy {
    fn interval_name(&self) -> &'static str;
    fn start(&self, timestamp: DateTime<Utc>) -> String;
    /// Shifts `timestamp` by `offset` units of the strategy's granularity before truncating.
    fn start_with_offset(&self, timestamp: DateTime<Utc>, offset: i64) -> String;
    fn supports(&self, name: &str) -> bool {
        self.interval_name() == name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Single,
    Minute,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

const MINUTE_SECS: i64 = 60;
const HOUR_SECS: i64 = 60 * MINUTE_SECS;
const DAY_SECS: i64 = 24 * HOUR_SECS;
const WEEK_SECS: i64 = 7 * DAY_SECS;

impl Interval {
    pub const ALL: [Interval; 6] = [Interval::Single, Interval::Minute, Interval::Hourly, Interval::Daily, Interval::Weekly, Interval::Monthly];

    pub fn resolve(name: &str) -> Option<Interval> {
        Self::ALL.into_iter().find(|i| i.supports(name))
    }

    fn fixed_secs(&self) -> Option<i64> {
        match self {
            Interval::Minute => Some(MINUTE_SECS),
            Interval::Hourly => Some(HOUR_SECS),
            Interval::Daily => Some(DAY_SECS),
            Interval::Weekly => Some(WEEK_SECS),
            Interval::Single | Interval::Monthly => None,
        }
    }

    pub fn start_instant(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Interval::Single => DateTime::<Utc>::UNIX_EPOCH,
            Interval::Monthly => Utc
                .with_ymd_and_hms(timestamp.year(), timestamp.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            fixed => {
                let len = fixed.fixed_secs().unwrap_or(1);
                let floored = timestamp.timestamp().div_euclid(len) * len;
                DateTime::from_timestamp(floored, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
            }
        }
    }

    pub fn start_instant_with_offset(&self, timestamp: DateTime<Utc>, offset: i64) -> DateTime<Utc> {
        let shifted = match self {
            Interval::Single => timestamp,
            Interval::Monthly => {
                let months = Months::new(offset.unsigned_abs().min(u32::MAX as u64) as u32);
                if offset >= 0 { timestamp.checked_add_months(months) } else { timestamp.checked_sub_months(months) }
                    .unwrap_or(timestamp)
            }
            fixed => {
                let secs = offset.saturating_mul(fixed.fixed_secs().unwrap_or(1));
                TimeDelta::try_seconds(secs)
                    .and_then(|delta| timestamp.checked_add_signed(delta))
                    .unwrap_or(timestamp)
            }
        };
        self.start_instant(shifted)
    }
}

impl IntervalStrategy for Interval {
    fn interval_name(&self) -> &'static str {
        match self {
            Interval::Single => "single",
            Interval::Minute => "minute",
            Interval::Hourly => "hourly",
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
        }
    }

    fn start(&self, timestamp: DateTime<Utc>) -> String {
        format_instant(self.start_instant(timestamp))
    }

    fn start_with_offset(&self, timestamp: DateTime<Utc>, offset: i64) -> String {
        format_instant(self.start_instant_with_offset(timestamp, offset))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.interval_name())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::resolve(&s.to_lowercase()).ok_or_else(|| format!("Invalid value for Interval: {}", s))
    }
}

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_instant(s).expect("valid instant")
    }

    fn samples() -> Vec<DateTime<Utc>> {
        let mut out = vec![
            ts("2021-01-01T00:00:00Z"),
            ts("2021-03-14T15:09:26.535897932Z"),
            ts("1969-12-31T23:59:59.999Z"),
            ts("2024-02-29T23:30:00Z"),
        ];
        for _ in 0..50 {
            let secs = rand::random::<u32>() as i64;
            let nanos = rand::random::<u32>() % 1_000_000_000;
            out.push(DateTime::from_timestamp(secs, nanos).unwrap());
        }
        out
    }

    #[test]
    fn hourly_truncates_sub_hour_fields() {
        for t in samples() {
            let start = Interval::Hourly.start_instant(t);
            assert_eq!((start.minute(), start.second(), start.nanosecond()), (0, 0, 0));
            assert_eq!((start.date_naive(), start.hour()), (t.date_naive(), t.hour()));
        }
        assert_eq!(Interval::Hourly.start(ts("2021-03-14T15:09:26.5Z")), "2021-03-14T15:00:00Z");
    }

    #[test]
    fn start_is_idempotent() {
        for interval in Interval::ALL {
            for t in samples() {
                let once = interval.start(t);
                assert_eq!(interval.start(ts(&once)), once, "{interval} not idempotent for {t}");
            }
        }
    }

    #[test]
    fn offset_equals_shifted_timestamp() {
        for t in samples() {
            for offset in [-48i64, -1, 0, 1, 5, 1000] {
                let shifted = t + TimeDelta::hours(offset);
                assert_eq!(Interval::Hourly.start_with_offset(t, offset), Interval::Hourly.start(shifted));
            }
        }
        assert_eq!(Interval::Hourly.start_with_offset(ts("2021-01-01T00:10:00Z"), -1), "2020-12-31T23:00:00Z");
        assert_eq!(Interval::Daily.start_with_offset(ts("2021-01-01T10:00:00Z"), 2), "2021-01-03T00:00:00Z");
    }

    #[test]
    fn single_always_maps_to_epoch() {
        for t in samples() {
            assert_eq!(Interval::Single.start(t), "1970-01-01T00:00:00Z");
            assert_eq!(Interval::Single.start_with_offset(t, 7), "1970-01-01T00:00:00Z");
        }
    }

    #[test]
    fn weekly_and_monthly_buckets() {
        let weekly = Interval::Weekly.start_instant(ts("2021-01-05T12:00:00Z"));
        assert_eq!(weekly.timestamp() % WEEK_SECS, 0);
        assert!(weekly <= ts("2021-01-05T12:00:00Z"));
        assert!(ts("2021-01-05T12:00:00Z") - weekly < TimeDelta::weeks(1));
        assert_eq!(Interval::Monthly.start(ts("2021-01-31T23:59:59Z")), "2021-01-01T00:00:00Z");
        assert_eq!(Interval::Monthly.start_with_offset(ts("2021-01-31T10:00:00Z"), 1), "2021-02-01T00:00:00Z");
        assert_eq!(Interval::Monthly.start_with_offset(ts("2021-01-15T10:00:00Z"), -1), "2020-12-01T00:00:00Z");
    }

    #[test]
    fn resolve_by_name() {
        for interval in Interval::ALL {
            assert_eq!(Interval::resolve(interval.interval_name()), Some(interval));
            assert!(interval.supports(interval.interval_name()));
        }
        assert_eq!(Interval::resolve("fortnightly"), None);
        assert_eq!("WEEKLY".parse::<Interval>(), Ok(Interval::Weekly));
        assert!(!Interval::Hourly.supports("daily"));
    }

    #[test]
    fn keys_sort_chronologically() {
        let mut keys: Vec<String> = (0..10).map(|h| Interval::Hourly.start_with_offset(ts("2021-01-01T00:00:00Z"), h * 7)).collect();
        let expected = keys.clone();
        keys.reverse();
        keys.sort();
        assert_eq!(keys, expected);
    }
}
