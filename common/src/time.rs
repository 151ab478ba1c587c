//! Time utilities and calendar day bucketing.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

/// A timestamp with timezone (always UTC for ChainLedger).
pub type Timestamp = DateTime<Utc>;

/// Calendar day bucket in `YYYYMMDD` form, taken from the UTC date.
///
/// Lexical order equals chronological order for years 0 through 9999.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(String);

impl DayKey {
    /// Bucket for a calendar date. `None` for years outside 0..=9999,
    /// which have no 8-digit key.
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        if !(0..=9999).contains(&date.year()) {
            return None;
        }
        Some(Self(format!(
            "{:04}{:02}{:02}",
            date.year(),
            date.month(),
            date.day()
        )))
    }

    /// Parse an existing `YYYYMMDD` key.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::Configuration(format!(
                "day key must be 8 digits, got {s:?}"
            )));
        }
        let date = NaiveDate::parse_from_str(s, "%Y%m%d")
            .map_err(|e| LedgerError::Configuration(format!("invalid day key {s:?}: {e}")))?;
        Self::from_date(date)
            .ok_or_else(|| LedgerError::Configuration(format!("invalid day key {s:?}")))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DayKey {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<DayKey> for String {
    fn from(key: DayKey) -> Self {
        key.0
    }
}

/// Day bucket of a timestamp, using the UTC calendar date.
pub fn day_key(timestamp: Timestamp) -> Result<DayKey> {
    DayKey::from_date(timestamp.date_naive())
        .ok_or(LedgerError::InvalidTimestamp(timestamp.timestamp_millis()))
}

/// Day bucket of a unix timestamp in milliseconds.
pub fn day_key_from_millis(millis: i64) -> Result<DayKey> {
    timestamp_from_millis(millis).and_then(day_key)
}

/// Convert chain milliseconds into a UTC timestamp.
pub fn timestamp_from_millis(millis: i64) -> Result<Timestamp> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(LedgerError::InvalidTimestamp(millis))
}

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_day_key_format() {
        assert_eq!(day_key(utc(2023, 6, 15, 12, 0, 0)).unwrap().as_str(), "20230615");
        // January is month 01, not 00.
        assert_eq!(day_key(utc(2024, 1, 5, 0, 0, 0)).unwrap().as_str(), "20240105");
        assert_eq!(day_key(utc(987, 3, 9, 0, 0, 0)).unwrap().as_str(), "09870309");
    }

    #[test]
    fn test_day_key_uses_utc_boundaries() {
        assert_eq!(
            day_key(utc(2023, 6, 15, 0, 0, 0)).unwrap(),
            day_key(utc(2023, 6, 15, 23, 59, 59)).unwrap()
        );
        assert_ne!(
            day_key(utc(2023, 6, 15, 23, 59, 59)).unwrap(),
            day_key(utc(2023, 6, 16, 0, 0, 0)).unwrap()
        );
    }

    #[test]
    fn test_day_key_year_rollover() {
        let december = day_key(utc(2023, 12, 31, 23, 59, 59)).unwrap();
        let january = day_key(utc(2024, 1, 1, 0, 0, 0)).unwrap();
        assert!(december.as_str() < january.as_str());
        assert_eq!(december.as_str(), "20231231");
        assert_eq!(january.as_str(), "20240101");
    }

    #[test]
    fn test_day_key_from_millis() {
        // 2023-06-15T10:00:00Z
        assert_eq!(day_key_from_millis(1_686_823_200_000).unwrap().as_str(), "20230615");
        assert!(matches!(
            day_key_from_millis(i64::MAX),
            Err(LedgerError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_day_key_rejects_years_without_eight_digits() {
        let ancient = utc(-5, 1, 1, 0, 0, 0);
        assert!(matches!(day_key(ancient), Err(LedgerError::InvalidTimestamp(_))));
        let last_bc = utc(-1, 12, 31, 23, 59, 59).timestamp_millis();
        assert!(matches!(
            day_key_from_millis(last_bc),
            Err(LedgerError::InvalidTimestamp(m)) if m == last_bc
        ));
        assert!(DayKey::from_date(NaiveDate::from_ymd_opt(10000, 1, 1).unwrap()).is_none());
        assert_eq!(day_key(utc(0, 1, 1, 0, 0, 0)).unwrap().as_str(), "00000101");
    }

    #[test]
    fn test_day_key_parse_roundtrip() {
        let key = DayKey::parse("20230615").unwrap();
        assert_eq!(key.to_string(), "20230615");
        assert!(DayKey::parse("20231315").is_err());
        assert!(DayKey::parse("2023-06-15").is_err());

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"20230615\"");
        assert!(serde_json::from_str::<DayKey>("\"2023061\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_day_key_monotonic(
            start in 0i64..253_402_300_799, // up to 9999-12-31T23:59:59Z
            step in 0i64..(400 * 86_400),
        ) {
            let t1 = Utc.timestamp_opt(start, 0).unwrap();
            let t2 = t1 + Duration::seconds(step);
            prop_assume!(t2.year() <= 9999);

            let k1 = day_key(t1).unwrap();
            let k2 = day_key(t2).unwrap();
            prop_assert!(k1.as_str() <= k2.as_str());
            prop_assert_eq!(k1 == k2, t1.date_naive() == t2.date_naive());
        }
    }
}
