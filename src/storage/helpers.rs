//! Shared storage helper functions.
//!
//! Timestamp and flag conversions used by the SQLite stores. Timestamps are
//! stored as RFC 3339 text, dates as `YYYY-MM-DD`, flags as 0/1 integers.

use chrono::{DateTime, NaiveDate, Utc};

use super::{Result, StorageError};

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(value.to_string()))
}

pub fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

pub fn parse_optional_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .as_deref()
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map_err(|_| StorageError::InvalidTimestamp(v.to_string()))
        })
        .transpose()
}

pub fn flag(value: bool) -> i32 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_normalises_offset() {
        let parsed = parse_timestamp("2024-05-01T12:00:00+03:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T09:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(StorageError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_optional_values() {
        assert_eq!(parse_optional_timestamp(None).unwrap(), None);
        assert_eq!(
            parse_optional_date(Some("2024-02-29".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert!(parse_optional_date(Some("2024-02-30".to_string())).is_err());
    }
}
