//! Period grouping expressions for time-bucketed aggregation.
//!
//! Given a requested granularity and the sampling interval of the source
//! rows, [`bucket_expr`] returns the SQL expression that maps a timestamp
//! column to a canonical bucket label. [`bucket_label`] is the Rust mirror
//! of the same mapping, used by the in-memory backend so that both backends
//! produce byte-identical labels.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::api::ReportGrouping;

/// SQL expression producing the canonical bucket label for `column` at the
/// requested granularity.
///
/// `interval_min` is the sampling interval already present in the source
/// rows; a grouping finer than that interval cannot be resolved and yields
/// `None`, which callers must treat as a request-validation error rather
/// than attempting to execute SQL.
///
/// Cache tables store bucket-aligned timestamps, so the cache path reads
/// the column directly; raw tables carry arbitrary sample times and the
/// quarter-hour path floors them to the bucket boundary first.
pub fn bucket_expr(
    grouping: ReportGrouping,
    interval_min: u32,
    column: &str,
    on_cache: bool,
) -> Option<String> {
    if grouping.period_minutes() < interval_min {
        return None;
    }

    let expr = match grouping {
        ReportGrouping::QuarterHour if on_cache => {
            format!("to_char({}, 'YYYY-MM-DD HH24:MI')", column)
        }
        ReportGrouping::QuarterHour => format!(
            "to_char(to_timestamp(floor(extract(epoch from {}) / 900) * 900) \
             AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI')",
            column
        ),
        ReportGrouping::Hour => format!(
            "to_char(date_trunc('hour', {}), 'YYYY-MM-DD HH24:MI')",
            column
        ),
        ReportGrouping::Day => format!("to_char(date_trunc('day', {}), 'YYYY-MM-DD')", column),
        ReportGrouping::Week => format!("to_char(date_trunc('week', {}), 'IYYY\"-W\"IW')", column),
        ReportGrouping::Month => format!("to_char(date_trunc('month', {}), 'YYYY-MM')", column),
    };
    Some(expr)
}

/// Rust mirror of [`bucket_expr`]: canonical bucket label for a timestamp.
pub fn bucket_label(grouping: ReportGrouping, stamp: NaiveDateTime) -> String {
    match grouping {
        ReportGrouping::QuarterHour => {
            let floored = stamp
                .with_minute(stamp.minute() - stamp.minute() % 15)
                .and_then(|t| t.with_second(0))
                .unwrap_or(stamp);
            floored.format("%Y-%m-%d %H:%M").to_string()
        }
        ReportGrouping::Hour => stamp.format("%Y-%m-%d %H:00").to_string(),
        ReportGrouping::Day => stamp.format("%Y-%m-%d").to_string(),
        ReportGrouping::Week => {
            let week = stamp.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        ReportGrouping::Month => stamp.format("%Y-%m").to_string(),
    }
}

/// Truncate a timestamp to the start of its bucket.
///
/// Week and month buckets truncate to the first day of the ISO week and
/// calendar month respectively.
pub fn bucket_start(grouping: ReportGrouping, stamp: NaiveDateTime) -> NaiveDateTime {
    let date = stamp.date();
    match grouping {
        ReportGrouping::QuarterHour => stamp
            .with_minute(stamp.minute() - stamp.minute() % 15)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(stamp),
        ReportGrouping::Hour => date
            .and_hms_opt(stamp.hour(), 0, 0)
            .unwrap_or(stamp),
        ReportGrouping::Day => date.and_hms_opt(0, 0, 0).unwrap_or(stamp),
        ReportGrouping::Week => {
            let days_from_monday = date.weekday().num_days_from_monday() as i64;
            (date - chrono::Duration::days(days_from_monday))
                .and_hms_opt(0, 0, 0)
                .unwrap_or(stamp)
        }
        ReportGrouping::Month => date
            .with_day(1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(stamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_unresolvable_grouping_is_none() {
        // Quarter-hour grouping over day-resolution cache rows.
        assert!(bucket_expr(ReportGrouping::QuarterHour, 1_440, "stamp", true).is_none());
        assert!(bucket_expr(ReportGrouping::Hour, 1_440, "stamp", true).is_none());
        // Day grouping over the same rows resolves.
        assert!(bucket_expr(ReportGrouping::Day, 1_440, "stamp", true).is_some());
    }

    #[test]
    fn test_raw_quarter_hour_floors_epoch() {
        let expr = bucket_expr(ReportGrouping::QuarterHour, 15, "stamp", false).unwrap();
        assert!(expr.contains("floor(extract(epoch from stamp) / 900)"));
    }

    #[test]
    fn test_cache_quarter_hour_reads_column_directly() {
        let expr = bucket_expr(ReportGrouping::QuarterHour, 15, "stamp", true).unwrap();
        assert_eq!(expr, "to_char(stamp, 'YYYY-MM-DD HH24:MI')");
    }

    #[test]
    fn test_bucket_labels() {
        let stamp = ts("2024-01-15 13:47:31");
        assert_eq!(
            bucket_label(ReportGrouping::QuarterHour, stamp),
            "2024-01-15 13:45"
        );
        assert_eq!(bucket_label(ReportGrouping::Hour, stamp), "2024-01-15 13:00");
        assert_eq!(bucket_label(ReportGrouping::Day, stamp), "2024-01-15");
        assert_eq!(bucket_label(ReportGrouping::Week, stamp), "2024-W03");
        assert_eq!(bucket_label(ReportGrouping::Month, stamp), "2024-01");
    }

    #[test]
    fn test_iso_week_label_crosses_year_boundary() {
        // 2024-12-30 belongs to ISO week 1 of 2025.
        assert_eq!(
            bucket_label(ReportGrouping::Week, ts("2024-12-30 08:00:00")),
            "2025-W01"
        );
    }

    #[test]
    fn test_bucket_start() {
        let stamp = ts("2024-01-15 13:47:31");
        assert_eq!(
            bucket_start(ReportGrouping::QuarterHour, stamp),
            ts("2024-01-15 13:45:00")
        );
        assert_eq!(bucket_start(ReportGrouping::Hour, stamp), ts("2024-01-15 13:00:00"));
        assert_eq!(bucket_start(ReportGrouping::Day, stamp), ts("2024-01-15 00:00:00"));
        // 2024-01-15 is a Monday.
        assert_eq!(bucket_start(ReportGrouping::Week, stamp), ts("2024-01-15 00:00:00"));
        assert_eq!(
            bucket_start(ReportGrouping::Week, ts("2024-01-17 02:00:00")),
            ts("2024-01-15 00:00:00")
        );
        assert_eq!(bucket_start(ReportGrouping::Month, stamp), ts("2024-01-01 00:00:00"));
    }
}
