//! SQL synthesis for the report engine.
//!
//! Each report type has its own builder that assembles one `UNION ALL`
//! `SELECT` block per selected facility and series, labels every block with
//! a `{facility}_{series}` category, binds the date range per block through
//! `?` placeholders, and finishes with a global `ORDER BY bucket ASC`. The
//! assembled template is passed through the [`interpolate`] module, which is
//! the only place literals enter the statement.
//!
//! Builders never return malformed SQL: an empty facility selection yields
//! the `WHERE 1=0` sentinel statement, and an unsupported grouping is a
//! typed error raised before any SQL is produced.

pub mod grouping;
pub mod interpolate;
pub mod occupancy;
pub mod stay_duration;
pub mod transactions;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::api::{ReportGrouping, ReportParams, ReportType};
use interpolate::InterpolateError;

/// Sentinel statement returned for an empty facility selection.
///
/// Syntactically valid, executes successfully, and yields zero rows, so the
/// series assembler downstream is never handed a broken statement.
pub const EMPTY_SELECTION_SQL: &str =
    "SELECT '' AS category, '' AS bucket, 0::double precision AS value WHERE 1=0";

/// Errors raised while building report SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportSqlError {
    /// The requested grouping cannot be resolved against the source table.
    #[error("grouping {grouping:?} cannot be resolved against {table} (source interval {interval_min} min)")]
    UnsupportedGrouping {
        grouping: ReportGrouping,
        table: &'static str,
        interval_min: u32,
    },
    /// Placeholder substitution failed; indicates a builder bug.
    #[error("interpolation failed: {0}")]
    Interpolate(#[from] InterpolateError),
}

/// Resolved, interval-aligned date range for a report request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ReportRange {
    /// Format the bounds the way they are interpolated into SQL.
    pub fn as_sql_pair(&self) -> (String, String) {
        (sql_datetime(self.start), sql_datetime(self.end))
    }
}

/// Align a requested range to the grouping's bucket boundaries.
///
/// The start is floored to its bucket start so the first bucket is complete;
/// the end bound is kept as supplied (the range comparison is inclusive, so
/// flooring it would drop the final partial bucket).
pub fn align_range(params: &ReportParams) -> ReportRange {
    ReportRange {
        start: grouping::bucket_start(params.report_grouping, params.start_dt),
        end: params.end_dt,
    }
}

/// Canonical datetime formatting for interpolated SQL literals.
pub fn sql_datetime(stamp: NaiveDateTime) -> String {
    stamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Sampling interval (minutes) of the source a report type reads from.
///
/// Raw event tables resolve any grouping; the occupancy tables sample at
/// quarter-hour resolution, and the day-bucketed caches only support day
/// or coarser groupings.
pub fn source_interval_min(report_type: ReportType, use_cache: bool) -> u32 {
    match (report_type, use_cache) {
        (ReportType::AbsoluteOccupancy | ReportType::RelativeOccupancy, _) => 15,
        (ReportType::Transactions | ReportType::StayDuration, false) => 1,
        (ReportType::Transactions | ReportType::StayDuration, true) => 1_440,
    }
}

/// Source table a report type reads from.
pub fn source_table(report_type: ReportType, use_cache: bool) -> &'static str {
    match (report_type, use_cache) {
        (ReportType::AbsoluteOccupancy | ReportType::RelativeOccupancy, false) => "bezettingsdata",
        (ReportType::AbsoluteOccupancy | ReportType::RelativeOccupancy, true) => "bezetting_cache",
        (ReportType::Transactions, false) => "transacties",
        (ReportType::Transactions, true) => "transacties_cache",
        (ReportType::StayDuration, false) => "stallingsduur",
        (ReportType::StayDuration, true) => "stallingsduur_cache",
    }
}

/// Build the finished, fully-interpolated SQL for a report request.
///
/// This is the single entry point the repository backends and callers use;
/// the per-type builders stay independently testable underneath it.
pub fn build_report_sql(
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
) -> Result<String, ReportSqlError> {
    match params.report_type {
        ReportType::AbsoluteOccupancy => {
            occupancy::build_absolute_occupancy_sql(params, range, use_cache)
        }
        ReportType::RelativeOccupancy => {
            occupancy::build_relative_occupancy_sql(params, range, use_cache)
        }
        ReportType::Transactions => transactions::build_transactions_sql(params, range, use_cache),
        ReportType::StayDuration => stay_duration::build_stay_duration_sql(params, range, use_cache),
    }
}

/// Resolve the bucket expression for a report request or fail with the
/// typed validation error builders return.
pub(crate) fn resolved_bucket_expr(
    params: &ReportParams,
    use_cache: bool,
    column: &str,
) -> Result<String, ReportSqlError> {
    let interval_min = source_interval_min(params.report_type, use_cache);
    let table = source_table(params.report_type, use_cache);
    grouping::bucket_expr(params.report_grouping, interval_min, column, use_cache).ok_or(
        ReportSqlError::UnsupportedGrouping {
            grouping: params.report_grouping,
            table,
            interval_min,
        },
    )
}

/// Join assembled blocks and append the global bucket ordering.
pub(crate) fn finish_statement(blocks: Vec<String>) -> String {
    format!("{} ORDER BY bucket ASC", blocks.join(" UNION ALL "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BikeparkId;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn params(grouping: ReportGrouping) -> ReportParams {
        ReportParams {
            report_type: ReportType::AbsoluteOccupancy,
            report_grouping: grouping,
            bikepark_ids: vec![BikeparkId::from("A")],
            start_dt: ts("2024-01-01 00:07:00"),
            end_dt: ts("2024-01-02 00:00:00"),
            fillups: false,
            source: None,
        }
    }

    #[test]
    fn test_align_range_floors_start_to_bucket() {
        let range = align_range(&params(ReportGrouping::Hour));
        assert_eq!(range.start, ts("2024-01-01 00:00:00"));
        assert_eq!(range.end, ts("2024-01-02 00:00:00"));
    }

    #[test]
    fn test_sql_datetime_format() {
        assert_eq!(sql_datetime(ts("2024-01-01 13:05:00")), "2024-01-01 13:05:00");
    }

    #[test]
    fn test_source_tables() {
        assert_eq!(source_table(ReportType::Transactions, true), "transacties_cache");
        assert_eq!(source_table(ReportType::StayDuration, false), "stallingsduur");
    }

    #[test]
    fn test_day_cache_rejects_hourly_grouping() {
        let mut p = params(ReportGrouping::Hour);
        p.report_type = ReportType::Transactions;
        let range = align_range(&p);
        let err = build_report_sql(&p, &range, true).unwrap_err();
        assert!(matches!(err, ReportSqlError::UnsupportedGrouping { .. }));
        // The raw table supports it.
        assert!(build_report_sql(&p, &range, false).is_ok());
    }
}
