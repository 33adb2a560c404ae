//! SQL shape tests for the report query builders.

use chrono::NaiveDateTime;

use bikepark_reports::api::{BikeparkId, ReportGrouping, ReportParams, ReportType};
use bikepark_reports::reports::{
    align_range, build_report_sql, interpolate::interpolate, EMPTY_SELECTION_SQL,
};

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn occupancy_params(ids: &[&str]) -> ReportParams {
    ReportParams {
        report_type: ReportType::AbsoluteOccupancy,
        report_grouping: ReportGrouping::Hour,
        bikepark_ids: ids.iter().map(|id| BikeparkId::from(*id)).collect(),
        start_dt: ts("2024-01-01 00:00:00"),
        end_dt: ts("2024-01-02 00:00:00"),
        fillups: true,
        source: None,
    }
}

#[test]
fn absolute_occupancy_statement_shape() {
    // Two facilities, hourly buckets over one day.
    let params = occupancy_params(&["A", "B"]);
    let range = align_range(&params);
    let sql = build_report_sql(&params, &range, false).unwrap();

    // 2 facilities x 2 series = 4 UNION ALL-joined SELECT blocks.
    assert_eq!(sql.matches("SELECT ").count() - sql.matches("(SELECT ").count(), 4);
    assert_eq!(sql.matches(" UNION ALL ").count(), 3);

    // Four interpolated date literals per block: the interval subquery pins
    // the window directly, the outer range goes through the interpolator.
    let start_literals = sql.matches("'2024-01-01 00:00:00'").count();
    let end_literals = sql.matches("'2024-01-02 00:00:00'").count();
    assert_eq!(start_literals + end_literals, 16);

    // Multi-series results arrive already time-ordered.
    assert!(sql.trim_end().ends_with("ORDER BY bucket ASC"));

    // No placeholder survives interpolation.
    assert!(!sql.contains('?'));
}

#[test]
fn absolute_occupancy_series_labels_are_deterministic() {
    let params = occupancy_params(&["F"]);
    let range = align_range(&params);
    let sql = build_report_sql(&params, &range, false).unwrap();

    assert!(sql.contains("'F_capacity'"));
    assert!(sql.contains("'F_occupation'"));
    assert!(sql.contains("MAX(capacity)"));
    assert!(sql.contains("ROUND(AVG(occupation))"));
}

#[test]
fn empty_selection_yields_sentinel_for_every_report_type() {
    for report_type in [
        ReportType::AbsoluteOccupancy,
        ReportType::RelativeOccupancy,
        ReportType::Transactions,
        ReportType::StayDuration,
    ] {
        let mut params = occupancy_params(&[]);
        params.report_type = report_type;
        params.report_grouping = ReportGrouping::Day;
        let range = align_range(&params);
        let sql = build_report_sql(&params, &range, false).unwrap();
        assert_eq!(sql, EMPTY_SELECTION_SQL, "{:?}", report_type);
        assert!(sql.contains("WHERE 1=0"));
    }
}

#[test]
fn interpolator_count_invariant_is_deterministic() {
    let template = "SELECT 1 WHERE a = ? AND b = ?";
    let one = vec!["x".to_string()];
    let three = vec!["x".to_string(), "y".to_string(), "z".to_string()];

    // Both mismatch directions fail, and they fail identically every time.
    let first = interpolate(template, &one).unwrap_err();
    let second = interpolate(template, &one).unwrap_err();
    assert_eq!(first, second);
    assert!(interpolate(template, &three).is_err());

    let two = vec!["x".to_string(), "y".to_string()];
    assert!(interpolate(template, &two).is_ok());
}

#[test]
fn optional_filters_append_conjuncts() {
    let mut params = occupancy_params(&["A"]);
    params.fillups = false;
    params.source = Some("fms".to_string());
    let range = align_range(&params);
    let sql = build_report_sql(&params, &range, false).unwrap();

    assert_eq!(sql.matches("AND fillup = FALSE").count(), 2);
    assert_eq!(sql.matches("AND source = 'fms'").count(), 2);
}

#[test]
fn grouping_expressions_vary_with_granularity() {
    for (grouping, fragment) in [
        (ReportGrouping::QuarterHour, "floor(extract(epoch from stamp) / 900)"),
        (ReportGrouping::Hour, "date_trunc('hour', stamp)"),
        (ReportGrouping::Day, "date_trunc('day', stamp)"),
        (ReportGrouping::Week, "date_trunc('week', stamp)"),
        (ReportGrouping::Month, "date_trunc('month', stamp)"),
    ] {
        let mut params = occupancy_params(&["A"]);
        params.report_grouping = grouping;
        let range = align_range(&params);
        let sql = build_report_sql(&params, &range, false).unwrap();
        assert!(sql.contains(fragment), "{:?} missing {}", grouping, fragment);
    }
}

#[test]
fn relative_occupancy_shape() {
    let mut params = occupancy_params(&["A", "B", "C"]);
    params.report_type = ReportType::RelativeOccupancy;
    let range = align_range(&params);
    let sql = build_report_sql(&params, &range, false).unwrap();

    // One percentage series per facility.
    assert_eq!(sql.matches(" UNION ALL ").count(), 2);
    for id in ["A", "B", "C"] {
        assert!(sql.contains(&format!("'{}_percentage'", id)));
    }
}

#[test]
fn stay_duration_emits_one_block_per_class_and_facility() {
    let mut params = occupancy_params(&["A", "B"]);
    params.report_type = ReportType::StayDuration;
    params.report_grouping = ReportGrouping::Day;
    let range = align_range(&params);
    let sql = build_report_sql(&params, &range, false).unwrap();

    // 2 facilities x 6 duration classes.
    assert_eq!(sql.matches(" UNION ALL ").count(), 11);
    assert!(sql.contains("'A_0-1h'"));
    assert!(sql.contains("'B_24h+'"));
}
