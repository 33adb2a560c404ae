//! Duration-of-stay report builder.
//!
//! Emits one histogram series per duration class per facility: the value of
//! each bucket is the number of stays that ended in that bucket and fall in
//! the class. Class boundaries live in [`crate::cache`] so the cache
//! materialization and this builder cannot drift apart.

use crate::api::ReportParams;
use crate::cache::{DURATION_CLASSES, DurationClass};

use super::interpolate::{interpolate, quote_literal};
use super::{
    finish_statement, resolved_bucket_expr, source_table, ReportRange, ReportSqlError,
    EMPTY_SELECTION_SQL,
};

pub fn build_stay_duration_sql(
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
) -> Result<String, ReportSqlError> {
    if params.bikepark_ids.is_empty() {
        return Ok(EMPTY_SELECTION_SQL.to_string());
    }

    let bucket = resolved_bucket_expr(params, use_cache, "stamp")?;
    let table = source_table(params.report_type, use_cache);
    let (start, end) = range.as_sql_pair();

    let mut blocks = Vec::with_capacity(params.bikepark_ids.len() * DURATION_CLASSES.len());
    let mut bind = Vec::with_capacity(blocks.capacity() * 2);
    for id in &params.bikepark_ids {
        for class in DURATION_CLASSES {
            let category = quote_literal(&format!("{}_{}", id, class.label));
            let class_filter = if use_cache {
                format!("duration_class = {}", class.class)
            } else {
                raw_class_filter(class)
            };
            let aggregate = if use_cache {
                "SUM(stays)::double precision"
            } else {
                "COUNT(*)::double precision"
            };
            blocks.push(format!(
                "SELECT {category} AS category, {bucket} AS bucket, {aggregate} AS value \
                 FROM {table} \
                 WHERE bikepark_id = {id_literal} AND {class_filter} \
                 AND stamp BETWEEN ? AND ? GROUP BY bucket",
                category = category,
                bucket = bucket,
                aggregate = aggregate,
                table = table,
                id_literal = quote_literal(id.as_str()),
                class_filter = class_filter,
            ));
            bind.push(start.clone());
            bind.push(end.clone());
        }
    }

    Ok(interpolate(&finish_statement(blocks), &bind)?)
}

/// Raw-table predicate selecting stays inside a duration class.
fn raw_class_filter(class: &DurationClass) -> String {
    match class.max_min {
        Some(max) => format!(
            "duration_min >= {} AND duration_min < {}",
            class.min_min, max
        ),
        None => format!("duration_min >= {}", class.min_min),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::api::{BikeparkId, ReportGrouping, ReportType};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn params(ids: &[&str], grouping: ReportGrouping) -> ReportParams {
        ReportParams {
            report_type: ReportType::StayDuration,
            report_grouping: grouping,
            bikepark_ids: ids.iter().map(|id| BikeparkId::from(*id)).collect(),
            start_dt: ts("2024-01-01 00:00:00"),
            end_dt: ts("2024-01-31 00:00:00"),
            fillups: true,
            source: None,
        }
    }

    fn range(p: &ReportParams) -> ReportRange {
        super::super::align_range(p)
    }

    #[test]
    fn test_empty_selection_returns_sentinel() {
        let p = params(&[], ReportGrouping::Day);
        assert_eq!(
            build_stay_duration_sql(&p, &range(&p), false).unwrap(),
            EMPTY_SELECTION_SQL
        );
    }

    #[test]
    fn test_one_block_per_class() {
        let p = params(&["A"], ReportGrouping::Day);
        let sql = build_stay_duration_sql(&p, &range(&p), false).unwrap();
        assert_eq!(sql.matches("UNION ALL").count(), DURATION_CLASSES.len() - 1);
        assert!(sql.contains("'A_0-1h'"));
        assert!(sql.contains("'A_24h+'"));
        assert!(sql.contains("duration_min >= 1440"));
    }

    #[test]
    fn test_open_ended_class_has_no_upper_bound() {
        let last = DURATION_CLASSES.last().unwrap();
        assert!(last.max_min.is_none());
        assert_eq!(raw_class_filter(last), "duration_min >= 1440");
    }

    #[test]
    fn test_cache_path_sums_precomputed_counts() {
        let p = params(&["A"], ReportGrouping::Month);
        let sql = build_stay_duration_sql(&p, &range(&p), true).unwrap();
        assert!(sql.contains("SUM(stays)"));
        assert!(sql.contains("duration_class = 1"));
        assert!(sql.contains("FROM stallingsduur_cache"));
    }
}
