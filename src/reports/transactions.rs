//! Transaction and revenue report builder.
//!
//! Two series per facility: `transactions` (event count) and `revenue`
//! (amount sum). The cache path re-aggregates the day-bucketed cache rows,
//! the raw path counts the events themselves.

use crate::api::ReportParams;

use super::interpolate::{interpolate, quote_literal};
use super::{
    finish_statement, resolved_bucket_expr, source_table, ReportRange, ReportSqlError,
    EMPTY_SELECTION_SQL,
};

pub fn build_transactions_sql(
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
) -> Result<String, ReportSqlError> {
    if params.bikepark_ids.is_empty() {
        return Ok(EMPTY_SELECTION_SQL.to_string());
    }

    let bucket = resolved_bucket_expr(params, use_cache, "stamp")?;
    let table = source_table(params.report_type, use_cache);
    let series: [(&str, &str); 2] = if use_cache {
        [
            ("transactions", "SUM(transactions)::double precision"),
            ("revenue", "SUM(revenue)::double precision"),
        ]
    } else {
        [
            ("transactions", "COUNT(*)::double precision"),
            ("revenue", "COALESCE(SUM(amount), 0)::double precision"),
        ]
    };
    let (start, end) = range.as_sql_pair();

    let mut blocks = Vec::with_capacity(params.bikepark_ids.len() * 2);
    let mut bind = Vec::with_capacity(blocks.capacity() * 2);
    for id in &params.bikepark_ids {
        for (name, aggregate) in &series {
            let category = quote_literal(&format!("{}_{}", id, name));
            blocks.push(format!(
                "SELECT {category} AS category, {bucket} AS bucket, {aggregate} AS value \
                 FROM {table} \
                 WHERE bikepark_id = {id_literal} AND stamp BETWEEN ? AND ? GROUP BY bucket",
                category = category,
                bucket = bucket,
                aggregate = aggregate,
                table = table,
                id_literal = quote_literal(id.as_str()),
            ));
            bind.push(start.clone());
            bind.push(end.clone());
        }
    }

    Ok(interpolate(&finish_statement(blocks), &bind)?)
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
            report_type: ReportType::Transactions,
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
            build_transactions_sql(&p, &range(&p), false).unwrap(),
            EMPTY_SELECTION_SQL
        );
    }

    #[test]
    fn test_raw_counts_events() {
        let p = params(&["A"], ReportGrouping::Day);
        let sql = build_transactions_sql(&p, &range(&p), false).unwrap();
        assert!(sql.contains("COUNT(*)::double precision"));
        assert!(sql.contains("COALESCE(SUM(amount), 0)"));
        assert!(sql.contains("FROM transacties "));
        assert!(sql.contains("'A_transactions'"));
        assert!(sql.contains("'A_revenue'"));
    }

    #[test]
    fn test_cache_reaggregates_day_rows() {
        let p = params(&["A"], ReportGrouping::Month);
        let sql = build_transactions_sql(&p, &range(&p), true).unwrap();
        assert!(sql.contains("SUM(transactions)"));
        assert!(sql.contains("SUM(revenue)"));
        assert!(sql.contains("FROM transacties_cache"));
    }

    #[test]
    fn test_block_and_parameter_counts() {
        let p = params(&["A", "B", "C"], ReportGrouping::Week);
        let sql = build_transactions_sql(&p, &range(&p), false).unwrap();
        // Three facilities, two series each.
        assert_eq!(sql.matches("UNION ALL").count(), 5);
        assert_eq!(sql.matches("'2024-01-01 00:00:00'").count(), 6);
        assert!(sql.ends_with("ORDER BY bucket ASC"));
    }
}
