//! Occupancy report builders.
//!
//! The absolute builder emits two series per facility — `capacity`
//! (`MAX(capacity)`) and `occupation` (`ROUND(AVG(occupation))`) — the
//! relative builder a single `percentage` series. Rows in both source
//! tables carry a declared sampling interval; each block restricts itself
//! to the finest interval present in the window so a mid-window interval
//! change cannot mix bucket populations.

use crate::api::{BikeparkId, ReportParams};

use super::interpolate::{interpolate, quote_literal};
use super::{
    finish_statement, resolved_bucket_expr, source_table, ReportRange, ReportSqlError,
    EMPTY_SELECTION_SQL,
};

/// Build the absolute occupancy statement: per facility, a `capacity` and
/// an `occupation` block, four date parameters per facility.
pub fn build_absolute_occupancy_sql(
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
) -> Result<String, ReportSqlError> {
    build_occupancy_sql(
        params,
        range,
        use_cache,
        &[
            ("capacity", "MAX(capacity)::double precision"),
            ("occupation", "ROUND(AVG(occupation))::double precision"),
        ],
    )
}

/// Build the relative occupancy statement: one `percentage` series per
/// facility, occupation as a share of capacity.
pub fn build_relative_occupancy_sql(
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
) -> Result<String, ReportSqlError> {
    build_occupancy_sql(
        params,
        range,
        use_cache,
        &[(
            "percentage",
            "ROUND(AVG(occupation * 100.0 / NULLIF(capacity, 0)))::double precision",
        )],
    )
}

fn build_occupancy_sql(
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
    series: &[(&str, &str)],
) -> Result<String, ReportSqlError> {
    if params.bikepark_ids.is_empty() {
        return Ok(EMPTY_SELECTION_SQL.to_string());
    }

    let bucket = resolved_bucket_expr(params, use_cache, "stamp")?;
    let table = source_table(params.report_type, use_cache);
    let filters = optional_filters(params);
    let (start, end) = range.as_sql_pair();

    let mut blocks = Vec::with_capacity(params.bikepark_ids.len() * series.len());
    let mut bind = Vec::with_capacity(blocks.capacity() * 2);
    for id in &params.bikepark_ids {
        for (name, aggregate) in series {
            blocks.push(occupancy_block(
                table, &bucket, id, name, aggregate, &filters, &start, &end,
            ));
            bind.push(start.clone());
            bind.push(end.clone());
        }
    }

    Ok(interpolate(&finish_statement(blocks), &bind)?)
}

/// One `SELECT` block for a single facility and series.
///
/// The inner subquery pins the block to the finest sampling interval found
/// in the window; its bounds are escaped directly, while the outer range
/// goes through the interpolator.
#[allow(clippy::too_many_arguments)]
fn occupancy_block(
    table: &str,
    bucket: &str,
    id: &BikeparkId,
    series: &str,
    aggregate: &str,
    filters: &str,
    start: &str,
    end: &str,
) -> String {
    let category = quote_literal(&format!("{}_{}", id, series));
    let id_literal = quote_literal(id.as_str());
    format!(
        "SELECT {category} AS category, {bucket} AS bucket, {aggregate} AS value \
         FROM {table} \
         WHERE bikepark_id = {id_literal} \
         AND interval_min = (SELECT MIN(interval_min) FROM {table} \
         WHERE bikepark_id = {id_literal} AND stamp BETWEEN {start} AND {end}) \
         AND stamp BETWEEN ? AND ?{filters} GROUP BY bucket",
        category = category,
        bucket = bucket,
        aggregate = aggregate,
        table = table,
        id_literal = id_literal,
        start = quote_literal(start),
        end = quote_literal(end),
        filters = filters,
    )
}

/// Optional `WHERE` conjuncts, appended only when requested.
fn optional_filters(params: &ReportParams) -> String {
    let mut filters = String::new();
    if !params.fillups {
        filters.push_str(" AND fillup = FALSE");
    }
    if let Some(source) = &params.source {
        filters.push_str(&format!(" AND source = {}", quote_literal(source)));
    }
    filters
}
