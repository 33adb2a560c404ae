//! Report execution service.
//!
//! Validates and resolves a report request, restricts the facility
//! selection to the caller's access context, executes it through the
//! repository, and assembles the raw rows into named series.

use log::debug;

use crate::api::{AccessContext, ReportParams, ReportSeries, SeriesPoint};
use crate::db::models::SeriesRow;
use crate::db::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::reports::{align_range, build_report_sql, ReportSqlError};

/// Drop every selected facility the caller may not query.
///
/// Facilities outside the access context are silently removed rather than
/// rejected: the surrounding application sends the user's full selection
/// and expects series only for the accessible part.
pub fn restrict_selection(params: &ReportParams, access: &AccessContext) -> ReportParams {
    let mut restricted = params.clone();
    restricted.bikepark_ids.retain(|id| access.allows(id));
    restricted
}

/// Build the finished SQL for a request without executing it.
///
/// The selection is restricted to the access context first, so the
/// statement never touches facilities the caller may not query.
pub fn report_sql(
    params: &ReportParams,
    access: &AccessContext,
    use_cache: bool,
) -> Result<String, ReportSqlError> {
    let params = restrict_selection(params, access);
    let range = align_range(&params);
    build_report_sql(&params, &range, use_cache)
}

/// Execute a report request and assemble its series.
pub async fn run_report(
    repo: &dyn FullRepository,
    params: &ReportParams,
    access: &AccessContext,
    use_cache: bool,
) -> RepositoryResult<Vec<ReportSeries>> {
    if params.end_dt < params.start_dt {
        return Err(RepositoryError::validation(format!(
            "endDT {} precedes startDT {}",
            params.end_dt, params.start_dt
        )));
    }

    let params = restrict_selection(params, access);
    let range = align_range(&params);
    debug!(
        "running {:?} report over {} .. {} for {} facilities",
        params.report_type,
        range.start,
        range.end,
        params.bikepark_ids.len()
    );

    let rows = repo.fetch_report_rows(&params, &range, use_cache).await?;
    Ok(assemble_series(rows))
}

/// Group executed rows into named series.
///
/// Rows arrive bucket-ordered; series appear in first-encounter order and
/// their category labels split at the last underscore into facility and
/// series name.
pub fn assemble_series(rows: Vec<SeriesRow>) -> Vec<ReportSeries> {
    let mut series: Vec<ReportSeries> = Vec::new();
    for row in rows {
        let point = SeriesPoint {
            bucket: row.bucket,
            value: row.value,
        };
        match series.iter_mut().find(|s| s.name == row.category) {
            Some(existing) => existing.points.push(point),
            None => {
                let (bikepark_id, name) = ReportSeries::split_category(&row.category);
                series.push(ReportSeries {
                    name: row.category,
                    bikepark_id,
                    series: name,
                    points: vec![point],
                });
            }
        }
    }
    series
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::api::{BikeparkId, ReportGrouping, ReportType};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn params(ids: &[&str]) -> ReportParams {
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
    fn test_restrict_selection_drops_inaccessible() {
        let access = AccessContext::admin(vec![BikeparkId::from("A")]);
        let restricted = restrict_selection(&params(&["A", "B"]), &access);
        assert_eq!(restricted.bikepark_ids, vec![BikeparkId::from("A")]);
    }

    #[test]
    fn test_report_sql_with_no_accessible_facility_is_sentinel() {
        let access = AccessContext::default();
        let sql = report_sql(&params(&["A"]), &access, false).unwrap();
        assert!(sql.contains("WHERE 1=0"));
    }

    #[test]
    fn test_assemble_series_groups_and_splits() {
        let rows = vec![
            SeriesRow {
                category: "A_capacity".into(),
                bucket: "2024-01-01 10:00".into(),
                value: 100.0,
            },
            SeriesRow {
                category: "A_occupation".into(),
                bucket: "2024-01-01 10:00".into(),
                value: 40.0,
            },
            SeriesRow {
                category: "A_capacity".into(),
                bucket: "2024-01-01 11:00".into(),
                value: 100.0,
            },
        ];
        let series = assemble_series(rows);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name, "A_capacity");
        assert_eq!(series[0].bikepark_id, "A");
        assert_eq!(series[0].series, "capacity");
        assert_eq!(series[0].points.len(), 2);
        assert_eq!(series[1].points.len(), 1);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let repo = crate::db::LocalRepository::new();
        let mut p = params(&["A"]);
        p.end_dt = ts("2023-12-31 00:00:00");
        let access = AccessContext::admin(vec![BikeparkId::from("A")]);
        let err = run_report(&repo, &p, &access, false).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }));
    }
}
