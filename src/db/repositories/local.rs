//! In-memory repository for unit testing and local development.
//!
//! `LocalRepository` implements the full trait surface against plain
//! vectors. The cache actions reproduce the SQL semantics exactly —
//! half-open delete windows, delete-then-insert updates, the same
//! aggregation formulas and bucket labels — so properties verified here
//! (idempotence, rebuild correctness, incremental/full equivalence) hold
//! for the Postgres backend as well.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use parking_lot::RwLock;

use crate::api::{BikeparkId, CacheStatus, ReportParams, ReportType};
use crate::cache::{duration_class, CacheTable, CacheWindow, DURATION_CLASSES};
use crate::db::models::{
    OccupancyCacheRow, OccupancyRecord, SeriesRow, StayCacheRow, StayRecord, TransactionRecord,
    TransactionsCacheRow,
};
use crate::db::repository::{
    CacheRepository, ErrorContext, RawDataRepository, ReportRepository, RepositoryError,
    RepositoryResult,
};
use crate::reports::{grouping, source_interval_min, source_table, ReportRange, ReportSqlError};

#[derive(Default)]
struct LocalState {
    occupancy: Vec<OccupancyRecord>,
    transactions: Vec<TransactionRecord>,
    stays: Vec<StayRecord>,
    // None = table missing, Some = available
    transactions_cache: Option<Vec<TransactionsCacheRow>>,
    occupancy_cache: Option<Vec<OccupancyCacheRow>>,
    stay_cache: Option<Vec<StayCacheRow>>,
    parent_indices: HashSet<CacheTable>,
}

/// In-memory implementation of the full repository surface.
#[derive(Default)]
pub struct LocalRepository {
    state: RwLock<LocalState>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Half-open window membership, `[start, end)`.
fn in_window(stamp: NaiveDateTime, window: &CacheWindow) -> bool {
    stamp >= window.start && stamp < window.end
}

/// Selection membership; `None` selects everything.
fn selected(id: &str, selection: &Option<Vec<BikeparkId>>) -> bool {
    match selection {
        None => true,
        Some(ids) => ids.iter().any(|b| b.as_str() == id),
    }
}

/// Inclusive range membership mirroring SQL `BETWEEN`.
fn in_range(stamp: NaiveDateTime, range: &ReportRange) -> bool {
    stamp >= range.start && stamp <= range.end
}

/// Floor a timestamp to its sampling-interval bucket.
fn interval_floor(stamp: NaiveDateTime, interval_min: i32) -> NaiveDateTime {
    let step = i64::from(interval_min.max(1)) * 60;
    let secs = stamp.and_utc().timestamp();
    let floored = secs - secs.rem_euclid(step);
    DateTime::from_timestamp(floored, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or(stamp)
}

/// Floor a timestamp to midnight.
fn day_floor(stamp: NaiveDateTime) -> NaiveDateTime {
    stamp.date().and_hms_opt(0, 0, 0).unwrap_or(stamp)
}

fn missing_table_error(table: CacheTable, operation: &str) -> RepositoryError {
    RepositoryError::query_with_context(
        format!("relation \"{}\" does not exist", table.table_name()),
        ErrorContext::new(operation)
            .with_entity("cache")
            .with_entity_id(table.table_name()),
    )
}

#[async_trait]
impl CacheRepository for LocalRepository {
    async fn cache_status(&self, table: CacheTable) -> RepositoryResult<CacheStatus> {
        let state = self.state.read();
        let stamps: Option<Vec<NaiveDateTime>> = match table {
            CacheTable::Transactions => state
                .transactions_cache
                .as_ref()
                .map(|rows| rows.iter().map(|r| r.stamp).collect()),
            CacheTable::Occupancy => state
                .occupancy_cache
                .as_ref()
                .map(|rows| rows.iter().map(|r| r.stamp).collect()),
            CacheTable::StayDuration => state
                .stay_cache
                .as_ref()
                .map(|rows| rows.iter().map(|r| r.stamp).collect()),
        };
        Ok(match stamps {
            None => CacheStatus::missing(table.table_name()),
            Some(stamps) => CacheStatus::available(
                table.table_name(),
                stamps.len() as i64,
                stamps.iter().min().copied(),
                stamps.iter().max().copied(),
            ),
        })
    }

    async fn create_cache_table(&self, table: CacheTable) -> RepositoryResult<()> {
        let mut state = self.state.write();
        match table {
            CacheTable::Transactions => {
                state.transactions_cache.get_or_insert_with(Vec::new);
            }
            CacheTable::Occupancy => {
                state.occupancy_cache.get_or_insert_with(Vec::new);
            }
            CacheTable::StayDuration => {
                state.stay_cache.get_or_insert_with(Vec::new);
            }
        }
        Ok(())
    }

    async fn drop_cache_table(&self, table: CacheTable) -> RepositoryResult<()> {
        let mut state = self.state.write();
        match table {
            CacheTable::Transactions => state.transactions_cache = None,
            CacheTable::Occupancy => state.occupancy_cache = None,
            CacheTable::StayDuration => state.stay_cache = None,
        }
        state.parent_indices.remove(&table);
        Ok(())
    }

    async fn clear_cache(
        &self,
        table: CacheTable,
        window: &CacheWindow,
    ) -> RepositoryResult<usize> {
        let mut state = self.state.write();
        match table {
            CacheTable::Transactions => {
                let rows = state
                    .transactions_cache
                    .as_mut()
                    .ok_or_else(|| missing_table_error(table, "clear_cache"))?;
                Ok(retain_outside(rows, window, |r| (r.stamp, &r.bikepark_id)))
            }
            CacheTable::Occupancy => {
                let rows = state
                    .occupancy_cache
                    .as_mut()
                    .ok_or_else(|| missing_table_error(table, "clear_cache"))?;
                Ok(retain_outside(rows, window, |r| (r.stamp, &r.bikepark_id)))
            }
            CacheTable::StayDuration => {
                let rows = state
                    .stay_cache
                    .as_mut()
                    .ok_or_else(|| missing_table_error(table, "clear_cache"))?;
                Ok(retain_outside(rows, window, |r| (r.stamp, &r.bikepark_id)))
            }
        }
    }

    async fn update_cache(
        &self,
        table: CacheTable,
        window: &CacheWindow,
    ) -> RepositoryResult<usize> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        match table {
            CacheTable::Transactions => {
                let fresh = aggregate_transactions(&state.transactions, window);
                let rows = state
                    .transactions_cache
                    .as_mut()
                    .ok_or_else(|| missing_table_error(table, "update_cache"))?;
                retain_outside(rows, window, |r| (r.stamp, &r.bikepark_id));
                let written = fresh.len();
                rows.extend(fresh);
                Ok(written)
            }
            CacheTable::Occupancy => {
                let fresh = aggregate_occupancy(&state.occupancy, window);
                let rows = state
                    .occupancy_cache
                    .as_mut()
                    .ok_or_else(|| missing_table_error(table, "update_cache"))?;
                retain_outside(rows, window, |r| (r.stamp, &r.bikepark_id));
                let written = fresh.len();
                rows.extend(fresh);
                Ok(written)
            }
            CacheTable::StayDuration => {
                let fresh = aggregate_stays(&state.stays, window);
                let rows = state
                    .stay_cache
                    .as_mut()
                    .ok_or_else(|| missing_table_error(table, "update_cache"))?;
                retain_outside(rows, window, |r| (r.stamp, &r.bikepark_id));
                let written = fresh.len();
                rows.extend(fresh);
                Ok(written)
            }
        }
    }

    async fn create_parent_indices(&self, table: CacheTable) -> RepositoryResult<()> {
        let mut state = self.state.write();
        let exists = match table {
            CacheTable::Transactions => state.transactions_cache.is_some(),
            CacheTable::Occupancy => state.occupancy_cache.is_some(),
            CacheTable::StayDuration => state.stay_cache.is_some(),
        };
        if !exists {
            return Err(missing_table_error(table, "create_parent_indices"));
        }
        state.parent_indices.insert(table);
        Ok(())
    }

    async fn drop_parent_indices(&self, table: CacheTable) -> RepositoryResult<()> {
        self.state.write().parent_indices.remove(&table);
        Ok(())
    }
}

/// Drop the rows inside the window × selection; returns how many were removed.
fn retain_outside<R>(
    rows: &mut Vec<R>,
    window: &CacheWindow,
    key: impl Fn(&R) -> (NaiveDateTime, &String),
) -> usize {
    let before = rows.len();
    rows.retain(|r| {
        let (stamp, id) = key(r);
        !(in_window(stamp, window) && selected(id, &window.bikepark_ids))
    });
    before - rows.len()
}

/// Aggregate raw transactions into day-bucketed cache rows.
fn aggregate_transactions(
    raw: &[TransactionRecord],
    window: &CacheWindow,
) -> Vec<TransactionsCacheRow> {
    let mut groups: BTreeMap<(String, NaiveDateTime), (i64, f64)> = BTreeMap::new();
    for record in raw {
        if !in_window(record.stamp, window) || !selected(&record.bikepark_id, &window.bikepark_ids)
        {
            continue;
        }
        let key = (record.bikepark_id.clone(), day_floor(record.stamp));
        let entry = groups.entry(key).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.amount;
    }
    groups
        .into_iter()
        .map(|((bikepark_id, stamp), (transactions, revenue))| TransactionsCacheRow {
            bikepark_id,
            stamp,
            transactions,
            revenue,
        })
        .collect()
}

/// Aggregate raw occupancy snapshots into interval-bucketed cache rows.
fn aggregate_occupancy(raw: &[OccupancyRecord], window: &CacheWindow) -> Vec<OccupancyCacheRow> {
    type Key = (String, NaiveDateTime, i32, bool, Option<String>);
    let mut groups: BTreeMap<Key, (i32, i64, i64)> = BTreeMap::new();
    for record in raw {
        if !in_window(record.stamp, window) || !selected(&record.bikepark_id, &window.bikepark_ids)
        {
            continue;
        }
        let key = (
            record.bikepark_id.clone(),
            interval_floor(record.stamp, record.interval_min),
            record.interval_min,
            record.fillup,
            record.source.clone(),
        );
        let entry = groups.entry(key).or_insert((i32::MIN, 0, 0));
        entry.0 = entry.0.max(record.capacity);
        entry.1 += i64::from(record.occupation);
        entry.2 += 1;
    }
    groups
        .into_iter()
        .map(
            |((bikepark_id, stamp, interval_min, fillup, source), (capacity, occ_sum, count))| {
                OccupancyCacheRow {
                    bikepark_id,
                    stamp,
                    interval_min,
                    fillup,
                    source,
                    capacity,
                    occupation: (occ_sum as f64 / count as f64).round() as i32,
                }
            },
        )
        .collect()
}

/// Aggregate raw stays into day-bucketed histogram cache rows.
fn aggregate_stays(raw: &[StayRecord], window: &CacheWindow) -> Vec<StayCacheRow> {
    let mut groups: BTreeMap<(String, NaiveDateTime, i16), i64> = BTreeMap::new();
    for record in raw {
        if !in_window(record.stamp, window) || !selected(&record.bikepark_id, &window.bikepark_ids)
        {
            continue;
        }
        let key = (
            record.bikepark_id.clone(),
            day_floor(record.stamp),
            duration_class(record.duration_min),
        );
        *groups.entry(key).or_insert(0) += 1;
    }
    groups
        .into_iter()
        .map(|((bikepark_id, stamp, duration_class), stays)| StayCacheRow {
            bikepark_id,
            stamp,
            duration_class,
            stays,
        })
        .collect()
}

#[async_trait]
impl ReportRepository for LocalRepository {
    async fn fetch_report_rows(
        &self,
        params: &ReportParams,
        range: &ReportRange,
        use_cache: bool,
    ) -> RepositoryResult<Vec<SeriesRow>> {
        // An empty selection executes the sentinel statement: zero rows.
        if params.bikepark_ids.is_empty() {
            return Ok(Vec::new());
        }
        // Same validation the SQL builders apply before emitting anything.
        let interval_min = source_interval_min(params.report_type, use_cache);
        if grouping::bucket_expr(params.report_grouping, interval_min, "stamp", use_cache)
            .is_none()
        {
            return Err(ReportSqlError::UnsupportedGrouping {
                grouping: params.report_grouping,
                table: source_table(params.report_type, use_cache),
                interval_min,
            }
            .into());
        }

        let state = self.state.read();
        let mut rows = match params.report_type {
            ReportType::AbsoluteOccupancy => {
                occupancy_series(&state, params, range, use_cache, false)?
            }
            ReportType::RelativeOccupancy => {
                occupancy_series(&state, params, range, use_cache, true)?
            }
            ReportType::Transactions => transaction_series(&state, params, range, use_cache)?,
            ReportType::StayDuration => stay_series(&state, params, range, use_cache)?,
        };
        // Mirror of the statements' global ORDER BY bucket ASC; the sort is
        // stable, so block order is preserved inside a bucket.
        rows.sort_by(|a, b| a.bucket.cmp(&b.bucket));
        Ok(rows)
    }

    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(true)
    }
}

/// A facility's occupancy rows viewed uniformly over raw or cache storage.
struct OccupancySample<'a> {
    bikepark_id: &'a str,
    stamp: NaiveDateTime,
    capacity: i32,
    occupation: i32,
    interval_min: i32,
    fillup: bool,
    source: Option<&'a str>,
}

fn occupancy_series(
    state: &LocalState,
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
    relative: bool,
) -> RepositoryResult<Vec<SeriesRow>> {
    let samples: Vec<OccupancySample<'_>> = if use_cache {
        state
            .occupancy_cache
            .as_ref()
            .ok_or_else(|| missing_table_error(CacheTable::Occupancy, "fetch_report_rows"))?
            .iter()
            .map(|r| OccupancySample {
                bikepark_id: &r.bikepark_id,
                stamp: r.stamp,
                capacity: r.capacity,
                occupation: r.occupation,
                interval_min: r.interval_min,
                fillup: r.fillup,
                source: r.source.as_deref(),
            })
            .collect()
    } else {
        state
            .occupancy
            .iter()
            .map(|r| OccupancySample {
                bikepark_id: &r.bikepark_id,
                stamp: r.stamp,
                capacity: r.capacity,
                occupation: r.occupation,
                interval_min: r.interval_min,
                fillup: r.fillup,
                source: r.source.as_deref(),
            })
            .collect()
    };

    let mut out = Vec::new();
    for id in &params.bikepark_ids {
        let park: Vec<&OccupancySample<'_>> = samples
            .iter()
            .filter(|s| s.bikepark_id == id.as_str() && in_range(s.stamp, range))
            .collect();
        // The statements pin each block to the finest sampling interval in
        // the window; that lookup ignores the optional filters.
        let Some(min_interval) = park.iter().map(|s| s.interval_min).min() else {
            continue;
        };
        let filtered = park.iter().filter(|s| {
            s.interval_min == min_interval
                && (params.fillups || !s.fillup)
                && params
                    .source
                    .as_deref()
                    .map_or(true, |src| s.source == Some(src))
        });

        if relative {
            let mut groups: BTreeMap<String, (f64, u32)> = BTreeMap::new();
            for s in filtered {
                if s.capacity == 0 {
                    continue;
                }
                let bucket = grouping::bucket_label(params.report_grouping, s.stamp);
                let entry = groups.entry(bucket).or_insert((0.0, 0));
                entry.0 += f64::from(s.occupation) * 100.0 / f64::from(s.capacity);
                entry.1 += 1;
            }
            out.extend(groups.into_iter().map(|(bucket, (sum, n))| SeriesRow {
                category: format!("{}_percentage", id),
                bucket,
                value: (sum / f64::from(n)).round(),
            }));
        } else {
            let mut caps: BTreeMap<String, i32> = BTreeMap::new();
            let mut occs: BTreeMap<String, (i64, u32)> = BTreeMap::new();
            for s in filtered {
                let bucket = grouping::bucket_label(params.report_grouping, s.stamp);
                caps.entry(bucket.clone())
                    .and_modify(|max| *max = (*max).max(s.capacity))
                    .or_insert(s.capacity);
                let entry = occs.entry(bucket).or_insert((0, 0));
                entry.0 += i64::from(s.occupation);
                entry.1 += 1;
            }
            out.extend(caps.into_iter().map(|(bucket, max)| SeriesRow {
                category: format!("{}_capacity", id),
                bucket,
                value: f64::from(max),
            }));
            out.extend(occs.into_iter().map(|(bucket, (sum, n))| SeriesRow {
                category: format!("{}_occupation", id),
                bucket,
                value: (sum as f64 / f64::from(n)).round(),
            }));
        }
    }
    Ok(out)
}

fn transaction_series(
    state: &LocalState,
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
) -> RepositoryResult<Vec<SeriesRow>> {
    let mut out = Vec::new();
    for id in &params.bikepark_ids {
        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        let mut revenues: BTreeMap<String, f64> = BTreeMap::new();
        if use_cache {
            let rows = state
                .transactions_cache
                .as_ref()
                .ok_or_else(|| missing_table_error(CacheTable::Transactions, "fetch_report_rows"))?;
            for r in rows
                .iter()
                .filter(|r| r.bikepark_id == id.as_str() && in_range(r.stamp, range))
            {
                let bucket = grouping::bucket_label(params.report_grouping, r.stamp);
                *counts.entry(bucket.clone()).or_insert(0.0) += r.transactions as f64;
                *revenues.entry(bucket).or_insert(0.0) += r.revenue;
            }
        } else {
            for r in state
                .transactions
                .iter()
                .filter(|r| r.bikepark_id == id.as_str() && in_range(r.stamp, range))
            {
                let bucket = grouping::bucket_label(params.report_grouping, r.stamp);
                *counts.entry(bucket.clone()).or_insert(0.0) += 1.0;
                *revenues.entry(bucket).or_insert(0.0) += r.amount;
            }
        }
        out.extend(counts.into_iter().map(|(bucket, value)| SeriesRow {
            category: format!("{}_transactions", id),
            bucket,
            value,
        }));
        out.extend(revenues.into_iter().map(|(bucket, value)| SeriesRow {
            category: format!("{}_revenue", id),
            bucket,
            value,
        }));
    }
    Ok(out)
}

fn stay_series(
    state: &LocalState,
    params: &ReportParams,
    range: &ReportRange,
    use_cache: bool,
) -> RepositoryResult<Vec<SeriesRow>> {
    let mut out = Vec::new();
    for id in &params.bikepark_ids {
        for class in DURATION_CLASSES {
            let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
            if use_cache {
                let rows = state.stay_cache.as_ref().ok_or_else(|| {
                    missing_table_error(CacheTable::StayDuration, "fetch_report_rows")
                })?;
                for r in rows.iter().filter(|r| {
                    r.bikepark_id == id.as_str()
                        && r.duration_class == class.class
                        && in_range(r.stamp, range)
                }) {
                    let bucket = grouping::bucket_label(params.report_grouping, r.stamp);
                    *buckets.entry(bucket).or_insert(0.0) += r.stays as f64;
                }
            } else {
                for r in state.stays.iter().filter(|r| {
                    r.bikepark_id == id.as_str()
                        && duration_class(r.duration_min) == class.class
                        && in_range(r.stamp, range)
                }) {
                    let bucket = grouping::bucket_label(params.report_grouping, r.stamp);
                    *buckets.entry(bucket).or_insert(0.0) += 1.0;
                }
            }
            out.extend(buckets.into_iter().map(|(bucket, value)| SeriesRow {
                category: format!("{}_{}", id, class.label),
                bucket,
                value,
            }));
        }
    }
    Ok(out)
}

#[async_trait]
impl RawDataRepository for LocalRepository {
    async fn store_occupancy(&self, rows: &[OccupancyRecord]) -> RepositoryResult<usize> {
        let mut state = self.state.write();
        state.occupancy.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn store_transactions(&self, rows: &[TransactionRecord]) -> RepositoryResult<usize> {
        let mut state = self.state.write();
        state.transactions.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn store_stays(&self, rows: &[StayRecord]) -> RepositoryResult<usize> {
        let mut state = self.state.write();
        state.stays.extend_from_slice(rows);
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_interval_floor() {
        assert_eq!(
            interval_floor(ts("2024-01-01 13:47:31"), 15),
            ts("2024-01-01 13:45:00")
        );
        assert_eq!(
            interval_floor(ts("2024-01-01 13:47:31"), 60),
            ts("2024-01-01 13:00:00")
        );
        // A non-positive interval is treated as one minute.
        assert_eq!(
            interval_floor(ts("2024-01-01 13:47:31"), 0),
            ts("2024-01-01 13:47:00")
        );
    }

    #[test]
    fn test_occupancy_rounding_matches_sql_round() {
        let window = CacheWindow {
            start: ts("2024-01-01 00:00:00"),
            end: ts("2024-01-02 00:00:00"),
            bikepark_ids: None,
        };
        let raw = vec![
            OccupancyRecord {
                bikepark_id: "A".into(),
                stamp: ts("2024-01-01 08:01:00"),
                capacity: 100,
                occupation: 10,
                interval_min: 15,
                fillup: false,
                source: None,
            },
            OccupancyRecord {
                bikepark_id: "A".into(),
                stamp: ts("2024-01-01 08:14:00"),
                capacity: 120,
                occupation: 11,
                interval_min: 15,
                fillup: false,
                source: None,
            },
        ];
        let rows = aggregate_occupancy(&raw, &window);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stamp, ts("2024-01-01 08:00:00"));
        assert_eq!(rows[0].capacity, 120);
        // AVG(10, 11) = 10.5 rounds half away from zero.
        assert_eq!(rows[0].occupation, 11);
    }

    #[tokio::test]
    async fn test_clear_respects_selection_and_window() {
        let repo = LocalRepository::new();
        repo.create_cache_table(CacheTable::Transactions).await.unwrap();
        repo.store_transactions(&[
            TransactionRecord {
                bikepark_id: "A".into(),
                stamp: ts("2024-01-01 10:00:00"),
                amount: 1.0,
            },
            TransactionRecord {
                bikepark_id: "B".into(),
                stamp: ts("2024-01-01 11:00:00"),
                amount: 2.0,
            },
        ])
        .await
        .unwrap();

        let window = CacheWindow {
            start: ts("2024-01-01 00:00:00"),
            end: ts("2024-01-02 00:00:00"),
            bikepark_ids: None,
        };
        repo.update_cache(CacheTable::Transactions, &window).await.unwrap();

        let only_a = CacheWindow {
            bikepark_ids: Some(vec![BikeparkId::from("A")]),
            ..window.clone()
        };
        let deleted = repo.clear_cache(CacheTable::Transactions, &only_a).await.unwrap();
        assert_eq!(deleted, 1);

        let status = repo.cache_status(CacheTable::Transactions).await.unwrap();
        assert_eq!(status.row_count, Some(1));
    }

    #[tokio::test]
    async fn test_update_on_missing_table_fails() {
        let repo = LocalRepository::new();
        let window = CacheWindow {
            start: ts("2024-01-01 00:00:00"),
            end: ts("2024-01-02 00:00:00"),
            bikepark_ids: None,
        };
        let err = repo.update_cache(CacheTable::Occupancy, &window).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
