//! Cache update driver.
//!
//! Decides how a requested window is recomputed: one `update` spanning the
//! whole window (full mode), or one `update` per calendar day (incremental
//! mode). Incremental mode bounds per-call cost and gives day-granular
//! resumption — a failure on day N leaves days before N committed. Both
//! modes first clear the fixed wide historical horizon so no orphaned rows
//! survive from earlier runs with different boundaries.

use chrono::{Days, NaiveDate, NaiveDateTime};
use log::{debug, info};

use crate::db::repository::{FullRepository, RepositoryResult};

use super::{CacheTable, CacheWindow};

/// Start of the fixed historical window cleared before every update run.
pub fn clear_horizon_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// How the driver walks the requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// One `update` call over the entire window.
    Full,
    /// One `update` call per calendar day.
    Incremental,
}

/// Clear the wide horizon, then recompute the window in the chosen mode.
///
/// Returns the total number of cache rows written. Both modes produce
/// identical final cache content; they differ only in call count and
/// failure granularity.
pub async fn run_update(
    repo: &dyn FullRepository,
    table: CacheTable,
    window: &CacheWindow,
    mode: UpdateMode,
) -> RepositoryResult<usize> {
    let horizon = CacheWindow {
        start: clear_horizon_start(),
        end: window.end,
        bikepark_ids: window.bikepark_ids.clone(),
    };
    let cleared = repo.clear_cache(table, &horizon).await?;
    debug!(
        "cleared {} rows from {} before update",
        cleared,
        table.table_name()
    );

    let written = match mode {
        UpdateMode::Full => repo.update_cache(table, window).await?,
        UpdateMode::Incremental => {
            let mut total = 0;
            for day in day_windows(window) {
                total += repo.update_cache(table, &day).await?;
            }
            total
        }
    };
    info!(
        "updated {} with {} rows over {} .. {}",
        table.table_name(),
        written,
        window.start,
        window.end
    );
    Ok(written)
}

/// Split a window into per-day windows that partition it exactly.
fn day_windows(window: &CacheWindow) -> Vec<CacheWindow> {
    let mut days = Vec::new();
    let mut start = window.start;
    while start < window.end {
        let next_midnight = start
            .date()
            .checked_add_days(Days::new(1))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(window.end);
        let end = next_midnight.min(window.end);
        days.push(CacheWindow {
            start,
            end,
            bikepark_ids: window.bikepark_ids.clone(),
        });
        start = end;
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn window(start: &str, end: &str) -> CacheWindow {
        CacheWindow {
            start: ts(start),
            end: ts(end),
            bikepark_ids: None,
        }
    }

    #[test]
    fn test_day_windows_partition_exactly() {
        let days = day_windows(&window("2024-01-01 00:00:00", "2024-01-04 00:00:00"));
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].start, ts("2024-01-01 00:00:00"));
        assert_eq!(days[0].end, ts("2024-01-02 00:00:00"));
        assert_eq!(days[2].end, ts("2024-01-04 00:00:00"));
        for pair in days.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_day_windows_clip_partial_days() {
        let days = day_windows(&window("2024-01-01 06:00:00", "2024-01-02 18:00:00"));
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].start, ts("2024-01-01 06:00:00"));
        assert_eq!(days[0].end, ts("2024-01-02 00:00:00"));
        assert_eq!(days[1].end, ts("2024-01-02 18:00:00"));
    }

    #[test]
    fn test_empty_window_has_no_days() {
        let days = day_windows(&window("2024-01-02 00:00:00", "2024-01-02 00:00:00"));
        assert!(days.is_empty());
    }

    #[test]
    fn test_horizon_start_is_fixed() {
        assert_eq!(clear_horizon_start(), ts("2018-01-01 00:00:00"));
    }
}
