//! Cache lifecycle service.
//!
//! Dispatches [`CacheParams`] actions to the repository, resolving the date
//! window and facility selection first. Mutating actions are serialized per
//! cache table through an async mutex: two concurrent updates over
//! overlapping windows would otherwise race at the database level.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, Utc};
use log::error;
use tokio::sync::Mutex;

use crate::api::{CacheAction, CacheParams, CacheStatus};
use crate::cache::update_driver::{self, UpdateMode};
use crate::cache::{CacheTable, CacheWindow};
use crate::db::repository::{FullRepository, RepositoryError, RepositoryResult};

/// Orchestrates cache lifecycle actions against a repository.
pub struct CacheService {
    repository: Arc<dyn FullRepository>,
    locks: HashMap<CacheTable, Mutex<()>>,
}

impl CacheService {
    pub fn new(repository: Arc<dyn FullRepository>) -> Self {
        let locks = CacheTable::ALL
            .into_iter()
            .map(|table| (table, Mutex::new(())))
            .collect();
        Self { repository, locks }
    }

    /// Execute one lifecycle action and return the post-action status.
    ///
    /// Errors are logged with their context here and surfaced unchanged;
    /// after a failed mutating action the cache must be considered
    /// indeterminate for the requested window until a `status` check or a
    /// rebuild.
    pub async fn execute(
        &self,
        table: CacheTable,
        params: &CacheParams,
    ) -> RepositoryResult<CacheStatus> {
        let result = self.dispatch(table, params).await;
        match result {
            Ok(status) => Ok(status),
            Err(e) => {
                error!(
                    "cache action {:?} on {} failed: {}",
                    params.action,
                    table.table_name(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        table: CacheTable,
        params: &CacheParams,
    ) -> RepositoryResult<CacheStatus> {
        // Serialize mutating actions per table. Held across the whole
        // action, including the day-by-day driver loop.
        let _guard = if params.action.is_mutating() {
            Some(self.lock_for(table).lock().await)
        } else {
            None
        };

        let repo = self.repository.as_ref();
        match params.action {
            CacheAction::Status => {}
            CacheAction::CreateTable => repo.create_cache_table(table).await?,
            CacheAction::DropTable => repo.drop_cache_table(table).await?,
            CacheAction::Clear => {
                let window = resolve_window(params)?;
                repo.clear_cache(table, &window).await?;
            }
            CacheAction::Update => {
                let window = resolve_window(params)?;
                update_driver::run_update(repo, table, &window, UpdateMode::Incremental).await?;
            }
            CacheAction::Rebuild => {
                let window = resolve_window(params)?;
                update_driver::run_update(repo, table, &window, UpdateMode::Full).await?;
            }
            CacheAction::CreateParentIndices => repo.create_parent_indices(table).await?,
            CacheAction::DropParentIndices => repo.drop_parent_indices(table).await?,
        }

        repo.cache_status(table).await
    }

    fn lock_for(&self, table: CacheTable) -> &Mutex<()> {
        // The map is built over CacheTable::ALL in the constructor.
        &self.locks[&table]
    }

    /// Statuses of all cache tables.
    pub async fn statuses(&self) -> RepositoryResult<Vec<CacheStatus>> {
        let mut statuses = Vec::with_capacity(CacheTable::ALL.len());
        for table in CacheTable::ALL {
            statuses.push(self.repository.cache_status(table).await?);
        }
        Ok(statuses)
    }
}

/// Resolve the date window and selection of a lifecycle request.
///
/// `allDates` expands to the fixed cache horizon up to now; otherwise both
/// dates are required and the end date is inclusive. `allBikeparks`
/// expands the selection to every facility.
fn resolve_window(params: &CacheParams) -> RepositoryResult<CacheWindow> {
    let (start, end) = if params.all_dates {
        (
            update_driver::clear_horizon_start(),
            Utc::now().naive_utc(),
        )
    } else {
        let start_date = params.start_date.ok_or_else(|| {
            RepositoryError::validation(format!(
                "startDate is required for action {:?}",
                params.action
            ))
        })?;
        let end_date = params.end_date.ok_or_else(|| {
            RepositoryError::validation(format!(
                "endDate is required for action {:?}",
                params.action
            ))
        })?;
        if end_date < start_date {
            return Err(RepositoryError::validation(format!(
                "endDate {} precedes startDate {}",
                end_date, start_date
            )));
        }
        let start = start_date
            .and_hms_opt(0, 0, 0)
            .unwrap_or(chrono::NaiveDateTime::MIN);
        let end = end_date
            .checked_add_days(Days::new(1))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(chrono::NaiveDateTime::MAX);
        (start, end)
    };

    let bikepark_ids = if params.all_bikeparks {
        None
    } else {
        Some(params.selected_bikepark_ids.clone())
    };

    Ok(CacheWindow {
        start,
        end,
        bikepark_ids,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::api::BikeparkId;
    use crate::db::LocalRepository;

    fn service() -> CacheService {
        CacheService::new(Arc::new(LocalRepository::new()))
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_resolve_window_requires_dates() {
        let params = CacheParams::for_action(CacheAction::Clear);
        let err = resolve_window(&params).unwrap_err();
        assert!(err.to_string().contains("startDate"));
    }

    #[test]
    fn test_resolve_window_end_date_is_inclusive() {
        let mut params = CacheParams::for_action(CacheAction::Clear);
        params.start_date = Some(date("2024-01-01"));
        params.end_date = Some(date("2024-01-01"));
        let window = resolve_window(&params).unwrap();
        assert_eq!(window.end - window.start, chrono::Duration::days(1));
    }

    #[test]
    fn test_resolve_window_all_variants() {
        let mut params = CacheParams::for_action(CacheAction::Rebuild);
        params.all_dates = true;
        params.all_bikeparks = true;
        let window = resolve_window(&params).unwrap();
        assert_eq!(window.start, update_driver::clear_horizon_start());
        assert!(window.bikepark_ids.is_none());

        params.all_bikeparks = false;
        params.selected_bikepark_ids = vec![BikeparkId::from("A")];
        let window = resolve_window(&params).unwrap();
        assert_eq!(window.bikepark_ids.as_deref().map(<[BikeparkId]>::len), Some(1));
    }

    #[tokio::test]
    async fn test_status_on_missing_table() {
        let service = service();
        let status = service
            .execute(CacheTable::Occupancy, &CacheParams::for_action(CacheAction::Status))
            .await
            .unwrap();
        assert_eq!(status.state, crate::api::CacheState::Missing);
    }

    #[tokio::test]
    async fn test_createtable_is_idempotent() {
        let service = service();
        let params = CacheParams::for_action(CacheAction::CreateTable);
        let first = service.execute(CacheTable::Transactions, &params).await.unwrap();
        let second = service.execute(CacheTable::Transactions, &params).await.unwrap();
        assert_eq!(first.state, crate::api::CacheState::Available);
        assert_eq!(second.state, crate::api::CacheState::Available);
        assert_eq!(second.row_count, Some(0));
    }

    #[tokio::test]
    async fn test_statuses_covers_all_tables() {
        let service = service();
        let statuses = service.statuses().await.unwrap();
        assert_eq!(statuses.len(), 3);
    }
}
