//! Repository traits for the report cache engine.
//!
//! The traits split by concern: cache lifecycle, report execution, and raw
//! data ingestion. Backends implement all three; [`FullRepository`] is the
//! combined surface the services and HTTP layer work against, always behind
//! `Arc<dyn FullRepository>` so backends can be swapped at runtime.

pub mod error;

use async_trait::async_trait;

use crate::api::{CacheStatus, ReportParams};
use crate::cache::{CacheTable, CacheWindow};
use crate::db::models::{OccupancyRecord, SeriesRow, StayRecord, TransactionRecord};
use crate::reports::ReportRange;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

/// Cache lifecycle operations.
///
/// Each cache table is a small state machine (`missing` ⇄ `available`);
/// every action returns the typed result of the attempt, and callers must
/// treat an error as "the cache is in an indeterminate state for this
/// window" — a `status` check or a rebuild is required before trusting the
/// table again.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Read-only: current state, row count and date coverage.
    async fn cache_status(&self, table: CacheTable) -> RepositoryResult<CacheStatus>;

    /// Create the cache table. Idempotent: a no-op success when the table
    /// already exists.
    async fn create_cache_table(&self, table: CacheTable) -> RepositoryResult<()>;

    /// Drop the cache table.
    async fn drop_cache_table(&self, table: CacheTable) -> RepositoryResult<()>;

    /// Delete cache rows inside the window × selection without changing
    /// table existence. Returns the number of rows deleted.
    async fn clear_cache(&self, table: CacheTable, window: &CacheWindow)
        -> RepositoryResult<usize>;

    /// Recompute the window from raw data and (re)insert it. Idempotent:
    /// re-running with the same window yields the same cache content.
    /// Returns the number of rows written.
    async fn update_cache(&self, table: CacheTable, window: &CacheWindow)
        -> RepositoryResult<usize>;

    /// Create the secondary index on (facility, bucket).
    async fn create_parent_indices(&self, table: CacheTable) -> RepositoryResult<()>;

    /// Drop the secondary index, e.g. ahead of a bulk rebuild.
    async fn drop_parent_indices(&self, table: CacheTable) -> RepositoryResult<()>;
}

/// Report execution.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Execute a report request and return its raw category/bucket/value
    /// rows, ordered by bucket.
    async fn fetch_report_rows(
        &self,
        params: &ReportParams,
        range: &ReportRange,
        use_cache: bool,
    ) -> RepositoryResult<Vec<SeriesRow>>;

    /// Probe backend connectivity.
    async fn health_check(&self) -> RepositoryResult<bool>;
}

/// Ingestion of raw transactional rows.
///
/// The raw tables are owned by the surrounding application; this surface
/// exists for local development and tests, and for the application's
/// importers when they run against the same backend.
#[async_trait]
pub trait RawDataRepository: Send + Sync {
    async fn store_occupancy(&self, rows: &[OccupancyRecord]) -> RepositoryResult<usize>;

    async fn store_transactions(&self, rows: &[TransactionRecord]) -> RepositoryResult<usize>;

    async fn store_stays(&self, rows: &[StayRecord]) -> RepositoryResult<usize>;
}

/// The combined repository surface used by services and handlers.
pub trait FullRepository: CacheRepository + ReportRepository + RawDataRepository {}

impl<T: CacheRepository + ReportRepository + RawDataRepository> FullRepository for T {}
