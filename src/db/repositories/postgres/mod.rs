//! Postgres repository implementation using Diesel.
//!
//! Production backend for the report cache engine. Lifecycle DDL/DML and
//! report statements are assembled at runtime (the statements vary per
//! request and per cache table) and executed through `diesel::sql_query`;
//! the raw transactional tables are written through the typed schema in
//! [`schema`].
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures (exponential backoff)
//! - Pool health monitoring
//! - Automatic migration execution for the raw tables
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;

use crate::api::{CacheStatus, ReportParams};
use crate::cache::{CacheTable, CacheWindow};
use crate::db::models::{OccupancyRecord, SeriesRow, StayRecord, TransactionRecord};
use crate::db::repository::{
    CacheRepository, ErrorContext, RawDataRepository, ReportRepository, RepositoryError,
    RepositoryResult,
};
use crate::reports::{build_report_sql, ReportRange};

mod models;
mod schema;

use models::{
    CacheCoverageRow, NewOccupancyRow, NewStayRow, NewTransactionRow, SeriesRowSql, TableExistsRow,
};

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    /// Returns an error when no database URL is set.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let parse_var = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        Ok(Self {
            database_url,
            max_pool_size: parse_var("PG_POOL_MAX", 10) as u32,
            min_pool_size: parse_var("PG_POOL_MIN", 1) as u32,
            connection_timeout_sec: parse_var("PG_CONN_TIMEOUT_SEC", 30),
            idle_timeout_sec: parse_var("PG_IDLE_TIMEOUT_SEC", 600),
            max_retries: parse_var("PG_MAX_RETRIES", 3) as u32,
            retry_delay_ms: parse_var("PG_RETRY_DELAY_MS", 100),
        })
    }
}

/// Pool state and query statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub connections_in_use: u32,
    pub idle_connections: u32,
    pub total_connections: u32,
    pub max_size: u32,
    pub total_queries: u64,
    pub failed_queries: u64,
    pub retried_operations: u64,
}

/// Postgres-backed implementation of the full repository surface.
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
    retried_operations: Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a repository with a fresh connection pool and run pending
    /// migrations for the raw tables.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("build_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::configuration(format!("Migration failed: {}", e))
        })?;

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
            retried_operations: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run a closure with a pooled connection on a blocking thread.
    ///
    /// Retries the operation up to `max_retries` times when a retryable
    /// error occurs (connection errors, timeouts, serialization failures),
    /// doubling the delay between attempts.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    retried_operations.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }
                };

                total_queries.fetch_add(1, Ordering::Relaxed);
                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            failed_queries.fetch_add(1, Ordering::Relaxed);
            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Get pool health statistics.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }

    /// Get detailed health information.
    ///
    /// Returns a tuple of (is_healthy, latency_ms, error_message).
    pub async fn health_check_detailed(&self) -> (bool, Option<u64>, Option<String>) {
        let start = Instant::now();
        match self.health_check().await {
            Ok(true) => (true, Some(start.elapsed().as_millis() as u64), None),
            Ok(false) => (
                false,
                Some(start.elapsed().as_millis() as u64),
                Some("Health check returned false".to_string()),
            ),
            Err(e) => (
                false,
                Some(start.elapsed().as_millis() as u64),
                Some(e.to_string()),
            ),
        }
    }

    /// Execute a single runtime statement and return its affected row count.
    async fn execute_sql(&self, statement: String, operation: &'static str) -> RepositoryResult<usize> {
        self.with_conn(move |conn| {
            sql_query(statement.as_str())
                .execute(conn)
                .map_err(|e| RepositoryError::from(e).with_operation(operation))
        })
        .await
    }
}

#[async_trait]
impl CacheRepository for PostgresRepository {
    async fn cache_status(&self, table: CacheTable) -> RepositoryResult<CacheStatus> {
        let name = table.table_name();
        self.with_conn(move |conn| {
            let exists: TableExistsRow = sql_query(format!(
                "SELECT to_regclass('{}') IS NOT NULL AS present",
                name
            ))
            .get_result(conn)
            .map_err(|e| RepositoryError::from(e).with_operation("cache_status"))?;

            if !exists.present {
                return Ok(CacheStatus::missing(name));
            }

            let coverage: CacheCoverageRow = sql_query(format!(
                "SELECT COUNT(*) AS row_count, MIN(stamp) AS first_bucket, \
                 MAX(stamp) AS last_bucket FROM {}",
                name
            ))
            .get_result(conn)
            .map_err(|e| RepositoryError::from(e).with_operation("cache_status"))?;

            Ok(CacheStatus::available(
                name,
                coverage.row_count,
                coverage.first_bucket,
                coverage.last_bucket,
            ))
        })
        .await
    }

    async fn create_cache_table(&self, table: CacheTable) -> RepositoryResult<()> {
        self.execute_sql(table.create_table_sql(), "create_cache_table")
            .await
            .map(|_| ())
    }

    async fn drop_cache_table(&self, table: CacheTable) -> RepositoryResult<()> {
        self.execute_sql(table.drop_table_sql(), "drop_cache_table")
            .await
            .map(|_| ())
    }

    async fn clear_cache(
        &self,
        table: CacheTable,
        window: &CacheWindow,
    ) -> RepositoryResult<usize> {
        self.execute_sql(table.delete_window_sql(window), "clear_cache")
            .await
    }

    async fn update_cache(
        &self,
        table: CacheTable,
        window: &CacheWindow,
    ) -> RepositoryResult<usize> {
        // Delete-then-insert in one transaction: the unit of work is a
        // single window, never the whole rebuild, so locks on the live
        // tables stay short.
        let delete = table.delete_window_sql(window);
        let insert = table.insert_from_raw_sql(window);
        self.with_conn(move |conn| {
            conn.transaction::<usize, diesel::result::Error, _>(|conn| {
                sql_query(delete.as_str()).execute(conn)?;
                sql_query(insert.as_str()).execute(conn)
            })
            .map_err(|e| RepositoryError::from(e).with_operation("update_cache"))
        })
        .await
    }

    async fn create_parent_indices(&self, table: CacheTable) -> RepositoryResult<()> {
        self.execute_sql(table.create_parent_index_sql(), "create_parent_indices")
            .await
            .map(|_| ())
    }

    async fn drop_parent_indices(&self, table: CacheTable) -> RepositoryResult<()> {
        self.execute_sql(table.drop_parent_index_sql(), "drop_parent_indices")
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ReportRepository for PostgresRepository {
    async fn fetch_report_rows(
        &self,
        params: &ReportParams,
        range: &ReportRange,
        use_cache: bool,
    ) -> RepositoryResult<Vec<SeriesRow>> {
        let statement = build_report_sql(params, range, use_cache)?;
        debug!("executing report statement: {}", statement);
        self.with_conn(move |conn| {
            let rows: Vec<SeriesRowSql> = sql_query(statement.as_str())
                .load(conn)
                .map_err(|e| RepositoryError::from(e).with_operation("fetch_report_rows"))?;
            Ok(rows.into_iter().map(SeriesRow::from).collect())
        })
        .await
    }

    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(|e| RepositoryError::from(e).with_operation("health_check"))
        })
        .await
    }
}

#[async_trait]
impl RawDataRepository for PostgresRepository {
    async fn store_occupancy(&self, rows: &[OccupancyRecord]) -> RepositoryResult<usize> {
        let owned = rows.to_vec();
        self.with_conn(move |conn| {
            let values: Vec<NewOccupancyRow<'_>> = owned.iter().map(Into::into).collect();
            diesel::insert_into(schema::bezettingsdata::table)
                .values(&values)
                .execute(conn)
                .map_err(|e| RepositoryError::from(e).with_operation("store_occupancy"))
        })
        .await
    }

    async fn store_transactions(&self, rows: &[TransactionRecord]) -> RepositoryResult<usize> {
        let owned = rows.to_vec();
        self.with_conn(move |conn| {
            let values: Vec<NewTransactionRow<'_>> = owned.iter().map(Into::into).collect();
            diesel::insert_into(schema::transacties::table)
                .values(&values)
                .execute(conn)
                .map_err(|e| RepositoryError::from(e).with_operation("store_transactions"))
        })
        .await
    }

    async fn store_stays(&self, rows: &[StayRecord]) -> RepositoryResult<usize> {
        let owned = rows.to_vec();
        self.with_conn(move |conn| {
            let values: Vec<NewStayRow<'_>> = owned.iter().map(Into::into).collect();
            diesel::insert_into(schema::stallingsduur::table)
                .values(&values)
                .execute(conn)
                .map_err(|e| RepositoryError::from(e).with_operation("store_stays"))
        })
        .await
    }
}
