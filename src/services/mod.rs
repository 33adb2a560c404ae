//! Service layer for business logic and orchestration.
//!
//! Services sit between the HTTP handlers and the repository: report
//! execution with series assembly, and cache lifecycle dispatch with
//! per-table serialization of mutating actions.

pub mod cache;

pub mod reports;

#[cfg(feature = "http-server")]
pub mod job_tracker;

pub use cache::CacheService;
pub use reports::{assemble_series, report_sql, run_report};
