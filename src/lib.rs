//! # Bikepark Reports Backend
//!
//! Report cache and time-series query engine for a municipal bicycle-parking
//! platform.
//!
//! The engine maintains three denormalized cache tables derived from the
//! platform's transactional data (occupancy snapshots, payment transactions,
//! duration-of-stay events), rebuilds them incrementally or fully on demand,
//! and synthesizes multi-series SQL that aggregates raw or cached data into
//! time-bucketed report series (capacity, occupancy, revenue, stay duration).
//! The engine is exposed to the surrounding application through a REST API
//! via Axum.
//!
//! ## Architecture
//!
//! - [`api`]: Data Transfer Objects shared by all layers
//! - [`reports`]: SQL synthesis — period grouping, per-report-type query
//!   builders, and the placeholder interpolator
//! - [`cache`]: cache table descriptors and the update driver
//! - [`db`]: repository pattern and persistence backends
//! - [`services`]: orchestration of report execution and cache lifecycle
//! - [`http`]: Axum-based HTTP server and request handlers

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;

pub mod cache;
pub mod db;
pub mod reports;

pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
