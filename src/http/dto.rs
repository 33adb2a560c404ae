//! Data Transfer Objects for the HTTP API.
//!
//! These DTOs wrap the core envelopes from [`crate::api`] with transport
//! concerns: the caller-resolved access context and per-request options.

use serde::{Deserialize, Serialize};

// Re-export core envelopes that are already serializable
pub use crate::api::{
    AccessContext, CacheParams, CacheStatus, ReportParams, ReportSeries, SeriesPoint,
};

/// Request body for report execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// Report parameters
    pub params: ReportParams,
    /// Caller authorization context resolved by the surrounding application
    pub access: AccessContext,
    /// Whether to read from the cache tables (default: true)
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

/// Response body for report execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    /// Named, time-bucketed series
    pub series: Vec<ReportSeries>,
    /// Total series count
    pub total: usize,
}

/// Request body for a cache lifecycle action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheActionRequest {
    /// Lifecycle parameters
    pub params: CacheParams,
    /// Caller authorization context resolved by the surrounding application
    pub access: AccessContext,
    /// Run the action in the background and return a job ID (rebuild/update)
    #[serde(default)]
    pub background: bool,
}

/// Accepted response for a background cache action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheActionAccepted {
    /// Job ID for tracking the background action
    pub job_id: String,
    /// Message about the operation
    pub message: String,
}

/// Status listing of all cache tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheListResponse {
    pub caches: Vec<CacheStatus>,
    pub total: usize,
}

/// Job status response for background processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    /// Job ID
    pub job_id: String,
    /// Job status
    pub status: String,
    /// Log entries
    pub logs: Vec<crate::services::job_tracker::LogEntry>,
    /// Result if completed
    pub result: Option<serde_json::Value>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Database connection status
    pub database: String,
}
