//! Row-level models shared by the repository backends.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One occupancy snapshot from `bezettingsdata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    pub bikepark_id: String,
    pub stamp: NaiveDateTime,
    pub capacity: i32,
    pub occupation: i32,
    /// Declared sampling interval of this row in minutes.
    pub interval_min: i32,
    /// Whether the row was written by a fill-up run rather than a live count.
    pub fillup: bool,
    pub source: Option<String>,
}

/// One payment event from `transacties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub bikepark_id: String,
    pub stamp: NaiveDateTime,
    pub amount: f64,
}

/// One duration-of-stay event from `stallingsduur`; `stamp` is the exit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StayRecord {
    pub bikepark_id: String,
    pub stamp: NaiveDateTime,
    pub duration_min: i32,
}

/// One row of an executed report statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    /// Category label, `{facility}_{series}`.
    pub category: String,
    /// Canonical bucket label.
    pub bucket: String,
    pub value: f64,
}

/// Materialized row of `transacties_cache`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionsCacheRow {
    pub bikepark_id: String,
    pub stamp: NaiveDateTime,
    pub transactions: i64,
    pub revenue: f64,
}

/// Materialized row of `bezetting_cache`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyCacheRow {
    pub bikepark_id: String,
    pub stamp: NaiveDateTime,
    pub interval_min: i32,
    pub fillup: bool,
    pub source: Option<String>,
    pub capacity: i32,
    pub occupation: i32,
}

/// Materialized row of `stallingsduur_cache`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StayCacheRow {
    pub bikepark_id: String,
    pub stamp: NaiveDateTime,
    pub duration_class: i16,
    pub stays: i64,
}
