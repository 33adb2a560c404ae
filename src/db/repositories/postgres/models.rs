//! Diesel row types for the Postgres backend.
//!
//! Runtime queries (`sql_query`) deserialize into the `QueryableByName`
//! structs; the raw tables are written through the `Insertable` structs.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Double, Nullable, Text, Timestamp};

use super::schema::{bezettingsdata, stallingsduur, transacties};
use crate::db::models::{OccupancyRecord, SeriesRow, StayRecord, TransactionRecord};

/// One row of an executed report statement.
#[derive(Debug, QueryableByName)]
pub struct SeriesRowSql {
    #[diesel(sql_type = Text)]
    pub category: String,
    #[diesel(sql_type = Text)]
    pub bucket: String,
    #[diesel(sql_type = Double)]
    pub value: f64,
}

impl From<SeriesRowSql> for SeriesRow {
    fn from(row: SeriesRowSql) -> Self {
        Self {
            category: row.category,
            bucket: row.bucket,
            value: row.value,
        }
    }
}

/// Result of the `to_regclass` table-existence probe.
#[derive(Debug, QueryableByName)]
pub struct TableExistsRow {
    #[diesel(sql_type = Bool)]
    pub present: bool,
}

/// Row count and bucket coverage of a cache table.
#[derive(Debug, QueryableByName)]
pub struct CacheCoverageRow {
    #[diesel(sql_type = BigInt)]
    pub row_count: i64,
    #[diesel(sql_type = Nullable<Timestamp>)]
    pub first_bucket: Option<NaiveDateTime>,
    #[diesel(sql_type = Nullable<Timestamp>)]
    pub last_bucket: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bezettingsdata)]
pub struct NewOccupancyRow<'a> {
    pub bikepark_id: &'a str,
    pub stamp: NaiveDateTime,
    pub capacity: i32,
    pub occupation: i32,
    pub interval_min: i32,
    pub fillup: bool,
    pub source: Option<&'a str>,
}

impl<'a> From<&'a OccupancyRecord> for NewOccupancyRow<'a> {
    fn from(record: &'a OccupancyRecord) -> Self {
        Self {
            bikepark_id: &record.bikepark_id,
            stamp: record.stamp,
            capacity: record.capacity,
            occupation: record.occupation,
            interval_min: record.interval_min,
            fillup: record.fillup,
            source: record.source.as_deref(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = transacties)]
pub struct NewTransactionRow<'a> {
    pub bikepark_id: &'a str,
    pub stamp: NaiveDateTime,
    pub amount: f64,
}

impl<'a> From<&'a TransactionRecord> for NewTransactionRow<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        Self {
            bikepark_id: &record.bikepark_id,
            stamp: record.stamp,
            amount: record.amount,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = stallingsduur)]
pub struct NewStayRow<'a> {
    pub bikepark_id: &'a str,
    pub stamp: NaiveDateTime,
    pub duration_min: i32,
}

impl<'a> From<&'a StayRecord> for NewStayRow<'a> {
    fn from(record: &'a StayRecord) -> Self {
        Self {
            bikepark_id: &record.bikepark_id,
            stamp: record.stamp,
            duration_min: record.duration_min,
        }
    }
}
