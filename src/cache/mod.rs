//! Cache table descriptors.
//!
//! Each report family owns one denormalized cache table, materialized from
//! its raw transactional table by the lifecycle actions. This module is the
//! single source of truth for the tables' DDL, their parent indices, and
//! the delete/insert statement pair the `update` action executes. Cache
//! content for a window must always equal a fresh aggregation of the raw
//! data over that window; `update` therefore deletes the window and
//! re-inserts it in one unit of work (never appends).

pub mod update_driver;

use chrono::NaiveDateTime;

use crate::api::BikeparkId;
use crate::reports::interpolate::quote_literal;
use crate::reports::sql_datetime;

/// The three cache families owned by this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTable {
    Transactions,
    Occupancy,
    StayDuration,
}

/// Duration-of-stay histogram class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationClass {
    /// Stable class number stored in the cache.
    pub class: i16,
    /// Series label, e.g. `0-1h`.
    pub label: &'static str,
    /// Inclusive lower bound in minutes.
    pub min_min: i32,
    /// Exclusive upper bound in minutes; `None` for the open-ended class.
    pub max_min: Option<i32>,
}

/// Histogram classes for duration-of-stay reports, shortest first.
pub const DURATION_CLASSES: &[DurationClass] = &[
    DurationClass { class: 1, label: "0-1h", min_min: 0, max_min: Some(60) },
    DurationClass { class: 2, label: "1-2h", min_min: 60, max_min: Some(120) },
    DurationClass { class: 3, label: "2-4h", min_min: 120, max_min: Some(240) },
    DurationClass { class: 4, label: "4-8h", min_min: 240, max_min: Some(480) },
    DurationClass { class: 5, label: "8-24h", min_min: 480, max_min: Some(1_440) },
    DurationClass { class: 6, label: "24h+", min_min: 1_440, max_min: None },
];

/// Class number for a stay of the given length.
pub fn duration_class(duration_min: i32) -> i16 {
    for class in DURATION_CLASSES {
        let below_max = class.max_min.map(|max| duration_min < max).unwrap_or(true);
        if duration_min >= class.min_min && below_max {
            return class.class;
        }
    }
    // Negative durations land in the shortest class.
    1
}

/// Date window and facility selection a lifecycle action operates on.
///
/// The window is half-open: `[start, end)`. A `None` selection means every
/// facility; an empty selection matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub bikepark_ids: Option<Vec<BikeparkId>>,
}

impl CacheTable {
    pub const ALL: [CacheTable; 3] = [
        CacheTable::Transactions,
        CacheTable::Occupancy,
        CacheTable::StayDuration,
    ];

    /// Name of the cache table.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Transactions => "transacties_cache",
            Self::Occupancy => "bezetting_cache",
            Self::StayDuration => "stallingsduur_cache",
        }
    }

    /// Raw transactional table the cache is materialized from.
    pub fn raw_table(self) -> &'static str {
        match self {
            Self::Transactions => "transacties",
            Self::Occupancy => "bezettingsdata",
            Self::StayDuration => "stallingsduur",
        }
    }

    /// URL path segment for the HTTP surface.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Occupancy => "occupancy",
            Self::StayDuration => "stay-duration",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "transactions" => Some(Self::Transactions),
            "occupancy" => Some(Self::Occupancy),
            "stay-duration" => Some(Self::StayDuration),
            _ => None,
        }
    }

    /// Idempotent table creation DDL.
    pub fn create_table_sql(self) -> String {
        match self {
            Self::Transactions => "CREATE TABLE IF NOT EXISTS transacties_cache (\
                 bikepark_id TEXT NOT NULL, \
                 stamp TIMESTAMP NOT NULL, \
                 transactions BIGINT NOT NULL, \
                 revenue DOUBLE PRECISION NOT NULL)"
                .to_string(),
            Self::Occupancy => "CREATE TABLE IF NOT EXISTS bezetting_cache (\
                 bikepark_id TEXT NOT NULL, \
                 stamp TIMESTAMP NOT NULL, \
                 interval_min INTEGER NOT NULL, \
                 fillup BOOLEAN NOT NULL, \
                 source TEXT, \
                 capacity INTEGER NOT NULL, \
                 occupation INTEGER NOT NULL)"
                .to_string(),
            Self::StayDuration => "CREATE TABLE IF NOT EXISTS stallingsduur_cache (\
                 bikepark_id TEXT NOT NULL, \
                 stamp TIMESTAMP NOT NULL, \
                 duration_class SMALLINT NOT NULL, \
                 stays BIGINT NOT NULL)"
                .to_string(),
        }
    }

    pub fn drop_table_sql(self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table_name())
    }

    /// Secondary index supporting range scans by parent facility.
    ///
    /// Managed independently of row content so bulk rebuilds can drop it
    /// for write throughput and recreate it afterwards.
    pub fn create_parent_index_sql(self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_parent ON {table} (bikepark_id, stamp)",
            table = self.table_name()
        )
    }

    pub fn drop_parent_index_sql(self) -> String {
        format!("DROP INDEX IF EXISTS idx_{}_parent", self.table_name())
    }

    /// Delete the cache rows inside a window × selection.
    pub fn delete_window_sql(self, window: &CacheWindow) -> String {
        format!(
            "DELETE FROM {table} WHERE stamp >= {start} AND stamp < {end}{selection}",
            table = self.table_name(),
            start = quote_literal(&sql_datetime(window.start)),
            end = quote_literal(&sql_datetime(window.end)),
            selection = selection_predicate(window),
        )
    }

    /// Recompute the window from raw data and insert it into the cache.
    pub fn insert_from_raw_sql(self, window: &CacheWindow) -> String {
        let start = quote_literal(&sql_datetime(window.start));
        let end = quote_literal(&sql_datetime(window.end));
        let selection = selection_predicate(window);
        match self {
            Self::Transactions => format!(
                "INSERT INTO transacties_cache (bikepark_id, stamp, transactions, revenue) \
                 SELECT bikepark_id, date_trunc('day', stamp), COUNT(*), COALESCE(SUM(amount), 0) \
                 FROM transacties \
                 WHERE stamp >= {start} AND stamp < {end}{selection} \
                 GROUP BY bikepark_id, date_trunc('day', stamp)"
            ),
            Self::Occupancy => format!(
                "INSERT INTO bezetting_cache \
                 (bikepark_id, stamp, interval_min, fillup, source, capacity, occupation) \
                 SELECT bikepark_id, \
                 to_timestamp(floor(extract(epoch from stamp) / (interval_min * 60)) \
                 * (interval_min * 60)) AT TIME ZONE 'UTC', \
                 interval_min, fillup, source, MAX(capacity), ROUND(AVG(occupation))::int \
                 FROM bezettingsdata \
                 WHERE stamp >= {start} AND stamp < {end}{selection} \
                 GROUP BY bikepark_id, 2, interval_min, fillup, source"
            ),
            Self::StayDuration => format!(
                "INSERT INTO stallingsduur_cache (bikepark_id, stamp, duration_class, stays) \
                 SELECT bikepark_id, date_trunc('day', stamp), {class_expr}, COUNT(*) \
                 FROM stallingsduur \
                 WHERE stamp >= {start} AND stamp < {end}{selection} \
                 GROUP BY bikepark_id, date_trunc('day', stamp), {class_expr}",
                class_expr = duration_class_case_expr(),
                start = start,
                end = end,
                selection = selection,
            ),
        }
    }
}

/// `CASE` expression mapping `duration_min` to its class number.
fn duration_class_case_expr() -> String {
    let mut expr = String::from("CASE");
    for class in DURATION_CLASSES {
        match class.max_min {
            Some(max) => expr.push_str(&format!(
                " WHEN duration_min < {} THEN {}",
                max, class.class
            )),
            None => expr.push_str(&format!(" ELSE {}", class.class)),
        }
    }
    expr.push_str(" END");
    expr
}

/// Facility selection predicate for lifecycle statements.
///
/// `None` selects everything, an empty selection matches nothing, and a
/// non-empty selection becomes an escaped `IN` list.
fn selection_predicate(window: &CacheWindow) -> String {
    match &window.bikepark_ids {
        None => String::new(),
        Some(ids) if ids.is_empty() => " AND 1=0".to_string(),
        Some(ids) => {
            let list: Vec<String> = ids.iter().map(|id| quote_literal(id.as_str())).collect();
            format!(" AND bikepark_id IN ({})", list.join(", "))
        }
    }
}
