//! Data Transfer Objects shared by the report and cache surfaces.
//!
//! These types form the request/response envelopes of the engine: report
//! parameters, cache lifecycle parameters, cache status, and the assembled
//! report series. They are serialization-ready and independent of any
//! storage backend.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Identifier of a bicycle parking facility.
///
/// Facility IDs are the primary partition key for all cache and report data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BikeparkId(String);

impl BikeparkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BikeparkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BikeparkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Report families supported by the query builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Capacity and occupation counts per facility.
    AbsoluteOccupancy,
    /// Occupation as a percentage of capacity per facility.
    RelativeOccupancy,
    /// Transaction counts and revenue totals per facility.
    Transactions,
    /// Duration-of-stay histogram per facility.
    StayDuration,
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absolute_occupancy" => Ok(Self::AbsoluteOccupancy),
            "relative_occupancy" => Ok(Self::RelativeOccupancy),
            "transactions" => Ok(Self::Transactions),
            "stay_duration" => Ok(Self::StayDuration),
            _ => Err(format!("Unknown report type: {}", s)),
        }
    }
}

/// Time-bucket size used to aggregate rows for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportGrouping {
    QuarterHour,
    Hour,
    Day,
    Week,
    Month,
}

impl ReportGrouping {
    /// Nominal bucket size in minutes.
    ///
    /// Used to decide whether a grouping can be resolved against a source
    /// whose rows carry a coarser sampling interval. Months are counted at
    /// their minimum length; the comparison only needs an ordering.
    pub fn period_minutes(self) -> u32 {
        match self {
            Self::QuarterHour => 15,
            Self::Hour => 60,
            Self::Day => 1_440,
            Self::Week => 10_080,
            Self::Month => 40_320,
        }
    }
}

impl FromStr for ReportGrouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarter_hour" => Ok(Self::QuarterHour),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            _ => Err(format!("Unknown report grouping: {}", s)),
        }
    }
}

/// Request envelope for report execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportParams {
    pub report_type: ReportType,
    pub report_grouping: ReportGrouping,
    /// Selected facilities. An empty selection is valid and yields an empty
    /// result, never an error.
    #[serde(default)]
    pub bikepark_ids: Vec<BikeparkId>,
    pub start_dt: NaiveDateTime,
    pub end_dt: NaiveDateTime,
    /// When false, fill-up records are excluded from occupancy reports.
    #[serde(default)]
    pub fillups: bool,
    /// Restrict occupancy reports to a single data source tag.
    #[serde(default)]
    pub source: Option<String>,
}

/// Lifecycle actions accepted by the cache management surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAction {
    Status,
    CreateTable,
    DropTable,
    Clear,
    Rebuild,
    Update,
    CreateParentIndices,
    DropParentIndices,
}

impl CacheAction {
    /// Whether the action changes table contents or structure.
    ///
    /// Mutating actions are serialized per cache table by the cache service.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Status)
    }

    /// Whether the action needs a resolved date window.
    pub fn needs_window(self) -> bool {
        matches!(self, Self::Clear | Self::Rebuild | Self::Update)
    }
}

impl FromStr for CacheAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Self::Status),
            "createtable" => Ok(Self::CreateTable),
            "droptable" => Ok(Self::DropTable),
            "clear" => Ok(Self::Clear),
            "rebuild" => Ok(Self::Rebuild),
            "update" => Ok(Self::Update),
            "createparentindices" => Ok(Self::CreateParentIndices),
            "dropparentindices" => Ok(Self::DropParentIndices),
            _ => Err(format!("Unknown cache action: {}", s)),
        }
    }
}

/// Request envelope driving cache lifecycle actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheParams {
    pub action: CacheAction,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub selected_bikepark_ids: Vec<BikeparkId>,
    /// Expand the date window to the full cache horizon.
    #[serde(default)]
    pub all_dates: bool,
    /// Expand the selection to every facility.
    #[serde(default)]
    pub all_bikeparks: bool,
}

impl CacheParams {
    /// Shorthand for actions that do not need dates or a selection.
    pub fn for_action(action: CacheAction) -> Self {
        Self {
            action,
            start_date: None,
            end_date: None,
            selected_bikepark_ids: Vec::new(),
            all_dates: false,
            all_bikeparks: false,
        }
    }
}

/// Existence state of a cache table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Missing,
    Available,
}

/// Result envelope for cache lifecycle actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    /// Cache table name.
    pub table: String,
    pub state: CacheState,
    /// Row count, when the table exists.
    pub row_count: Option<i64>,
    /// Earliest cached bucket, when rows exist.
    pub first_bucket: Option<NaiveDateTime>,
    /// Latest cached bucket, when rows exist.
    pub last_bucket: Option<NaiveDateTime>,
    /// Human-readable summary suitable for display.
    pub summary: String,
}

impl CacheStatus {
    /// Status for a table that does not exist.
    pub fn missing(table: impl Into<String>) -> Self {
        let table = table.into();
        let summary = format!("cache table {} does not exist", table);
        Self {
            table,
            state: CacheState::Missing,
            row_count: None,
            first_bucket: None,
            last_bucket: None,
            summary,
        }
    }

    /// Status for an existing table with the given coverage.
    pub fn available(
        table: impl Into<String>,
        row_count: i64,
        first_bucket: Option<NaiveDateTime>,
        last_bucket: Option<NaiveDateTime>,
    ) -> Self {
        let table = table.into();
        let summary = match (first_bucket, last_bucket) {
            (Some(first), Some(last)) => format!(
                "cache table {} holds {} rows covering {} .. {}",
                table, row_count, first, last
            ),
            _ => format!("cache table {} holds {} rows", table, row_count),
        };
        Self {
            table,
            state: CacheState::Available,
            row_count: Some(row_count),
            first_bucket,
            last_bucket,
            summary,
        }
    }
}

/// One point of a time-bucketed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Canonical bucket label, e.g. `2024-01-01 13:00`.
    pub bucket: String,
    pub value: f64,
}

/// One named, time-bucketed series within a report response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSeries {
    /// Full category label, e.g. `A_capacity`.
    pub name: String,
    /// Facility the series belongs to.
    pub bikepark_id: String,
    /// Series name within the facility, e.g. `capacity`.
    pub series: String,
    pub points: Vec<SeriesPoint>,
}

impl ReportSeries {
    /// Split a category label into facility and series parts.
    ///
    /// Categories are built as `{facility}_{series}`; facility IDs may
    /// themselves contain underscores, so the label splits at the last one.
    pub fn split_category(category: &str) -> (String, String) {
        match category.rsplit_once('_') {
            Some((bikepark, series)) => (bikepark.to_string(), series.to_string()),
            None => (category.to_string(), String::new()),
        }
    }
}

/// Caller authorization context resolved by the surrounding application.
///
/// The engine does not authenticate; it trusts this context to list the
/// facilities the caller may query and whether the caller holds reporting
/// administration rights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    #[serde(default)]
    pub bikepark_ids: Vec<BikeparkId>,
    #[serde(default)]
    pub is_admin: bool,
}

impl AccessContext {
    /// Context with administration rights over the given facilities.
    pub fn admin(bikepark_ids: Vec<BikeparkId>) -> Self {
        Self {
            bikepark_ids,
            is_admin: true,
        }
    }

    /// Whether the caller may query the given facility.
    pub fn allows(&self, id: &BikeparkId) -> bool {
        self.bikepark_ids.contains(id)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
