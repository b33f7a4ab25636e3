//! # Trajectory Stats
//!
//! Batch analytics over large collections of timestamped GPS trajectory points.
//!
//! This library provides:
//! - Timezone normalization of day-count timestamps to local dates/times
//! - Rectangular geofence filtering
//! - Partitioned window functions (rank, lag) with deterministic tie-breaking
//! - Grouped aggregation (count, sum, max, min, span) with second-level rollups
//! - Great-circle distance accumulation over ordered point sequences
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel per-partition processing with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use trajectory_stats::{run_analytics, AnalyticsConfig, RawPoint};
//!
//! // Two points in Beijing, one minute apart (day-count timestamps)
//! let raw = vec![
//!     RawPoint::new(1, 39.90, 116.40, 100.0, 39448.50),
//!     RawPoint::new(1, 39.91, 116.41, 150.0, 39448.50 + 1.0 / 1440.0),
//! ];
//!
//! let report = run_analytics(&raw, &AnalyticsConfig::default()).unwrap();
//! assert_eq!(report.region.count, 2);
//! println!("Total distance: {:.2} km", report.total_distance_km);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{AnalyticsError, OptionExt, Result};

// Timezone normalization (raw timestamp + longitude -> local date/time)
pub mod timezone;
pub use timezone::{normalize_dataset, normalize_point, timezone_offset};
#[cfg(feature = "parallel")]
pub use timezone::normalize_dataset_parallel;

// Rectangular geofence filtering
pub mod spatial;
pub use spatial::{distinct_visitors, filter_points};

// Partitioned window functions (rank, lag)
pub mod window;
pub use window::{
    lag, rank, top_per_partition, Direction, FieldValue, Lagged, OrderKey, Ranked, Row, WindowSpec,
};
#[cfg(feature = "parallel")]
pub use window::{lag_parallel, rank_parallel};

// Grouped aggregation with second-level rollups
pub mod group;
pub use group::{group_by, regroup, sort_by_measure_desc, Aggregate, GroupRow, GroupSpec, Rollup};
#[cfg(feature = "parallel")]
pub use group::group_by_parallel;

// Great-circle distance accumulation
pub mod distance;
pub use distance::{daily_distances, grand_total_km, haversine_km, DailyDistance, EARTH_RADIUS_KM};
#[cfg(feature = "parallel")]
pub use distance::daily_distances_parallel;

// The seven trajectory queries
pub mod analytics;
pub use analytics::{
    active_days_ranking, active_weeks_ranking, altitude_spans, distance_analysis,
    northernmost_points, region_summary, run_analytics, ActiveDaysRow, ActiveWeeksRow,
    AltitudeSpanRow, AnalyticsReport, LongestDayRow, NorthernmostRow, RegionSummary,
};

// ============================================================================
// Core Types
// ============================================================================

/// A raw GPS sample as supplied by the loader.
///
/// Timestamps are day-counts since 1899-12-30 with the fractional part
/// encoding time of day. The `date` and `time` strings are the loader's
/// own rendering of the raw timestamp; the analytics core never reads them.
///
/// # Example
/// ```
/// use trajectory_stats::RawPoint;
/// let point = RawPoint::new(42, 39.9042, 116.4074, 55.0, 39448.5); // Beijing
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub user_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters. Sentinel values pass through untouched.
    pub altitude: f64,
    /// Day-count timestamp (days since 1899-12-30, fraction = time of day)
    pub raw_timestamp: f64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
}

impl RawPoint {
    /// Create a raw point without the loader's display strings.
    pub fn new(user_id: u32, latitude: f64, longitude: f64, altitude: f64, timestamp: f64) -> Self {
        Self {
            user_id,
            latitude,
            longitude,
            altitude,
            raw_timestamp: timestamp,
            date: String::new(),
            time: String::new(),
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A GPS sample with timezone-derived fields populated.
///
/// Immutable once produced by [`normalize_point`]; every query consumes
/// the adjusted fields, never the raw timestamp directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub user_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub raw_timestamp: f64,
    /// Whole hours east of GMT, truncated from longitude / 15
    pub timezone_offset: i32,
    /// Raw timestamp shifted into local time (still a day-count)
    pub adjusted_timestamp: f64,
    /// Local calendar date (serializes as `YYYY-MM-DD`)
    pub adjusted_date: chrono::NaiveDate,
    /// Local time of day (serializes as `HH:MM:SS`)
    pub adjusted_time: chrono::NaiveTime,
}

/// An inclusive rectangular geofence in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Beijing's approximate borders, the region of the original study.
pub const BEIJING: GeoBox = GeoBox {
    min_lat: 39.5,
    max_lat: 40.5,
    min_lon: 115.5,
    max_lon: 117.5,
};

impl GeoBox {
    /// Check whether a coordinate falls inside the box (bounds inclusive).
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && longitude >= self.min_lon
            && longitude <= self.max_lon
    }

    /// Validate that the bounds are ordered.
    pub fn validate(&self) -> Result<()> {
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(AnalyticsError::ConfigError {
                message: format!(
                    "Inverted geofence bounds: lat {}..{}, lon {}..{}",
                    self.min_lat, self.max_lat, self.min_lon, self.max_lon
                ),
            });
        }
        Ok(())
    }
}

/// Configuration for an analytics run.
///
/// Every run is a pure function of its input dataset and this struct;
/// there is no ambient or process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Geofence for the region filter and the region-visit flag.
    /// Default: Beijing's box
    pub region: GeoBox,

    /// A day counts as active when it has strictly more points than this.
    /// Default: 10
    pub daily_point_threshold: u64,

    /// A week counts as active when it has strictly more points than this.
    /// Default: 100
    pub weekly_point_threshold: u64,

    /// Number of rows kept in each ranked result table.
    /// Default: 6
    pub top_n: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            region: BEIJING,
            daily_point_threshold: 10,
            weekly_point_threshold: 100,
            top_n: 6,
        }
    }
}

impl AnalyticsConfig {
    /// Fail fast on inconsistent configuration, before any data is touched.
    pub fn validate(&self) -> Result<()> {
        self.region.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================
