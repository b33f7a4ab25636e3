//! Timezone normalization for day-count GPS timestamps.
//!
//! Raw timestamps arrive as GMT day-counts (days since 1899-12-30, the
//! fractional part encoding time of day). Local time is approximated from
//! longitude alone: every 15 degrees east of Greenwich is one hour ahead.
//!
//! ## Example
//! ```rust
//! use trajectory_stats::{normalize_point, RawPoint};
//!
//! let raw = RawPoint::new(1, 39.9, 116.4, 55.0, 39448.5); // GMT noon
//! let point = normalize_point(&raw);
//! assert_eq!(point.timezone_offset, 7);
//! assert_eq!(point.adjusted_time.to_string(), "19:00:00");
//! ```

use chrono::{DateTime, Utc};
use log::debug;

use crate::{PointRecord, RawPoint};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Days between the day-count reference date (1899-12-30) and the Unix epoch.
pub const EXCEL_EPOCH_DAY_OFFSET: f64 = 25569.0;

/// Seconds per day.
const SECONDS_PER_DAY: f64 = 86400.0;

/// Datasets below this size are normalized sequentially even when the
/// `parallel` feature is enabled.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 10_000;

/// Derive the whole-hour timezone offset from a longitude.
///
/// Truncates toward zero (cast semantics), so -100 degrees gives -6,
/// not the -7 that geographic convention (floor) would produce.
pub fn timezone_offset(longitude: f64) -> i32 {
    (longitude / 15.0) as i32
}

/// Normalize one raw sample: derive the timezone offset, shift the
/// timestamp into local time and render the local calendar date and
/// time of day.
///
/// All inputs are finite by the loader's contract; there are no error
/// conditions. Out-of-range timestamps collapse to the Unix epoch.
pub fn normalize_point(raw: &RawPoint) -> PointRecord {
    let offset = timezone_offset(raw.longitude);
    let adjusted_timestamp = raw.raw_timestamp + offset as f64 / 24.0;

    // Round to the nearest second: the offset shift leaves sub-microsecond
    // float noise at day-count magnitude, and truncation would turn it into
    // a full lost second (and, at local midnight, the wrong calendar date).
    let unix_seconds = ((adjusted_timestamp - EXCEL_EPOCH_DAY_OFFSET) * SECONDS_PER_DAY).round() as i64;
    let local = DateTime::<Utc>::from_timestamp(unix_seconds, 0).unwrap_or_default();

    PointRecord {
        user_id: raw.user_id,
        latitude: raw.latitude,
        longitude: raw.longitude,
        altitude: raw.altitude,
        raw_timestamp: raw.raw_timestamp,
        timezone_offset: offset,
        adjusted_timestamp,
        adjusted_date: local.date_naive(),
        adjusted_time: local.time(),
    }
}

/// Normalize a whole dataset, preserving input order.
pub fn normalize_dataset(raw: &[RawPoint]) -> Vec<PointRecord> {
    debug!("[Timezone] Normalizing {} points", raw.len());
    raw.iter().map(normalize_point).collect()
}

/// Normalize a whole dataset using parallel processing.
/// Falls back to sequential for small datasets.
#[cfg(feature = "parallel")]
pub fn normalize_dataset_parallel(raw: &[RawPoint]) -> Vec<PointRecord> {
    if raw.len() < PARALLEL_THRESHOLD {
        return normalize_dataset(raw);
    }
    debug!("[Timezone] Normalizing {} points in parallel", raw.len());
    raw.par_iter().map(normalize_point).collect()
}
