//! Great-circle distance accumulation.
//!
//! The stateless [`haversine_km`] function implements the standard
//! half-angle formula; on top of it, [`daily_distances`] walks every
//! (user, date) partition in timestamp order and sums the distances
//! between consecutive points.
//!
//! ## Example
//! ```rust
//! use trajectory_stats::haversine_km;
//!
//! let km = haversine_km(39.90, 116.40, 39.91, 116.41);
//! assert!((km - 1.4).abs() < 0.05);
//! ```

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::window::{lag, Direction, FieldValue, Row, WindowSpec};
use crate::PointRecord;

#[cfg(feature = "parallel")]
use crate::window::{lag_parallel, Lagged};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers between two coordinates in degrees.
///
/// The intermediate value `a` is clamped to `[0, 1]` before the square
/// root: floating-point rounding can push it fractionally outside the
/// domain of `asin` for identical or antipodal points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
    c * EARTH_RADIUS_KM
}

/// Total kilometers traveled by one user on one local date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyDistance {
    pub user_id: u32,
    pub date: NaiveDate,
    pub distance_km: f64,
}

impl Row for DailyDistance {
    fn field_names() -> &'static [&'static str] {
        &["user_id", "date", "distance_km"]
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "user_id" => Some(FieldValue::Int(self.user_id as i64)),
            "date" => Some(FieldValue::Date(self.date)),
            "distance_km" => Some(FieldValue::Float(self.distance_km)),
            _ => None,
        }
    }
}

fn consecutive_spec() -> Result<WindowSpec<PointRecord>> {
    WindowSpec::new(
        &["user_id", "adjusted_date"],
        &[("adjusted_timestamp", Direction::Asc)],
    )
}

/// Sum great-circle distances between consecutive points of every
/// (user, date) partition, ordered by adjusted timestamp.
///
/// The first point of each partition has no predecessor and contributes
/// nothing; a partition with a single point therefore produces no output
/// row at all, matching the lag-then-filter semantics of the queries
/// downstream.
pub fn daily_distances(points: &[PointRecord]) -> Result<Vec<DailyDistance>> {
    let spec = consecutive_spec()?;
    let lagged = lag(points, &spec, |p| (p.latitude, p.longitude));
    Ok(accumulate(lagged.iter().map(|l| (&l.row, l.prev))))
}

/// Parallel variant of [`daily_distances`]; partitions are ordered on
/// rayon workers.
#[cfg(feature = "parallel")]
pub fn daily_distances_parallel(points: &[PointRecord]) -> Result<Vec<DailyDistance>> {
    let spec = consecutive_spec()?;
    let lagged: Vec<Lagged<PointRecord, (f64, f64)>> =
        lag_parallel(points, &spec, |p| (p.latitude, p.longitude));
    Ok(accumulate(lagged.iter().map(|l| (&l.row, l.prev))))
}

fn accumulate<'a, I>(pairs: I) -> Vec<DailyDistance>
where
    I: Iterator<Item = (&'a PointRecord, Option<(f64, f64)>)>,
{
    let mut totals: BTreeMap<(u32, NaiveDate), f64> = BTreeMap::new();
    for (point, prev) in pairs {
        if let Some((prev_lat, prev_lon)) = prev {
            let km = haversine_km(prev_lat, prev_lon, point.latitude, point.longitude);
            *totals
                .entry((point.user_id, point.adjusted_date))
                .or_insert(0.0) += km;
        }
    }

    let result: Vec<DailyDistance> = totals
        .into_iter()
        .map(|((user_id, date), distance_km)| DailyDistance {
            user_id,
            date,
            distance_km,
        })
        .collect();
    info!("[Distance] Accumulated {} user-days", result.len());
    result
}

/// Grand total distance across all partitions and users.
pub fn grand_total_km(distances: &[DailyDistance]) -> f64 {
    distances.iter().map(|d| d.distance_km).sum()
}
