//! Rectangular geofence filtering.
//!
//! A [`GeoBox`] is a pure, stateless predicate over coordinates; this module
//! applies it across datasets, both to produce a filtered dataset and to
//! answer "which users ever entered the region" membership queries.

use std::collections::BTreeSet;

use log::info;

use crate::{GeoBox, PointRecord};

/// Return the points falling inside the box (bounds inclusive).
///
/// Filtering is idempotent: applying the same box to an already-filtered
/// dataset yields the same set.
pub fn filter_points(points: &[PointRecord], region: &GeoBox) -> Vec<PointRecord> {
    let filtered: Vec<PointRecord> = points
        .iter()
        .filter(|p| region.contains(p.latitude, p.longitude))
        .copied()
        .collect();
    info!(
        "[Spatial] {} of {} points inside region",
        filtered.len(),
        points.len()
    );
    filtered
}

/// Return the set of users with at least one point inside the box.
///
/// A `BTreeSet` keeps membership iteration deterministic for display
/// and join purposes.
pub fn distinct_visitors(points: &[PointRecord], region: &GeoBox) -> BTreeSet<u32> {
    points
        .iter()
        .filter(|p| region.contains(p.latitude, p.longitude))
        .map(|p| p.user_id)
        .collect()
}
