//! The seven trajectory queries.
//!
//! Each query is a fixed composition of the timezone, spatial, window,
//! group and distance primitives. None of them keeps state across
//! invocations: a run is a pure function of the input dataset and an
//! [`AnalyticsConfig`], and each query is independently computable from
//! the normalized dataset.
//!
//! ## Example
//! ```rust
//! use trajectory_stats::{run_analytics, AnalyticsConfig, RawPoint};
//!
//! let raw = vec![
//!     RawPoint::new(1, 39.90, 116.40, 100.0, 39448.50),
//!     RawPoint::new(1, 39.91, 116.41, 150.0, 39448.50 + 1.0 / 1440.0),
//! ];
//! let report = run_analytics(&raw, &AnalyticsConfig::default()).unwrap();
//! assert_eq!(report.altitude_spans[0].max_span, 50.0);
//! ```

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::distance::{grand_total_km, DailyDistance};
use crate::error::{OptionExt, Result};
use crate::group::{regroup, sort_by_measure_desc, Aggregate, GroupRow, GroupSpec, Rollup};
use crate::spatial::{distinct_visitors, filter_points};
use crate::window::{top_per_partition, Direction, WindowSpec};
use crate::{AnalyticsConfig, GeoBox, PointRecord, RawPoint};

#[cfg(not(feature = "parallel"))]
use crate::distance::daily_distances;
#[cfg(not(feature = "parallel"))]
use crate::group::group_by;
#[cfg(not(feature = "parallel"))]
use crate::timezone::normalize_dataset;

#[cfg(feature = "parallel")]
use crate::distance::daily_distances_parallel;
#[cfg(feature = "parallel")]
use crate::group::group_by_parallel;
#[cfg(feature = "parallel")]
use crate::timezone::normalize_dataset_parallel;

// ============================================================================
// Result Tables
// ============================================================================

/// Region filter result: the filtered dataset, its size and the set of
/// users that ever entered the region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSummary {
    pub count: usize,
    pub points: Vec<PointRecord>,
    pub visitors: BTreeSet<u32>,
}

/// Number of dates on which a user logged more than the daily threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDaysRow {
    pub user_id: u32,
    pub qualifying_days: u64,
}

/// Number of ISO weeks in which a user logged more than the weekly threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveWeeksRow {
    pub user_id: u32,
    pub qualifying_weeks: u64,
}

/// A user's northernmost point, with the region-visit flag attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NorthernmostRow {
    pub user_id: u32,
    pub latitude: f64,
    pub date: NaiveDate,
    pub visited_region: bool,
}

/// A user's largest single-day altitude range, in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltitudeSpanRow {
    pub user_id: u32,
    pub max_span: f64,
}

/// A user's single longest day by accumulated great-circle distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongestDayRow {
    pub user_id: u32,
    pub date: NaiveDate,
    pub distance_km: f64,
}

/// The seven result tables of one analytics run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    /// Query 1: the timezone-adjusted dataset all other queries consume
    pub normalized: Vec<PointRecord>,
    /// Query 2: region filter
    pub region: RegionSummary,
    /// Query 3: active-days ranking (top N)
    pub active_days: Vec<ActiveDaysRow>,
    /// Query 4: active-weeks ranking
    pub active_weeks: Vec<ActiveWeeksRow>,
    /// Query 5: northernmost point per user (top N) with region-visit flag
    pub northernmost: Vec<NorthernmostRow>,
    /// Query 6: largest daily altitude span per user (top N)
    pub altitude_spans: Vec<AltitudeSpanRow>,
    /// Query 7: each user's longest day, distance descending
    pub longest_days: Vec<LongestDayRow>,
    /// Query 7: grand total distance across all users and days
    pub total_distance_km: f64,
}

// ============================================================================
// Individual Queries
// ============================================================================

fn key_user_id(row: &GroupRow) -> Result<u32> {
    row.keys
        .first()
        .and_then(|k| k.as_i64())
        .map(|v| v as u32)
        .ok_or_internal("group key missing user id")
}

fn count_groups(points: &[PointRecord], spec: &GroupSpec<PointRecord>) -> Result<Vec<GroupRow>> {
    #[cfg(feature = "parallel")]
    let counts = group_by_parallel(points, spec, &Aggregate::Count);
    #[cfg(not(feature = "parallel"))]
    let counts = group_by(points, spec, &Aggregate::Count);
    counts
}

/// Query 2: filter the dataset to the configured region and collect the
/// distinct visitor set.
pub fn region_summary(points: &[PointRecord], region: &GeoBox) -> RegionSummary {
    let filtered = filter_points(points, region);
    RegionSummary {
        count: filtered.len(),
        visitors: distinct_visitors(points, region),
        points: filtered,
    }
}

/// Count points per (user, `bucket_field`), keep buckets above the
/// threshold, then count qualifying buckets per user and sort by the
/// engine-wide display contract.
fn bucket_ranking(
    points: &[PointRecord],
    bucket_field: &str,
    threshold: u64,
    limit: Option<usize>,
) -> Result<Vec<(u32, u64)>> {
    let spec = GroupSpec::new(&["user_id", bucket_field])?;
    let counts = count_groups(points, &spec)?;

    let qualifying: Vec<GroupRow> = counts
        .into_iter()
        .filter(|r| r.value > threshold as f64)
        .collect();

    let mut per_user = regroup(&qualifying, &[0], Rollup::Count)?;
    sort_by_measure_desc(&mut per_user);
    if let Some(n) = limit {
        per_user.truncate(n);
    }

    per_user
        .iter()
        .map(|r| Ok((key_user_id(r)?, r.value as u64)))
        .collect()
}

/// Query 3: users ranked by how many dates exceeded the daily point
/// threshold, top N.
pub fn active_days_ranking(
    points: &[PointRecord],
    config: &AnalyticsConfig,
) -> Result<Vec<ActiveDaysRow>> {
    let rows = bucket_ranking(
        points,
        "adjusted_date",
        config.daily_point_threshold,
        Some(config.top_n),
    )?;
    Ok(rows
        .into_iter()
        .map(|(user_id, qualifying_days)| ActiveDaysRow {
            user_id,
            qualifying_days,
        })
        .collect())
}

/// Query 4: users ranked by how many ISO weeks exceeded the weekly point
/// threshold. Unlimited; week numbers are year-agnostic (1-53).
pub fn active_weeks_ranking(
    points: &[PointRecord],
    config: &AnalyticsConfig,
) -> Result<Vec<ActiveWeeksRow>> {
    let rows = bucket_ranking(points, "iso_week", config.weekly_point_threshold, None)?;
    Ok(rows
        .into_iter()
        .map(|(user_id, qualifying_weeks)| ActiveWeeksRow {
            user_id,
            qualifying_weeks,
        })
        .collect())
}

/// Query 5: each user's northernmost point (earliest date breaks latitude
/// ties), globally sorted latitude-descending, top N, flagged with region
/// membership from the visitor set.
pub fn northernmost_points(
    points: &[PointRecord],
    visitors: &BTreeSet<u32>,
    config: &AnalyticsConfig,
) -> Result<Vec<NorthernmostRow>> {
    let spec = WindowSpec::new(
        &["user_id"],
        &[
            ("latitude", Direction::Desc),
            ("adjusted_date", Direction::Asc),
        ],
    )?;
    let mut tops = top_per_partition(points, &spec);
    tops.sort_by(|a, b| {
        b.latitude
            .total_cmp(&a.latitude)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    tops.truncate(config.top_n);

    Ok(tops
        .into_iter()
        .map(|p| NorthernmostRow {
            user_id: p.user_id,
            latitude: p.latitude,
            date: p.adjusted_date,
            visited_region: visitors.contains(&p.user_id),
        })
        .collect())
}

/// Query 6: per user, the maximum over days of (max altitude - min
/// altitude), top N.
pub fn altitude_spans(
    points: &[PointRecord],
    config: &AnalyticsConfig,
) -> Result<Vec<AltitudeSpanRow>> {
    let spec = GroupSpec::new(&["user_id", "adjusted_date"])?;
    let agg = Aggregate::Span("altitude".to_string());

    #[cfg(feature = "parallel")]
    let daily = group_by_parallel(points, &spec, &agg)?;
    #[cfg(not(feature = "parallel"))]
    let daily = group_by(points, &spec, &agg)?;

    let mut per_user = regroup(&daily, &[0], Rollup::Max)?;
    sort_by_measure_desc(&mut per_user);
    per_user.truncate(config.top_n);

    per_user
        .iter()
        .map(|r| {
            Ok(AltitudeSpanRow {
                user_id: key_user_id(r)?,
                max_span: r.value,
            })
        })
        .collect()
}

/// Query 7: each user's single longest day (distance descending, earliest
/// date breaks ties), plus the grand total over all users and days.
pub fn distance_analysis(points: &[PointRecord]) -> Result<(Vec<LongestDayRow>, f64)> {
    #[cfg(feature = "parallel")]
    let daily = daily_distances_parallel(points)?;
    #[cfg(not(feature = "parallel"))]
    let daily = daily_distances(points)?;

    let total = grand_total_km(&daily);

    let spec = WindowSpec::<DailyDistance>::new(
        &["user_id"],
        &[
            ("distance_km", Direction::Desc),
            ("date", Direction::Asc),
        ],
    )?;
    let mut best = top_per_partition(&daily, &spec);
    best.sort_by(|a, b| {
        b.distance_km
            .total_cmp(&a.distance_km)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    let rows = best
        .into_iter()
        .map(|d| LongestDayRow {
            user_id: d.user_id,
            date: d.date,
            distance_km: d.distance_km,
        })
        .collect();
    Ok((rows, total))
}

// ============================================================================
// Orchestration
// ============================================================================

/// Run all seven queries over a raw dataset.
///
/// Normalization happens exactly once; every query consumes the adjusted
/// fields. The report's tables carry the exact column sets and orderings
/// of the individual query functions.
pub fn run_analytics(raw: &[RawPoint], config: &AnalyticsConfig) -> Result<AnalyticsReport> {
    config.validate()?;
    info!("[Analytics] Analyzing {} raw points", raw.len());

    #[cfg(feature = "parallel")]
    let normalized = normalize_dataset_parallel(raw);
    #[cfg(not(feature = "parallel"))]
    let normalized = normalize_dataset(raw);

    let region = region_summary(&normalized, &config.region);
    let active_days = active_days_ranking(&normalized, config)?;
    let active_weeks = active_weeks_ranking(&normalized, config)?;
    let northernmost = northernmost_points(&normalized, &region.visitors, config)?;
    let altitude = altitude_spans(&normalized, config)?;
    let (longest_days, total_distance_km) = distance_analysis(&normalized)?;

    info!(
        "[Analytics] {} region points, {} users ranked, total distance {:.2} km",
        region.count,
        longest_days.len(),
        total_distance_km
    );

    Ok(AnalyticsReport {
        normalized,
        region,
        active_days,
        active_weeks,
        northernmost,
        altitude_spans: altitude,
        longest_days,
        total_distance_km,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone::normalize_dataset;

    fn minutes(n: u32) -> f64 {
        n as f64 / 1440.0
    }

    /// One user, two nearby points on the same Beijing day.
    fn two_point_raw() -> Vec<RawPoint> {
        vec![
            RawPoint::new(1, 39.90, 116.40, 100.0, 39448.50),
            RawPoint::new(1, 39.91, 116.41, 150.0, 39448.50 + minutes(1)),
        ]
    }

    #[test]
    fn test_worked_example() {
        let report = run_analytics(&two_point_raw(), &AnalyticsConfig::default()).unwrap();

        // Both points fall inside the Beijing box
        assert_eq!(report.region.count, 2);
        assert_eq!(
            report.region.visitors.iter().copied().collect::<Vec<_>>(),
            vec![1]
        );

        // Altitude span for the day is 50 m
        assert_eq!(report.altitude_spans.len(), 1);
        assert_eq!(report.altitude_spans[0].max_span, 50.0);

        // Single pair, single day: longest day equals the grand total, ~1.4 km
        assert_eq!(report.longest_days.len(), 1);
        assert!((report.longest_days[0].distance_km - 1.4).abs() < 0.05);
        assert_eq!(
            report.longest_days[0].distance_km,
            report.total_distance_km
        );

        // Northernmost point is the second sample, flagged as a region visitor
        assert_eq!(report.northernmost.len(), 1);
        assert_eq!(report.northernmost[0].latitude, 39.91);
        assert!(report.northernmost[0].visited_region);

        // Two points on one day clears no threshold
        assert!(report.active_days.is_empty());
        assert!(report.active_weeks.is_empty());
    }

    #[test]
    fn test_active_days_threshold_and_order() {
        // User 1: 12 points on each of two days; user 2: 12 points on one
        // day and 3 on another; user 3 never qualifies
        let mut raw = Vec::new();
        for day in 0..2 {
            for i in 0..12 {
                raw.push(RawPoint::new(
                    1,
                    39.90,
                    116.40,
                    0.0,
                    39448.0 + day as f64 + minutes(i),
                ));
            }
        }
        for i in 0..12 {
            raw.push(RawPoint::new(2, 39.90, 116.40, 0.0, 39448.0 + minutes(i)));
        }
        for i in 0..3 {
            raw.push(RawPoint::new(2, 39.90, 116.40, 0.0, 39449.0 + minutes(i)));
        }
        raw.push(RawPoint::new(3, 39.90, 116.40, 0.0, 39448.0));

        let points = normalize_dataset(&raw);
        let rows = active_days_ranking(&points, &AnalyticsConfig::default()).unwrap();

        assert_eq!(
            rows,
            vec![
                ActiveDaysRow {
                    user_id: 1,
                    qualifying_days: 2
                },
                ActiveDaysRow {
                    user_id: 2,
                    qualifying_days: 1
                },
            ]
        );
    }

    #[test]
    fn test_active_days_tie_breaks_by_user_id() {
        // Users 5 and 2 both qualify on exactly one day
        let mut raw = Vec::new();
        for user in [5, 2] {
            for i in 0..11 {
                raw.push(RawPoint::new(
                    user,
                    39.90,
                    116.40,
                    0.0,
                    39448.0 + minutes(i),
                ));
            }
        }
        let points = normalize_dataset(&raw);
        let rows = active_days_ranking(&points, &AnalyticsConfig::default()).unwrap();

        assert_eq!(rows[0].user_id, 2);
        assert_eq!(rows[1].user_id, 5);
    }

    #[test]
    fn test_top_n_truncation() {
        // Seven users each qualify with a different number of days
        let mut raw = Vec::new();
        for user in 1..=7u32 {
            for day in 0..user {
                for i in 0..11 {
                    raw.push(RawPoint::new(
                        user,
                        39.90,
                        116.40,
                        0.0,
                        39448.0 + day as f64 + minutes(i),
                    ));
                }
            }
        }
        let points = normalize_dataset(&raw);
        let rows = active_days_ranking(&points, &AnalyticsConfig::default()).unwrap();

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].user_id, 7);
        assert_eq!(rows[0].qualifying_days, 7);
        // User 1 (single qualifying day) is cut by the top-6 limit
        assert!(rows.iter().all(|r| r.user_id != 1));
    }

    #[test]
    fn test_northernmost_latitude_tie_takes_earliest_date() {
        let raw = vec![
            RawPoint::new(1, 40.00, 116.40, 0.0, 39450.50), // later date
            RawPoint::new(1, 40.00, 116.41, 0.0, 39448.50), // earlier date
            RawPoint::new(2, 10.00, 16.40, 0.0, 39448.50),  // outside region
        ];
        let points = normalize_dataset(&raw);
        let visitors = distinct_visitors(&points, &crate::BEIJING);
        let rows =
            northernmost_points(&points, &visitors, &AnalyticsConfig::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, 1);
        assert_eq!(rows[0].date.to_string(), "2008-01-01");
        assert!(rows[0].visited_region);
        assert!(!rows[1].visited_region);
    }

    #[test]
    fn test_longest_day_rank_tie_takes_earliest_date() {
        // Same out-and-back distance on two days; the earlier day must win
        let raw = vec![
            RawPoint::new(1, 39.90, 116.40, 0.0, 39449.50),
            RawPoint::new(1, 39.95, 116.40, 0.0, 39449.50 + minutes(10)),
            RawPoint::new(1, 39.90, 116.40, 0.0, 39448.50),
            RawPoint::new(1, 39.95, 116.40, 0.0, 39448.50 + minutes(10)),
        ];
        let points = normalize_dataset(&raw);
        let (rows, total) = distance_analysis(&points).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date.to_string(), "2008-01-01");
        // Grand total covers both days
        assert!((total - 2.0 * rows[0].distance_km).abs() < 1e-9);
    }

    #[test]
    fn test_empty_dataset() {
        let report = run_analytics(&[], &AnalyticsConfig::default()).unwrap();
        assert!(report.normalized.is_empty());
        assert_eq!(report.region.count, 0);
        assert!(report.longest_days.is_empty());
        assert_eq!(report.total_distance_km, 0.0);
    }
}
