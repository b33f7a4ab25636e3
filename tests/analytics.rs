//! End-to-end tests for the seven trajectory queries

use trajectory_stats::{
    haversine_km, run_analytics, AnalyticsConfig, AnalyticsError, RawPoint,
};

fn minutes(n: u32) -> f64 {
    n as f64 / 1440.0
}

/// Three users over two days in early 2008 (day-count epoch 1899-12-30):
/// - User 1 rides north through Beijing on both days, 12 points each
/// - User 2 walks in London, 11 points on one day
/// - User 3 takes two points in Beijing with a 300 m altitude change
fn synthetic_dataset() -> Vec<RawPoint> {
    let mut raw = Vec::new();
    for day in 0..2u32 {
        let step = if day == 0 { 0.01 } else { 0.005 };
        for i in 0..12u32 {
            raw.push(RawPoint::new(
                1,
                39.90 + i as f64 * step,
                116.40,
                50.0 + i as f64,
                39448.0 + day as f64 + minutes(i),
            ));
        }
    }
    for i in 0..11u32 {
        raw.push(RawPoint::new(
            2,
            51.500 + i as f64 * 0.001,
            -0.13,
            10.0,
            39448.0 + minutes(i),
        ));
    }
    raw.push(RawPoint::new(3, 39.95, 116.45, 100.0, 39448.2));
    raw.push(RawPoint::new(3, 39.96, 116.46, 400.0, 39448.2 + minutes(1)));
    raw
}

fn test_config() -> AnalyticsConfig {
    AnalyticsConfig {
        // Small dataset, small weekly threshold
        weekly_point_threshold: 20,
        ..AnalyticsConfig::default()
    }
}

#[test]
fn test_normalization_covers_all_points() {
    let raw = synthetic_dataset();
    let report = run_analytics(&raw, &test_config()).unwrap();

    assert_eq!(report.normalized.len(), raw.len());
    // Beijing longitudes are UTC+7 by the 15-degrees-per-hour rule
    assert!(report
        .normalized
        .iter()
        .filter(|p| p.user_id == 1)
        .all(|p| p.timezone_offset == 7));
    // London is UTC+0
    assert!(report
        .normalized
        .iter()
        .filter(|p| p.user_id == 2)
        .all(|p| p.timezone_offset == 0));
}

#[test]
fn test_region_filter_and_visitors() {
    let report = run_analytics(&synthetic_dataset(), &test_config()).unwrap();

    // User 2 never enters the Beijing box
    assert_eq!(report.region.count, 26);
    assert_eq!(
        report.region.visitors.iter().copied().collect::<Vec<_>>(),
        vec![1, 3]
    );
    assert!(report.region.points.iter().all(|p| p.user_id != 2));
}

#[test]
fn test_active_days_ranking() {
    let report = run_analytics(&synthetic_dataset(), &test_config()).unwrap();

    // User 1 clears 10 points on two days, user 2 on one, user 3 never
    assert_eq!(report.active_days.len(), 2);
    assert_eq!(report.active_days[0].user_id, 1);
    assert_eq!(report.active_days[0].qualifying_days, 2);
    assert_eq!(report.active_days[1].user_id, 2);
    assert_eq!(report.active_days[1].qualifying_days, 1);
}

#[test]
fn test_active_weeks_ranking() {
    let report = run_analytics(&synthetic_dataset(), &test_config()).unwrap();

    // Both of user 1's days fall in ISO week 1 of 2008: 24 points > 20
    assert_eq!(report.active_weeks.len(), 1);
    assert_eq!(report.active_weeks[0].user_id, 1);
    assert_eq!(report.active_weeks[0].qualifying_weeks, 1);
}

#[test]
fn test_northernmost_with_region_flag() {
    let report = run_analytics(&synthetic_dataset(), &test_config()).unwrap();

    assert_eq!(report.northernmost.len(), 3);

    // London is the northernmost, but its user never visited the region
    assert_eq!(report.northernmost[0].user_id, 2);
    assert!((report.northernmost[0].latitude - 51.510).abs() < 1e-9);
    assert!(!report.northernmost[0].visited_region);

    // User 1's best is the top of the first (faster) day
    assert_eq!(report.northernmost[1].user_id, 1);
    assert!((report.northernmost[1].latitude - 40.01).abs() < 1e-9);
    assert_eq!(report.northernmost[1].date.to_string(), "2008-01-01");
    assert!(report.northernmost[1].visited_region);

    assert_eq!(report.northernmost[2].user_id, 3);
    assert!(report.northernmost[2].visited_region);
}

#[test]
fn test_altitude_spans() {
    let report = run_analytics(&synthetic_dataset(), &test_config()).unwrap();

    assert_eq!(report.altitude_spans.len(), 3);
    // User 3: 400 - 100 on a single day
    assert_eq!(report.altitude_spans[0].user_id, 3);
    assert_eq!(report.altitude_spans[0].max_span, 300.0);
    // User 1: altitudes climb 50..=61 on each day
    assert_eq!(report.altitude_spans[1].user_id, 1);
    assert_eq!(report.altitude_spans[1].max_span, 11.0);
    // User 2: constant altitude
    assert_eq!(report.altitude_spans[2].user_id, 2);
    assert_eq!(report.altitude_spans[2].max_span, 0.0);
}

#[test]
fn test_distance_analysis() {
    let report = run_analytics(&synthetic_dataset(), &test_config()).unwrap();

    // Expected per-day totals straight from the distance function
    let seg_day1 = haversine_km(39.90, 116.40, 39.91, 116.40);
    let seg_day2 = haversine_km(39.90, 116.40, 39.905, 116.40);
    let seg_london = haversine_km(51.500, -0.13, 51.501, -0.13);
    let seg_user3 = haversine_km(39.95, 116.45, 39.96, 116.46);

    let user1_day1 = 11.0 * seg_day1;
    let user1_day2 = 11.0 * seg_day2;
    let user2_day = 10.0 * seg_london;

    // Each user's longest day, distance descending
    assert_eq!(report.longest_days.len(), 3);
    assert_eq!(report.longest_days[0].user_id, 1);
    assert_eq!(report.longest_days[0].date.to_string(), "2008-01-01");
    assert!((report.longest_days[0].distance_km - user1_day1).abs() < 1e-6);

    assert_eq!(report.longest_days[1].user_id, 3);
    assert!((report.longest_days[1].distance_km - seg_user3).abs() < 1e-6);

    assert_eq!(report.longest_days[2].user_id, 2);
    assert!((report.longest_days[2].distance_km - user2_day).abs() < 1e-6);

    // Grand total covers every day of every user, not just the best days
    let expected_total = user1_day1 + user1_day2 + user2_day + seg_user3;
    assert!((report.total_distance_km - expected_total).abs() < 1e-6);
}

#[test]
fn test_report_serializes_to_json() {
    let report = run_analytics(&synthetic_dataset(), &test_config()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    // Dates and times render as the expected display strings
    assert_eq!(json["normalized"][0]["adjusted_date"], "2008-01-01");
    assert_eq!(json["normalized"][0]["adjusted_time"], "07:00:00");
    assert!(json["total_distance_km"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_inverted_region_rejected() {
    let config = AnalyticsConfig {
        region: trajectory_stats::GeoBox {
            min_lat: 40.5,
            max_lat: 39.5,
            min_lon: 115.5,
            max_lon: 117.5,
        },
        ..AnalyticsConfig::default()
    };
    let result = run_analytics(&synthetic_dataset(), &config);
    assert!(matches!(result, Err(AnalyticsError::ConfigError { .. })));
}

#[test]
fn test_queries_are_deterministic() {
    let raw = synthetic_dataset();
    let a = run_analytics(&raw, &test_config()).unwrap();
    let b = run_analytics(&raw, &test_config()).unwrap();

    assert_eq!(a.active_days, b.active_days);
    assert_eq!(a.northernmost, b.northernmost);
    assert_eq!(a.longest_days, b.longest_days);
    assert_eq!(a.total_distance_km, b.total_distance_km);
}
