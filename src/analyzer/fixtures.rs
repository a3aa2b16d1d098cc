// Shared builders for analyzer tests
use crate::config::AnalysisConfig;
use crate::model::{Metric, PerformanceRow};
use chrono::{Duration, NaiveDate};

/// 2024-03-01 plus `offset` days.
pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(offset)
}

pub fn row(query: &str, page: &str, offset: i64, clicks: u64, impressions: u64, position: f64) -> PerformanceRow {
    PerformanceRow::new(query, page, day(offset), clicks, impressions, position)
}

/// Seven-day windows: A = days 0..7, B = days 7..14.
pub fn config() -> AnalysisConfig {
    AnalysisConfig {
        cannibalization_min_pages: 2,
        striking_distance_low: 8.0,
        striking_distance_high: 20.0,
        striking_distance_min_impressions: 100,
        decay_threshold_pct: 30.0,
        decay_window_days: 7,
        decay_window_boundary: day(7),
        decay_metric: Metric::Clicks,
        strict: false,
        quality: None,
        device_gap_threshold: 5.0,
    }
}
