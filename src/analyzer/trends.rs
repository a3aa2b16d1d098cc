use crate::model::{DateWindow, PerformanceRow, TrafficTrend, TrendDirection, Volatility};
use chrono::NaiveDate;
use std::collections::BTreeMap;

const TREND_BAND_PCT: f64 = 10.0;
const VOLATILITY_WINDOW: usize = 7;

/// Site-wide click trend between the two windows, plus day-to-day volatility.
pub fn traffic_trend(
    rows: &[PerformanceRow],
    window_a: &DateWindow,
    window_b: &DateWindow,
) -> TrafficTrend {
    let clicks_in = |w: &DateWindow| -> u64 {
        rows.iter()
            .filter(|r| w.contains(r.date))
            .fold(0u64, |acc, r| acc.saturating_add(r.clicks))
    };
    let before = clicks_in(window_a) as f64;
    let after = clicks_in(window_b) as f64;

    let growth_rate_pct = if before > 0.0 {
        (after - before) / before * 100.0
    } else {
        0.0
    };
    let direction = if growth_rate_pct > TREND_BAND_PCT {
        TrendDirection::Growing
    } else if growth_rate_pct < -TREND_BAND_PCT {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    TrafficTrend {
        direction,
        growth_rate_pct,
        volatility: volatility(&daily_clicks(rows)),
    }
}

fn daily_clicks(rows: &[PerformanceRow]) -> Vec<f64> {
    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for row in rows {
        let day = days.entry(row.date).or_default();
        *day = day.saturating_add(row.clicks);
    }
    days.into_values().map(|c| c as f64).collect()
}

/// Mean absolute deviation from the trailing 7-day average, relative to mean daily clicks.
fn volatility(daily: &[f64]) -> Volatility {
    if daily.len() <= VOLATILITY_WINDOW {
        return Volatility::Low;
    }
    let mean = daily.iter().sum::<f64>() / daily.len() as f64;
    if mean == 0.0 {
        return Volatility::Low;
    }

    let averages = moving_average(daily, VOLATILITY_WINDOW);
    let deviations: Vec<f64> = daily[VOLATILITY_WINDOW - 1..]
        .iter()
        .zip(&averages)
        .map(|(value, avg)| (value - avg).abs())
        .collect();
    let ratio = deviations.iter().sum::<f64>() / deviations.len() as f64 / mean;

    if ratio > 0.3 {
        Volatility::High
    } else if ratio > 0.15 {
        Volatility::Medium
    } else {
        Volatility::Low
    }
}

/// Calculates the moving average of a slice of data with the given window size.
fn moving_average(data: &[f64], window_size: usize) -> Vec<f64> {
    if window_size == 0 || data.len() < window_size {
        return Vec::new();
    }
    data.windows(window_size)
        .map(|window| window.iter().sum::<f64>() / window_size as f64)
        .collect()
}
