use crate::analyzer::aggregate::{ensure_valid, Totals};
use crate::model::{
    AnalysisError, ChangeKind, DateWindow, DecayAlert, GroupKey, Metric, PerformanceRow,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Compares `metric` per query or page between two disjoint windows of equal
/// length. Percent change is `(b - a) / a * 100`; an alert is raised when its
/// magnitude reaches `threshold_pct`. A key absent from window A but present
/// in B is always reported as `New`.
pub fn detect_decay(
    rows: &[PerformanceRow],
    window_a: DateWindow,
    window_b: DateWindow,
    metric: Metric,
    threshold_pct: f64,
    group_by: GroupKey,
) -> Result<Vec<DecayAlert>, AnalysisError> {
    ensure_valid(rows)?;
    check_windows(&window_a, &window_b)?;
    if !threshold_pct.is_finite() || threshold_pct <= 0.0 {
        return Err(AnalysisError::Configuration(format!(
            "threshold_pct must be positive, got {}",
            threshold_pct
        )));
    }

    let mut windows: BTreeMap<&str, (Totals, Totals)> = BTreeMap::new();
    for row in rows {
        if window_a.contains(row.date) {
            windows.entry(group_by.key_of(row)).or_default().0.add(row);
        } else if window_b.contains(row.date) {
            windows.entry(group_by.key_of(row)).or_default().1.add(row);
        }
    }

    let mut alerts: Vec<DecayAlert> = windows
        .into_iter()
        .filter_map(|(subject, (a, b))| {
            let a_value = metric_value(&a, metric);
            let b_value = metric_value(&b, metric);
            let (percent_change, kind) = classify(a_value, b_value, threshold_pct)?;
            Some(DecayAlert {
                dimension: group_by,
                subject: subject.to_string(),
                metric,
                window_a_value: a_value,
                window_b_value: b_value,
                percent_change,
                kind,
            })
        })
        .collect();

    alerts.sort_by(|x, y| {
        worst_first(x.percent_change, y.percent_change).then_with(|| x.subject.cmp(&y.subject))
    });
    Ok(alerts)
}

fn check_windows(a: &DateWindow, b: &DateWindow) -> Result<(), AnalysisError> {
    if a.days() <= 0 || b.days() <= 0 {
        return Err(AnalysisError::Configuration(
            "decay windows must span at least one day".into(),
        ));
    }
    if a.days() != b.days() {
        return Err(AnalysisError::Configuration(format!(
            "decay windows differ in length: {} vs {} days",
            a.days(),
            b.days()
        )));
    }
    if a.overlaps(b) {
        return Err(AnalysisError::Configuration(
            "decay windows overlap".into(),
        ));
    }
    Ok(())
}

fn metric_value(totals: &Totals, metric: Metric) -> f64 {
    match metric {
        Metric::Clicks => totals.clicks as f64,
        Metric::Impressions => totals.impressions as f64,
        Metric::Ctr => totals.ctr(),
    }
}

fn classify(a: f64, b: f64, threshold_pct: f64) -> Option<(Option<f64>, ChangeKind)> {
    if a == 0.0 {
        return if b > 0.0 { Some((None, ChangeKind::New)) } else { None };
    }

    let pct = (b - a) / a * 100.0;
    if pct.abs() < threshold_pct {
        return None;
    }
    let kind = if b == 0.0 {
        ChangeKind::Lost
    } else if pct < 0.0 {
        ChangeKind::Decline
    } else {
        ChangeKind::Growth
    };
    Some((Some(pct), kind))
}

/// Steepest decline first; `New` (no percentage) sorts last.
fn worst_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
