use crate::analyzer::aggregate::{ensure_valid, Totals};
use crate::model::{AnalysisError, DeviceComparison, DeviceGap, DeviceTotals, PerformanceRow};
use std::collections::BTreeMap;

const MOBILE: &str = "MOBILE";
const DESKTOP: &str = "DESKTOP";
const MAX_GAP_PAGES: usize = 20;

/// Mobile vs desktop ranking per page, plus totals per device.
/// `rows` are the per-device rows before folding; rows without a device are ignored.
pub fn compare_devices(
    rows: &[PerformanceRow],
    gap_threshold: f64,
) -> Result<DeviceComparison, AnalysisError> {
    ensure_valid(rows)?;
    if !gap_threshold.is_finite() || gap_threshold <= 0.0 {
        return Err(AnalysisError::Configuration(format!(
            "gap_threshold must be positive, got {}",
            gap_threshold
        )));
    }

    let mut devices: BTreeMap<String, Totals> = BTreeMap::new();
    let mut pages: BTreeMap<&str, (Totals, Totals)> = BTreeMap::new();
    for row in rows {
        let Some(device) = &row.device else { continue };
        let device = device.to_uppercase();
        if device == MOBILE {
            pages.entry(row.page.as_str()).or_default().0.add(row);
        } else if device == DESKTOP {
            pages.entry(row.page.as_str()).or_default().1.add(row);
        }
        devices.entry(device).or_default().add(row);
    }

    let mut problematic_pages: Vec<DeviceGap> = pages
        .into_iter()
        .filter(|(_, (mobile, desktop))| mobile.impressions > 0 && desktop.impressions > 0)
        .map(|(page, (mobile, desktop))| DeviceGap {
            page: page.to_string(),
            mobile_position: mobile.avg_position(),
            desktop_position: desktop.avg_position(),
            position_gap: mobile.avg_position() - desktop.avg_position(),
            mobile_clicks: mobile.clicks,
            desktop_clicks: desktop.clicks,
        })
        .filter(|gap| gap.position_gap.abs() >= gap_threshold)
        .collect();

    problematic_pages.sort_by(|a, b| {
        b.position_gap
            .abs()
            .total_cmp(&a.position_gap.abs())
            .then_with(|| a.page.cmp(&b.page))
    });
    problematic_pages.truncate(MAX_GAP_PAGES);

    let device_summary = devices
        .into_iter()
        .map(|(device, t)| DeviceTotals {
            device,
            clicks: t.clicks,
            impressions: t.impressions,
            ctr: t.ctr(),
            position: t.avg_position(),
        })
        .collect();

    Ok(DeviceComparison {
        problematic_pages,
        device_summary,
    })
}
