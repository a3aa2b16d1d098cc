use crate::analyzer::aggregate::Totals;
use crate::model::{AnalysisError, PerformanceRow, RawRow};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Rows that passed validation, plus what was dropped on the way.
#[derive(Debug, Default)]
pub struct NormalizedRows {
    /// One row per (query, page, date); per-device rows are folded together.
    pub rows: Vec<PerformanceRow>,
    /// Valid per-device rows as reported, before folding.
    pub device_rows: Vec<PerformanceRow>,
    pub skipped: usize,
    pub duplicates: usize,
}

type RowKey = (String, String, NaiveDate);

struct Slot {
    first: PerformanceRow,
    totals: Totals,
    devices: usize,
}

/// Validates raw rows and de-duplicates them by (query, page, date), keeping
/// the first occurrence. In strict mode the first invalid row aborts the run;
/// otherwise it is skipped and counted.
///
/// Rows for the same key reported under different devices are summed into one
/// row with an impression-weighted position. Each device row is validated on
/// its own first, so a malformed one never hides inside a folded total.
pub fn normalize_all(raw: &[RawRow], strict: bool) -> Result<NormalizedRows, AnalysisError> {
    let mut result = NormalizedRows::default();
    let mut slots: Vec<Slot> = Vec::new();
    let mut index: HashMap<RowKey, usize> = HashMap::new();
    let mut seen_devices: HashSet<(RowKey, String)> = HashSet::new();

    for (position, raw_row) in raw.iter().enumerate() {
        let row = match normalize_row(raw_row) {
            Ok(row) => row,
            Err(reason) if strict => {
                return Err(AnalysisError::Validation { row: position, reason });
            }
            Err(reason) => {
                debug!("Skipping row {}: {}", position, reason);
                result.skipped += 1;
                continue;
            }
        };

        let key: RowKey = (row.query.clone(), row.page.clone(), row.date);
        match index.get(&key).copied() {
            None => {
                if let Some(device) = &row.device {
                    seen_devices.insert((key.clone(), device.clone()));
                    result.device_rows.push(row.clone());
                }
                index.insert(key, slots.len());
                let mut totals = Totals::default();
                totals.add(&row);
                slots.push(Slot { first: row, totals, devices: 1 });
            }
            Some(i) => {
                let slot = &mut slots[i];
                let new_device = match (&slot.first.device, &row.device) {
                    (Some(_), Some(device)) => seen_devices.insert((key, device.clone())),
                    _ => false,
                };
                if !new_device {
                    result.duplicates += 1;
                    continue;
                }
                slot.totals.add(&row);
                slot.devices += 1;
                result.device_rows.push(row);
            }
        }
    }

    result.rows = slots.into_iter().map(fold).collect();

    if result.skipped > 0 {
        warn!("Skipped {} malformed rows", result.skipped);
    }
    if result.duplicates > 0 {
        debug!("Dropped {} duplicate rows", result.duplicates);
    }
    Ok(result)
}

fn fold(slot: Slot) -> PerformanceRow {
    if slot.devices < 2 {
        return slot.first;
    }
    let t = slot.totals;
    PerformanceRow::new(
        &slot.first.query,
        &slot.first.page,
        slot.first.date,
        t.clicks,
        t.impressions,
        t.avg_position(),
    )
}

fn normalize_row(raw: &RawRow) -> Result<PerformanceRow, String> {
    let query = raw.query.as_deref().ok_or("missing query")?;
    let page = raw.page.as_deref().ok_or("missing page")?;
    let date_str = raw.date.as_deref().ok_or("missing date")?;
    let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}': {}", date_str, e))?;

    let clicks = count(raw.clicks, "clicks")?;
    let impressions = count(raw.impressions, "impressions")?;
    let position = raw.position.ok_or("missing position")?;

    let ctr = match raw.ctr {
        Some(ctr) => ctr,
        None if impressions > 0 => clicks as f64 / impressions as f64,
        None => 0.0,
    };

    let row = PerformanceRow {
        query: query.trim().to_string(),
        page: page.trim().to_string(),
        date,
        clicks,
        impressions,
        ctr,
        position,
        device: raw.device.clone(),
    };
    row.validate()?;
    Ok(row)
}

fn count(value: Option<f64>, field: &str) -> Result<u64, String> {
    let value = value.ok_or_else(|| format!("missing {}", field))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number, got {}", field, value));
    }
    if value.fract() != 0.0 {
        return Err(format!("{} must be a whole number, got {}", field, value));
    }
    if value >= u64::MAX as f64 {
        return Err(format!("{} out of range: {}", field, value));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(query: &str, page: &str, date: &str, clicks: f64, impressions: f64, position: f64) -> RawRow {
        RawRow {
            query: Some(query.into()),
            page: Some(page.into()),
            date: Some(date.into()),
            device: None,
            clicks: Some(clicks),
            impressions: Some(impressions),
            ctr: None,
            position: Some(position),
        }
    }

    #[test]
    fn derives_ctr_when_absent() {
        let out = normalize_all(&[raw("shoes", "/a", "2024-03-01", 5.0, 50.0, 3.0)], false).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert!((out.rows[0].ctr - 0.1).abs() < 1e-12);
    }

    #[test]
    fn lenient_mode_skips_and_counts() {
        let mut bad_ctr = raw("shoes", "/a", "2024-03-02", 1.0, 10.0, 3.0);
        bad_ctr.ctr = Some(1.5);
        let rows = vec![
            raw("shoes", "/a", "2024-03-01", 1.0, 10.0, 3.0),
            raw("shoes", "/a", "2024-03-03", -1.0, 10.0, 3.0),
            RawRow { query: None, ..raw("x", "/a", "2024-03-01", 1.0, 10.0, 3.0) },
            raw("shoes", "/a", "not-a-date", 1.0, 10.0, 3.0),
            raw("shoes", "/a", "2024-03-04", 1.0, 10.0, 0.5),
            bad_ctr,
        ];

        let out = normalize_all(&rows, false).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.skipped, 5);
    }

    #[test]
    fn strict_mode_aborts_with_row_index() {
        let rows = vec![
            raw("shoes", "/a", "2024-03-01", 1.0, 10.0, 3.0),
            raw("shoes", "/b", "2024-03-01", 1.0, -10.0, 3.0),
        ];
        match normalize_all(&rows, true) {
            Err(AnalysisError::Validation { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let rows = vec![
            raw("shoes", "/a", "2024-03-01", 1.0, 10.0, 3.0),
            raw("shoes", "/a", "2024-03-01", 9.0, 90.0, 7.0),
            raw("shoes", "/a", "2024-03-02", 2.0, 20.0, 3.0),
        ];
        let out = normalize_all(&rows, false).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.rows[0].clicks, 1);
    }

    fn on(device: &str, row: RawRow) -> RawRow {
        RawRow { device: Some(device.into()), ..row }
    }

    #[test]
    fn counts_beyond_u64_are_rejected() {
        let rows = vec![
            raw("shoes", "/a", "2024-03-01", 1.0, 1e20, 3.0),
            raw("shoes", "/a", "2024-03-02", 1.0, 10.0, 3.0),
        ];
        let out = normalize_all(&rows, false).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.skipped, 1);

        assert!(matches!(
            normalize_all(&rows, true),
            Err(AnalysisError::Validation { row: 0, .. })
        ));
    }

    #[test]
    fn folds_device_rows() {
        let rows = vec![
            on("MOBILE", raw("shoes", "/a", "2024-03-01", 10.0, 100.0, 2.0)),
            on("DESKTOP", raw("shoes", "/a", "2024-03-01", 5.0, 300.0, 6.0)),
            on("MOBILE", raw("shoes", "/a", "2024-03-01", 10.0, 100.0, 2.0)),
            on("TABLET", raw("boots", "/b", "2024-03-01", 1.0, 10.0, 9.0)),
        ];
        let out = normalize_all(&rows, true).unwrap();

        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.device_rows.len(), 3);

        let folded = &out.rows[0];
        assert_eq!(folded.device, None);
        assert_eq!(folded.clicks, 15);
        assert_eq!(folded.impressions, 400);
        assert!((folded.position - 5.0).abs() < 1e-9);
        assert!((folded.ctr - 15.0 / 400.0).abs() < 1e-9);

        assert_eq!(out.rows[1].device.as_deref(), Some("TABLET"));
    }

    #[test]
    fn malformed_device_row_is_not_folded_away() {
        let rows = vec![
            on("MOBILE", raw("shoes", "/a", "2024-03-01", -5.0, 100.0, 2.0)),
            on("DESKTOP", raw("shoes", "/a", "2024-03-01", 10.0, 300.0, 6.0)),
        ];
        assert!(matches!(
            normalize_all(&rows, true),
            Err(AnalysisError::Validation { row: 0, .. })
        ));

        let out = normalize_all(&rows, false).unwrap();
        assert_eq!(out.skipped, 1);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].clicks, 10);
        assert_eq!(out.rows[0].device.as_deref(), Some("DESKTOP"));
    }
}
