use crate::model::{AnalysisError, PerformanceRow};

/// Running totals for one grouping key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub clicks: u64,
    pub impressions: u64,
    weighted_position: f64,
    position_sum: f64,
    rows: usize,
}

impl Totals {
    pub fn add(&mut self, row: &PerformanceRow) {
        self.clicks = self.clicks.saturating_add(row.clicks);
        self.impressions = self.impressions.saturating_add(row.impressions);
        self.weighted_position += row.position * row.impressions as f64;
        self.position_sum += row.position;
        self.rows += 1;
    }

    /// Impression-weighted average position; plain mean when nothing was shown.
    pub fn avg_position(&self) -> f64 {
        if self.impressions > 0 {
            self.weighted_position / self.impressions as f64
        } else if self.rows > 0 {
            self.position_sum / self.rows as f64
        } else {
            0.0
        }
    }

    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            return 0.0;
        }
        self.clicks as f64 / self.impressions as f64
    }
}

pub fn ensure_valid(rows: &[PerformanceRow]) -> Result<(), AnalysisError> {
    for (index, row) in rows.iter().enumerate() {
        row.validate()
            .map_err(|reason| AnalysisError::Validation { row: index, reason })?;
    }
    Ok(())
}

/// Rough organic CTR expected at a given average position. Fractional
/// positions round down to the bucket they sit in.
pub fn expected_ctr(position: f64) -> f64 {
    if position <= 10.0 {
        match position as u32 {
            0 | 1 => 0.28,
            2 => 0.15,
            3 => 0.11,
            4 => 0.08,
            5 => 0.07,
            6 => 0.05,
            7 => 0.04,
            _ => 0.03,
        }
    } else if position <= 20.0 {
        0.01
    } else {
        0.005
    }
}
