use crate::analyzer::cannibalization::detect_cannibalization;
use crate::analyzer::decay::detect_decay;
use crate::analyzer::devices::compare_devices;
use crate::analyzer::opportunities::{detect_featured_snippets, detect_opportunities, detect_quick_wins};
use crate::analyzer::quality::analyze_quality;
use crate::analyzer::trends::traffic_trend;
use crate::config::AnalysisConfig;
use crate::model::{
    AnalysisError, AuditReport, AuditSummary, AuditWarning, ChangeKind, GroupKey, RawRow,
};
use crate::normalizer::normalize_all;
use tracing::{info, warn};

/// Trait defining the interface for an audit analyzer.
pub trait Analyzer {
    fn build_report(&self, rows: &[RawRow], config: &AnalysisConfig) -> Result<AuditReport, AnalysisError>;
}

/// Runs every detection over one batch of rows. Holds no state, so one
/// instance can serve any number of independent runs.
#[derive(Debug, Default)]
pub struct AuditAnalyzer;

impl AuditAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for AuditAnalyzer {
    fn build_report(&self, rows: &[RawRow], config: &AnalysisConfig) -> Result<AuditReport, AnalysisError> {
        config.validate()?;

        let normalized = normalize_all(rows, config.strict)?;
        let valid = &normalized.rows;

        let mut warnings = Vec::new();
        if valid.is_empty() {
            warn!("No analyzable rows in input ({} supplied)", rows.len());
            warnings.push(AuditWarning::EmptyInput);
        }

        let (window_a, window_b) = config.windows()?;

        let cannibalization = detect_cannibalization(valid, config.cannibalization_min_pages)?;
        let opportunities = detect_opportunities(
            valid,
            config.striking_distance_low,
            config.striking_distance_high,
            config.striking_distance_min_impressions,
        )?;
        let featured_snippets = detect_featured_snippets(valid)?;

        let mut decay = Vec::new();
        for group_by in [GroupKey::Page, GroupKey::Query] {
            decay.extend(detect_decay(
                valid,
                window_a,
                window_b,
                config.decay_metric,
                config.decay_threshold_pct,
                group_by,
            )?);
        }

        let declining_pages = decay
            .iter()
            .filter(|a| a.dimension == GroupKey::Page)
            .filter(|a| matches!(a.kind, ChangeKind::Decline | ChangeKind::Lost))
            .count();
        let quality = config
            .quality
            .as_ref()
            .map(|q| analyze_quality(valid, q, declining_pages));
        let quick_wins = quality
            .as_ref()
            .map(|q| detect_quick_wins(&q.low_ctr_pages))
            .unwrap_or_default();

        let devices = if normalized.device_rows.is_empty() {
            None
        } else {
            Some(compare_devices(&normalized.device_rows, config.device_gap_threshold)?)
        };

        let trend = traffic_trend(valid, &window_a, &window_b);

        let summary = AuditSummary {
            total_rows: rows.len(),
            analyzed_rows: valid.len(),
            skipped_rows: normalized.skipped,
            duplicate_rows: normalized.duplicates,
            cannibalization_groups: cannibalization.len(),
            opportunities: opportunities.len(),
            decay_alerts: decay.len(),
            declines: decay
                .iter()
                .filter(|a| matches!(a.kind, ChangeKind::Decline | ChangeKind::Lost))
                .count(),
            growths: decay
                .iter()
                .filter(|a| matches!(a.kind, ChangeKind::Growth | ChangeKind::New))
                .count(),
            low_ctr_pages: quality.as_ref().map_or(0, |q| q.low_ctr_pages.len()),
            zero_click_pages: quality.as_ref().map_or(0, |q| q.zero_click_pages.len()),
            featured_snippets: featured_snippets.len(),
            quick_wins: quick_wins.len(),
            device_gap_pages: devices.as_ref().map_or(0, |d| d.problematic_pages.len()),
        };

        info!(
            "Analyzed {} rows ({} skipped, {} duplicates): {} cannibalized queries, {} opportunities, {} decay alerts",
            summary.analyzed_rows,
            summary.skipped_rows,
            summary.duplicate_rows,
            summary.cannibalization_groups,
            summary.opportunities,
            summary.decay_alerts
        );

        Ok(AuditReport {
            window_a,
            window_b,
            cannibalization,
            opportunities,
            featured_snippets,
            quick_wins,
            decay,
            quality,
            devices,
            trend,
            summary,
            warnings,
        })
    }
}
