// Core structs: PerformanceRow, findings, AuditReport
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One search-analytics row as delivered by the collector, before validation.
/// Every field is optional because upstream exports are occasionally inconsistent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub query: Option<String>,
    pub page: Option<String>,
    pub date: Option<String>,
    pub device: Option<String>,
    pub clicks: Option<f64>,
    pub impressions: Option<f64>,
    pub ctr: Option<f64>,
    pub position: Option<f64>,
}

/// A validated performance row for one (query, page, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub query: String,
    pub page: String,
    pub date: NaiveDate,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
    pub device: Option<String>,
}

impl PerformanceRow {
    pub fn new(
        query: &str,
        page: &str,
        date: NaiveDate,
        clicks: u64,
        impressions: u64,
        position: f64,
    ) -> Self {
        let ctr = if impressions > 0 {
            clicks as f64 / impressions as f64
        } else {
            0.0
        };
        Self {
            query: query.to_string(),
            page: page.to_string(),
            date,
            clicks,
            impressions,
            ctr,
            position,
            device: None,
        }
    }

    /// Checks the invariants the type alone cannot carry.
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("empty query".into());
        }
        if self.page.trim().is_empty() {
            return Err("empty page".into());
        }
        if !self.ctr.is_finite() || !(0.0..=1.0).contains(&self.ctr) {
            return Err(format!("ctr {} outside [0, 1]", self.ctr));
        }
        if !self.position.is_finite() || self.position < 1.0 {
            return Err(format!("position {} below 1", self.position));
        }
        if self.clicks > self.impressions {
            return Err(format!(
                "clicks {} exceed impressions {}",
                self.clicks, self.impressions
            ));
        }
        Ok(())
    }
}

impl From<PerformanceRow> for RawRow {
    fn from(row: PerformanceRow) -> Self {
        RawRow {
            query: Some(row.query),
            page: Some(row.page),
            date: Some(row.date.format("%Y-%m-%d").to_string()),
            device: row.device,
            clicks: Some(row.clicks as f64),
            impressions: Some(row.impressions as f64),
            ctr: Some(row.ctr),
            position: Some(row.position),
        }
    }
}

/// Half-open date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window of `days` days ending right before `boundary`, or `None` when
    /// the start falls outside the representable date range.
    pub fn before(boundary: NaiveDate, days: u32) -> Option<Self> {
        let start = boundary.checked_sub_days(Days::new(days as u64))?;
        Some(Self::new(start, boundary))
    }

    /// Window of `days` days starting at `boundary`, or `None` on overflow.
    pub fn starting_at(boundary: NaiveDate, days: u32) -> Option<Self> {
        let end = boundary.checked_add_days(Days::new(days as u64))?;
        Some(Self::new(boundary, end))
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn overlaps(&self, other: &DateWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Clicks,
    Impressions,
    Ctr,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Clicks => "clicks",
            Metric::Impressions => "impressions",
            Metric::Ctr => "ctr",
        };
        f.write_str(name)
    }
}

/// Dimension a finding is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    Query,
    Page,
}

impl GroupKey {
    pub fn key_of<'a>(&self, row: &'a PerformanceRow) -> &'a str {
        match self {
            GroupKey::Query => row.query.as_str(),
            GroupKey::Page => row.page.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

/// One page competing for a query, aggregated over the analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRanking {
    pub page: String,
    pub clicks: u64,
    pub impressions: u64,
    pub position: f64,
    pub ctr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannibalizationGroup {
    pub query: String,
    /// Ordered so that `pages[0]` is the primary page.
    pub pages: Vec<PageRanking>,
    pub primary_page: String,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub avg_position: f64,
    pub best_position: f64,
    pub potential_additional_clicks: f64,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityKeyword {
    pub query: String,
    pub page: String,
    pub position: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub potential_clicks: f64,
    pub click_increase: f64,
}

/// Question-style query close enough to the top to compete for a featured snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturedSnippetOpportunity {
    pub query: String,
    pub position: f64,
    pub impressions: u64,
    pub clicks: u64,
}

/// Title/meta rewrite candidate: a low-CTR page clicked less than its position predicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickWin {
    pub page: String,
    pub current_ctr: f64,
    pub expected_ctr: f64,
    pub impressions: u64,
    pub potential_additional_clicks: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Decline,
    Growth,
    /// Nothing in window A, something in window B.
    New,
    /// Something in window A, nothing in window B.
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayAlert {
    pub dimension: GroupKey,
    pub subject: String,
    pub metric: Metric,
    pub window_a_value: f64,
    pub window_b_value: f64,
    /// `None` when window A is zero and the change is classified as `New`.
    pub percent_change: Option<f64>,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowCtrPage {
    pub page: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroClickPage {
    pub page: String,
    pub impressions: u64,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub pages_analyzed: usize,
    pub low_ctr_pages: Vec<LowCtrPage>,
    pub zero_click_pages: Vec<ZeroClickPage>,
    pub declining_pages: usize,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Growing,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficTrend {
    pub direction: TrendDirection,
    pub growth_rate_pct: f64,
    pub volatility: Volatility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTotals {
    pub device: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

/// A page ranking noticeably differently on mobile and desktop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceGap {
    pub page: String,
    pub mobile_position: f64,
    pub desktop_position: f64,
    /// Mobile minus desktop; positive means mobile ranks worse.
    pub position_gap: f64,
    pub mobile_clicks: u64,
    pub desktop_clicks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceComparison {
    pub problematic_pages: Vec<DeviceGap>,
    pub device_summary: Vec<DeviceTotals>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_rows: usize,
    pub analyzed_rows: usize,
    pub skipped_rows: usize,
    pub duplicate_rows: usize,
    pub cannibalization_groups: usize,
    pub opportunities: usize,
    pub decay_alerts: usize,
    pub declines: usize,
    pub growths: usize,
    pub low_ctr_pages: usize,
    pub zero_click_pages: usize,
    #[serde(default)]
    pub featured_snippets: usize,
    #[serde(default)]
    pub quick_wins: usize,
    #[serde(default)]
    pub device_gap_pages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditWarning {
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub window_a: DateWindow,
    pub window_b: DateWindow,
    pub cannibalization: Vec<CannibalizationGroup>,
    pub opportunities: Vec<OpportunityKeyword>,
    // Reports stored before these sections existed deserialize with them empty.
    #[serde(default)]
    pub featured_snippets: Vec<FeaturedSnippetOpportunity>,
    #[serde(default)]
    pub quick_wins: Vec<QuickWin>,
    pub decay: Vec<DecayAlert>,
    pub quality: Option<QualityReport>,
    /// Present only when the input was split by device.
    #[serde(default)]
    pub devices: Option<DeviceComparison>,
    pub trend: TrafficTrend,
    pub summary: AuditSummary,
    pub warnings: Vec<AuditWarning>,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid row {row}: {reason}")]
    Validation { row: usize, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("malformed search analytics body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported dimension: {0}")]
    UnsupportedDimension(String),
    #[error("required dimension missing: {0}")]
    MissingDimension(&'static str),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider responded [{status}]: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected provider response: {0}")]
    UnexpectedResponse(String),
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("prompt serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Narrative output for one prompt. Exactly one of `text` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightSection {
    pub name: String,
    pub text: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditInsights {
    pub sections: Vec<InsightSection>,
}
