use crate::model::{AnalysisError, DateWindow, Metric};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

/// Thresholds for the pattern analyzer. Every field except `strict` and
/// `quality` must be present in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    pub cannibalization_min_pages: usize,
    pub striking_distance_low: f64,
    pub striking_distance_high: f64,
    pub striking_distance_min_impressions: u64,
    pub decay_threshold_pct: f64,
    pub decay_window_days: u32,
    /// First day of the recent window; the analyzer never infers "today".
    pub decay_window_boundary: NaiveDate,
    pub decay_metric: Metric,
    /// Abort on the first malformed row instead of skipping it.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub quality: Option<QualityConfig>,
    /// Mobile/desktop position difference that flags a page.
    #[serde(default = "default_device_gap_threshold")]
    pub device_gap_threshold: f64,
}

fn default_device_gap_threshold() -> f64 {
    5.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QualityConfig {
    pub low_ctr_min_impressions: u64,
    pub low_ctr_max_ctr: f64,
    pub zero_click_min_impressions: u64,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.cannibalization_min_pages < 2 {
            return Err(AnalysisError::Configuration(format!(
                "cannibalization_min_pages must be at least 2, got {}",
                self.cannibalization_min_pages
            )));
        }
        if !self.striking_distance_low.is_finite()
            || !self.striking_distance_high.is_finite()
            || self.striking_distance_low < 1.0
            || self.striking_distance_high < self.striking_distance_low
        {
            return Err(AnalysisError::Configuration(format!(
                "striking distance band [{}, {}] is invalid",
                self.striking_distance_low, self.striking_distance_high
            )));
        }
        if !self.decay_threshold_pct.is_finite() || self.decay_threshold_pct <= 0.0 {
            return Err(AnalysisError::Configuration(format!(
                "decay_threshold_pct must be positive, got {}",
                self.decay_threshold_pct
            )));
        }
        if self.decay_window_days == 0 {
            return Err(AnalysisError::Configuration(
                "decay_window_days must be at least 1".into(),
            ));
        }
        self.windows()?;
        if !self.device_gap_threshold.is_finite() || self.device_gap_threshold <= 0.0 {
            return Err(AnalysisError::Configuration(format!(
                "device_gap_threshold must be positive, got {}",
                self.device_gap_threshold
            )));
        }
        if let Some(quality) = &self.quality {
            if !(0.0..=1.0).contains(&quality.low_ctr_max_ctr) {
                return Err(AnalysisError::Configuration(format!(
                    "low_ctr_max_ctr {} outside [0, 1]",
                    quality.low_ctr_max_ctr
                )));
            }
        }
        Ok(())
    }

    /// The baseline and recent decay windows on either side of the boundary.
    pub fn windows(&self) -> Result<(DateWindow, DateWindow), AnalysisError> {
        let boundary = self.decay_window_boundary;
        let days = self.decay_window_days;
        match (DateWindow::before(boundary, days), DateWindow::starting_at(boundary, days)) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(AnalysisError::Configuration(format!(
                "decay windows of {} days around {} fall outside the supported date range",
                days, boundary
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsightsConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub site: String,
    /// Saved body of a `searchanalytics.query` response.
    pub input: String,
    pub dimensions: Vec<String>,
    pub database_path: String,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub insights: Option<InsightsConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] AnalysisError),
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.analysis.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "site": "sc-domain:example.com",
        "input": "rows.json",
        "dimensions": ["query", "page", "date"],
        "database_path": "audit.db",
        "analysis": {
            "cannibalization_min_pages": 2,
            "striking_distance_low": 8,
            "striking_distance_high": 20,
            "striking_distance_min_impressions": 100,
            "decay_threshold_pct": 30,
            "decay_window_days": 28,
            "decay_window_boundary": "2024-03-01",
            "decay_metric": "clicks"
        }
    }"#;

    fn sample_analysis() -> AnalysisConfig {
        AnalysisConfig {
            cannibalization_min_pages: 2,
            striking_distance_low: 8.0,
            striking_distance_high: 20.0,
            striking_distance_min_impressions: 100,
            decay_threshold_pct: 30.0,
            decay_window_days: 7,
            decay_window_boundary: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            decay_metric: Metric::Clicks,
            strict: false,
            quality: None,
            device_gap_threshold: 5.0,
        }
    }

    #[test]
    fn loads_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.site, "sc-domain:example.com");
        assert_eq!(config.analysis.decay_window_days, 28);
        assert_eq!(config.analysis.decay_metric, Metric::Clicks);
        assert!(!config.analysis.strict);
        assert!(config.analysis.quality.is_none());
        assert!(config.insights.is_none());
    }

    #[test]
    fn missing_threshold_is_rejected() {
        let broken = SAMPLE.replace("\"decay_threshold_pct\": 30,", "");
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(broken.as_bytes()).unwrap();

        let err = load_config(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn out_of_range_thresholds_are_configuration_errors() {
        let mut cfg = sample_analysis();
        cfg.cannibalization_min_pages = 1;
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let mut cfg = sample_analysis();
        cfg.striking_distance_high = 5.0;
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let mut cfg = sample_analysis();
        cfg.decay_window_days = 0;
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let mut cfg = sample_analysis();
        cfg.quality = Some(QualityConfig {
            low_ctr_min_impressions: 500,
            low_ctr_max_ctr: 2.0,
            zero_click_min_impressions: 100,
        });
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let mut cfg = sample_analysis();
        cfg.device_gap_threshold = 0.0;
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        assert!(sample_analysis().validate().is_ok());
    }

    #[test]
    fn windows_beyond_the_calendar_are_configuration_errors() {
        let mut cfg = sample_analysis();
        cfg.decay_window_days = 200_000_000;
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let mut cfg = sample_analysis();
        cfg.decay_window_boundary = NaiveDate::MAX;
        assert!(matches!(cfg.windows(), Err(AnalysisError::Configuration(_))));

        let (a, b) = sample_analysis().windows().unwrap();
        assert_eq!(a.end, b.start);
        assert_eq!(a.days(), 7);
        assert_eq!(b.days(), 7);
    }

    #[test]
    fn device_gap_threshold_defaults_to_five() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.analysis.device_gap_threshold, 5.0);
    }
}
