pub mod prompts;
pub mod providers;

use crate::model::{AuditInsights, AuditReport, InsightError, InsightSection};
use futures::future::join_all;
use prompts::{build_prompts, SYSTEM_PROMPT};
use providers::InsightProvider;
use tracing::{info, warn};

pub use providers::build_provider;

/// Turns a finished report into narrative sections through an LLM provider.
pub struct InsightGenerator {
    provider: Box<dyn InsightProvider>,
}

impl InsightGenerator {
    pub fn new(provider: Box<dyn InsightProvider>) -> Self {
        Self { provider }
    }

    /// Sends every prompt concurrently. A failed section is kept with its error
    /// so one bad response does not discard the rest.
    pub async fn generate(&self, report: &AuditReport) -> Result<AuditInsights, InsightError> {
        let prompts = build_prompts(report)?;
        info!("Requesting {} insight sections...", prompts.len());

        let results = join_all(
            prompts
                .iter()
                .map(|prompt| self.provider.complete(SYSTEM_PROMPT, &prompt.text)),
        )
        .await;

        let sections = prompts
            .into_iter()
            .zip(results)
            .map(|(prompt, result)| match result {
                Ok(text) => InsightSection {
                    name: prompt.name,
                    text: Some(text),
                    error: None,
                },
                Err(e) => {
                    warn!("Insight '{}' failed: {}", prompt.name, e);
                    InsightSection {
                        name: prompt.name,
                        text: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        Ok(AuditInsights { sections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::fixtures::{config, row};
    use crate::analyzer::{Analyzer, AuditAnalyzer};
    use crate::config::QualityConfig;
    use crate::model::{DeviceComparison, DeviceGap, RawRow};
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl InsightProvider for EchoProvider {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, InsightError> {
            if prompt.contains("ranking opportunities") {
                return Err(InsightError::Api { status: 429, body: "slow down".into() });
            }
            Ok(format!("{} chars", prompt.len()))
        }
    }

    fn report() -> AuditReport {
        let rows: Vec<RawRow> = vec![
            row("shoes", "/a", 1, 10, 100, 5.0),
            row("shoes", "/b", 1, 1, 40, 9.0),
            row("widgets", "/w", 2, 30, 300, 11.0),
            row("widgets", "/w", 9, 10, 300, 12.0),
        ]
        .into_iter()
        .map(RawRow::from)
        .collect();
        AuditAnalyzer::new().build_report(&rows, &config()).unwrap()
    }

    #[test]
    fn prompts_cover_each_finding_type() {
        let prompts = build_prompts(&report()).unwrap();
        let names: Vec<&str> = prompts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["executive_summary", "cannibalization:shoes", "opportunities", "decay", "action_plan"]
        );
        assert!(prompts[1].text.contains("\"primary_page\": \"/a\""));
        assert!(!prompts.iter().any(|p| p.text.contains("{data}")));
    }

    #[test]
    fn empty_report_asks_for_summary_and_plan() {
        let empty = AuditAnalyzer::new().build_report(&[], &config()).unwrap();
        let prompts = build_prompts(&empty).unwrap();
        let names: Vec<&str> = prompts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["executive_summary", "action_plan"]);
    }

    #[test]
    fn action_plan_carries_counts_and_trend() {
        let prompts = build_prompts(&report()).unwrap();
        let plan = prompts.iter().find(|p| p.name == "action_plan").unwrap();
        assert!(plan.text.contains("90-day action plan"));
        assert!(plan.text.contains("\"cannibalization\": 1"));
        assert!(plan.text.contains("\"performance\""));
    }

    #[test]
    fn quality_and_device_prompts_follow_their_sections() {
        let mut cfg = config();
        cfg.quality = Some(QualityConfig {
            low_ctr_min_impressions: 100,
            low_ctr_max_ctr: 0.05,
            zero_click_min_impressions: 10,
        });
        let mut with_quality = AuditAnalyzer::new().build_report(&[], &cfg).unwrap();
        with_quality.devices = Some(DeviceComparison {
            problematic_pages: vec![DeviceGap {
                page: "/a".into(),
                mobile_position: 12.0,
                desktop_position: 3.0,
                position_gap: 9.0,
                mobile_clicks: 2,
                desktop_clicks: 20,
            }],
            device_summary: Vec::new(),
        });

        let prompts = build_prompts(&with_quality).unwrap();
        let names: Vec<&str> = prompts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["executive_summary", "quality_signals", "device_gap", "action_plan"]);
        assert!(prompts[1].text.contains("\"quality_score\""));
        assert!(prompts[2].text.contains("\"position_gap\": 9.0"));
    }

    #[tokio::test]
    async fn failed_sections_keep_their_error() {
        let generator = InsightGenerator::new(Box::new(EchoProvider));
        let insights = generator.generate(&report()).await.unwrap();

        assert_eq!(insights.sections.len(), 5);
        let failed = insights
            .sections
            .iter()
            .find(|s| s.name == "opportunities")
            .unwrap();
        assert!(failed.text.is_none());
        assert!(failed.error.as_deref().unwrap().contains("429"));
        assert!(insights.sections[0].text.is_some());
    }
}
