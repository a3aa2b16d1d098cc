// Prompt templates over the audit report
use crate::model::{AuditReport, CannibalizationGroup, ChangeKind, InsightError};
use serde::Serialize;
use serde_json::json;

pub const SYSTEM_PROMPT: &str = "You are an expert SEO analyst providing actionable insights \
based on Google Search Console data. Be specific, data-driven, and focus on business impact.";

const MAX_CANNIBALIZATION_PROMPTS: usize = 5;
const MAX_LISTED: usize = 10;

const EXECUTIVE_SUMMARY: &str = "Based on this Google Search Console audit data, provide a concise \
executive summary (3-4 paragraphs) that:
1. Summarizes the overall health and performance of the website
2. Highlights the most critical issues that need immediate attention
3. Identifies the biggest opportunities for growth
4. Provides a clear action priority

Data: {data}

Format the response in a professional, client-friendly manner with specific numbers and percentages.";

const CANNIBALIZATION: &str = "Analyze this keyword cannibalization data and provide specific, \
actionable recommendations:
{data}

Include:
1. The severity of the issue
2. Which page should be the primary target
3. Specific consolidation steps
4. Expected impact in terms of ranking improvement and traffic
5. Priority level and timeline";

const OPPORTUNITIES: &str = "Analyze these ranking opportunities:
{data}

Provide:
1. Quick wins vs long-term opportunities
2. Specific optimization tactics for each opportunity type
3. Resource requirements
4. Expected ROI and timeline
5. Priority order for implementation";

const QUALITY_SIGNALS: &str = "Analyze these content quality signals from Google Search Console:
{data}

Provide:
1. Specific patterns identified across the low-CTR and zero-click pages
2. Prioritized recommendations for improvement
3. Whether to improve or remove content
4. Expected impact on overall site quality";

const DEVICE_GAP: &str = "These pages rank very differently on mobile and desktop:
{data}

Provide:
1. Likely causes for each gap (mobile usability, page speed, content parity)
2. Specific fixes per page
3. Which device deserves priority given the traffic split";

const ACTION_PLAN: &str = "Create a detailed 90-day action plan based on this SEO audit data:

{data}

Structure the plan as:

Week 1-2 (Immediate Actions):
- List 3-5 high-impact, low-effort fixes
- Include specific pages/queries to target
- Estimate hours needed

Week 3-4 (Quick Wins):
- List optimization tasks that can show results quickly
- Focus on striking distance keywords and CTR improvements

Month 2 (Strategic Improvements):
- Content consolidation and cannibalization fixes
- Content quality enhancements

Month 3 (Growth Initiatives):
- New content opportunities
- Advanced optimizations

For each item, include:
- Specific action to take
- Expected impact (with numbers where possible)
- Resources needed
- Success metrics";

const DECAY: &str = "These pages and queries lost traffic between two equal periods:
{data}

Provide:
1. Likely causes for each decline
2. Whether to refresh, consolidate or retire the content
3. Priority order for recovery work";

/// A named prompt ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub name: String,
    pub text: String,
}

fn render(template: &str, data: &impl Serialize) -> Result<String, InsightError> {
    Ok(template.replace("{data}", &serde_json::to_string_pretty(data)?))
}

/// All prompts for one report: the executive summary, one per top
/// cannibalized query, one each for opportunities, declines, quality signals
/// and device gaps when present, and a closing action plan.
pub fn build_prompts(report: &AuditReport) -> Result<Vec<Prompt>, InsightError> {
    let mut prompts = vec![Prompt {
        name: "executive_summary".into(),
        text: render(EXECUTIVE_SUMMARY, &summary_data(report))?,
    }];

    for group in report.cannibalization.iter().take(MAX_CANNIBALIZATION_PROMPTS) {
        prompts.push(cannibalization_prompt(group)?);
    }

    if !report.opportunities.is_empty()
        || !report.featured_snippets.is_empty()
        || !report.quick_wins.is_empty()
    {
        let total_increase: f64 = report.opportunities.iter().map(|o| o.click_increase).sum();
        let data = json!({
            "striking_distance": report.opportunities.iter().take(MAX_LISTED).collect::<Vec<_>>(),
            "striking_distance_count": report.opportunities.len(),
            "total_potential_clicks": total_increase,
            "featured_snippet_opportunities": report.featured_snippets,
            "quick_wins": report.quick_wins,
        });
        prompts.push(Prompt {
            name: "opportunities".into(),
            text: render(OPPORTUNITIES, &data)?,
        });
    }

    let declines: Vec<_> = report
        .decay
        .iter()
        .filter(|a| matches!(a.kind, ChangeKind::Decline | ChangeKind::Lost))
        .take(MAX_LISTED)
        .collect();
    if !declines.is_empty() {
        let data = json!({
            "window_a": report.window_a,
            "window_b": report.window_b,
            "declines": declines,
        });
        prompts.push(Prompt {
            name: "decay".into(),
            text: render(DECAY, &data)?,
        });
    }

    if let Some(quality) = &report.quality {
        let data = json!({
            "pages_analyzed": quality.pages_analyzed,
            "quality_score": quality.quality_score,
            "declining_pages": quality.declining_pages,
            "low_ctr_pages": quality.low_ctr_pages.iter().take(MAX_LISTED).collect::<Vec<_>>(),
            "zero_click_pages": quality.zero_click_pages.iter().take(MAX_LISTED).collect::<Vec<_>>(),
        });
        prompts.push(Prompt {
            name: "quality_signals".into(),
            text: render(QUALITY_SIGNALS, &data)?,
        });
    }

    if let Some(devices) = report.devices.as_ref().filter(|d| !d.problematic_pages.is_empty()) {
        let data = json!({
            "pages": devices.problematic_pages.iter().take(MAX_CANNIBALIZATION_PROMPTS).collect::<Vec<_>>(),
            "summary": devices.device_summary,
        });
        prompts.push(Prompt {
            name: "device_gap".into(),
            text: render(DEVICE_GAP, &data)?,
        });
    }

    prompts.push(Prompt {
        name: "action_plan".into(),
        text: render(ACTION_PLAN, &action_plan_data(report))?,
    });

    Ok(prompts)
}

fn action_plan_data(report: &AuditReport) -> serde_json::Value {
    json!({
        "critical_issues": {
            "cannibalization": report.summary.cannibalization_groups,
            "declines": report.summary.declines,
            "device_gap_pages": report.summary.device_gap_pages,
            "quality": report.quality.as_ref().map(|q| json!({
                "quality_score": q.quality_score,
                "low_ctr_pages": q.low_ctr_pages.len(),
                "zero_click_pages": q.zero_click_pages.len(),
                "declining_pages": q.declining_pages,
            })),
        },
        "opportunities": {
            "striking_distance": report.summary.opportunities,
            "featured_snippets": report.summary.featured_snippets,
            "quick_wins": report.summary.quick_wins,
        },
        "performance": report.trend,
    })
}

fn cannibalization_prompt(group: &CannibalizationGroup) -> Result<Prompt, InsightError> {
    Ok(Prompt {
        name: format!("cannibalization:{}", group.query),
        text: render(CANNIBALIZATION, group)?,
    })
}

fn summary_data(report: &AuditReport) -> serde_json::Value {
    json!({
        "summary": report.summary,
        "trend": report.trend,
        "quality_score": report.quality.as_ref().map(|q| q.quality_score),
        "window_a": report.window_a,
        "window_b": report.window_b,
        "top_cannibalized_queries": report
            .cannibalization
            .iter()
            .take(MAX_CANNIBALIZATION_PROMPTS)
            .map(|g| &g.query)
            .collect::<Vec<_>>(),
    })
}
