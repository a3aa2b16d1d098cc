use crate::analyzer::aggregate::{ensure_valid, expected_ctr, Totals};
use crate::model::{
    AnalysisError, FeaturedSnippetOpportunity, LowCtrPage, OpportunityKeyword, PerformanceRow,
    QuickWin,
};
use std::collections::BTreeMap;

/// Position the potential click estimate assumes a striking-distance keyword can reach.
const TARGET_POSITION: f64 = 7.0;

const QUESTION_WORDS: [&str; 9] = ["what", "how", "why", "when", "where", "who", "is", "can", "does"];
const SNIPPET_POSITION_LOW: f64 = 2.0;
const SNIPPET_POSITION_HIGH: f64 = 10.0;
const SNIPPET_MIN_IMPRESSIONS: u64 = 50;
const SNIPPET_LIMIT: usize = 10;
const QUICK_WIN_LIMIT: usize = 10;

/// Striking-distance keywords: (query, page) pairs whose average position over
/// the window lies in `[position_low, position_high]` with at least
/// `min_impressions` impressions. Ordered by impressions (descending), then
/// position (ascending).
pub fn detect_opportunities(
    rows: &[PerformanceRow],
    position_low: f64,
    position_high: f64,
    min_impressions: u64,
) -> Result<Vec<OpportunityKeyword>, AnalysisError> {
    ensure_valid(rows)?;
    if !position_low.is_finite() || !position_high.is_finite() || position_low > position_high {
        return Err(AnalysisError::Configuration(format!(
            "position band [{}, {}] is invalid",
            position_low, position_high
        )));
    }

    let mut pairs: BTreeMap<(&str, &str), Totals> = BTreeMap::new();
    for row in rows {
        pairs
            .entry((row.query.as_str(), row.page.as_str()))
            .or_default()
            .add(row);
    }

    let target_ctr = expected_ctr(TARGET_POSITION);
    let mut opportunities: Vec<OpportunityKeyword> = pairs
        .into_iter()
        .filter_map(|((query, page), totals)| {
            let position = totals.avg_position();
            if position < position_low || position > position_high {
                return None;
            }
            if totals.impressions < min_impressions {
                return None;
            }
            let potential_clicks = totals.impressions as f64 * target_ctr;
            Some(OpportunityKeyword {
                query: query.to_string(),
                page: page.to_string(),
                position,
                impressions: totals.impressions,
                clicks: totals.clicks,
                potential_clicks,
                click_increase: potential_clicks - totals.clicks as f64,
            })
        })
        .collect();

    opportunities.sort_by(|a, b| {
        b.impressions
            .cmp(&a.impressions)
            .then_with(|| a.position.total_cmp(&b.position))
            .then_with(|| a.query.cmp(&b.query))
            .then_with(|| a.page.cmp(&b.page))
    });
    Ok(opportunities)
}

/// Question queries ranking on page one below the top spot, where a featured
/// snippet is within reach. Aggregated per query; top ten by impressions.
pub fn detect_featured_snippets(
    rows: &[PerformanceRow],
) -> Result<Vec<FeaturedSnippetOpportunity>, AnalysisError> {
    ensure_valid(rows)?;

    let mut queries: BTreeMap<&str, Totals> = BTreeMap::new();
    for row in rows.iter().filter(|r| is_question(&r.query)) {
        queries.entry(row.query.as_str()).or_default().add(row);
    }

    let mut found: Vec<FeaturedSnippetOpportunity> = queries
        .into_iter()
        .filter(|(_, t)| t.impressions > SNIPPET_MIN_IMPRESSIONS)
        .map(|(query, t)| FeaturedSnippetOpportunity {
            query: query.to_string(),
            position: t.avg_position(),
            impressions: t.impressions,
            clicks: t.clicks,
        })
        .filter(|o| (SNIPPET_POSITION_LOW..=SNIPPET_POSITION_HIGH).contains(&o.position))
        .collect();

    found.sort_by(|a, b| {
        b.impressions
            .cmp(&a.impressions)
            .then_with(|| a.position.total_cmp(&b.position))
            .then_with(|| a.query.cmp(&b.query))
    });
    found.truncate(SNIPPET_LIMIT);
    Ok(found)
}

fn is_question(query: &str) -> bool {
    query
        .split_whitespace()
        .next()
        .map(|word| QUESTION_WORDS.contains(&word.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Title/meta rewrite candidates among low-CTR pages: the clicks a page would
/// gain by reaching the CTR its position normally earns. Pages already at or
/// above that CTR are left out.
pub fn detect_quick_wins(low_ctr_pages: &[LowCtrPage]) -> Vec<QuickWin> {
    let mut wins: Vec<QuickWin> = low_ctr_pages
        .iter()
        .filter_map(|page| {
            let expected = expected_ctr(page.position);
            let gap = expected - page.ctr;
            if gap <= 0.0 {
                return None;
            }
            Some(QuickWin {
                page: page.page.clone(),
                current_ctr: page.ctr,
                expected_ctr: expected,
                impressions: page.impressions,
                potential_additional_clicks: page.impressions as f64 * gap,
            })
        })
        .collect();

    wins.sort_by(|a, b| {
        b.potential_additional_clicks
            .total_cmp(&a.potential_additional_clicks)
            .then_with(|| a.page.cmp(&b.page))
    });
    wins.truncate(QUICK_WIN_LIMIT);
    wins
}
