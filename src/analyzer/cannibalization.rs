use crate::analyzer::aggregate::{ensure_valid, expected_ctr, Totals};
use crate::model::{AnalysisError, CannibalizationGroup, PageRanking, PerformanceRow, Priority};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const HIGH_PRIORITY_IMPRESSIONS: u64 = 1000;

/// Finds queries for which at least `min_pages` distinct pages rank.
/// Groups are ordered by total impressions (descending), then query.
pub fn detect_cannibalization(
    rows: &[PerformanceRow],
    min_pages: usize,
) -> Result<Vec<CannibalizationGroup>, AnalysisError> {
    ensure_valid(rows)?;
    if min_pages < 2 {
        return Err(AnalysisError::Configuration(format!(
            "min_pages must be at least 2, got {}",
            min_pages
        )));
    }

    let mut by_query: BTreeMap<&str, (Totals, BTreeMap<&str, Totals>)> = BTreeMap::new();
    for row in rows {
        let (query_totals, pages) = by_query.entry(row.query.as_str()).or_default();
        query_totals.add(row);
        pages.entry(row.page.as_str()).or_default().add(row);
    }

    let mut groups: Vec<CannibalizationGroup> = by_query
        .into_iter()
        .filter(|(_, (_, pages))| pages.len() >= min_pages)
        .filter_map(|(query, (totals, pages))| build_group(query, &totals, &pages))
        .collect();

    groups.sort_by(|a, b| {
        b.total_impressions
            .cmp(&a.total_impressions)
            .then_with(|| a.query.cmp(&b.query))
    });
    Ok(groups)
}

fn build_group(
    query: &str,
    totals: &Totals,
    pages: &BTreeMap<&str, Totals>,
) -> Option<CannibalizationGroup> {
    let mut ranked: Vec<PageRanking> = pages
        .iter()
        .map(|(page, t)| PageRanking {
            page: page.to_string(),
            clicks: t.clicks,
            impressions: t.impressions,
            position: t.avg_position(),
            ctr: t.ctr(),
        })
        .collect();
    ranked.sort_by(primary_first);

    let primary_page = ranked.first()?.page.clone();
    let best_position = ranked
        .iter()
        .map(|p| p.position)
        .min_by(|a, b| a.total_cmp(b))?;

    let potential = totals.impressions as f64 * expected_ctr(best_position) - totals.clicks as f64;
    let priority = if totals.impressions > HIGH_PRIORITY_IMPRESSIONS {
        Priority::High
    } else {
        Priority::Medium
    };

    Some(CannibalizationGroup {
        query: query.to_string(),
        pages: ranked,
        primary_page,
        total_clicks: totals.clicks,
        total_impressions: totals.impressions,
        avg_position: totals.avg_position(),
        best_position,
        potential_additional_clicks: potential.max(0.0),
        priority,
    })
}

/// Highest impressions first; ties go to the better (lower) position, then the smaller URL.
fn primary_first(a: &PageRanking, b: &PageRanking) -> Ordering {
    b.impressions
        .cmp(&a.impressions)
        .then_with(|| a.position.total_cmp(&b.position))
        .then_with(|| a.page.cmp(&b.page))
}
