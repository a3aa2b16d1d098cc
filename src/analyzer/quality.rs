use crate::analyzer::aggregate::Totals;
use crate::config::QualityConfig;
use crate::model::{LowCtrPage, PerformanceRow, QualityReport, ZeroClickPage};
use std::collections::BTreeMap;

/// Page-level content quality signals: pages that are seen but rarely or
/// never clicked. `declining_pages` comes from the page decay pass.
pub fn analyze_quality(
    rows: &[PerformanceRow],
    cfg: &QualityConfig,
    declining_pages: usize,
) -> QualityReport {
    let mut pages: BTreeMap<&str, Totals> = BTreeMap::new();
    for row in rows {
        pages.entry(row.page.as_str()).or_default().add(row);
    }

    let mut low_ctr_pages: Vec<LowCtrPage> = pages
        .iter()
        .filter(|(_, t)| t.impressions >= cfg.low_ctr_min_impressions && t.ctr() <= cfg.low_ctr_max_ctr)
        .map(|(page, t)| LowCtrPage {
            page: page.to_string(),
            clicks: t.clicks,
            impressions: t.impressions,
            ctr: t.ctr(),
            position: t.avg_position(),
        })
        .collect();
    low_ctr_pages.sort_by(|a, b| b.impressions.cmp(&a.impressions).then_with(|| a.page.cmp(&b.page)));

    let mut zero_click_pages: Vec<ZeroClickPage> = pages
        .iter()
        .filter(|(_, t)| t.impressions > cfg.zero_click_min_impressions && t.clicks == 0)
        .map(|(page, t)| ZeroClickPage {
            page: page.to_string(),
            impressions: t.impressions,
            position: t.avg_position(),
        })
        .collect();
    zero_click_pages.sort_by(|a, b| b.impressions.cmp(&a.impressions).then_with(|| a.page.cmp(&b.page)));

    let pages_analyzed = pages.len();
    let quality_score = quality_score(
        pages_analyzed,
        low_ctr_pages.len(),
        zero_click_pages.len(),
        declining_pages,
    );

    QualityReport {
        pages_analyzed,
        low_ctr_pages,
        zero_click_pages,
        declining_pages,
        quality_score,
    }
}

/// 100 minus capped deductions per issue ratio, floored at 0.
fn quality_score(total: usize, low_ctr: usize, zero_click: usize, declining: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let mut score = 100.0;
    score -= (low_ctr as f64 / total * 100.0).min(20.0);
    score -= (zero_click as f64 / total * 50.0).min(15.0);
    score -= (declining as f64 / total * 50.0).min(15.0);
    f64::max(score, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::fixtures::row;

    fn cfg() -> QualityConfig {
        QualityConfig {
            low_ctr_min_impressions: 500,
            low_ctr_max_ctr: 0.02,
            zero_click_min_impressions: 100,
        }
    }

    #[test]
    fn flags_low_ctr_and_zero_click_pages() {
        let rows = vec![
            row("a", "/low", 0, 5, 400, 6.0),
            row("b", "/low", 1, 4, 400, 8.0),
            row("c", "/zero", 0, 0, 150, 30.0),
            row("d", "/fine", 0, 90, 600, 2.0),
            row("e", "/quiet", 0, 0, 80, 40.0),
        ];
        let report = analyze_quality(&rows, &cfg(), 0);
        assert_eq!(report.pages_analyzed, 4);
        assert_eq!(report.low_ctr_pages.len(), 1);
        assert_eq!(report.low_ctr_pages[0].page, "/low");
        assert_eq!(report.low_ctr_pages[0].impressions, 800);
        assert_eq!(report.zero_click_pages.len(), 1);
        assert_eq!(report.zero_click_pages[0].page, "/zero");
        // 100 - 25 (capped 20) - 12.5 = 67.5
        assert!((report.quality_score - 67.5).abs() < 1e-9);
    }

    #[test]
    fn score_stays_within_bounds() {
        assert_eq!(quality_score(0, 0, 0, 0), 0.0);
        assert_eq!(quality_score(10, 0, 0, 0), 100.0);
        assert_eq!(quality_score(1, 1, 1, 1), 50.0);
    }
}
