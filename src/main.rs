mod analyzer;
mod config;
mod insights;
mod model;
mod normalizer;
mod parser;
mod storage;

use analyzer::{Analyzer, AuditAnalyzer};
use config::{load_config, AppConfig};
use insights::{build_provider, InsightGenerator};
use model::{AuditReport, ChangeKind};
use parser::SearchAnalyticsParser;
use std::env;
use std::process;
use storage::SqliteStorage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "audit.json";
const RECENT_RUNS: usize = 5;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error: {}", e);
            process::exit(1);
        }
    };

    if let Err(code) = run(&config).await {
        process::exit(code);
    }
}

async fn run(config: &AppConfig) -> Result<(), i32> {
    let storage = SqliteStorage::new(&config.database_path).map_err(|e| {
        error!("Failed to initialize storage: {}", e);
        1
    })?;

    log_history(&storage, &config.site);

    info!("Parsing {}...", config.input);
    let parser = SearchAnalyticsParser::new(&config.dimensions).map_err(|e| {
        error!("Parser setup failed: {}", e);
        1
    })?;
    let rows = parser.parse_file(&config.input).map_err(|e| {
        error!("Parse error: {}", e);
        1
    })?;
    info!("Parsed {} rows", rows.len());

    let analyzer = AuditAnalyzer::new();
    let report = analyzer.build_report(&rows, &config.analysis).map_err(|e| {
        error!("Analysis failed: {}", e);
        1
    })?;
    log_report(&report);

    let run_id = storage.save_report(&config.site, &report).map_err(|e| {
        error!("Failed to save report: {}", e);
        1
    })?;
    info!("Saved audit run #{}", run_id);

    let Some(insights_cfg) = &config.insights else {
        info!("No insights provider configured, done.");
        return Ok(());
    };

    // Insight failures never invalidate the stored report.
    let provider = match build_provider(insights_cfg) {
        Ok(p) => p,
        Err(e) => {
            warn!("Insights skipped: {}", e);
            return Ok(());
        }
    };
    let generator = InsightGenerator::new(provider);
    match generator.generate(&report).await {
        Ok(insights) => {
            let failed = insights.sections.iter().filter(|s| s.error.is_some()).count();
            info!(
                "Generated {} insight sections ({} failed)",
                insights.sections.len(),
                failed
            );
            if let Err(e) = storage.save_insights(run_id, &insights) {
                warn!("Failed to save insights: {}", e);
            }
        }
        Err(e) => warn!("Insight generation failed: {}", e),
    }

    Ok(())
}

/// Logs the previous run for this site and the most recent runs overall.
fn log_history(storage: &SqliteStorage, site: &str) {
    match storage.last_run(site) {
        Ok(Some(prev)) => {
            info!(
                "Previous run #{} at {}: {} rows, {} cannibalized queries, {} opportunities, {} declines",
                prev.id,
                prev.created_at,
                prev.summary.analyzed_rows,
                prev.summary.cannibalization_groups,
                prev.summary.opportunities,
                prev.summary.declines
            );
            match storage.load_report(prev.id) {
                Ok(Some(report)) => info!(
                    "Previous windows: {} .. {} vs {} .. {}",
                    report.window_a.start, report.window_a.end, report.window_b.start, report.window_b.end
                ),
                Ok(None) => {}
                Err(e) => warn!("Could not load previous report: {}", e),
            }
        }
        Ok(None) => info!("No previous run for {}", site),
        Err(e) => warn!("Could not read previous run: {}", e),
    }

    match storage.list_runs(RECENT_RUNS) {
        Ok(runs) => {
            for run in runs {
                info!(
                    "  #{} {} {} quality={:?}",
                    run.id, run.site, run.created_at, run.quality_score
                );
            }
        }
        Err(e) => warn!("Could not list runs: {}", e),
    }
}

fn log_report(report: &AuditReport) {
    for warning in &report.warnings {
        warn!("Report warning: {:?}", warning);
    }

    info!(
        "Window A {} .. {} | Window B {} .. {}",
        report.window_a.start, report.window_a.end, report.window_b.start, report.window_b.end
    );

    for group in &report.cannibalization {
        info!(
            "Cannibalization: '{}' across {} pages, primary {} ({:?})",
            group.query,
            group.pages.len(),
            group.primary_page,
            group.priority
        );
    }

    for opp in report.opportunities.iter().take(10) {
        info!(
            "Opportunity: '{}' on {} at {:.1} ({} impressions, +{:.0} clicks)",
            opp.query, opp.page, opp.position, opp.impressions, opp.click_increase
        );
    }

    for snippet in &report.featured_snippets {
        info!(
            "Featured snippet candidate: '{}' at {:.1} ({} impressions)",
            snippet.query, snippet.position, snippet.impressions
        );
    }

    for win in &report.quick_wins {
        info!(
            "Quick win: {} CTR {:.2}% vs expected {:.2}% (+{:.0} clicks)",
            win.page,
            win.current_ctr * 100.0,
            win.expected_ctr * 100.0,
            win.potential_additional_clicks
        );
    }

    for alert in &report.decay {
        let change = match alert.percent_change {
            Some(pct) => format!("{:+.1}%", pct),
            None => "new".to_string(),
        };
        match alert.kind {
            ChangeKind::Decline | ChangeKind::Lost => warn!(
                "📉 {:?} {} {}: {} -> {} ({})",
                alert.dimension, alert.subject, alert.metric, alert.window_a_value, alert.window_b_value, change
            ),
            ChangeKind::Growth | ChangeKind::New => info!(
                "📈 {:?} {} {}: {} -> {} ({})",
                alert.dimension, alert.subject, alert.metric, alert.window_a_value, alert.window_b_value, change
            ),
        }
    }

    if let Some(quality) = &report.quality {
        info!(
            "Quality score {:.1} over {} pages ({} low CTR, {} zero click)",
            quality.quality_score,
            quality.pages_analyzed,
            quality.low_ctr_pages.len(),
            quality.zero_click_pages.len()
        );
    }

    if let Some(devices) = &report.devices {
        for total in &devices.device_summary {
            info!(
                "Device {}: {} clicks, {} impressions, avg position {:.1}",
                total.device, total.clicks, total.impressions, total.position
            );
        }
        for gap in &devices.problematic_pages {
            warn!(
                "📱 {} mobile {:.1} vs desktop {:.1} (gap {:+.1})",
                gap.page, gap.mobile_position, gap.desktop_position, gap.position_gap
            );
        }
    }

    info!(
        "Traffic trend: {:?} ({:+.1}%), volatility {:?}",
        report.trend.direction, report.trend.growth_rate_pct, report.trend.volatility
    );
}
