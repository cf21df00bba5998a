use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::Parser;
use log::*;

use ads_insight_dashboard_lib::config_manager::{ConfigManager, DEFAULT_CONFIG_FILE};
use ads_insight_dashboard_lib::insight_engine::{format_count, format_percent, format_usd};
use ads_insight_dashboard_lib::{
    export_snapshot, Dashboard, DashboardFilter, DashboardSnapshot, ExportFormat, LoadingProgress, Platform,
    SystemClock,
};

/// Cross-channel ad performance report.
#[derive(Parser, Debug)]
#[command(name = "ads-report", version, about)]
struct Cli {
    /// INI configuration file; created with defaults if missing.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// First day in scope (YYYY-MM-DD).
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day in scope (YYYY-MM-DD).
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Platform to include; repeatable. Defaults to all platforms.
    #[arg(long = "platform")]
    platforms: Vec<Platform>,

    /// Campaign name to include; repeatable. Defaults to all campaigns.
    #[arg(long = "campaign")]
    campaigns: Vec<String>,

    /// Write every view and the insights to this directory.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    format: ExportFormat,
}

impl Cli {
    fn filter(&self) -> DashboardFilter {
        let mut filter = DashboardFilter::default().with_dates(self.start, self.end);
        if !self.platforms.is_empty() {
            filter = filter.with_platforms(self.platforms.iter().copied());
        }
        if !self.campaigns.is_empty() {
            filter = filter.with_campaigns(self.campaigns.iter().cloned());
        }
        filter
    }
}

fn opt_usd(value: Option<f64>) -> String {
    value.map(format_usd).unwrap_or_else(|| "-".to_string())
}

fn opt_percent(value: Option<f64>) -> String {
    value.map(|v| format_percent(v, 2)).unwrap_or_else(|| "-".to_string())
}

fn print_report(snapshot: &DashboardSnapshot) {
    let kpis = &snapshot.tables.overview;
    println!("== Overview ==");
    println!("  Spend            {}", format_usd(kpis.totals.spend));
    println!("  Impressions      {}", format_count(kpis.totals.impressions as f64));
    println!("  Clicks           {}", format_count(kpis.totals.clicks as f64));
    println!("  Conversions      {}", format_count(kpis.totals.conversions));
    println!("  CTR              {}", opt_percent(kpis.metrics.ctr));
    println!("  CPC              {}", opt_usd(kpis.metrics.cpc));
    println!("  CPA              {}", opt_usd(kpis.metrics.cpa));
    println!("  Conversion rate  {}", opt_percent(kpis.metrics.conversion_rate));
    println!("  CPM              {}", opt_usd(kpis.metrics.cpm));

    println!();
    println!("== Platforms ==");
    for p in &snapshot.tables.platforms {
        println!(
            "  {:<9} spend {:>12} ({:>6})  conversions {:>8} ({:>6})  CPA {:>9}  CTR {:>7}",
            p.platform.as_str(),
            format_usd(p.totals.spend),
            format_percent(p.spend_share, 1),
            format_count(p.totals.conversions),
            format_percent(p.conversion_share, 1),
            opt_usd(p.metrics.cpa),
            opt_percent(p.metrics.ctr)
        );
    }

    println!();
    println!("== Insights ==");
    for f in &snapshot.findings {
        println!("  [{}][{}] {}", f.category, f.severity, f.title);
        println!("      {}", f.detail);
    }

    println!();
    println!("== Recommendations ==");
    for rec in &snapshot.recommendations {
        println!("  - {}", rec);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let manager = ConfigManager::new(&cli.config)?;
    let config = &manager.config;
    let base_dir = manager.base_dir();

    let source = config.data_source(&base_dir);
    info!("Reading platform exports from {}", source.data_dir().display());

    let mut dashboard = Dashboard::with_clock(source, SystemClock::default(), &config.thresholds(), config.cache_ttl())
        .with_progress(Box::new(|p: &LoadingProgress| {
            if p.completed {
                debug!("[{}] {}", p.step, p.message);
            }
        }));

    let filter = cli.filter();
    let snapshot = dashboard
        .snapshot(&filter)
        .map_err(|e| anyhow!("Failed to build dashboard: {}", e))?;

    if snapshot.is_empty() {
        println!("No data for selected filters.");
        return Ok(());
    }

    print_report(&snapshot);

    let export_dir = cli
        .export_dir
        .clone()
        .or_else(|| config.export_dir().map(|dir| base_dir.join(dir)));
    if let Some(dir) = export_dir {
        let written = export_snapshot(&snapshot, &dir, cli.format)
            .map_err(|e| anyhow!("Failed to export to {}: {}", dir.display(), e))?;
        println!();
        println!("Exported {} files to {}", written.len(), dir.display());
    }

    Ok(())
}
