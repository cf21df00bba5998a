use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::*;
use polars::prelude::*;
use serde::Serialize;

use crate::ad_data_analyzer::{
    CampaignPerformanceRow, DailyPlatformRow, PlatformSummaryRow, SearchQualityRow, VideoFunnelRow,
    WeeklyPlatformRow, FUNNEL_PLATFORM, QUALITY_PLATFORM,
};
use crate::dashboard::DashboardSnapshot;
use crate::dashboard_filter::DashboardFilter;
use crate::error::Result;
use crate::insight_engine::Finding;
use crate::metric_calculator::{round_currency, round_rate, round_to};
use crate::platform::Platform;
use crate::schema_normalizer::UnifiedRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    /// Newline-delimited JSON, one object per row.
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

fn date_strings(dates: impl Iterator<Item = NaiveDate>) -> Vec<String> {
    dates.map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

fn platform_names<'a, T: 'a>(rows: &'a [T], platform: impl Fn(&T) -> Platform) -> Vec<&'static str> {
    rows.iter().map(|r| platform(r).as_str()).collect()
}

fn with_platform_column(mut df: DataFrame, platform: Platform) -> Result<DataFrame> {
    if df.height() == 0 {
        df.with_column(Series::new("platform", Vec::<String>::new()))?;
        return Ok(df);
    }
    Ok(df.lazy().with_column(lit(platform.as_str()).alias("platform")).collect()?)
}

pub fn unified_frame(rows: &[UnifiedRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("platform", platform_names(rows, |r| r.platform)),
        Series::new("date", date_strings(rows.iter().map(|r| r.date))),
        Series::new("campaign_id", rows.iter().map(|r| r.campaign_id.clone()).collect::<Vec<_>>()),
        Series::new("campaign_name", rows.iter().map(|r| r.campaign_name.clone()).collect::<Vec<_>>()),
        Series::new("ad_group_id", rows.iter().map(|r| r.ad_group_id.clone()).collect::<Vec<_>>()),
        Series::new("ad_group_name", rows.iter().map(|r| r.ad_group_name.clone()).collect::<Vec<_>>()),
        Series::new("impressions", rows.iter().map(|r| r.impressions).collect::<Vec<_>>()),
        Series::new("clicks", rows.iter().map(|r| r.clicks).collect::<Vec<_>>()),
        Series::new("spend", rows.iter().map(|r| r.spend).collect::<Vec<_>>()),
        Series::new("conversions", rows.iter().map(|r| r.conversions).collect::<Vec<_>>()),
        Series::new("video_views", rows.iter().map(|r| r.video_views).collect::<Vec<_>>()),
        Series::new("engagement_rate", rows.iter().map(|r| r.engagement_rate).collect::<Vec<_>>()),
        Series::new("reach", rows.iter().map(|r| r.reach).collect::<Vec<_>>()),
        Series::new("frequency", rows.iter().map(|r| r.frequency).collect::<Vec<_>>()),
        Series::new("conversion_value", rows.iter().map(|r| r.conversion_value).collect::<Vec<_>>()),
        Series::new("quality_score", rows.iter().map(|r| r.quality_score).collect::<Vec<_>>()),
        Series::new(
            "search_impression_share",
            rows.iter().map(|r| r.search_impression_share).collect::<Vec<_>>(),
        ),
        Series::new("video_watch_25", rows.iter().map(|r| r.video_watch_25).collect::<Vec<_>>()),
        Series::new("video_watch_50", rows.iter().map(|r| r.video_watch_50).collect::<Vec<_>>()),
        Series::new("video_watch_75", rows.iter().map(|r| r.video_watch_75).collect::<Vec<_>>()),
        Series::new("video_watch_100", rows.iter().map(|r| r.video_watch_100).collect::<Vec<_>>()),
        Series::new("likes", rows.iter().map(|r| r.likes).collect::<Vec<_>>()),
        Series::new("shares", rows.iter().map(|r| r.shares).collect::<Vec<_>>()),
        Series::new("comments", rows.iter().map(|r| r.comments).collect::<Vec<_>>()),
        Series::new("ctr", rows.iter().map(|r| round_rate(r.metrics.ctr)).collect::<Vec<_>>()),
        Series::new("cpc", rows.iter().map(|r| round_currency(r.metrics.cpc)).collect::<Vec<_>>()),
        Series::new("cpa", rows.iter().map(|r| round_currency(r.metrics.cpa)).collect::<Vec<_>>()),
        Series::new(
            "conversion_rate",
            rows.iter().map(|r| round_rate(r.metrics.conversion_rate)).collect::<Vec<_>>(),
        ),
        Series::new("cpm", rows.iter().map(|r| round_currency(r.metrics.cpm)).collect::<Vec<_>>()),
    ])?;
    Ok(df)
}

pub fn daily_frame(rows: &[DailyPlatformRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("date", date_strings(rows.iter().map(|r| r.date))),
        Series::new("platform", platform_names(rows, |r| r.platform)),
        Series::new("total_impressions", rows.iter().map(|r| r.totals.impressions).collect::<Vec<_>>()),
        Series::new("total_clicks", rows.iter().map(|r| r.totals.clicks).collect::<Vec<_>>()),
        Series::new("total_spend", rows.iter().map(|r| round_to(r.totals.spend, 2)).collect::<Vec<_>>()),
        Series::new("total_conversions", rows.iter().map(|r| r.totals.conversions).collect::<Vec<_>>()),
        Series::new("total_video_views", rows.iter().map(|r| r.totals.video_views).collect::<Vec<_>>()),
        Series::new("avg_ctr", rows.iter().map(|r| round_rate(r.metrics.ctr)).collect::<Vec<_>>()),
        Series::new("avg_cpc", rows.iter().map(|r| round_currency(r.metrics.cpc)).collect::<Vec<_>>()),
        Series::new("avg_cpa", rows.iter().map(|r| round_currency(r.metrics.cpa)).collect::<Vec<_>>()),
        Series::new(
            "avg_conversion_rate",
            rows.iter().map(|r| round_rate(r.metrics.conversion_rate)).collect::<Vec<_>>(),
        ),
        Series::new("avg_cpm", rows.iter().map(|r| round_currency(r.metrics.cpm)).collect::<Vec<_>>()),
    ])?;
    Ok(df)
}

pub fn platform_summary_frame(rows: &[PlatformSummaryRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("platform", platform_names(rows, |r| r.platform)),
        Series::new("color", rows.iter().map(|r| r.platform.color()).collect::<Vec<_>>()),
        Series::new("campaigns", rows.iter().map(|r| r.campaigns as u32).collect::<Vec<_>>()),
        Series::new("total_impressions", rows.iter().map(|r| r.totals.impressions).collect::<Vec<_>>()),
        Series::new("total_clicks", rows.iter().map(|r| r.totals.clicks).collect::<Vec<_>>()),
        Series::new("total_spend", rows.iter().map(|r| round_to(r.totals.spend, 2)).collect::<Vec<_>>()),
        Series::new("total_conversions", rows.iter().map(|r| r.totals.conversions).collect::<Vec<_>>()),
        Series::new("avg_ctr", rows.iter().map(|r| round_rate(r.metrics.ctr)).collect::<Vec<_>>()),
        Series::new("avg_cpc", rows.iter().map(|r| round_currency(r.metrics.cpc)).collect::<Vec<_>>()),
        Series::new("avg_cpa", rows.iter().map(|r| round_currency(r.metrics.cpa)).collect::<Vec<_>>()),
        Series::new(
            "avg_conversion_rate",
            rows.iter().map(|r| round_rate(r.metrics.conversion_rate)).collect::<Vec<_>>(),
        ),
        Series::new("avg_cpm", rows.iter().map(|r| round_currency(r.metrics.cpm)).collect::<Vec<_>>()),
        Series::new("roas", rows.iter().map(|r| round_currency(r.roas)).collect::<Vec<_>>()),
        Series::new("spend_share", rows.iter().map(|r| round_to(r.spend_share, 4)).collect::<Vec<_>>()),
        Series::new(
            "conversion_share",
            rows.iter().map(|r| round_to(r.conversion_share, 4)).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

pub fn campaign_frame(rows: &[CampaignPerformanceRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("platform", platform_names(rows, |r| r.platform)),
        Series::new("campaign_id", rows.iter().map(|r| r.campaign_id.clone()).collect::<Vec<_>>()),
        Series::new("campaign_name", rows.iter().map(|r| r.campaign_name.clone()).collect::<Vec<_>>()),
        Series::new("total_impressions", rows.iter().map(|r| r.totals.impressions).collect::<Vec<_>>()),
        Series::new("total_clicks", rows.iter().map(|r| r.totals.clicks).collect::<Vec<_>>()),
        Series::new("total_spend", rows.iter().map(|r| round_to(r.totals.spend, 2)).collect::<Vec<_>>()),
        Series::new("total_conversions", rows.iter().map(|r| r.totals.conversions).collect::<Vec<_>>()),
        Series::new("avg_ctr", rows.iter().map(|r| round_rate(r.metrics.ctr)).collect::<Vec<_>>()),
        Series::new("avg_cpc", rows.iter().map(|r| round_currency(r.metrics.cpc)).collect::<Vec<_>>()),
        Series::new("avg_cpa", rows.iter().map(|r| round_currency(r.metrics.cpa)).collect::<Vec<_>>()),
        Series::new(
            "avg_conversion_rate",
            rows.iter().map(|r| round_rate(r.metrics.conversion_rate)).collect::<Vec<_>>(),
        ),
        Series::new("avg_cpm", rows.iter().map(|r| round_currency(r.metrics.cpm)).collect::<Vec<_>>()),
        Series::new("roas", rows.iter().map(|r| round_currency(r.roas)).collect::<Vec<_>>()),
        Series::new("spend_rank", rows.iter().map(|r| r.spend_rank).collect::<Vec<_>>()),
        Series::new("cpa_rank", rows.iter().map(|r| r.cpa_rank).collect::<Vec<_>>()),
    ])?;
    Ok(df)
}

pub fn weekly_frame(rows: &[WeeklyPlatformRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("week_start", date_strings(rows.iter().map(|r| r.week_start))),
        Series::new("platform", platform_names(rows, |r| r.platform)),
        Series::new("impressions", rows.iter().map(|r| r.totals.impressions).collect::<Vec<_>>()),
        Series::new("clicks", rows.iter().map(|r| r.totals.clicks).collect::<Vec<_>>()),
        Series::new("spend", rows.iter().map(|r| round_to(r.totals.spend, 2)).collect::<Vec<_>>()),
        Series::new("conversions", rows.iter().map(|r| r.totals.conversions).collect::<Vec<_>>()),
        Series::new("ctr", rows.iter().map(|r| round_rate(r.metrics.ctr)).collect::<Vec<_>>()),
        Series::new("cpc", rows.iter().map(|r| round_currency(r.metrics.cpc)).collect::<Vec<_>>()),
        Series::new("cpa", rows.iter().map(|r| round_currency(r.metrics.cpa)).collect::<Vec<_>>()),
        Series::new(
            "spend_wow_change",
            rows.iter().map(|r| round_rate(r.spend_wow_change)).collect::<Vec<_>>(),
        ),
        Series::new(
            "conversions_wow_change",
            rows.iter().map(|r| round_rate(r.conversions_wow_change)).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

pub fn funnel_frame(rows: &[VideoFunnelRow]) -> Result<DataFrame> {
    let rates: Vec<[Option<f64>; 4]> = rows.iter().map(|r| r.view_through_rates()).collect();
    let rate_at = |i: usize| rates.iter().map(|r| round_rate(r[i])).collect::<Vec<_>>();

    let df = DataFrame::new(vec![
        Series::new("campaign_id", rows.iter().map(|r| r.campaign_id.clone()).collect::<Vec<_>>()),
        Series::new("campaign_name", rows.iter().map(|r| r.campaign_name.clone()).collect::<Vec<_>>()),
        Series::new("total_views", rows.iter().map(|r| r.total_views).collect::<Vec<_>>()),
        Series::new("watched_25pct", rows.iter().map(|r| r.watched_25pct).collect::<Vec<_>>()),
        Series::new("watched_50pct", rows.iter().map(|r| r.watched_50pct).collect::<Vec<_>>()),
        Series::new("watched_75pct", rows.iter().map(|r| r.watched_75pct).collect::<Vec<_>>()),
        Series::new("watched_100pct", rows.iter().map(|r| r.watched_100pct).collect::<Vec<_>>()),
        Series::new("view_through_25", rate_at(0)),
        Series::new("view_through_50", rate_at(1)),
        Series::new("view_through_75", rate_at(2)),
        Series::new("view_through_100", rate_at(3)),
    ])?;
    with_platform_column(df, FUNNEL_PLATFORM)
}

pub fn quality_frame(rows: &[SearchQualityRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("campaign_id", rows.iter().map(|r| r.campaign_id.clone()).collect::<Vec<_>>()),
        Series::new("campaign_name", rows.iter().map(|r| r.campaign_name.clone()).collect::<Vec<_>>()),
        Series::new("ad_group_id", rows.iter().map(|r| r.ad_group_id.clone()).collect::<Vec<_>>()),
        Series::new("ad_group_name", rows.iter().map(|r| r.ad_group_name.clone()).collect::<Vec<_>>()),
        Series::new(
            "avg_quality_score",
            rows.iter().map(|r| r.avg_quality_score.map(|q| round_to(q, 1))).collect::<Vec<_>>(),
        ),
        Series::new(
            "avg_search_impression_share",
            rows.iter().map(|r| round_rate(r.avg_search_impression_share)).collect::<Vec<_>>(),
        ),
        Series::new("total_impressions", rows.iter().map(|r| r.totals.impressions).collect::<Vec<_>>()),
        Series::new("total_clicks", rows.iter().map(|r| r.totals.clicks).collect::<Vec<_>>()),
        Series::new("total_cost", rows.iter().map(|r| round_to(r.totals.spend, 2)).collect::<Vec<_>>()),
        Series::new("total_conversions", rows.iter().map(|r| r.totals.conversions).collect::<Vec<_>>()),
        Series::new(
            "total_conversion_value",
            rows.iter().map(|r| r.totals.conversion_value).collect::<Vec<_>>(),
        ),
        Series::new("avg_ctr", rows.iter().map(|r| round_rate(r.metrics.ctr)).collect::<Vec<_>>()),
        Series::new("avg_cpc", rows.iter().map(|r| round_currency(r.metrics.cpc)).collect::<Vec<_>>()),
        Series::new("avg_cpa", rows.iter().map(|r| round_currency(r.metrics.cpa)).collect::<Vec<_>>()),
        Series::new("roas", rows.iter().map(|r| round_currency(r.roas)).collect::<Vec<_>>()),
    ])?;
    with_platform_column(df, QUALITY_PLATFORM)
}

pub fn snapshot_frames(snapshot: &DashboardSnapshot) -> Result<Vec<(&'static str, DataFrame)>> {
    let tables = &snapshot.tables;
    Ok(vec![
        ("unified_ads", unified_frame(&snapshot.rows)?),
        ("daily_platform_summary", daily_frame(&tables.daily)?),
        ("campaign_performance", campaign_frame(&tables.campaigns)?),
        ("platform_summary", platform_summary_frame(&tables.platforms)?),
        ("weekly_trends", weekly_frame(&tables.weekly)?),
        ("video_funnel", funnel_frame(&tables.funnel)?),
        ("search_quality_analysis", quality_frame(&tables.quality)?),
    ])
}

#[derive(Serialize)]
struct InsightsReport<'a> {
    filter: &'a DashboardFilter,
    findings: &'a [Finding],
    recommendations: &'a [String],
}

/// Writes one file per view plus `insights.json` into `dir`.
pub fn export_snapshot(snapshot: &DashboardSnapshot, dir: &Path, format: ExportFormat) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for (name, mut df) in snapshot_frames(snapshot)? {
        let path = dir.join(format!("{}.{}", name, format.extension()));
        let file = File::create(&path)?;
        match format {
            ExportFormat::Csv => CsvWriter::new(file).finish(&mut df)?,
            ExportFormat::Json => JsonWriter::new(file)
                .with_json_format(JsonFormat::JsonLines)
                .finish(&mut df)?,
        }
        debug!("Wrote {} ({} rows)", path.display(), df.height());
        written.push(path);
    }

    let insights_path = dir.join("insights.json");
    let report = InsightsReport {
        filter: &snapshot.filter,
        findings: &snapshot.findings,
        recommendations: &snapshot.recommendations,
    };
    serde_json::to_writer_pretty(File::create(&insights_path)?, &report)?;
    written.push(insights_path);

    info!("Exported {} files to {}", written.len(), dir.display());
    Ok(written)
}
