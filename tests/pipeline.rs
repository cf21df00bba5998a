use std::fs;
use std::path::Path;
use std::time::Duration;

use ads_insight_dashboard_lib::insight_engine::Severity;
use ads_insight_dashboard_lib::{
    export_snapshot, AdDataManager, ConfigManager, Dashboard, DashboardFilter, ExportFormat, InsightCategory,
    InsightThresholds, ManualClock, PipelineError, Platform,
};

const FACEBOOK_CSV: &str = "\
date,campaign_id,campaign_name,ad_set_id,ad_set_name,impressions,clicks,spend,conversions,video_views,engagement_rate,reach,frequency
2024-03-04,fb_1,Spring Sale,as_1,Lookalike,3000,60,60.00,6,400,0.031,2500,1.2
2024-03-06,fb_1,Spring Sale,as_2,Retargeting,2000,40,40.00,4,300,0.028,1700,1.18
";

const GOOGLE_CSV: &str = "\
date,campaign_id,campaign_name,ad_group_id,ad_group_name,impressions,clicks,cost,conversions,conversion_value,quality_score,search_impression_share,ctr,avg_cpc
2024-03-04,g_1,Brand Search,ag_1,Exact,1500,90,120.00,6,480.00,8,0.72,0.06,1.33
2024-03-05,g_1,Brand Search,ag_2,Phrase,500,30,80.00,4,200.00,6,0.55,0.06,2.67
";

const TIKTOK_CSV: &str = "\
date,campaign_id,campaign_name,adgroup_id,adgroup_name,impressions,clicks,cost,conversions,video_views,video_watch_25,video_watch_50,video_watch_75,video_watch_100,likes,shares,comments
2024-03-05,t_1,Creator Push,tg_1,UGC,6000,60,180.00,18,3000,2000,1400,900,500,210,30,40
2024-03-07,t_1,Creator Push,tg_1,UGC,4000,40,120.00,12,2000,1200,800,500,300,150,20,25
";

fn write_exports(dir: &Path) {
    fs::write(dir.join("01_facebook_ads.csv"), FACEBOOK_CSV).unwrap();
    fs::write(dir.join("02_google_ads.csv"), GOOGLE_CSV).unwrap();
    fs::write(dir.join("03_tiktok_ads.csv"), TIKTOK_CSV).unwrap();
}

fn dashboard(dir: &Path) -> Dashboard<AdDataManager, ManualClock> {
    Dashboard::with_clock(
        AdDataManager::new(dir),
        ManualClock::new(),
        &InsightThresholds::default(),
        Duration::from_secs(600),
    )
}

#[test]
fn csv_exports_flow_through_every_view() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path());

    let mut dashboard = dashboard(dir.path());
    let snapshot = dashboard.snapshot(&DashboardFilter::default()).unwrap();

    assert_eq!(snapshot.rows.len(), 6);
    let tables = &snapshot.tables;
    assert_eq!(tables.overview.totals.spend, 600.0);
    assert_eq!(tables.overview.totals.conversions, 50.0);

    // spend [100, 200, 300], conversions [10, 10, 30]
    let share = |p: Platform| tables.platforms.iter().find(|r| r.platform == p).unwrap();
    assert!((share(Platform::Facebook).spend_share - 1.0 / 6.0).abs() < 1e-12);
    assert!((share(Platform::Google).conversion_share - 0.2).abs() < 1e-12);
    assert!((share(Platform::TikTok).spend_share - 0.5).abs() < 1e-12);
    assert_eq!(share(Platform::Google).roas, Some(3.4));
    assert_eq!(share(Platform::Facebook).roas, None);

    // all rows fall in the week of Monday 2024-03-04
    assert_eq!(tables.weekly.len(), 3);
    assert!(tables.weekly.iter().all(|w| w.week_start.to_string() == "2024-03-04"));

    assert_eq!(tables.funnel.len(), 1);
    assert_eq!(tables.funnel[0].total_views, Some(5000));
    assert_eq!(tables.quality.len(), 2);
    assert_eq!(tables.quality[0].avg_quality_score, Some(8.0));

    // Facebook sits exactly on the 1.2 boundary and does not trigger
    let budget: Vec<_> = snapshot
        .findings
        .iter()
        .filter(|f| f.category == InsightCategory::Budget)
        .collect();
    assert_eq!(budget.len(), 1);
    assert!(budget[0].title.starts_with("Google"));
    assert_eq!(budget[0].severity, Severity::Warning);

    assert!(snapshot.recommendations.iter().any(|r| r.contains("diversification")));
}

#[test]
fn filtered_scope_recomputes_shares() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path());

    let mut dashboard = dashboard(dir.path());
    let filter = DashboardFilter::default()
        .with_platforms([Platform::Facebook, Platform::Google])
        .with_campaigns(["Spring Sale", "Brand Search"]);
    let snapshot = dashboard.snapshot(&filter).unwrap();

    let total: f64 = snapshot.tables.platforms.iter().map(|p| p.spend_share).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(snapshot.tables.funnel.is_empty());
    assert!(!snapshot
        .recommendations
        .iter()
        .any(|r| r.contains("diversification")));
}

#[test]
fn empty_scope_reports_no_data() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path());

    let mut dashboard = dashboard(dir.path());
    let filter = DashboardFilter::default().with_campaigns(["Does Not Exist"]);
    let snapshot = dashboard.snapshot(&filter).unwrap();
    assert!(snapshot.is_empty());
    assert!(snapshot.findings.is_empty());
}

#[test]
fn missing_required_column_aborts_the_refresh() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path());
    fs::write(
        dir.path().join("02_google_ads.csv"),
        "date,campaign_id,impressions,clicks,conversions\n2024-03-04,g_1,10,1,0\n",
    )
    .unwrap();

    let err = dashboard(dir.path())
        .snapshot(&DashboardFilter::default())
        .unwrap_err();
    assert!(err.is_schema_error());
    assert!(matches!(err, PipelineError::MissingColumn { .. }));
}

#[test]
fn config_driven_run_exports_views() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();
    write_exports(&data_dir);

    let manager = ConfigManager::new(dir.path().join("dashboard.ini")).unwrap();
    let config = &manager.config;
    let mut dashboard = Dashboard::with_clock(
        config.data_source(&manager.base_dir()),
        ManualClock::new(),
        &config.thresholds(),
        config.cache_ttl(),
    );
    let snapshot = dashboard.snapshot(&DashboardFilter::default()).unwrap();

    let out = dir.path().join("out");
    let written = export_snapshot(&snapshot, &out, ExportFormat::Csv).unwrap();
    assert_eq!(written.len(), 8);
    let campaigns = fs::read_to_string(out.join("campaign_performance.csv")).unwrap();
    assert_eq!(campaigns.lines().count(), 4);
}
