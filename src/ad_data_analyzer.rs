use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::metric_calculator::{ratio, roas, DerivedMetrics};
use crate::platform::Platform;
use crate::schema_normalizer::UnifiedRow;

pub const FUNNEL_PLATFORM: Platform = Platform::TikTok;
pub const QUALITY_PLATFORM: Platform = Platform::Google;

fn add_optional_f64(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a + v),
        (None, v) => v,
        (a, None) => a,
    }
}

fn add_optional_u64(acc: Option<u64>, value: Option<u64>) -> Option<u64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a + v),
        (None, v) => v,
        (a, None) => a,
    }
}

fn mean_of_tracked(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Summed absolute metrics of a group. Optional metrics follow SQL `SUM`:
/// `None` when no row of the group tracks them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTotals {
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub conversions: f64,
    pub conversion_value: Option<f64>,
    pub video_views: Option<u64>,
}

impl MetricTotals {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a UnifiedRow>) -> Self {
        let mut totals = MetricTotals::default();
        for row in rows {
            totals.add(row);
        }
        totals
    }

    pub fn add(&mut self, row: &UnifiedRow) {
        self.impressions += row.impressions;
        self.clicks += row.clicks;
        self.spend += row.spend;
        self.conversions += row.conversions;
        self.conversion_value = add_optional_f64(self.conversion_value, row.conversion_value);
        self.video_views = add_optional_u64(self.video_views, row.video_views);
    }

    pub fn merge(&self, other: &MetricTotals) -> MetricTotals {
        MetricTotals {
            impressions: self.impressions + other.impressions,
            clicks: self.clicks + other.clicks,
            spend: self.spend + other.spend,
            conversions: self.conversions + other.conversions,
            conversion_value: add_optional_f64(self.conversion_value, other.conversion_value),
            video_views: add_optional_u64(self.video_views, other.video_views),
        }
    }

    pub fn derived(&self) -> DerivedMetrics {
        DerivedMetrics::compute(
            self.impressions as f64,
            self.clicks as f64,
            self.spend,
            self.conversions,
        )
    }

    pub fn roas(&self) -> Option<f64> {
        roas(self.conversion_value, self.spend)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlatformRow {
    pub date: NaiveDate,
    pub platform: Platform,
    pub totals: MetricTotals,
    pub metrics: DerivedMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSummaryRow {
    pub platform: Platform,
    pub campaigns: usize,
    pub totals: MetricTotals,
    pub metrics: DerivedMetrics,
    pub roas: Option<f64>,
    pub spend_share: f64,
    pub conversion_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPerformanceRow {
    pub platform: Platform,
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub totals: MetricTotals,
    pub metrics: DerivedMetrics,
    pub roas: Option<f64>,
    /// 1 = highest spend.
    pub spend_rank: u32,
    /// 1 = lowest CPA; null CPAs rank last.
    pub cpa_rank: u32,
}

impl CampaignPerformanceRow {
    pub fn label(&self) -> &str {
        self.campaign_name.as_deref().unwrap_or(&self.campaign_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPlatformRow {
    pub week_start: NaiveDate,
    pub platform: Platform,
    pub totals: MetricTotals,
    pub metrics: DerivedMetrics,
    pub spend_wow_change: Option<f64>,
    pub conversions_wow_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFunnelRow {
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub total_views: Option<u64>,
    pub watched_25pct: Option<u64>,
    pub watched_50pct: Option<u64>,
    pub watched_75pct: Option<u64>,
    pub watched_100pct: Option<u64>,
}

impl VideoFunnelRow {
    pub fn label(&self) -> &str {
        self.campaign_name.as_deref().unwrap_or(&self.campaign_id)
    }

    /// Share of views that reached each checkpoint (25/50/75/100%).
    pub fn view_through_rates(&self) -> [Option<f64>; 4] {
        let views = self.total_views.map(|v| v as f64);
        [
            self.watched_25pct,
            self.watched_50pct,
            self.watched_75pct,
            self.watched_100pct,
        ]
        .map(|w| ratio(w.map(|v| v as f64), views))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQualityRow {
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub ad_group_id: Option<String>,
    pub ad_group_name: Option<String>,
    pub avg_quality_score: Option<f64>,
    pub avg_search_impression_share: Option<f64>,
    pub totals: MetricTotals,
    pub metrics: DerivedMetrics,
    pub roas: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverviewKpis {
    pub totals: MetricTotals,
    pub metrics: DerivedMetrics,
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Min-method ranking: ties share the lowest rank and the next distinct
/// value skips past them (`[5, 5, 10]` -> `[1, 1, 3]`). `None` values
/// all share the rank after the last numeric value.
pub fn min_rank(values: &[Option<f64>], ascending: bool) -> Vec<u32> {
    let numeric = values.iter().filter(|v| v.is_some()).count() as u32;
    values
        .iter()
        .map(|v| match v {
            None => numeric + 1,
            Some(x) => {
                let better = values
                    .iter()
                    .flatten()
                    .filter(|w| if ascending { *w < x } else { *w > x })
                    .count() as u32;
                better + 1
            }
        })
        .collect()
}

fn cmp_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn overview(rows: &[UnifiedRow]) -> OverviewKpis {
    let totals = MetricTotals::from_rows(rows);
    OverviewKpis {
        totals,
        metrics: totals.derived(),
    }
}

pub fn daily_by_platform(rows: &[UnifiedRow]) -> Vec<DailyPlatformRow> {
    let mut groups: BTreeMap<(NaiveDate, Platform), MetricTotals> = BTreeMap::new();
    for row in rows {
        groups.entry((row.date, row.platform)).or_default().add(row);
    }
    groups
        .into_iter()
        .map(|((date, platform), totals)| DailyPlatformRow {
            date,
            platform,
            totals,
            metrics: totals.derived(),
        })
        .collect()
}

/// Per-platform sums with spend and conversion shares of the scope total.
///
/// Ordered by descending spend, then platform; this order is the
/// tie-break contract for the insight rules.
pub fn platform_summary(rows: &[UnifiedRow]) -> Vec<PlatformSummaryRow> {
    let mut groups: BTreeMap<Platform, (MetricTotals, BTreeSet<&str>)> = BTreeMap::new();
    for row in rows {
        let entry = groups.entry(row.platform).or_default();
        entry.0.add(row);
        entry.1.insert(row.campaign_id.as_str());
    }

    let total_spend: f64 = groups.values().map(|(t, _)| t.spend).sum();
    let total_conversions: f64 = groups.values().map(|(t, _)| t.conversions).sum();

    let mut out: Vec<PlatformSummaryRow> = groups
        .into_iter()
        .map(|(platform, (totals, campaigns))| PlatformSummaryRow {
            platform,
            campaigns: campaigns.len(),
            totals,
            metrics: totals.derived(),
            roas: totals.roas(),
            // An empty or zero-spend scope has a well-defined all-zero distribution.
            spend_share: ratio(totals.spend, total_spend).unwrap_or(0.0),
            conversion_share: ratio(totals.conversions, total_conversions).unwrap_or(0.0),
        })
        .collect();

    out.sort_by(|a, b| {
        b.totals
            .spend
            .total_cmp(&a.totals.spend)
            .then_with(|| a.platform.cmp(&b.platform))
    });
    out
}

/// Per-campaign sums with spend and CPA ranks.
///
/// Ordered by descending spend, then platform, then campaign id.
pub fn campaign_performance(rows: &[UnifiedRow]) -> Vec<CampaignPerformanceRow> {
    let mut groups: BTreeMap<(Platform, String, Option<String>), MetricTotals> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.platform, row.campaign_id.clone(), row.campaign_name.clone()))
            .or_default()
            .add(row);
    }

    let mut out: Vec<CampaignPerformanceRow> = groups
        .into_iter()
        .map(|((platform, campaign_id, campaign_name), totals)| CampaignPerformanceRow {
            platform,
            campaign_id,
            campaign_name,
            totals,
            metrics: totals.derived(),
            roas: totals.roas(),
            spend_rank: 0,
            cpa_rank: 0,
        })
        .collect();

    let spends: Vec<Option<f64>> = out.iter().map(|c| Some(c.totals.spend)).collect();
    let cpas: Vec<Option<f64>> = out.iter().map(|c| c.metrics.cpa).collect();
    let spend_ranks = min_rank(&spends, false);
    let cpa_ranks = min_rank(&cpas, true);
    for (i, row) in out.iter_mut().enumerate() {
        row.spend_rank = spend_ranks[i];
        row.cpa_rank = cpa_ranks[i];
    }

    out.sort_by(|a, b| {
        b.totals
            .spend
            .total_cmp(&a.totals.spend)
            .then_with(|| a.platform.cmp(&b.platform))
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
    });
    out
}

/// Per (week_start, platform) sums with week-over-week changes against
/// the same platform's preceding week.
pub fn weekly_by_platform(rows: &[UnifiedRow]) -> Vec<WeeklyPlatformRow> {
    let mut groups: BTreeMap<(NaiveDate, Platform), MetricTotals> = BTreeMap::new();
    for row in rows {
        groups.entry((week_start(row.date), row.platform)).or_default().add(row);
    }

    let previous: HashMap<(NaiveDate, Platform), MetricTotals> =
        groups.iter().map(|(k, v)| (*k, *v)).collect();

    groups
        .into_iter()
        .map(|((week, platform), totals)| {
            let prior = previous.get(&(week - Duration::days(7), platform));
            WeeklyPlatformRow {
                week_start: week,
                platform,
                totals,
                metrics: totals.derived(),
                spend_wow_change: prior.and_then(|p| ratio(totals.spend - p.spend, p.spend)),
                conversions_wow_change: prior
                    .and_then(|p| ratio(totals.conversions - p.conversions, p.conversions)),
            }
        })
        .collect()
}

/// View-through funnel per campaign of the video platform, ordered by
/// descending views.
pub fn video_funnel(rows: &[UnifiedRow]) -> Vec<VideoFunnelRow> {
    let mut groups: BTreeMap<(String, Option<String>), VideoFunnelRow> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.platform == FUNNEL_PLATFORM) {
        let entry = groups
            .entry((row.campaign_id.clone(), row.campaign_name.clone()))
            .or_insert_with(|| VideoFunnelRow {
                campaign_id: row.campaign_id.clone(),
                campaign_name: row.campaign_name.clone(),
                total_views: None,
                watched_25pct: None,
                watched_50pct: None,
                watched_75pct: None,
                watched_100pct: None,
            });
        entry.total_views = add_optional_u64(entry.total_views, row.video_views);
        entry.watched_25pct = add_optional_u64(entry.watched_25pct, row.video_watch_25);
        entry.watched_50pct = add_optional_u64(entry.watched_50pct, row.video_watch_50);
        entry.watched_75pct = add_optional_u64(entry.watched_75pct, row.video_watch_75);
        entry.watched_100pct = add_optional_u64(entry.watched_100pct, row.video_watch_100);
    }

    let mut out: Vec<VideoFunnelRow> = groups.into_values().collect();
    out.sort_by(|a, b| {
        cmp_desc_nulls_last(a.total_views.map(|v| v as f64), b.total_views.map(|v| v as f64))
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
    });
    out
}

/// Quality score against cost per (campaign, ad group) of the search
/// platform, ordered by descending mean quality score.
pub fn search_quality(rows: &[UnifiedRow]) -> Vec<SearchQualityRow> {
    type Key = (String, Option<String>, Option<String>, Option<String>);
    let mut groups: BTreeMap<Key, Vec<&UnifiedRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.platform == QUALITY_PLATFORM) {
        groups
            .entry((
                row.campaign_id.clone(),
                row.campaign_name.clone(),
                row.ad_group_id.clone(),
                row.ad_group_name.clone(),
            ))
            .or_default()
            .push(row);
    }

    let mut out: Vec<SearchQualityRow> = groups
        .into_iter()
        .map(|((campaign_id, campaign_name, ad_group_id, ad_group_name), members)| {
            let totals = MetricTotals::from_rows(members.iter().copied());
            SearchQualityRow {
                campaign_id,
                campaign_name,
                ad_group_id,
                ad_group_name,
                avg_quality_score: mean_of_tracked(members.iter().map(|r| r.quality_score)),
                avg_search_impression_share: mean_of_tracked(
                    members.iter().map(|r| r.search_impression_share),
                ),
                totals,
                metrics: totals.derived(),
                roas: totals.roas(),
            }
        })
        .collect();

    out.sort_by(|a, b| {
        cmp_desc_nulls_last(a.avg_quality_score, b.avg_quality_score)
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
            .then_with(|| a.ad_group_id.cmp(&b.ad_group_id))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTables {
    pub overview: OverviewKpis,
    pub daily: Vec<DailyPlatformRow>,
    pub platforms: Vec<PlatformSummaryRow>,
    pub campaigns: Vec<CampaignPerformanceRow>,
    pub weekly: Vec<WeeklyPlatformRow>,
    pub funnel: Vec<VideoFunnelRow>,
    pub quality: Vec<SearchQualityRow>,
}

impl AggregateTables {
    pub fn build(rows: &[UnifiedRow]) -> Self {
        AggregateTables {
            overview: overview(rows),
            daily: daily_by_platform(rows),
            platforms: platform_summary(rows),
            campaigns: campaign_performance(rows),
            weekly: weekly_by_platform(rows),
            funnel: video_funnel(rows),
            quality: search_quality(rows),
        }
    }
}
