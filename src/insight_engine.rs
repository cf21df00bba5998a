use std::fmt;

use log::*;
use serde::{Deserialize, Serialize};

use crate::ad_data_analyzer::{CampaignPerformanceRow, PlatformSummaryRow, WeeklyPlatformRow};
use crate::metric_calculator::ratio;

/// Slack applied to threshold comparisons so a ratio mathematically equal
/// to a threshold does not trigger through float error.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsightCategory {
    Efficiency,
    Budget,
    Campaign,
    Engagement,
    Reach,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Positive,
    Neutral,
    Warning,
}

impl fmt::Display for InsightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Positive => "positive",
            Severity::Neutral => "neutral",
            Severity::Warning => "warning",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: InsightCategory,
    pub title: String,
    pub detail: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsightThresholds {
    /// `conversion_share / spend_share` below this is under-delivery.
    pub share_underdelivery_ratio: f64,
    /// `conversion_share / spend_share` above this is over-delivery.
    pub share_overdelivery_ratio: f64,
    /// Absolute week-over-week spend change at which a swing becomes a warning.
    pub wow_swing_threshold: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            share_underdelivery_ratio: 0.8,
            share_overdelivery_ratio: 1.2,
            wow_swing_threshold: 0.15,
        }
    }
}

/// The aggregate tables a rule may read, already filtered to scope.
///
/// Platform and campaign tables are expected in the analyzer's order
/// (descending spend, then platform, then campaign id); the "first row
/// among ties" contract of every argmin/argmax follows that order.
#[derive(Debug, Clone, Copy)]
pub struct InsightInputs<'a> {
    pub platforms: &'a [PlatformSummaryRow],
    pub campaigns: &'a [CampaignPerformanceRow],
    pub weekly: &'a [WeeklyPlatformRow],
}

pub trait InsightRule {
    fn name(&self) -> &'static str;

    fn evaluate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding>;
}

/// `$1,234.56`
pub fn format_usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, group_thousands(cents / 100), cents % 100)
}

/// `1,234`
pub fn format_count(value: f64) -> String {
    let rounded = value.abs().round() as u64;
    let sign = if value < 0.0 && rounded > 0 { "-" } else { "" };
    format!("{}{}", sign, group_thousands(rounded))
}

/// `0.1234` with 1 decimal -> `12.3%`
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

fn format_optional_usd(value: Option<f64>) -> String {
    value.map(format_usd).unwrap_or_else(|| "n/a".to_string())
}

fn format_optional_percent(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format_percent(v, decimals))
        .unwrap_or_else(|| "n/a".to_string())
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn argmin_by<T>(items: &[T], key: impl Fn(&T) -> Option<f64>) -> Option<&T> {
    let mut best: Option<(&T, f64)> = None;
    for item in items {
        if let Some(v) = key(item) {
            match best {
                Some((_, b)) if v >= b => {}
                _ => best = Some((item, v)),
            }
        }
    }
    best.map(|(item, _)| item)
}

fn argmax_by<T>(items: &[T], key: impl Fn(&T) -> Option<f64>) -> Option<&T> {
    let mut best: Option<(&T, f64)> = None;
    for item in items {
        if let Some(v) = key(item) {
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((item, v)),
            }
        }
    }
    best.map(|(item, _)| item)
}

pub struct LowestCpaPlatform;

impl InsightRule for LowestCpaPlatform {
    fn name(&self) -> &'static str {
        "lowest_cpa_platform"
    }

    fn evaluate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding> {
        let (best, worst) = match (
            argmin_by(inputs.platforms, |p| p.metrics.cpa),
            argmax_by(inputs.platforms, |p| p.metrics.cpa),
        ) {
            (Some(best), Some(worst)) => (best, worst),
            _ => return Vec::new(),
        };
        let (best_cpa, worst_cpa) = match (best.metrics.cpa, worst.metrics.cpa) {
            (Some(b), Some(w)) => (b, w),
            _ => return Vec::new(),
        };

        let detail = if best.platform == worst.platform {
            format!(
                "{} achieves a CPA of {} and is the only platform with conversions in scope.",
                best.platform,
                format_usd(best_cpa)
            )
        } else {
            format!(
                "{} achieves a CPA of {}, which is {} lower than {} ({}). Consider shifting budget toward {} if the goal is cost-efficient conversions.",
                best.platform,
                format_usd(best_cpa),
                format_usd(worst_cpa - best_cpa),
                worst.platform,
                format_usd(worst_cpa),
                best.platform
            )
        };

        vec![Finding {
            category: InsightCategory::Efficiency,
            title: format!("{} delivers the lowest CPA at {}", best.platform, format_usd(best_cpa)),
            detail,
            severity: Severity::Positive,
        }]
    }
}

pub struct ShareMismatch {
    pub underdelivery_ratio: f64,
    pub overdelivery_ratio: f64,
}

impl InsightRule for ShareMismatch {
    fn name(&self) -> &'static str {
        "share_mismatch"
    }

    fn evaluate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for row in inputs.platforms {
            let delivery = match ratio(row.conversion_share, row.spend_share) {
                Some(r) => r,
                None => continue,
            };

            if delivery < self.underdelivery_ratio - BOUNDARY_TOLERANCE {
                findings.push(Finding {
                    category: InsightCategory::Budget,
                    title: format!(
                        "{} receives {} of spend but only {} of conversions",
                        row.platform,
                        format_percent(row.spend_share, 0),
                        format_percent(row.conversion_share, 0)
                    ),
                    detail: format!(
                        "There is a {} gap between budget allocation and conversion output for {}. The platform may be over-funded relative to its conversion efficiency. Evaluate whether this spend is justified by upper-funnel objectives (brand awareness, reach).",
                        format_percent(row.spend_share - row.conversion_share, 1),
                        row.platform
                    ),
                    severity: Severity::Warning,
                });
            } else if delivery > self.overdelivery_ratio + BOUNDARY_TOLERANCE {
                findings.push(Finding {
                    category: InsightCategory::Budget,
                    title: format!(
                        "{} over-delivers: {} of conversions on {} of spend",
                        row.platform,
                        format_percent(row.conversion_share, 0),
                        format_percent(row.spend_share, 0)
                    ),
                    detail: format!(
                        "{} produces a disproportionately high share of conversions relative to its budget. It is a strong candidate for a budget increase to capture more volume at efficient rates.",
                        row.platform
                    ),
                    severity: Severity::Positive,
                });
            }
        }
        findings
    }
}

pub struct CampaignExtremes;

impl InsightRule for CampaignExtremes {
    fn name(&self) -> &'static str {
        "campaign_extremes"
    }

    fn evaluate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding> {
        let best = argmin_by(inputs.campaigns, |c| c.metrics.cpa);
        let worst = argmax_by(inputs.campaigns, |c| c.metrics.cpa);
        let (best, worst) = match (best, worst) {
            (Some(b), Some(w)) => (b, w),
            _ => return Vec::new(),
        };
        let (best_cpa, worst_cpa) = match (best.metrics.cpa, worst.metrics.cpa) {
            (Some(b), Some(w)) => (b, w),
            _ => return Vec::new(),
        };

        let multiple = match ratio(worst_cpa, best_cpa) {
            Some(m) => format!("{:.1}x higher than the best. ", m),
            None => String::new(),
        };

        vec![
            Finding {
                category: InsightCategory::Campaign,
                title: format!("Best campaign: {} ({})", best.label(), best.platform),
                detail: format!(
                    "CPA of {} with {} conversions on {} spend. CTR: {}, Conv Rate: {}.",
                    format_usd(best_cpa),
                    format_count(best.totals.conversions),
                    format_usd(best.totals.spend),
                    format_optional_percent(best.metrics.ctr, 2),
                    format_optional_percent(best.metrics.conversion_rate, 2)
                ),
                severity: Severity::Positive,
            },
            Finding {
                category: InsightCategory::Campaign,
                title: format!("Highest CPA campaign: {} ({})", worst.label(), worst.platform),
                detail: format!(
                    "CPA of {}, {}Total spend: {}, conversions: {}. Review targeting, creative, and bid strategy.",
                    format_usd(worst_cpa),
                    multiple,
                    format_usd(worst.totals.spend),
                    format_count(worst.totals.conversions)
                ),
                severity: Severity::Warning,
            },
        ]
    }
}

pub struct HighestCtrPlatform;

impl InsightRule for HighestCtrPlatform {
    fn name(&self) -> &'static str {
        "highest_ctr_platform"
    }

    fn evaluate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding> {
        let best = match argmax_by(inputs.platforms, |p| p.metrics.ctr) {
            Some(best) => best,
            None => return Vec::new(),
        };
        vec![Finding {
            category: InsightCategory::Engagement,
            title: format!(
                "{} has the highest CTR at {}",
                best.platform,
                format_optional_percent(best.metrics.ctr, 2)
            ),
            detail: format!(
                "High CTR indicates strong ad-audience relevance. Combined with a CPC of {} and a conversion rate of {}, this platform shows strong top-of-funnel engagement.",
                format_optional_usd(best.metrics.cpc),
                format_optional_percent(best.metrics.conversion_rate, 2)
            ),
            severity: Severity::Positive,
        }]
    }
}

pub struct HighestImpressionPlatform;

impl InsightRule for HighestImpressionPlatform {
    fn name(&self) -> &'static str {
        "highest_impression_platform"
    }

    fn evaluate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding> {
        let top = match argmax_by(inputs.platforms, |p| Some(p.totals.impressions as f64)) {
            Some(top) => top,
            None => return Vec::new(),
        };
        let impressions = format_count(top.totals.impressions as f64);
        vec![Finding {
            category: InsightCategory::Reach,
            title: format!("{} drives the most impressions ({})", top.platform, impressions),
            detail: format!(
                "With {} impressions and a CPM of {}, {} is the primary reach driver and suits awareness and consideration campaigns.",
                impressions,
                format_optional_usd(top.metrics.cpm),
                top.platform
            ),
            severity: Severity::Neutral,
        }]
    }
}

pub struct WeekOverWeekSpend {
    pub swing_threshold: f64,
}

impl InsightRule for WeekOverWeekSpend {
    fn name(&self) -> &'static str {
        "week_over_week_spend"
    }

    fn evaluate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding> {
        let latest = match inputs.weekly.iter().map(|w| w.week_start).max() {
            Some(latest) => latest,
            None => return Vec::new(),
        };

        inputs
            .weekly
            .iter()
            .filter(|w| w.week_start == latest)
            .filter_map(|w| w.spend_wow_change.map(|change| (w, change)))
            .map(|(w, change)| {
                let direction = if change > 0.0 { "increased" } else { "decreased" };
                let severity = if change.abs() < self.swing_threshold - BOUNDARY_TOLERANCE {
                    Severity::Neutral
                } else {
                    Severity::Warning
                };
                Finding {
                    category: InsightCategory::Trend,
                    title: format!(
                        "{} spend {} {} week-over-week",
                        w.platform,
                        direction,
                        format_percent(change.abs(), 1)
                    ),
                    detail: format!(
                        "Latest week spend for {}: {}. Conversions WoW change: {}. Monitor whether spend changes are proportional to conversion changes.",
                        w.platform,
                        format_usd(w.totals.spend),
                        format_optional_percent(w.conversions_wow_change, 1)
                    ),
                    severity,
                }
            })
            .collect()
    }
}

pub fn default_rules(thresholds: &InsightThresholds) -> Vec<Box<dyn InsightRule>> {
    vec![
        Box::new(LowestCpaPlatform),
        Box::new(ShareMismatch {
            underdelivery_ratio: thresholds.share_underdelivery_ratio,
            overdelivery_ratio: thresholds.share_overdelivery_ratio,
        }),
        Box::new(CampaignExtremes),
        Box::new(HighestCtrPlatform),
        Box::new(HighestImpressionPlatform),
        Box::new(WeekOverWeekSpend {
            swing_threshold: thresholds.wow_swing_threshold,
        }),
    ]
}

pub struct InsightEngine {
    rules: Vec<Box<dyn InsightRule>>,
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self::new(&InsightThresholds::default())
    }
}

impl InsightEngine {
    pub fn new(thresholds: &InsightThresholds) -> Self {
        Self::with_rules(default_rules(thresholds))
    }

    pub fn with_rules(rules: Vec<Box<dyn InsightRule>>) -> Self {
        InsightEngine { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn generate(&self, inputs: &InsightInputs<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for rule in &self.rules {
            let produced = rule.evaluate(inputs);
            debug!("rule {} produced {} findings", rule.name(), produced.len());
            findings.extend(produced);
        }
        findings
    }
}

/// Free-text budget suggestions derived from the same aggregates.
pub fn generate_recommendations(
    platforms: &[PlatformSummaryRow],
    campaigns: &[CampaignPerformanceRow],
) -> Vec<String> {
    let mut recs = Vec::new();
    if platforms.is_empty() {
        return recs;
    }

    let best = argmin_by(platforms, |p| p.metrics.cpa);
    let worst = argmax_by(platforms, |p| p.metrics.cpa);
    if let (Some(best), Some(worst)) = (best, worst) {
        let mut rec = format!(
            "Increase {} budget share (currently {}): it has the lowest CPA ({}).",
            best.platform,
            format_percent(best.spend_share, 0),
            format_optional_usd(best.metrics.cpa)
        );
        if worst.platform != best.platform {
            rec.push_str(&format!(
                " A 10-20% budget shift from {} could yield more conversions at lower cost.",
                worst.platform
            ));
        }
        recs.push(rec);
    }

    if campaigns.len() > 1 {
        let top = argmin_by(campaigns, |c| c.metrics.cpa);
        let bottom = argmax_by(campaigns, |c| c.metrics.cpa);
        if let (Some(top), Some(bottom)) = (top, bottom) {
            recs.push(format!(
                "Scale top performer: {} ({}) at {} CPA is the best-performing campaign. Increase its daily budget or expand its audience targeting.",
                top.label(),
                top.platform,
                format_optional_usd(top.metrics.cpa)
            ));
            recs.push(format!(
                "Optimize or pause: {} ({}) has a CPA of {}. Test new creatives, tighten targeting, or reallocate its budget.",
                bottom.label(),
                bottom.platform,
                format_optional_usd(bottom.metrics.cpa)
            ));
        }
    }

    if platforms.len() == 3 {
        recs.push(
            "Maintain cross-platform diversification: running on 3 platforms reduces audience saturation risk. Use TikTok and Facebook for awareness, Google for high-intent conversion capture."
                .to_string(),
        );
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad_data_analyzer::{campaign_performance, platform_summary, weekly_by_platform};
    use crate::dashboard_filter::test_rows::row;
    use crate::platform::Platform;
    use crate::schema_normalizer::UnifiedRow;

    fn three_platform_rows() -> Vec<UnifiedRow> {
        vec![
            row(Platform::Facebook, "2024-03-04", "Spring", 5000, 100, 100.0, 10.0),
            row(Platform::Google, "2024-03-04", "Brand", 2000, 120, 200.0, 10.0),
            row(Platform::TikTok, "2024-03-04", "Creators", 9000, 90, 300.0, 30.0),
        ]
    }

    fn run(rule: &dyn InsightRule, rows: &[UnifiedRow]) -> Vec<Finding> {
        let platforms = platform_summary(rows);
        let campaigns = campaign_performance(rows);
        let weekly = weekly_by_platform(rows);
        rule.evaluate(&InsightInputs {
            platforms: &platforms,
            campaigns: &campaigns,
            weekly: &weekly,
        })
    }

    fn share_rule() -> ShareMismatch {
        let t = InsightThresholds::default();
        ShareMismatch {
            underdelivery_ratio: t.share_underdelivery_ratio,
            overdelivery_ratio: t.share_overdelivery_ratio,
        }
    }

    #[test]
    fn formats_usd_with_thousands() {
        assert_eq!(format_usd(1234.5), "$1,234.50");
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_usd(-12.5), "-$12.50");
        assert_eq!(format_count(12345.0), "12,345");
        assert_eq!(format_percent(0.1234, 1), "12.3%");
    }

    #[test]
    fn lowest_cpa_platform() {
        let findings = run(&LowestCpaPlatform, &three_platform_rows());
        assert_eq!(findings.len(), 1);
        // Facebook CPA 10, Google 20, TikTok 10; TikTok comes first by spend
        assert!(findings[0].title.starts_with("TikTok delivers the lowest CPA at $10.00"));
        assert!(findings[0].detail.contains("Google ($20.00)"));
        assert_eq!(findings[0].severity, Severity::Positive);
    }

    #[test]
    fn share_boundary_is_exclusive() {
        // shares: spend [1/6, 1/3, 1/2], conversions [0.2, 0.2, 0.6]
        let findings = run(&share_rule(), &three_platform_rows());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].title.starts_with("Google receives 33% of spend but only 20%"));
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn share_underdelivery_boundary_is_exclusive() {
        // spend shares [0.5, 0.5], conversion shares [0.4, 0.6]: ratios 0.8 and 1.2
        let rows = vec![
            row(Platform::Facebook, "2024-03-04", "A", 100, 10, 100.0, 4.0),
            row(Platform::Google, "2024-03-04", "B", 100, 10, 100.0, 6.0),
        ];
        let findings = run(&share_rule(), &rows);
        assert!(findings.is_empty());
    }

    #[test]
    fn share_overdelivery_above_boundary() {
        let rows = vec![
            row(Platform::Facebook, "2024-03-04", "A", 100, 10, 100.0, 13.0),
            row(Platform::Google, "2024-03-04", "B", 100, 10, 100.0, 7.0),
        ];
        let findings = run(&share_rule(), &rows);
        assert_eq!(findings.len(), 2);
        let fb = findings.iter().find(|f| f.title.starts_with("Facebook")).unwrap();
        assert_eq!(fb.severity, Severity::Positive);
        assert!(fb.title.contains("over-delivers: 65% of conversions on 50% of spend"));
        let google = findings.iter().find(|f| f.title.starts_with("Google")).unwrap();
        assert_eq!(google.severity, Severity::Warning);
    }

    #[test]
    fn share_rule_skips_zero_spend_share() {
        let rows = vec![
            row(Platform::Facebook, "2024-03-04", "A", 100, 10, 0.0, 5.0),
            row(Platform::Google, "2024-03-04", "B", 100, 10, 100.0, 5.0),
        ];
        let findings = run(&share_rule(), &rows);
        // Google: 0.5 / 1.0 = 0.5 -> warning; Facebook has no spend share
        assert_eq!(findings.len(), 1);
        assert!(findings[0].title.starts_with("Google"));
    }

    #[test]
    fn zero_conversions_with_spend_is_underdelivery() {
        let rows = vec![
            row(Platform::Facebook, "2024-03-04", "A", 100, 10, 50.0, 0.0),
            row(Platform::Google, "2024-03-04", "B", 100, 10, 50.0, 5.0),
        ];
        let findings = run(&share_rule(), &rows);
        let fb = findings.iter().find(|f| f.title.starts_with("Facebook")).unwrap();
        assert_eq!(fb.severity, Severity::Warning);
    }

    #[test]
    fn ties_resolve_to_first_row_in_spend_order() {
        let rows = vec![
            row(Platform::TikTok, "2024-03-04", "C", 100, 10, 100.0, 10.0),
            row(Platform::Facebook, "2024-03-04", "A", 100, 10, 100.0, 10.0),
            row(Platform::Google, "2024-03-04", "B", 100, 10, 100.0, 10.0),
        ];
        let cpa = run(&LowestCpaPlatform, &rows);
        assert!(cpa[0].title.starts_with("Facebook"));
        let ctr = run(&HighestCtrPlatform, &rows);
        assert!(ctr[0].title.starts_with("Facebook"));
        let reach = run(&HighestImpressionPlatform, &rows);
        assert!(reach[0].title.starts_with("Facebook"));
    }

    #[test]
    fn campaign_extremes_skip_null_cpa() {
        let rows = vec![
            row(Platform::Google, "2024-03-04", "Brand", 1000, 50, 100.0, 10.0),
            row(Platform::TikTok, "2024-03-04", "Creators", 1000, 50, 300.0, 10.0),
            row(Platform::Facebook, "2024-03-04", "NoConv", 1000, 50, 900.0, 0.0),
        ];
        let findings = run(&CampaignExtremes, &rows);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].title, "Best campaign: Brand (Google)");
        assert_eq!(findings[1].title, "Highest CPA campaign: Creators (TikTok)");
        assert!(findings[1].detail.contains("3.0x higher"));
        assert!(findings[0].detail.contains("CTR: 5.00%"));
    }

    #[test]
    fn campaign_extremes_empty_table() {
        assert!(run(&CampaignExtremes, &[]).is_empty());
        let only_null = vec![row(Platform::Google, "2024-03-04", "X", 10, 1, 5.0, 0.0)];
        assert!(run(&CampaignExtremes, &only_null).is_empty());
    }

    #[test]
    fn highest_impression_platform_is_neutral() {
        let findings = run(&HighestImpressionPlatform, &three_platform_rows());
        assert_eq!(findings[0].title, "TikTok drives the most impressions (9,000)");
        assert_eq!(findings[0].severity, Severity::Neutral);
    }

    #[test]
    fn week_over_week_uses_latest_week_only() {
        let rows = vec![
            row(Platform::Google, "2024-03-04", "A", 100, 10, 100.0, 10.0),
            row(Platform::Google, "2024-03-11", "A", 100, 10, 110.0, 10.0),
            row(Platform::TikTok, "2024-02-26", "B", 100, 10, 100.0, 10.0),
            row(Platform::TikTok, "2024-03-04", "B", 100, 10, 200.0, 10.0),
            row(Platform::Facebook, "2024-03-11", "C", 100, 10, 50.0, 1.0),
        ];
        let findings = run(
            &WeekOverWeekSpend {
                swing_threshold: 0.15,
            },
            &rows,
        );
        // TikTok's +100% swing is in an earlier week; Facebook has no prior week
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Google spend increased 10.0% week-over-week");
        assert_eq!(findings[0].severity, Severity::Neutral);
        assert!(findings[0].detail.contains("Conversions WoW change: 0.0%"));
    }

    #[test]
    fn week_over_week_swing_is_a_warning() {
        let rows = vec![
            row(Platform::Google, "2024-03-04", "A", 100, 10, 200.0, 10.0),
            row(Platform::Google, "2024-03-11", "A", 100, 10, 100.0, 10.0),
        ];
        let findings = run(
            &WeekOverWeekSpend {
                swing_threshold: 0.15,
            },
            &rows,
        );
        assert_eq!(findings[0].title, "Google spend decreased 50.0% week-over-week");
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn week_over_week_exactly_at_threshold_is_warning() {
        let rows = vec![
            row(Platform::Google, "2024-03-04", "A", 100, 10, 100.0, 10.0),
            row(Platform::Google, "2024-03-11", "A", 100, 10, 115.0, 10.0),
            row(Platform::Facebook, "2024-03-04", "B", 100, 10, 100.0, 10.0),
            row(Platform::Facebook, "2024-03-11", "B", 100, 10, 85.0, 10.0),
        ];
        let findings = run(
            &WeekOverWeekSpend {
                swing_threshold: 0.15,
            },
            &rows,
        );
        assert_eq!(findings.len(), 2);
        let google = findings.iter().find(|f| f.title.starts_with("Google")).unwrap();
        assert_eq!(google.title, "Google spend increased 15.0% week-over-week");
        assert_eq!(google.severity, Severity::Warning);
        let fb = findings.iter().find(|f| f.title.starts_with("Facebook")).unwrap();
        assert_eq!(fb.title, "Facebook spend decreased 15.0% week-over-week");
        assert_eq!(fb.severity, Severity::Warning);
    }

    #[test]
    fn engine_runs_rules_independently_in_order() {
        let rows = three_platform_rows();
        let platforms = platform_summary(&rows);
        let campaigns = campaign_performance(&rows);
        let weekly = weekly_by_platform(&rows);
        let engine = InsightEngine::default();
        let findings = engine.generate(&InsightInputs {
            platforms: &platforms,
            campaigns: &campaigns,
            weekly: &weekly,
        });

        let categories: Vec<InsightCategory> = findings.iter().map(|f| f.category).collect();
        assert_eq!(
            categories,
            vec![
                InsightCategory::Efficiency,
                InsightCategory::Budget,
                InsightCategory::Campaign,
                InsightCategory::Campaign,
                InsightCategory::Engagement,
                InsightCategory::Reach,
            ]
        );
        assert_eq!(engine.rule_names().len(), 6);
    }

    #[test]
    fn engine_on_empty_scope_has_no_findings() {
        let findings = InsightEngine::default().generate(&InsightInputs {
            platforms: &[],
            campaigns: &[],
            weekly: &[],
        });
        assert!(findings.is_empty());
    }

    #[test]
    fn custom_rule_set() {
        let engine = InsightEngine::with_rules(vec![Box::new(HighestImpressionPlatform)]);
        let rows = three_platform_rows();
        let platforms = platform_summary(&rows);
        let findings = engine.generate(&InsightInputs {
            platforms: &platforms,
            campaigns: &[],
            weekly: &[],
        });
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn recommendations() {
        let rows = three_platform_rows();
        let recs = generate_recommendations(&platform_summary(&rows), &campaign_performance(&rows));
        assert_eq!(recs.len(), 4);
        assert!(recs[0].starts_with("Increase TikTok budget share (currently 50%)"));
        assert!(recs[0].contains("shift from Google"));
        assert!(recs[1].starts_with("Scale top performer: Creators (TikTok)"));
        assert!(recs[2].starts_with("Optimize or pause: Brand (Google)"));
        assert!(recs[3].starts_with("Maintain cross-platform diversification"));
    }

    #[test]
    fn recommendations_for_single_campaign_scope() {
        let rows = vec![row(Platform::Google, "2024-03-04", "Brand", 100, 10, 50.0, 5.0)];
        let recs = generate_recommendations(&platform_summary(&rows), &campaign_performance(&rows));
        assert_eq!(recs.len(), 1);
        assert!(!recs[0].contains("shift from"));
        assert!(generate_recommendations(&[], &[]).is_empty());
    }
}
