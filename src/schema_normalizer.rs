use std::collections::HashMap;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use log::*;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::metric_calculator::DerivedMetrics;
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalColumn {
    Platform,
    Date,
    CampaignId,
    CampaignName,
    AdGroupId,
    AdGroupName,
    Impressions,
    Clicks,
    Spend,
    Conversions,
    VideoViews,
    EngagementRate,
    Reach,
    Frequency,
    ConversionValue,
    QualityScore,
    SearchImpressionShare,
    VideoWatch25,
    VideoWatch50,
    VideoWatch75,
    VideoWatch100,
    Likes,
    Shares,
    Comments,
}

impl CanonicalColumn {
    pub const ALL: [CanonicalColumn; 24] = [
        CanonicalColumn::Platform,
        CanonicalColumn::Date,
        CanonicalColumn::CampaignId,
        CanonicalColumn::CampaignName,
        CanonicalColumn::AdGroupId,
        CanonicalColumn::AdGroupName,
        CanonicalColumn::Impressions,
        CanonicalColumn::Clicks,
        CanonicalColumn::Spend,
        CanonicalColumn::Conversions,
        CanonicalColumn::VideoViews,
        CanonicalColumn::EngagementRate,
        CanonicalColumn::Reach,
        CanonicalColumn::Frequency,
        CanonicalColumn::ConversionValue,
        CanonicalColumn::QualityScore,
        CanonicalColumn::SearchImpressionShare,
        CanonicalColumn::VideoWatch25,
        CanonicalColumn::VideoWatch50,
        CanonicalColumn::VideoWatch75,
        CanonicalColumn::VideoWatch100,
        CanonicalColumn::Likes,
        CanonicalColumn::Shares,
        CanonicalColumn::Comments,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalColumn::Platform => "platform",
            CanonicalColumn::Date => "date",
            CanonicalColumn::CampaignId => "campaign_id",
            CanonicalColumn::CampaignName => "campaign_name",
            CanonicalColumn::AdGroupId => "ad_group_id",
            CanonicalColumn::AdGroupName => "ad_group_name",
            CanonicalColumn::Impressions => "impressions",
            CanonicalColumn::Clicks => "clicks",
            CanonicalColumn::Spend => "spend",
            CanonicalColumn::Conversions => "conversions",
            CanonicalColumn::VideoViews => "video_views",
            CanonicalColumn::EngagementRate => "engagement_rate",
            CanonicalColumn::Reach => "reach",
            CanonicalColumn::Frequency => "frequency",
            CanonicalColumn::ConversionValue => "conversion_value",
            CanonicalColumn::QualityScore => "quality_score",
            CanonicalColumn::SearchImpressionShare => "search_impression_share",
            CanonicalColumn::VideoWatch25 => "video_watch_25",
            CanonicalColumn::VideoWatch50 => "video_watch_50",
            CanonicalColumn::VideoWatch75 => "video_watch_75",
            CanonicalColumn::VideoWatch100 => "video_watch_100",
            CanonicalColumn::Likes => "likes",
            CanonicalColumn::Shares => "shares",
            CanonicalColumn::Comments => "comments",
        }
    }

    /// Columns every source must provide. Platform may instead be bound
    /// to a literal by the mapping.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            CanonicalColumn::Platform
                | CanonicalColumn::Date
                | CanonicalColumn::CampaignId
                | CanonicalColumn::Impressions
                | CanonicalColumn::Clicks
                | CanonicalColumn::Spend
                | CanonicalColumn::Conversions
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    Column(&'static str),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformBinding {
    Fixed(Platform),
    Column(&'static str),
}

/// Declarative mapping from one source's raw columns onto the unified schema.
#[derive(Debug, Clone)]
pub struct SourceSchema {
    pub name: &'static str,
    pub platform: PlatformBinding,
    pub columns: Vec<(CanonicalColumn, ColumnSource)>,
}

lazy_static! {
    static ref HEADER_SEPARATORS: Regex = Regex::new(r"[\s\-]+").unwrap();

    static ref SOURCE_SCHEMAS: HashMap<Platform, SourceSchema> = {
        use CanonicalColumn as C;
        use ColumnSource::{Column, Null};

        let mut map = HashMap::new();
        map.insert(Platform::Facebook, SourceSchema {
            name: "facebook_ads",
            platform: PlatformBinding::Fixed(Platform::Facebook),
            columns: vec![
                (C::Date, Column("date")),
                (C::CampaignId, Column("campaign_id")),
                (C::CampaignName, Column("campaign_name")),
                (C::AdGroupId, Column("ad_set_id")),
                (C::AdGroupName, Column("ad_set_name")),
                (C::Impressions, Column("impressions")),
                (C::Clicks, Column("clicks")),
                (C::Spend, Column("spend")),
                (C::Conversions, Column("conversions")),
                (C::VideoViews, Column("video_views")),
                (C::EngagementRate, Column("engagement_rate")),
                (C::Reach, Column("reach")),
                (C::Frequency, Column("frequency")),
                (C::ConversionValue, Null),
                (C::QualityScore, Null),
                (C::SearchImpressionShare, Null),
                (C::VideoWatch25, Null),
                (C::VideoWatch50, Null),
                (C::VideoWatch75, Null),
                (C::VideoWatch100, Null),
                (C::Likes, Null),
                (C::Shares, Null),
                (C::Comments, Null),
            ],
        });
        map.insert(Platform::Google, SourceSchema {
            name: "google_ads",
            platform: PlatformBinding::Fixed(Platform::Google),
            columns: vec![
                (C::Date, Column("date")),
                (C::CampaignId, Column("campaign_id")),
                (C::CampaignName, Column("campaign_name")),
                (C::AdGroupId, Column("ad_group_id")),
                (C::AdGroupName, Column("ad_group_name")),
                (C::Impressions, Column("impressions")),
                (C::Clicks, Column("clicks")),
                (C::Spend, Column("cost")),
                (C::Conversions, Column("conversions")),
                (C::VideoViews, Null),
                (C::EngagementRate, Null),
                (C::Reach, Null),
                (C::Frequency, Null),
                (C::ConversionValue, Column("conversion_value")),
                (C::QualityScore, Column("quality_score")),
                (C::SearchImpressionShare, Column("search_impression_share")),
                (C::VideoWatch25, Null),
                (C::VideoWatch50, Null),
                (C::VideoWatch75, Null),
                (C::VideoWatch100, Null),
                (C::Likes, Null),
                (C::Shares, Null),
                (C::Comments, Null),
            ],
        });
        map.insert(Platform::TikTok, SourceSchema {
            name: "tiktok_ads",
            platform: PlatformBinding::Fixed(Platform::TikTok),
            columns: vec![
                (C::Date, Column("date")),
                (C::CampaignId, Column("campaign_id")),
                (C::CampaignName, Column("campaign_name")),
                (C::AdGroupId, Column("adgroup_id")),
                (C::AdGroupName, Column("adgroup_name")),
                (C::Impressions, Column("impressions")),
                (C::Clicks, Column("clicks")),
                (C::Spend, Column("cost")),
                (C::Conversions, Column("conversions")),
                (C::VideoViews, Column("video_views")),
                (C::EngagementRate, Null),
                (C::Reach, Null),
                (C::Frequency, Null),
                (C::ConversionValue, Null),
                (C::QualityScore, Null),
                (C::SearchImpressionShare, Null),
                (C::VideoWatch25, Column("video_watch_25")),
                (C::VideoWatch50, Column("video_watch_50")),
                (C::VideoWatch75, Column("video_watch_75")),
                (C::VideoWatch100, Column("video_watch_100")),
                (C::Likes, Column("likes")),
                (C::Shares, Column("shares")),
                (C::Comments, Column("comments")),
            ],
        });
        map
    };
}

impl SourceSchema {
    pub fn for_platform(platform: Platform) -> Result<&'static SourceSchema> {
        SOURCE_SCHEMAS.get(&platform).ok_or_else(|| {
            PipelineError::InvalidSchema(format!("no source mapping registered for {}", platform))
        })
    }

    pub fn unified(name: &'static str) -> SourceSchema {
        SourceSchema {
            name,
            platform: PlatformBinding::Column("platform"),
            columns: CanonicalColumn::ALL
                .iter()
                .filter(|c| **c != CanonicalColumn::Platform)
                .map(|c| (*c, ColumnSource::Column(c.name())))
                .collect(),
        }
    }

    /// Every canonical column must be mapped exactly once and required
    /// columns may not be null-filled.
    pub fn validate(&self) -> Result<()> {
        for canonical in CanonicalColumn::ALL.iter() {
            if *canonical == CanonicalColumn::Platform {
                continue;
            }
            let entries: Vec<&ColumnSource> = self
                .columns
                .iter()
                .filter(|(c, _)| c == canonical)
                .map(|(_, s)| s)
                .collect();
            match entries.as_slice() {
                [] => {
                    return Err(PipelineError::InvalidSchema(format!(
                        "{}: canonical column '{}' is not mapped",
                        self.name,
                        canonical.name()
                    )))
                }
                [ColumnSource::Null] if canonical.is_required() => {
                    return Err(PipelineError::InvalidSchema(format!(
                        "{}: required column '{}' cannot be null-filled",
                        self.name,
                        canonical.name()
                    )))
                }
                [_] => {}
                _ => {
                    return Err(PipelineError::InvalidSchema(format!(
                        "{}: canonical column '{}' is mapped more than once",
                        self.name,
                        canonical.name()
                    )))
                }
            }
        }
        if self.columns.iter().any(|(c, _)| *c == CanonicalColumn::Platform) {
            return Err(PipelineError::InvalidSchema(format!(
                "{}: platform is bound separately and cannot be a mapped column",
                self.name
            )));
        }
        Ok(())
    }

    fn source_for(&self, canonical: CanonicalColumn) -> &ColumnSource {
        self.columns
            .iter()
            .find(|(c, _)| *c == canonical)
            .map(|(_, s)| s)
            .unwrap_or(&ColumnSource::Null)
    }

    pub fn required_source_columns(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = self
            .columns
            .iter()
            .filter(|(c, _)| c.is_required())
            .filter_map(|(_, s)| match s {
                ColumnSource::Column(name) => Some(*name),
                ColumnSource::Null => None,
            })
            .collect();
        if let PlatformBinding::Column(name) = self.platform {
            out.insert(0, name);
        }
        out
    }
}

/// `"Ad Set ID"` -> `"ad_set_id"`.
pub fn normalize_header_name(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches('\u{feff}').trim();
    HEADER_SEPARATORS
        .replace_all(trimmed, "_")
        .to_ascii_lowercase()
}

pub fn normalize_headers(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for old in names {
        let new = normalize_header_name(&old);
        if new != old {
            df.rename(&old, &new)?;
        }
    }
    Ok(())
}

/// One advertising record on the unified schema.
///
/// Metrics a platform does not track are `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRow {
    pub platform: Platform,
    pub date: NaiveDate,
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub ad_group_id: Option<String>,
    pub ad_group_name: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub conversions: f64,
    pub video_views: Option<u64>,
    pub engagement_rate: Option<f64>,
    pub reach: Option<u64>,
    pub frequency: Option<f64>,
    pub conversion_value: Option<f64>,
    pub quality_score: Option<f64>,
    pub search_impression_share: Option<f64>,
    pub video_watch_25: Option<u64>,
    pub video_watch_50: Option<u64>,
    pub video_watch_75: Option<u64>,
    pub video_watch_100: Option<u64>,
    pub likes: Option<u64>,
    pub shares: Option<u64>,
    pub comments: Option<u64>,
    pub metrics: DerivedMetrics,
}

impl UnifiedRow {
    /// Campaign label for display; falls back to the id.
    pub fn campaign_label(&self) -> &str {
        self.campaign_name.as_deref().unwrap_or(&self.campaign_id)
    }

    fn with_derived_metrics(mut self) -> Self {
        self.metrics = DerivedMetrics::compute(
            self.impressions as f64,
            self.clicks as f64,
            self.spend,
            self.conversions,
        );
        self
    }
}

struct ColumnReader<'a> {
    df: &'a DataFrame,
    schema: &'a SourceSchema,
    height: usize,
}

impl<'a> ColumnReader<'a> {
    fn resolve(&self, canonical: CanonicalColumn) -> Result<Option<&'static str>> {
        match self.schema.source_for(canonical) {
            ColumnSource::Null => Ok(None),
            ColumnSource::Column(name) => {
                if self.df.column(name).is_ok() {
                    Ok(Some(*name))
                } else if canonical.is_required() {
                    Err(PipelineError::missing_column(self.schema.name, name))
                } else {
                    warn!(
                        "{}: optional column '{}' not found, filling '{}' with nulls",
                        self.schema.name,
                        name,
                        canonical.name()
                    );
                    Ok(None)
                }
            }
        }
    }

    fn strings(&self, canonical: CanonicalColumn) -> Result<Vec<Option<String>>> {
        match self.resolve(canonical)? {
            None => Ok(vec![None; self.height]),
            Some(name) => {
                let series = self.df.column(name)?.cast(&DataType::String)?;
                let values = series
                    .str()?
                    .into_iter()
                    .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
                    .collect();
                Ok(values)
            }
        }
    }

    fn floats(&self, canonical: CanonicalColumn) -> Result<Vec<Option<f64>>> {
        match self.resolve(canonical)? {
            None => Ok(vec![None; self.height]),
            Some(name) => {
                let series = self.df.column(name)?.cast(&DataType::Float64)?;
                let values = series.f64()?.into_iter().collect();
                Ok(values)
            }
        }
    }

    fn counts(&self, canonical: CanonicalColumn) -> Result<Vec<Option<u64>>> {
        let column = self.schema.source_for(canonical);
        let column_name = match column {
            ColumnSource::Column(name) => *name,
            ColumnSource::Null => canonical.name(),
        };
        self.floats(canonical)?
            .into_iter()
            .enumerate()
            .map(|(row, v)| match v {
                None => Ok(None),
                Some(x) if !x.is_finite() || x < 0.0 => Err(PipelineError::invalid_value(
                    self.schema.name,
                    column_name,
                    row,
                    format!("expected a non-negative count, got {}", x),
                )),
                Some(x) if x.fract() != 0.0 => Err(PipelineError::invalid_value(
                    self.schema.name,
                    column_name,
                    row,
                    format!("expected an integer count, got {}", x),
                )),
                Some(x) => Ok(Some(x as u64)),
            })
            .collect()
    }
}

fn require<T>(value: Option<T>, schema: &SourceSchema, column: CanonicalColumn, row: usize) -> Result<T> {
    value.ok_or_else(|| {
        let name = match schema.source_for(column) {
            ColumnSource::Column(name) => *name,
            ColumnSource::Null => column.name(),
        };
        PipelineError::invalid_value(schema.name, name, row, "required value is null")
    })
}

fn non_negative(value: f64, schema: &SourceSchema, column: CanonicalColumn, row: usize) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        let name = match schema.source_for(column) {
            ColumnSource::Column(name) => *name,
            ColumnSource::Null => column.name(),
        };
        Err(PipelineError::invalid_value(
            schema.name,
            name,
            row,
            format!("expected a non-negative number, got {}", value),
        ))
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(0..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Projects one source frame onto the unified schema. Derived ratios are
/// not computed here; see [`unify`].
pub fn normalize_frame(df: &DataFrame, schema: &SourceSchema) -> Result<Vec<UnifiedRow>> {
    schema.validate()?;

    let mut df = df.clone();
    normalize_headers(&mut df)?;

    for required in schema.required_source_columns() {
        if df.column(required).is_err() {
            return Err(PipelineError::missing_column(schema.name, required));
        }
    }

    let height = df.height();
    let reader = ColumnReader {
        df: &df,
        schema,
        height,
    };

    let platforms: Vec<Option<Platform>> = match schema.platform {
        PlatformBinding::Fixed(p) => vec![Some(p); height],
        PlatformBinding::Column(name) => {
            let series = df.column(name)?.cast(&DataType::String)?;
            let mut out = Vec::with_capacity(height);
            for (row, v) in series.str()?.into_iter().enumerate() {
                let raw = v.ok_or_else(|| {
                    PipelineError::invalid_value(schema.name, name, row, "required value is null")
                })?;
                let platform = raw
                    .parse::<Platform>()
                    .map_err(|e| PipelineError::invalid_value(schema.name, name, row, e))?;
                out.push(Some(platform));
            }
            out
        }
    };

    let dates = reader.strings(CanonicalColumn::Date)?;
    let campaign_ids = reader.strings(CanonicalColumn::CampaignId)?;
    let campaign_names = reader.strings(CanonicalColumn::CampaignName)?;
    let ad_group_ids = reader.strings(CanonicalColumn::AdGroupId)?;
    let ad_group_names = reader.strings(CanonicalColumn::AdGroupName)?;
    let impressions = reader.counts(CanonicalColumn::Impressions)?;
    let clicks = reader.counts(CanonicalColumn::Clicks)?;
    let spend = reader.floats(CanonicalColumn::Spend)?;
    let conversions = reader.floats(CanonicalColumn::Conversions)?;
    let video_views = reader.counts(CanonicalColumn::VideoViews)?;
    let engagement_rate = reader.floats(CanonicalColumn::EngagementRate)?;
    let reach = reader.counts(CanonicalColumn::Reach)?;
    let frequency = reader.floats(CanonicalColumn::Frequency)?;
    let conversion_value = reader.floats(CanonicalColumn::ConversionValue)?;
    let quality_score = reader.floats(CanonicalColumn::QualityScore)?;
    let search_impression_share = reader.floats(CanonicalColumn::SearchImpressionShare)?;
    let watch_25 = reader.counts(CanonicalColumn::VideoWatch25)?;
    let watch_50 = reader.counts(CanonicalColumn::VideoWatch50)?;
    let watch_75 = reader.counts(CanonicalColumn::VideoWatch75)?;
    let watch_100 = reader.counts(CanonicalColumn::VideoWatch100)?;
    let likes = reader.counts(CanonicalColumn::Likes)?;
    let shares = reader.counts(CanonicalColumn::Shares)?;
    let comments = reader.counts(CanonicalColumn::Comments)?;

    let mut rows = Vec::with_capacity(height);
    for i in 0..height {
        let raw_date = require(dates[i].clone(), schema, CanonicalColumn::Date, i)?;
        let date = parse_date(&raw_date).ok_or_else(|| {
            PipelineError::invalid_value(schema.name, "date", i, format!("unparseable date '{}'", raw_date))
        })?;
        let spend_value = require(spend[i], schema, CanonicalColumn::Spend, i)?;
        let conversions_value = require(conversions[i], schema, CanonicalColumn::Conversions, i)?;

        rows.push(UnifiedRow {
            platform: require(platforms[i], schema, CanonicalColumn::Platform, i)?,
            date,
            campaign_id: require(campaign_ids[i].clone(), schema, CanonicalColumn::CampaignId, i)?,
            campaign_name: campaign_names[i].clone(),
            ad_group_id: ad_group_ids[i].clone(),
            ad_group_name: ad_group_names[i].clone(),
            impressions: require(impressions[i], schema, CanonicalColumn::Impressions, i)?,
            clicks: require(clicks[i], schema, CanonicalColumn::Clicks, i)?,
            spend: non_negative(spend_value, schema, CanonicalColumn::Spend, i)?,
            conversions: non_negative(conversions_value, schema, CanonicalColumn::Conversions, i)?,
            video_views: video_views[i],
            engagement_rate: engagement_rate[i],
            reach: reach[i],
            frequency: frequency[i],
            conversion_value: conversion_value[i],
            quality_score: quality_score[i],
            search_impression_share: search_impression_share[i],
            video_watch_25: watch_25[i],
            video_watch_50: watch_50[i],
            video_watch_75: watch_75[i],
            video_watch_100: watch_100[i],
            likes: likes[i],
            shares: shares[i],
            comments: comments[i],
            metrics: DerivedMetrics::default(),
        });
    }

    debug!("{}: normalized {} rows", schema.name, rows.len());
    Ok(rows)
}

/// Concatenates normalized sources in the given order, then derives the
/// per-row ratios uniformly. No row is dropped or deduplicated.
pub fn unify(sources: Vec<Vec<UnifiedRow>>) -> Vec<UnifiedRow> {
    sources
        .into_iter()
        .flatten()
        .map(UnifiedRow::with_derived_metrics)
        .collect()
}

pub fn normalize_platform_frame(platform: Platform, df: &DataFrame) -> Result<Vec<UnifiedRow>> {
    let schema = SourceSchema::for_platform(platform)?;
    normalize_frame(df, schema)
}
