//! Null-safe marketing efficiency ratios.
//!
//! Every ratio is `None` when its denominator is zero or untracked. Values
//! are kept un-rounded; [`round_rate`] and [`round_currency`] exist for the
//! display layer only.

use serde::{Deserialize, Serialize};

pub const RATE_PRECISION: i32 = 4;
pub const CURRENCY_PRECISION: i32 = 2;

/// `num / den` when `den > 0`, otherwise `None`. A `None` on either side
/// propagates.
pub fn ratio(num: impl Into<Option<f64>>, den: impl Into<Option<f64>>) -> Option<f64> {
    match (num.into(), den.into()) {
        (Some(n), Some(d)) if d > 0.0 && n.is_finite() && d.is_finite() => Some(n / d),
        _ => None,
    }
}

pub fn ctr(clicks: f64, impressions: f64) -> Option<f64> {
    ratio(clicks, impressions)
}

pub fn cpc(spend: f64, clicks: f64) -> Option<f64> {
    ratio(spend, clicks)
}

pub fn cpa(spend: f64, conversions: f64) -> Option<f64> {
    ratio(spend, conversions)
}

pub fn conversion_rate(conversions: f64, clicks: f64) -> Option<f64> {
    ratio(conversions, clicks)
}

pub fn cpm(spend: f64, impressions: f64) -> Option<f64> {
    ratio(spend, impressions).map(|v| v * 1000.0)
}

/// Only defined where conversion value is tracked.
pub fn roas(conversion_value: Option<f64>, spend: f64) -> Option<f64> {
    ratio(conversion_value, spend)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn round_rate(value: Option<f64>) -> Option<f64> {
    value.map(|v| round_to(v, RATE_PRECISION))
}

pub fn round_currency(value: Option<f64>) -> Option<f64> {
    value.map(|v| round_to(v, CURRENCY_PRECISION))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub cpa: Option<f64>,
    pub conversion_rate: Option<f64>,
    pub cpm: Option<f64>,
}

impl DerivedMetrics {
    pub fn compute(impressions: f64, clicks: f64, spend: f64, conversions: f64) -> Self {
        DerivedMetrics {
            ctr: ctr(clicks, impressions),
            cpc: cpc(spend, clicks),
            cpa: cpa(spend, conversions),
            conversion_rate: conversion_rate(conversions, clicks),
            cpm: cpm(spend, impressions),
        }
    }

    pub fn rounded(&self) -> Self {
        DerivedMetrics {
            ctr: round_rate(self.ctr),
            cpc: round_currency(self.cpc),
            cpa: round_currency(self.cpa),
            conversion_rate: round_rate(self.conversion_rate),
            cpm: round_currency(self.cpm),
        }
    }
}
