use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::schema_normalizer::UnifiedRow;

/// The analyst's current scope, as handed over by the UI collaborator.
///
/// Date bounds are inclusive and each may be open. `campaigns: None`
/// selects every campaign on the selected platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DashboardFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub platforms: BTreeSet<Platform>,
    pub campaigns: Option<BTreeSet<String>>,
}

impl Default for DashboardFilter {
    fn default() -> Self {
        DashboardFilter {
            start: None,
            end: None,
            platforms: Platform::ALL.iter().copied().collect(),
            campaigns: None,
        }
    }
}

impl DashboardFilter {
    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    pub fn with_campaigns<S: Into<String>>(mut self, campaigns: impl IntoIterator<Item = S>) -> Self {
        self.campaigns = Some(campaigns.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, row: &UnifiedRow) -> bool {
        if let Some(start) = self.start {
            if row.date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if row.date > end {
                return false;
            }
        }
        if !self.platforms.contains(&row.platform) {
            return false;
        }
        match &self.campaigns {
            Some(selected) => selected.contains(row.campaign_label()),
            None => true,
        }
    }

    pub fn apply(&self, rows: &[UnifiedRow]) -> Vec<UnifiedRow> {
        rows.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

pub fn available_campaigns(rows: &[UnifiedRow], platforms: &BTreeSet<Platform>) -> Vec<String> {
    rows.iter()
        .filter(|r| platforms.contains(&r.platform))
        .map(|r| r.campaign_label().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn date_bounds(rows: &[UnifiedRow]) -> Option<(NaiveDate, NaiveDate)> {
    let min = rows.iter().map(|r| r.date).min()?;
    let max = rows.iter().map(|r| r.date).max()?;
    Some((min, max))
}


#[cfg(test)]
mod tests {
    use super::test_rows::row;
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample() -> Vec<UnifiedRow> {
        vec![
            row(Platform::Facebook, "2024-03-01", "Spring", 100, 5, 10.0, 1.0),
            row(Platform::Google, "2024-03-02", "Brand", 100, 5, 10.0, 1.0),
            row(Platform::TikTok, "2024-03-03", "Creators", 100, 5, 10.0, 1.0),
            row(Platform::Google, "2024-03-04", "Generic", 100, 5, 10.0, 1.0),
        ]
    }

    #[test]
    fn date_bounds_are_inclusive_and_optional() {
        let rows = sample();
        let f = DashboardFilter::default().with_dates(Some(d("2024-03-02")), Some(d("2024-03-03")));
        assert_eq!(f.apply(&rows).len(), 2);

        let open_start = DashboardFilter::default().with_dates(None, Some(d("2024-03-02")));
        assert_eq!(open_start.apply(&rows).len(), 2);

        let unbounded = DashboardFilter::default();
        assert_eq!(unbounded.apply(&rows).len(), 4);
    }

    #[test]
    fn platform_and_campaign_selection() {
        let rows = sample();
        let f = DashboardFilter::default()
            .with_platforms([Platform::Google])
            .with_campaigns(["Brand", "Spring"]);
        let out = f.apply(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].campaign_label(), "Brand");
    }

    #[test]
    fn empty_selection_is_an_empty_scope_not_an_error() {
        let rows = sample();
        let f = DashboardFilter::default().with_platforms(Vec::<Platform>::new());
        assert!(f.apply(&rows).is_empty());
    }

    #[test]
    fn campaign_options_are_scoped_to_platforms() {
        let rows = sample();
        let google: BTreeSet<Platform> = [Platform::Google].into_iter().collect();
        assert_eq!(available_campaigns(&rows, &google), vec!["Brand", "Generic"]);
    }

    #[test]
    fn bounds_of_empty_input() {
        assert_eq!(date_bounds(&[]), None);
        assert_eq!(date_bounds(&sample()), Some((d("2024-03-01"), d("2024-03-04"))));
    }
}
