use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::*;
use serde::Serialize;

use crate::ad_data_analyzer::AggregateTables;
use crate::ad_data_manager::{load_unified, AdDataSource};
use crate::dashboard_filter::{available_campaigns, date_bounds, DashboardFilter};
use crate::error::Result;
use crate::insight_engine::{generate_recommendations, Finding, InsightEngine, InsightInputs, InsightThresholds};
use crate::platform::Platform;
use crate::schema_normalizer::UnifiedRow;
use crate::view_cache::{Clock, SystemClock, TtlCache, DEFAULT_TTL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Unified,
}

#[derive(Debug, Serialize, Clone)]
pub struct LoadingProgress {
    pub step: String,
    pub message: String,
    pub progress: Option<f64>,
    pub completed: bool,
}

pub type ProgressCallback = Box<dyn Fn(&LoadingProgress)>;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub filter: DashboardFilter,
    pub rows: Vec<UnifiedRow>,
    pub tables: AggregateTables,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
}

impl DashboardSnapshot {
    /// Runs aggregation and insights over already-filtered rows. An empty
    /// scope short-circuits to empty tables and no findings.
    pub fn build(filter: DashboardFilter, rows: Vec<UnifiedRow>, engine: &InsightEngine) -> Self {
        let tables = AggregateTables::build(&rows);
        if rows.is_empty() {
            return DashboardSnapshot {
                filter,
                rows,
                tables,
                findings: Vec::new(),
                recommendations: Vec::new(),
            };
        }

        let findings = engine.generate(&InsightInputs {
            platforms: &tables.platforms,
            campaigns: &tables.campaigns,
            weekly: &tables.weekly,
        });
        let recommendations = generate_recommendations(&tables.platforms, &tables.campaigns);
        DashboardSnapshot {
            filter,
            rows,
            tables,
            findings,
            recommendations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Fetch, normalize, filter, aggregate and explain, with the fetched
/// table and every per-filter snapshot memoized for one staleness window.
pub struct Dashboard<S: AdDataSource, C: Clock = SystemClock> {
    source: S,
    clock: C,
    engine: InsightEngine,
    unified: TtlCache<QueryKey, Arc<Vec<UnifiedRow>>>,
    snapshots: TtlCache<DashboardFilter, Arc<DashboardSnapshot>>,
    progress: Option<ProgressCallback>,
}

impl<S: AdDataSource> Dashboard<S, SystemClock> {
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SystemClock::default(), &InsightThresholds::default(), DEFAULT_TTL)
    }
}

impl<S: AdDataSource, C: Clock> Dashboard<S, C> {
    pub fn with_clock(source: S, clock: C, thresholds: &InsightThresholds, ttl: Duration) -> Self {
        Dashboard {
            source,
            clock,
            engine: InsightEngine::new(thresholds),
            unified: TtlCache::new(ttl),
            snapshots: TtlCache::new(ttl),
            progress: None,
        }
    }

    pub fn with_engine(mut self, engine: InsightEngine) -> Self {
        self.engine = engine;
        self.snapshots.clear();
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn emit_progress(&self, step: &str, message: &str, progress: Option<f64>, completed: bool) {
        if let Some(ref callback) = self.progress {
            callback(&LoadingProgress {
                step: step.to_string(),
                message: message.to_string(),
                progress,
                completed,
            });
        }
    }

    /// The unified row table, refetched when stale. A refetch drops every
    /// cached snapshot so old and new aggregates never mix.
    pub fn unified_rows(&mut self) -> Result<Arc<Vec<UnifiedRow>>> {
        let now = self.clock.now();
        if let Some(rows) = self.unified.get(&QueryKey::Unified, now) {
            return Ok(rows);
        }

        self.snapshots.clear();
        self.emit_progress("fetch", &format!("Fetching from {}...", self.source.name()), Some(0.0), false);
        let start = Instant::now();

        let source = &self.source;
        let fetched = self
            .unified
            .get_or_try_insert_with(QueryKey::Unified, now, || load_unified(source).map(Arc::new));

        match fetched {
            Ok(rows) => {
                self.emit_progress(
                    "fetch",
                    &format!("Loaded {} rows ({:.2}s)", rows.len(), start.elapsed().as_secs_f64()),
                    Some(100.0),
                    true,
                );
                Ok(rows)
            }
            Err(e) => {
                error!("Refresh from {} failed: {}", self.source.name(), e);
                self.emit_progress("fetch", &format!("Fetch failed: {}", e), None, true);
                Err(e)
            }
        }
    }

    /// Aggregates and findings for `filter`, recomputed from the filtered
    /// unified rows.
    pub fn snapshot(&mut self, filter: &DashboardFilter) -> Result<Arc<DashboardSnapshot>> {
        let rows = self.unified_rows()?;
        let now = self.clock.now();
        if let Some(snapshot) = self.snapshots.get(filter, now) {
            debug!("Reusing snapshot for {:?}", filter);
            return Ok(snapshot);
        }

        let start = Instant::now();
        self.emit_progress("filter", "Applying filters...", Some(0.0), false);
        let scoped = filter.apply(&rows);
        self.emit_progress(
            "filter",
            &format!("{} of {} rows in scope", scoped.len(), rows.len()),
            Some(100.0),
            true,
        );

        if scoped.is_empty() {
            info!("No data for filter {:?}", filter);
        }

        self.emit_progress("aggregate", "Aggregating views and insights...", Some(0.0), false);
        let snapshot = Arc::new(DashboardSnapshot::build(filter.clone(), scoped, &self.engine));
        self.emit_progress(
            "aggregate",
            &format!(
                "{} findings, {} recommendations ({:.2}s)",
                snapshot.findings.len(),
                snapshot.recommendations.len(),
                start.elapsed().as_secs_f64()
            ),
            Some(100.0),
            true,
        );

        self.snapshots.insert(filter.clone(), snapshot.clone(), now);
        Ok(snapshot)
    }

    pub fn campaign_options(&mut self, platforms: &BTreeSet<Platform>) -> Result<Vec<String>> {
        Ok(available_campaigns(&self.unified_rows()?, platforms))
    }

    pub fn date_range(&mut self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        Ok(date_bounds(&self.unified_rows()?))
    }

    pub fn invalidate(&mut self) {
        self.unified.clear();
        self.snapshots.clear();
    }

    pub fn refresh(&mut self) -> Result<Arc<Vec<UnifiedRow>>> {
        self.invalidate();
        self.unified_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad_data_manager::{InMemoryAdSource, SourceTable};
    use crate::error::PipelineError;
    use crate::insight_engine::Severity;
    use crate::view_cache::ManualClock;
    use polars::prelude::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    fn unified_frame() -> DataFrame {
        df!(
            "platform" => &["Facebook", "Google", "TikTok", "Google"],
            "date" => &["2024-03-04", "2024-03-05", "2024-03-06", "2024-03-12"],
            "campaign_id" => &["fb_1", "g_1", "t_1", "g_1"],
            "campaign_name" => &["Spring", "Brand", "Creators", "Brand"],
            "impressions" => &[5000i64, 2000, 9000, 1000],
            "clicks" => &[100i64, 120, 90, 60],
            "spend" => &[100.0, 200.0, 300.0, 100.0],
            "conversions" => &[10.0, 10.0, 30.0, 5.0]
        )
        .unwrap()
    }

    struct FlakySource {
        inner: InMemoryAdSource,
        calls: Rc<Cell<usize>>,
        failing: Rc<Cell<bool>>,
    }

    impl AdDataSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn fetch_tables(&self) -> Result<Vec<SourceTable>> {
            self.calls.set(self.calls.get() + 1);
            if self.failing.get() {
                return Err(PipelineError::fetch("flaky", "timed out"));
            }
            self.inner.fetch_tables()
        }
    }

    fn dashboard() -> (Dashboard<FlakySource, ManualClock>, ManualClock, Rc<Cell<usize>>, Rc<Cell<bool>>) {
        let calls = Rc::new(Cell::new(0));
        let failing = Rc::new(Cell::new(false));
        let source = FlakySource {
            inner: InMemoryAdSource::new().with_unified_frame(unified_frame()),
            calls: calls.clone(),
            failing: failing.clone(),
        };
        let clock = ManualClock::new();
        let dashboard = Dashboard::with_clock(
            source,
            clock.clone(),
            &InsightThresholds::default(),
            Duration::from_secs(600),
        );
        (dashboard, clock, calls, failing)
    }

    #[test]
    fn fetches_once_per_staleness_window() {
        let (mut dashboard, clock, calls, _) = dashboard();
        let all = DashboardFilter::default();
        let google = DashboardFilter::default().with_platforms([Platform::Google]);

        let first = dashboard.snapshot(&all).unwrap();
        let again = dashboard.snapshot(&all).unwrap();
        dashboard.snapshot(&google).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&first, &again));

        clock.advance(Duration::from_secs(600));
        let refreshed = dashboard.snapshot(&all).unwrap();
        assert_eq!(calls.get(), 2);
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[test]
    fn failed_refetch_propagates_and_keeps_no_stale_data() {
        let (mut dashboard, clock, calls, failing) = dashboard();
        let all = DashboardFilter::default();
        dashboard.snapshot(&all).unwrap();

        clock.advance(Duration::from_secs(601));
        failing.set(true);
        let err = dashboard.snapshot(&all).unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));

        // nothing stale is served while the source is down
        assert!(dashboard.snapshot(&all).is_err());
        assert_eq!(calls.get(), 3);

        failing.set(false);
        assert_eq!(dashboard.snapshot(&all).unwrap().rows.len(), 4);
    }

    #[test]
    fn views_are_recomputed_from_filtered_rows() {
        let (mut dashboard, _, _, _) = dashboard();
        let scoped = DashboardFilter::default().with_platforms([Platform::Google, Platform::TikTok]);
        let snapshot = dashboard.snapshot(&scoped).unwrap();

        assert_eq!(snapshot.tables.platforms.len(), 2);
        let share_total: f64 = snapshot.tables.platforms.iter().map(|p| p.spend_share).sum();
        assert!((share_total - 1.0).abs() < 1e-9);
        assert!(snapshot.tables.campaigns.iter().all(|c| c.platform != Platform::Facebook));
        assert_eq!(snapshot.tables.overview.totals.spend, 600.0);
    }

    #[test]
    fn empty_scope_is_a_state_not_an_error() {
        let (mut dashboard, _, _, _) = dashboard();
        let start = NaiveDate::from_ymd_opt(2025, 1, 1);
        let filter = DashboardFilter::default().with_dates(start, None);
        let snapshot = dashboard.snapshot(&filter).unwrap();

        assert!(snapshot.is_empty());
        assert!(snapshot.findings.is_empty());
        assert!(snapshot.recommendations.is_empty());
        assert!(snapshot.tables.platforms.is_empty());
    }

    #[test]
    fn full_scope_produces_findings() {
        let (mut dashboard, _, _, _) = dashboard();
        let snapshot = dashboard.snapshot(&DashboardFilter::default()).unwrap();
        assert!(!snapshot.findings.is_empty());
        assert!(snapshot.findings.iter().any(|f| f.severity == Severity::Warning));
        assert!(!snapshot.recommendations.is_empty());
    }

    #[test]
    fn refresh_and_invalidate_force_a_refetch() {
        let (mut dashboard, _, calls, _) = dashboard();
        dashboard.unified_rows().unwrap();
        dashboard.refresh().unwrap();
        assert_eq!(calls.get(), 2);
        dashboard.invalidate();
        dashboard.unified_rows().unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn selector_helpers() {
        let (mut dashboard, _, _, _) = dashboard();
        let google: BTreeSet<Platform> = [Platform::Google].into_iter().collect();
        assert_eq!(dashboard.campaign_options(&google).unwrap(), vec!["Brand"]);
        let (first, last) = dashboard.date_range().unwrap().unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
    }

    #[test]
    fn reports_progress_per_stage() {
        let steps: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = steps.clone();
        let (dashboard, _, _, _) = dashboard();
        let mut dashboard = dashboard.with_progress(Box::new(move |p: &LoadingProgress| {
            if p.completed {
                sink.borrow_mut().push(p.step.clone());
            }
        }));

        dashboard.snapshot(&DashboardFilter::default()).unwrap();
        assert_eq!(*steps.borrow(), vec!["fetch", "filter", "aggregate"]);
    }
}
