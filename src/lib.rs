pub mod ad_data_analyzer;
pub mod ad_data_manager;
pub mod config_manager;
pub mod dashboard;
pub mod dashboard_filter;
pub mod error;
pub mod insight_engine;
pub mod metric_calculator;
pub mod platform;
pub mod schema_normalizer;
pub mod table_export;
pub mod view_cache;

pub use ad_data_analyzer::{AggregateTables, MetricTotals, OverviewKpis};
pub use ad_data_manager::{load_unified, AdDataManager, AdDataSource, InMemoryAdSource, SourceTable};
pub use config_manager::{AppConfig, ConfigManager};
pub use dashboard::{Dashboard, DashboardSnapshot, LoadingProgress, QueryKey};
pub use dashboard_filter::DashboardFilter;
pub use error::{PipelineError, Result};
pub use insight_engine::{Finding, InsightCategory, InsightEngine, InsightRule, InsightThresholds, Severity};
pub use metric_calculator::DerivedMetrics;
pub use platform::Platform;
pub use schema_normalizer::{SourceSchema, UnifiedRow};
pub use table_export::{export_snapshot, ExportFormat};
pub use view_cache::{Clock, ManualClock, SystemClock, TtlCache};
