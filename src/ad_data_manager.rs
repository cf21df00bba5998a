use std::path::{Path, PathBuf};
use std::time::Instant;

use log::*;
use polars::prelude::*;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::platform::Platform;
use crate::schema_normalizer::{normalize_frame, normalize_header_name, unify, SourceSchema, UnifiedRow};

#[derive(Debug, Clone)]
pub struct SourceTable {
    pub origin: String,
    pub schema: SourceSchema,
    pub frame: DataFrame,
}

/// The storage/query boundary. Implementations block until a complete
/// table is available; partial results are not supported.
pub trait AdDataSource {
    fn name(&self) -> &str;

    fn fetch_tables(&self) -> Result<Vec<SourceTable>>;
}

pub fn load_unified(source: &dyn AdDataSource) -> Result<Vec<UnifiedRow>> {
    let start = Instant::now();
    let tables = source.fetch_tables()?;

    let mut normalized = Vec::with_capacity(tables.len());
    for table in &tables {
        let rows = normalize_frame(&table.frame, &table.schema)?;
        info!("{} ({}): {} rows", table.origin, table.schema.name, rows.len());
        normalized.push(rows);
    }

    let unified = unify(normalized);
    info!(
        "[{}] unified {} rows from {} tables in {:.2}s",
        source.name(),
        unified.len(),
        tables.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(unified)
}

/// Flat-file source: one or more CSV exports per platform in a data
/// directory, matched by file-name glob.
#[derive(Debug, Clone)]
pub struct AdDataManager {
    data_dir_path: PathBuf,
    file_patterns: Vec<(Platform, String)>,
}

impl AdDataManager {
    pub fn new(data_dir_path: impl Into<PathBuf>) -> Self {
        AdDataManager {
            data_dir_path: data_dir_path.into(),
            file_patterns: vec![
                (Platform::Facebook, "*facebook*.csv".to_string()),
                (Platform::Google, "*google*.csv".to_string()),
                (Platform::TikTok, "*tiktok*.csv".to_string()),
            ],
        }
    }

    pub fn with_pattern(mut self, platform: Platform, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        match self.file_patterns.iter_mut().find(|(p, _)| *p == platform) {
            Some(entry) => entry.1 = pattern,
            None => self.file_patterns.push((platform, pattern)),
        }
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir_path
    }

    pub fn find_platform_files(&self, platform: Platform) -> Vec<PathBuf> {
        let pattern = match self.file_patterns.iter().find(|(p, _)| *p == platform) {
            Some((_, pattern)) => pattern.to_ascii_lowercase(),
            None => return Vec::new(),
        };

        let mut files: Vec<PathBuf> = WalkDir::new(&self.data_dir_path)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| glob_match::glob_match(&pattern, &name.to_ascii_lowercase()))
                    .unwrap_or(false)
            })
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// Checks the header row before handing the file to polars, so a
    /// missing required column fails without parsing the whole file.
    fn check_headers(&self, path: &Path, schema: &SourceSchema) -> Result<()> {
        let file_name = path.display().to_string();
        let mut csv_reader = csv::Reader::from_path(path)
            .map_err(|e| PipelineError::fetch(&file_name, format!("failed to open CSV: {}", e)))?;
        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| PipelineError::fetch(&file_name, format!("failed to read CSV headers: {}", e)))?
            .iter()
            .map(normalize_header_name)
            .collect();

        for required in schema.required_source_columns() {
            if !headers.iter().any(|h| h == required) {
                return Err(PipelineError::missing_column(schema.name, required));
            }
        }
        Ok(())
    }

    fn read_csv(&self, path: &Path) -> Result<DataFrame> {
        let file_name = path.display().to_string();
        CsvReader::from_path(path)
            .map_err(|e| PipelineError::fetch(&file_name, format!("failed to open data file: {}", e)))?
            .has_header(true)
            .infer_schema(None)
            .finish()
            .map_err(|e| PipelineError::fetch(&file_name, format!("failed to parse CSV: {}", e)))
    }
}

impl AdDataSource for AdDataManager {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_tables(&self) -> Result<Vec<SourceTable>> {
        if !self.data_dir_path.is_dir() {
            return Err(PipelineError::fetch(
                &self.data_dir_path.display().to_string(),
                "data directory does not exist",
            ));
        }

        let mut tables = Vec::new();
        for platform in Platform::ALL {
            let schema = SourceSchema::for_platform(platform)?;
            let files = self.find_platform_files(platform);
            if files.is_empty() {
                warn!("No {} export found in {}", platform, self.data_dir_path.display());
                continue;
            }
            for path in files {
                self.check_headers(&path, schema)?;
                let frame = self.read_csv(&path)?;
                debug!("Loaded {} ({} rows)", path.display(), frame.height());
                tables.push(SourceTable {
                    origin: path.display().to_string(),
                    schema: schema.clone(),
                    frame,
                });
            }
        }
        Ok(tables)
    }
}

/// Source backed by frames already in memory: tests, or a warehouse
/// adapter that has materialized its query results.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAdSource {
    tables: Vec<SourceTable>,
}

impl InMemoryAdSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platform_frame(mut self, platform: Platform, frame: DataFrame) -> Result<Self> {
        let schema = SourceSchema::for_platform(platform)?.clone();
        self.tables.push(SourceTable {
            origin: format!("memory:{}", platform),
            schema,
            frame,
        });
        Ok(self)
    }

    pub fn with_unified_frame(mut self, frame: DataFrame) -> Self {
        self.tables.push(SourceTable {
            origin: "memory:unified".to_string(),
            schema: SourceSchema::unified("unified_ads"),
            frame,
        });
        self
    }
}

impl AdDataSource for InMemoryAdSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_tables(&self) -> Result<Vec<SourceTable>> {
        Ok(self.tables.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TIKTOK_CSV: &str = "date,campaign_id,campaign_name,adgroup_id,adgroup_name,impressions,clicks,cost,conversions,video_views,video_watch_25,video_watch_50,video_watch_75,video_watch_100,likes,shares,comments\n\
2024-03-04,t_1,Creator Push,ag_1,UGC,2000,40,30.5,3,900,600,400,250,100,50,5,7\n\
2024-03-05,t_1,Creator Push,ag_1,UGC,1800,36,28.0,2,850,580,390,240,90,44,4,6\n";

    #[test]
    fn finds_platform_files_by_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("03_tiktok_ads.csv"), TIKTOK_CSV).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let manager = AdDataManager::new(dir.path());
        assert_eq!(manager.find_platform_files(Platform::TikTok).len(), 1);
        assert!(manager.find_platform_files(Platform::Google).is_empty());
    }

    #[test]
    fn loads_csv_into_unified_rows() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("03_tiktok_ads.csv"), TIKTOK_CSV).unwrap();

        let rows = load_unified(&AdDataManager::new(dir.path())).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].platform, Platform::TikTok);
        assert_eq!(rows[0].spend, 30.5);
        assert_eq!(rows[0].video_watch_100, Some(100));
        assert_eq!(rows[0].quality_score, None);
    }

    #[test]
    fn header_check_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("02_google_ads.csv"),
            "date,campaign_id,impressions,clicks,conversions\n2024-03-04,g_1,1,1,0\n",
        )
        .unwrap();

        let err = load_unified(&AdDataManager::new(dir.path())).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "cost"));
    }

    #[test]
    fn missing_directory_is_a_fetch_error() {
        let err = AdDataManager::new("/definitely/not/here").fetch_tables().unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
    }

    #[test]
    fn custom_pattern_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tt_export.csv"), TIKTOK_CSV).unwrap();

        let manager = AdDataManager::new(dir.path()).with_pattern(Platform::TikTok, "tt_*.csv");
        assert_eq!(manager.find_platform_files(Platform::TikTok).len(), 1);
    }
}
