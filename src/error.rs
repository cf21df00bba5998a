use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a refresh.
///
/// Empty scopes and null ratios are not errors; they surface as empty
/// tables and `None` metrics.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{source_name}: required column '{column}' is missing")]
    MissingColumn {
        source_name: String,
        column: String,
    },

    /// A cell in a required column is null, unparseable or out of range.
    #[error("{source_name}: invalid value in column '{column}' at row {row}: {reason}")]
    InvalidValue {
        source_name: String,
        column: String,
        row: usize,
        reason: String,
    },

    #[error("invalid source schema: {0}")]
    InvalidSchema(String),

    #[error("failed to fetch {source_name}: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },

    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn missing_column(source_name: &str, column: &str) -> Self {
        PipelineError::MissingColumn {
            source_name: source_name.to_string(),
            column: column.to_string(),
        }
    }

    pub fn invalid_value(source_name: &str, column: &str, row: usize, reason: impl Into<String>) -> Self {
        PipelineError::InvalidValue {
            source_name: source_name.to_string(),
            column: column.to_string(),
            row,
            reason: reason.into(),
        }
    }

    pub fn fetch(source_name: &str, message: impl Into<String>) -> Self {
        PipelineError::Fetch {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Schema errors are fatal input problems that retrying cannot fix.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingColumn { .. }
                | PipelineError::InvalidValue { .. }
                | PipelineError::InvalidSchema(_)
        )
    }
}
