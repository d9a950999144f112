//! Error types.

use chrono::NaiveDate;

#[derive(thiserror::Error, Debug)]
pub enum CaseLineError {
    #[error("No snapshot found for '{template}' between {start} and {end}")]
    SnapshotNotFound {
        template: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("No usable input tables")]
    EmptyInput,
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type CaseLineResult<T> = Result<T, CaseLineError>;
