use caseline::error::CaseLineError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum CaseLineCliError {
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("caseline error: {0}")]
    CaseLineError(#[from] CaseLineError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type CaseLineCliResult<T> = Result<T, CaseLineCliError>;
