use std::path::PathBuf;

use thiserror::Error;

use crate::browser::BrowserError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("browser error during export: {0}")]
    Browser(#[from] BrowserError),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid header profile {profile}: {reason}")]
    HeaderProfile { profile: String, reason: String },
    #[error("export {path} did not complete: {reason}")]
    Incomplete { path: PathBuf, reason: String },
}

impl From<reqwest::Error> for ExportError {
    fn from(error: reqwest::Error) -> Self {
        ExportError::Network(error.to_string())
    }
}

pub type ExportResult<T> = Result<T, ExportError>;
