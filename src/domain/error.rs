use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Catalog service error: {0}")]
    Service(String),

    #[error("Unexpected catalog response: {0}")]
    Parse(String),

    #[error("Destination is not a usable directory: {}", .0.display())]
    InvalidDestination(PathBuf),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Worker(String),
}

impl AppError {
    /// Whether running the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network(_))
    }
}

impl From<ApiError> for AppError {
    fn from(error: ApiError) -> Self {
        let message = error.to_string();
        match error {
            ApiError::EmptyQuery => AppError::InvalidInput(message),
            ApiError::Transient(_) => AppError::Network(message),
            ApiError::Client(_) => AppError::Config(message),
            ApiError::Service { .. } | ApiError::Rejected { .. } => AppError::Service(message),
            ApiError::Parse(_) | ApiError::InvalidUrl(_) => AppError::Parse(message),
        }
    }
}

/// Why a single cloudcast could not be fetched. Recorded on the job, never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadItemError {
    #[error("could not start media engine: {0}")]
    Spawn(String),

    #[error("media engine exited with {}: {message}", describe_exit(.code))]
    Engine { code: Option<i32>, message: String },

    #[error("media engine reported success but produced no file at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("could not write destination file: {0}")]
    Io(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

impl From<std::io::Error> for DownloadItemError {
    fn from(error: std::io::Error) -> Self {
        DownloadItemError::Io(error.to_string())
    }
}
