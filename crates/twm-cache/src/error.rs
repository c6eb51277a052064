use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by cache persistence.
///
/// Only genuine I/O failures surface here. Missing, legacy, corrupt, or mismatched cache data
/// is reported through [`crate::ReadMeta`] instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {message}")]
    Json { message: String },

    #[error("path {path} has no parent directory")]
    MissingParentDir { path: PathBuf },

    #[error("failed to publish {path} after {attempts} rename attempts: {source}")]
    RenameRetriesExhausted {
        path: PathBuf,
        attempts: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("cache task failed: {message}")]
    Task { message: String },
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        // Keep the category and location only; the payload may be arbitrarily large.
        let message = match err.classify() {
            serde_json::error::Category::Io => format!("io failure: {err}"),
            category => format!(
                "{category:?} error at line {} column {}",
                err.line(),
                err.column()
            ),
        };
        Self::Json { message }
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}
