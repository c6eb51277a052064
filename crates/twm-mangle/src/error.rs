use std::path::PathBuf;
use twm_cache::CacheError;

pub type Result<T> = std::result::Result<T, MangleError>;

#[derive(Debug, thiserror::Error)]
pub enum MangleError {
    /// A glob or regular expression in the allocator configuration does not compile.
    #[error("invalid {kind} pattern {pattern:?}: {message}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        message: String,
    },

    #[error("invalid token inventory {path}: {message}")]
    Inventory { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("class extraction failed: {0:#}")]
    Extraction(#[source] anyhow::Error),
}
