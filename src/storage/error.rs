use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("library folder {0} could not be created")]
    LibraryFolder(PathBuf, #[source] std::io::Error),

    #[error("cache at {0} is stale")]
    StaleCache(PathBuf),

    #[error("{path} is not a valid audio file: {reason}")]
    InvalidAudio { path: PathBuf, reason: String },
}
