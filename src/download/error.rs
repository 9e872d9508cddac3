use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("executable not found: {0}")]
    NotFound(PathBuf),

    #[error("permission denied running {0}")]
    PermissionDenied(PathBuf),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: PathBuf, timeout: Duration },

    #[error("downloader settings path not found in config output: {0}")]
    SettingsNotFound(String),

    #[error("downloader settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
