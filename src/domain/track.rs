use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::normalize::{NormalizedKey, Normalizer};

/// A track from the remote playlist.
///
/// Immutable once built; matching and retry state lives in the caller's lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrackRef {
    title: String,
    artist: String,
    patterns: [NormalizedKey; 2],
}

impl RemoteTrackRef {
    /// Builds the track with its `"title - artist"` and `"artist - title"` patterns.
    pub fn new(title: impl Into<String>, artist: impl Into<String>, normalizer: &Normalizer) -> Self {
        let title = title.into();
        let artist = artist.into();
        let patterns = [
            normalizer.normalize(&format!("{title} - {artist}")),
            normalizer.normalize(&format!("{artist} - {title}")),
        ];
        Self {
            title,
            artist,
            patterns,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn patterns(&self) -> &[NormalizedKey; 2] {
        &self.patterns
    }

    /// `"title - artist"` label for log lines
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

/// Result of reconciling one track against the local keys.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub track: RemoteTrackRef,
    pub matched: bool,
    /// similarity of the first pair that crossed the threshold
    pub score: Option<f64>,
    pub local_key: Option<NormalizedKey>,
}

#[derive(Debug, Clone)]
pub struct DownloadAttemptResult {
    pub track: RemoteTrackRef,
    pub succeeded: bool,
}

/// A library file that failed integrity verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptFileRecord {
    pub path: PathBuf,
    pub artist: String,
    pub title: String,
}

impl CorruptFileRecord {
    /// Parses `"Artist - Title.ext"`; without a separator the whole stem is the title.
    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (artist, title) = match stem.split_once(" - ") {
            Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
            None => (String::new(), stem.trim().to_string()),
        };

        Self {
            path: path.to_path_buf(),
            artist,
            title,
        }
    }
}
