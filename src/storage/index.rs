//! Local library index: normalized identity keys of the audio files on disk,
//! with a best-effort JSON cache next to the files.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, SystemTime},
};

use crate::{
    domain::normalize::{NormalizedKey, Normalizer},
    reporter::Reporter,
    storage::{error::StorageError, fs},
};

pub const CACHE_FILE_NAME: &str = ".track_cache.json";

pub type LocalKeys = BTreeSet<NormalizedKey>;

/// Identity keys derived from one audio file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrackEntry {
    pub keys: Vec<NormalizedKey>,
}

impl LocalTrackEntry {
    /// The stem as-is, plus `"segment1 segment2"` when the stem contains `" - "`.
    pub fn from_path(path: &Path, normalizer: &Normalizer) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut keys = vec![normalizer.normalize(&stem)];
        let mut segments = stem.split(" - ");
        if let (Some(first), Some(second)) = (segments.next(), segments.next()) {
            let joined = normalizer.normalize(&format!("{first} {second}"));
            if !keys.contains(&joined) {
                keys.push(joined);
            }
        }

        Self { keys }
    }
}

/// Where the keys of an [`IndexSnapshot`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    /// the library folder did not exist and was just created
    CreatedFolder,
    Cache { written_at: SystemTime },
    Scan { files: usize },
}

#[derive(Debug)]
pub struct IndexSnapshot {
    pub keys: LocalKeys,
    pub source: IndexSource,
}

/// Cache validity: the folder must not have changed after the cache was written,
/// and the cache must be younger than `ttl`.
pub fn cache_is_fresh(
    dir_mtime: SystemTime,
    cache_mtime: SystemTime,
    now: SystemTime,
    ttl: Duration,
) -> bool {
    if dir_mtime > cache_mtime {
        return false;
    }
    match now.duration_since(cache_mtime) {
        Ok(age) => age < ttl,
        // cache stamped in the future, clock skew
        Err(_) => true,
    }
}

pub struct LocalIndex {
    folder: PathBuf,
    cache_enabled: bool,
    cache_ttl: Duration,
    normalizer: Normalizer,
    reporter: Rc<dyn Reporter>,
}

impl LocalIndex {
    pub fn new(folder: PathBuf, normalizer: Normalizer, reporter: Rc<dyn Reporter>) -> Self {
        Self {
            folder,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            normalizer,
            reporter,
        }
    }

    pub fn with_cache(mut self, enabled: bool, ttl: Duration) -> Self {
        self.cache_enabled = enabled;
        self.cache_ttl = ttl;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn cache_path(&self) -> PathBuf {
        self.folder.join(CACHE_FILE_NAME)
    }

    /// Loads the keys from a fresh cache, or scans the folder and rewrites the cache.
    pub fn build(&self) -> IndexSnapshot {
        self.build_inner(self.cache_enabled)
    }

    /// Always rescans, ignoring any cache; used after downloads landed new files.
    pub fn refresh(&self) -> IndexSnapshot {
        self.build_inner(false)
    }

    fn build_inner(&self, use_cache: bool) -> IndexSnapshot {
        if !self.folder.exists() {
            if let Err(e) = std::fs::create_dir_all(&self.folder) {
                let err = StorageError::LibraryFolder(self.folder.clone(), e);
                self.reporter.warn(&format!("{err}, continuing with an empty library"));
            } else {
                self.reporter.info(&format!(
                    "created library folder {}",
                    self.folder.to_string_lossy()
                ));
            }
            return IndexSnapshot {
                keys: LocalKeys::new(),
                source: IndexSource::CreatedFolder,
            };
        }

        if use_cache {
            match self.load_cache() {
                Ok((keys, written_at)) => {
                    self.reporter
                        .debug(&format!("loaded {} local keys from cache", keys.len()));
                    return IndexSnapshot {
                        keys,
                        source: IndexSource::Cache { written_at },
                    };
                }
                Err(e) => self.reporter.debug(&format!("local index cache miss: {e}")),
            }
        }

        let files = fs::scan_dir(&self.folder, self.reporter.as_ref());
        let mut keys = LocalKeys::new();
        for path in &files {
            let entry = LocalTrackEntry::from_path(path, &self.normalizer);
            self.reporter.debug(&format!(
                "[LOCAL] {} -> {}",
                path.file_name().unwrap_or_default().to_string_lossy(),
                entry
                    .keys
                    .iter()
                    .map(NormalizedKey::as_str)
                    .collect::<Vec<_>>()
                    .join(" / ")
            ));
            keys.extend(entry.keys);
        }

        if self.cache_enabled {
            if let Err(e) = self.store_cache(&keys) {
                self.reporter
                    .warn(&format!("failed to write local index cache: {e}"));
            }
        }

        IndexSnapshot {
            keys,
            source: IndexSource::Scan { files: files.len() },
        }
    }

    fn load_cache(&self) -> Result<(LocalKeys, SystemTime), StorageError> {
        let cache_path = self.cache_path();
        let cache_mtime = std::fs::metadata(&cache_path)?.modified()?;
        let dir_mtime = std::fs::metadata(&self.folder)?.modified()?;

        if !cache_is_fresh(dir_mtime, cache_mtime, SystemTime::now(), self.cache_ttl) {
            return Err(StorageError::StaleCache(cache_path));
        }

        let contents = std::fs::read_to_string(&cache_path)?;
        let keys: Vec<NormalizedKey> = serde_json::from_str(&contents)?;
        if keys.is_empty() {
            return Err(StorageError::StaleCache(cache_path));
        }

        Ok((keys.into_iter().collect(), cache_mtime))
    }

    fn store_cache(&self, keys: &LocalKeys) -> Result<(), StorageError> {
        let json = serde_json::to_string(&keys.iter().collect::<Vec<_>>())?;
        std::fs::write(self.cache_path(), json)?;
        Ok(())
    }
}
