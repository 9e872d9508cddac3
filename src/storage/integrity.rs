//! Structural checks for downloaded audio files

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use lofty::{file::AudioFile, read_from_path};

use crate::{
    domain::track::CorruptFileRecord,
    reporter::Reporter,
    storage::{error::StorageError, fs},
};

const MIN_DURATION: Duration = Duration::from_secs(1);

/// Fail-closed validity check: any inspection error counts as invalid.
pub fn verify(path: &Path) -> bool {
    inspect(path).is_ok()
}

/// Explains why a file is invalid.
///
/// Rejects empty files, files lofty cannot open as a known container
/// and tracks shorter than one second.
pub fn inspect(path: &Path) -> Result<Duration, StorageError> {
    let invalid = |reason: String| StorageError::InvalidAudio {
        path: path.to_path_buf(),
        reason,
    };

    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(invalid("not a regular file".into()));
    }
    if meta.len() == 0 {
        return Err(invalid("file is empty".into()));
    }

    let tagged = read_from_path(path).map_err(|e| invalid(e.to_string()))?;
    let duration = tagged.properties().duration();
    if duration < MIN_DURATION {
        return Err(invalid(format!("duration {duration:?} is under one second")));
    }

    Ok(duration)
}

/// Verifies every music file in `folder`, returning the corrupt ones.
pub fn verify_folder(folder: &Path, reporter: &dyn Reporter) -> Vec<CorruptFileRecord> {
    let files: Vec<PathBuf> = fs::scan_dir(folder, reporter);
    reporter.info(&format!("verifying {} audio files", files.len()));

    files
        .iter()
        .filter_map(|path| match inspect(path) {
            Ok(_) => None,
            Err(e) => {
                reporter.warn(&format!("[CORRUPT] {e}"));
                Some(CorruptFileRecord::from_path(path))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::reporter::testing::MemoryReporter;

    #[test]
    fn zero_byte_file_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Band - Song.mp3");
        std::fs::write(&path, b"").unwrap();

        assert!(!verify(&path));
        let err = inspect(&path).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn garbage_bytes_are_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Band - Song.flac");
        std::fs::write(&path, b"definitely not a flac stream").unwrap();

        assert!(!verify(&path));
    }

    #[test]
    fn missing_file_is_invalid() {
        let tmp = TempDir::new().unwrap();
        assert!(!verify(&tmp.path().join("nope.mp3")));
    }

    #[test]
    fn verify_folder_reports_corrupt_files_with_parsed_names() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Band - Song.mp3"), b"").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"").unwrap();
        let reporter = MemoryReporter::default();

        let corrupt = verify_folder(tmp.path(), &reporter);

        assert_eq!(corrupt.len(), 1);
        assert_eq!(corrupt[0].artist, "Band");
        assert_eq!(corrupt[0].title, "Song");
        assert!(reporter.contains("[CORRUPT]"));
    }
}
