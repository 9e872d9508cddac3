//! Terminal failure report: tracks still missing after every retry round

use std::path::Path;

use crate::{domain::track::RemoteTrackRef, reporter::Reporter, storage::error::StorageError};

/// Writes `tracks` as a pretty JSON array of `{title, artist, patterns}`.
///
/// Nothing is written for an empty list, and a report left over from an earlier
/// run is removed, so that the file's absence always means full success.
/// Returns whether a report was written.
pub fn write_failure_report(
    path: &Path,
    tracks: &[RemoteTrackRef],
    reporter: &dyn Reporter,
) -> Result<bool, StorageError> {
    if tracks.is_empty() {
        match std::fs::remove_file(path) {
            Ok(()) => reporter.debug(&format!(
                "removed stale failure report {}",
                path.to_string_lossy()
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(tracks)?;
    std::fs::write(path, json)?;
    Ok(true)
}

pub fn read_failure_report(path: &Path) -> Result<Vec<RemoteTrackRef>, StorageError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{domain::normalize::Normalizer, reporter::testing::MemoryReporter};

    #[test]
    fn writes_report_only_when_tracks_remain() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("out").join("missing_tracks.json");
        let n = Normalizer::default();
        let tracks = vec![
            RemoteTrackRef::new("Song A", "Artist", &n),
            RemoteTrackRef::new("Sång B", "Ärtist", &n),
        ];

        assert!(write_failure_report(&path, &tracks, &MemoryReporter::default())?);
        assert_eq!(read_failure_report(&path)?, tracks);
        assert!(std::fs::read_to_string(&path)?.contains("Sång B"));

        Ok(())
    }

    #[test]
    fn empty_list_leaves_no_file() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("missing_tracks.json");

        let reporter = MemoryReporter::default();

        assert!(!write_failure_report(&path, &[], &reporter)?);
        assert!(!path.exists());
        assert!(!reporter.contains("removed stale"));

        std::fs::write(&path, "[]")?;
        assert!(!write_failure_report(&path, &[], &reporter)?);
        assert!(!path.exists());
        assert!(reporter.contains("removed stale failure report"));

        Ok(())
    }
}
