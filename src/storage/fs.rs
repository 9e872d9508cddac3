//! Module to scan the library folder in the file system

use walkdir::WalkDir;

use std::path::{Path, PathBuf};

use crate::reporter::Reporter;

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac"];

pub fn is_music_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MUSIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lists the music files directly inside `folder`, sorted by path.
///
/// Unreadable entries are reported and skipped.
pub fn scan_dir(folder: &Path, reporter: &dyn Reporter) -> Vec<PathBuf> {
    let folder_str = folder.to_string_lossy();

    let mut paths = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                reporter.warn(&format!(
                    "error while scanning dir {folder_str}, skipping an entry: {err}"
                ));
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|e| is_music_file(e))
        .collect::<Vec<PathBuf>>();

    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::{reporter::testing::MemoryReporter, storage::fs::scan_dir};

    #[test]
    fn scan_finds_music_files_only() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let song1 = root.join("song1.mp3");
        let song2 = root.join("song2.FLAC");
        let not_music = root.join("notes.txt");
        let cache = root.join(".track_cache.json");

        std::fs::write(&song1, b"aaa").unwrap();
        std::fs::write(&song2, b"bbb").unwrap();
        std::fs::write(&not_music, b"ccc").unwrap();
        std::fs::write(&cache, b"[]").unwrap();

        let files = scan_dir(root, &MemoryReporter::default());

        assert_eq!(files, vec![song1, song2]);
    }

    #[test]
    fn scan_does_not_descend_into_subfolders() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let song = root.join("top.m4a");
        let nested_dir = root.join("nested");
        std::fs::create_dir_all(&nested_dir).unwrap();
        std::fs::write(&song, b"aaa").unwrap();
        std::fs::write(nested_dir.join("deep.mp3"), b"bbb").unwrap();

        let files = scan_dir(root, &MemoryReporter::default());

        assert_eq!(files, vec![song]);
    }
}
