//! Finding input clips in a directory.

use std::path::{Path, PathBuf};

/// Regular files (or symlinks to them) directly inside `dir` whose extension is in `extensions`
/// (case-insensitive), sorted by path.
pub fn list_videos(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut videos = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Follows symlinks
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches {
            videos.push(path);
        }
    }

    videos.sort();
    Ok(videos)
}
