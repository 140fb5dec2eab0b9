use dashmap::DashSet;
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "aif", "aiff", "flac", "mp3", "m4a", "ogg"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Parallel directory traversal collecting audio files, sorted by path.
/// Skips symlinks, empty files and anything matching an ignore glob.
pub fn collect_audio_files(root_paths: &[&str], ignore_globs: &[&str]) -> io::Result<Vec<PathBuf>> {
    let found: DashSet<PathBuf> = DashSet::new();

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    root_paths.par_iter().try_for_each(|root_dir| {
        let root = Path::new(root_dir);
        if !root.is_dir() {
            warn!("Search folder {} is not a directory", root.display());
            return Ok(());
        }
        visit_dirs(root, &found, &ignore_patterns)
    })?;

    let mut files: Vec<PathBuf> = found.into_iter().collect();
    files.sort();
    Ok(files)
}

fn visit_dirs(dir: &Path, found: &DashSet<PathBuf>, ignore_patterns: &[Pattern]) -> io::Result<()> {
    if ignore_patterns.iter().any(|pattern| pattern.matches_path(dir)) {
        return Ok(());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            error!("Access denied reading directory {}: {}", dir.display(), err);
            return Ok(());
        }
        Err(err) => {
            return Err(io::Error::new(
                err.kind(),
                format!("Error reading directory {}: {}", dir.display(), err),
            ))
        }
    };

    entries.par_bridge().try_for_each(|entry_result| {
        let entry = entry_result.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error reading entry in directory {}: {}", dir.display(), err),
            )
        })?;

        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Error getting metadata for {}: {}", path.display(), err);
                return Ok(());
            }
        };

        if metadata.is_dir() {
            visit_dirs(&path, found, ignore_patterns)?;
        } else if metadata.is_file()
            && metadata.len() > 0
            && is_audio_file(&path)
            && !ignore_patterns.iter().any(|pattern| pattern.matches_path(&path))
        {
            found.insert(path);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_file_ignores_case() {
        assert!(is_audio_file(Path::new("/a/Boom.WAV")));
        assert!(is_audio_file(Path::new("/a/b.aiff")));
        assert!(!is_audio_file(Path::new("/a/notes.txt")));
        assert!(!is_audio_file(Path::new("/a/noext")));
    }
}
