use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::RemoveError;

/// What happens to the audio files of removed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Disposition {
    /// Leave files on disk.
    #[default]
    Keep,
    /// Move to the OS trash.
    Trash,
    /// Remove permanently.
    Delete,
    /// Move into an archive folder.
    Archive,
}

/// File moves performed so far, in order, so they can be undone. Archive moves are final
/// once the transaction commits; files set aside for trash or delete are only disposed of
/// by `finish`.
#[derive(Debug, Default)]
pub struct MoveLog {
    moves: Vec<(PathBuf, PathBuf)>,
}

impl MoveLog {
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Move `src` into `dir`, keeping its name; clashes get a ` (n)` suffix.
    pub fn archive(&mut self, src: &Path, dir: &Path) -> Result<PathBuf, RemoveError> {
        let dest = unique_destination(src, dir);
        move_file(src, &dest).map_err(|err| RemoveError::from_io(src, err))?;
        debug!("Archived {} -> {}", src.display(), dest.display());
        self.moves.push((src.to_path_buf(), dest.clone()));
        Ok(dest)
    }

    /// Rename `src` to a hidden name next to it, pending `finish`.
    pub fn set_aside(&mut self, src: &Path) -> Result<PathBuf, RemoveError> {
        if !src.is_file() {
            return Err(RemoveError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", src.display()),
            )));
        }
        let dest = set_aside_path(src);
        fs::rename(src, &dest).map_err(|err| RemoveError::from_io(src, err))?;
        debug!("Set aside {} -> {}", src.display(), dest.display());
        self.moves.push((src.to_path_buf(), dest.clone()));
        Ok(dest)
    }

    /// Dispose of every file set aside, after the records are committed. Returns the
    /// original paths that could not be disposed of, with the reason.
    pub fn finish(&mut self, disposition: Disposition) -> Vec<(PathBuf, RemoveError)> {
        let mut failures = Vec::new();
        for (src, parked) in self.moves.drain(..) {
            let result = match disposition {
                Disposition::Delete => {
                    fs::remove_file(&parked).map_err(|err| RemoveError::from_io(&src, err))
                }
                Disposition::Trash => move_file(&parked, &src)
                    .map_err(|err| RemoveError::from_io(&src, err))
                    .and_then(|()| dispose(&src, Disposition::Trash)),
                Disposition::Keep | Disposition::Archive => Ok(()),
            };
            if let Err(err) = result {
                warn!("Could not dispose of {}: {}", src.display(), err);
                failures.push((src, err));
            }
        }
        failures
    }

    /// Undo every recorded move, newest first. Returns how many could not be undone.
    pub fn revert(&mut self) -> usize {
        let mut failures = 0;
        while let Some((src, dest)) = self.moves.pop() {
            if let Err(err) = move_file(&dest, &src) {
                warn!(
                    "Could not restore {} from {}: {}",
                    src.display(),
                    dest.display(),
                    err
                );
                failures += 1;
            }
        }
        failures
    }
}

fn set_aside_path(src: &Path) -> PathBuf {
    (0..)
        .map(|n| {
            let mut name = src.as_os_str().to_os_string();
            match n {
                0 => name.push(".smdb-removed"),
                n => name.push(format!(".smdb-removed-{}", n)),
            }
            PathBuf::from(name)
        })
        .find(|p| !p.exists())
        .unwrap_or_else(|| src.with_extension("smdb-removed"))
}

fn unique_destination(src: &Path, dir: &Path) -> PathBuf {
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
        _ => (name.clone(), String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{} ({}){}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Rename, falling back to copy and remove across filesystems.
fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
            ) =>
        {
            Err(err)
        }
        Err(_) => {
            fs::copy(src, dest)?;
            fs::remove_file(src)
        }
    }
}

/// Trash or delete one file. Callers skip files that no longer exist.
fn dispose(path: &Path, disposition: Disposition) -> Result<(), RemoveError> {
    match disposition {
        Disposition::Trash => trash::delete(path).map_err(|err| trash_error(path, err)),
        Disposition::Delete => fs::remove_file(path).map_err(|err| RemoveError::from_io(path, err)),
        Disposition::Keep | Disposition::Archive => Ok(()),
    }
}

/// Keep permission failures distinct where the trash backend reports them.
fn trash_error(path: &Path, err: trash::Error) -> RemoveError {
    match err {
        #[cfg(all(
            unix,
            not(target_os = "macos"),
            not(target_os = "ios"),
            not(target_os = "android")
        ))]
        trash::Error::FileSystem { source, .. } => RemoveError::from_io(path, source),
        trash::Error::Os { code, description }
            if io::Error::from_raw_os_error(code).kind() == io::ErrorKind::PermissionDenied =>
        {
            RemoveError::Permission {
                path: path.to_path_buf(),
                message: description,
            }
        }
        other => RemoveError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("could not move {} to the trash: {}", path.display(), other),
        )),
    }
}

/// Confirm we can create and remove files in `dir`.
pub fn check_writable(dir: &Path) -> Result<(), RemoveError> {
    let marker = dir.join(format!(".smdb-write-check-{}", std::process::id()));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .and_then(|_| fs::remove_file(&marker))
        .map_err(|err| RemoveError::from_io(dir, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_and_revert() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive");
        fs::create_dir(&archive).unwrap();
        let a = dir.path().join("a.wav");
        fs::write(&a, b"a").unwrap();
        fs::write(archive.join("a.wav"), b"existing").unwrap();

        let mut log = MoveLog::default();
        let dest = log.archive(&a, &archive).unwrap();
        assert_eq!(dest, archive.join("a (1).wav"));
        assert!(!a.exists());

        assert_eq!(log.revert(), 0);
        assert!(a.exists());
        assert!(!dest.exists());
        assert!(log.is_empty());
    }

    #[test]
    fn test_delete_and_write_check() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("gone.wav");
        fs::write(&f, b"x").unwrap();
        dispose(&f, Disposition::Delete).unwrap();
        assert!(!f.exists());
        check_writable(dir.path()).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_set_aside_is_undone_by_revert() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        fs::write(&a, b"a").unwrap();

        let mut log = MoveLog::default();
        let parked = log.set_aside(&a).unwrap();
        assert!(!a.exists());
        assert!(parked.exists());

        assert_eq!(log.revert(), 0);
        assert_eq!(fs::read(&a).unwrap(), b"a");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_finish_deletes_what_was_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        fs::write(&a, b"a").unwrap();

        let mut log = MoveLog::default();
        log.set_aside(&a).unwrap();
        assert!(log.finish(Disposition::Delete).is_empty());
        assert!(log.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_set_aside_refuses_directories() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("folder.wav");
        fs::create_dir(&folder).unwrap();

        let mut log = MoveLog::default();
        assert!(matches!(log.set_aside(&folder), Err(RemoveError::Io(_))));
        assert!(folder.is_dir());
        assert!(log.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_trash_permission_errors_stay_distinct() {
        let path = Path::new("/sfx/a.wav");
        let denied = trash::Error::Os {
            code: 13,
            description: "Permission denied".into(),
        };
        assert!(trash_error(path, denied).is_permission());

        let other = trash::Error::Unknown {
            description: "no trash".into(),
        };
        assert!(matches!(trash_error(path, other), RemoveError::Io(_)));
    }

    #[cfg(all(unix, not(target_os = "macos"), not(target_os = "ios"), not(target_os = "android")))]
    #[test]
    fn test_trash_filesystem_permission_error_is_permission() {
        let err = trash::Error::FileSystem {
            path: PathBuf::from("/sfx"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(trash_error(Path::new("/sfx/a.wav"), err).is_permission());
    }
}
