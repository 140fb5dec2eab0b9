use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::RemoveError;

/// Advisory single-writer lock: a `<db>.smdb-lock` file holding the writer's pid that
/// exists while a mutation is applied. Removed on drop. A lock left behind by a process
/// that no longer runs is reclaimed.
#[derive(Debug)]
pub struct DbLock {
    path: PathBuf,
}

impl DbLock {
    pub fn lock_path(db_path: &Path) -> PathBuf {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(".smdb-lock");
        PathBuf::from(name)
    }

    pub fn acquire(db_path: &Path) -> Result<Self, RemoveError> {
        let path = Self::lock_path(db_path);
        match Self::create(&path) {
            Err(RemoveError::Locked(_)) if is_stale(&path) => {
                warn!("Reclaiming stale lock {}", path.display());
                fs::remove_file(&path).map_err(|err| RemoveError::from_io(&path, err))?;
                Self::create(&path)
            }
            result => result,
        }
    }

    fn create(path: &Path) -> Result<Self, RemoveError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let lock = DbLock {
                    path: path.to_path_buf(),
                };
                writeln!(file, "{}", std::process::id())?;
                debug!("Acquired write lock {}", lock.path.display());
                Ok(lock)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(RemoveError::Locked(path.to_path_buf()))
            }
            Err(err) => Err(RemoveError::from_io(path, err)),
        }
    }
}

/// Whether the pid recorded in the lock file belongs to no running process. Unreadable
/// locks and platforms without a process table to check are never stale.
fn is_stale(path: &Path) -> bool {
    let pid = match fs::read_to_string(path).map(|text| text.trim().parse::<u32>()) {
        Ok(Ok(pid)) => pid,
        _ => return false,
    };
    pid != std::process::id() && !process_alive(pid)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for DbLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!("Could not release lock {}: {}", self.path.display(), err);
        }
    }
}
