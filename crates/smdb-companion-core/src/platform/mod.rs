#[cfg(target_os = "windows")]
pub mod windows;

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Show each file in the platform file manager. Missing files are skipped.
pub fn reveal_files(paths: &[PathBuf]) -> io::Result<usize> {
    let mut revealed = 0;
    for path in paths {
        if !path.exists() {
            warn!("Cannot reveal missing file {}", path.display());
            continue;
        }
        let status = reveal_command(path).status()?;
        if status.success() {
            revealed += 1;
        } else {
            warn!("File manager exited with {} for {}", status, path.display());
        }
    }
    debug!("Revealed {} of {} files", revealed, paths.len());
    Ok(revealed)
}

#[cfg(target_os = "macos")]
fn reveal_command(path: &Path) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg("-R").arg(path);
    cmd
}

#[cfg(target_os = "windows")]
fn reveal_command(path: &Path) -> Command {
    windows::reveal_command(path)
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn reveal_command(path: &Path) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(path.parent().unwrap_or(path));
    cmd
}
