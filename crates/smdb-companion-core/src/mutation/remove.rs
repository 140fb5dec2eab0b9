use ahash::AHashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::disposition::{check_writable, Disposition, MoveLog};
use super::lock::DbLock;
use super::{MutationState, RemoveOutcome, RemoveRequest};
use crate::audio;
use crate::error::RemoveError;
use crate::progress::{self, StatusChannel, StatusReporter, RECORD_DIVISOR};
use crate::storage::models::DualMonoTarget;
use crate::storage::Database;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Everything validation resolved from the request.
struct Plan {
    files: Vec<PathBuf>,
    strip: Vec<DualMonoTarget>,
    archive_dir: Option<PathBuf>,
}

/// Mono rewrites written next to their originals, renamed into place after commit.
/// Anything still staged on drop is discarded.
#[derive(Default)]
struct StagedMono(Vec<(PathBuf, PathBuf)>);

impl Drop for StagedMono {
    fn drop(&mut self) {
        for (tmp, _) in &self.0 {
            if tmp.exists() {
                if let Err(err) = fs::remove_file(tmp) {
                    warn!("Could not remove temporary file {}: {}", tmp.display(), err);
                }
            }
        }
    }
}

fn advance(state: &mut MutationState, next: MutationState) {
    debug!("Removal {:?} -> {:?}", state, next);
    *state = next;
}

/// `<stem>_<tag>.<ext>` next to the original.
pub fn clone_path(db_path: &Path, tag: &str) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match db_path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, tag, ext.to_string_lossy()),
        None => format!("{}_{}", stem, tag),
    };
    db_path.with_file_name(name)
}

fn mono_temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".smdb-mono");
    PathBuf::from(name)
}

/// Remove records from `db_path` (or a fresh clone of it), dispose of their files and
/// strip dual-mono files. Database changes commit only after every file was moved or
/// set aside; those moves are undone on failure. Trash and delete happen after commit.
pub fn remove(
    db_path: &Path,
    request: &RemoveRequest,
    batch_size: usize,
    reporter: &dyn StatusReporter,
) -> Result<RemoveOutcome, RemoveError> {
    let mut state = MutationState::Requested;
    info!(
        "Removal requested: {} records, files {:?}, clone {}",
        request.ids.len(),
        request.delete,
        request.clone
    );
    progress::emit(reporter, StatusChannel::Remove, "validating", 0, "Validating request");

    check_shape(request)?;
    let _source_lock = DbLock::acquire(db_path)?;
    let plan = validate(db_path, request)?;
    advance(&mut state, MutationState::Validated);

    let (target, _clone_lock) = if request.clone {
        advance(&mut state, MutationState::SafetyCopy);
        let target = clone_path(db_path, request.clone_tag.trim());
        progress::emit(
            reporter,
            StatusChannel::Remove,
            "cloning",
            5,
            format!("Creating safety copy {}", target.display()),
        );
        let lock = DbLock::acquire(&target)?;
        if target.exists() {
            warn!("Overwriting existing safety copy {}", target.display());
        }
        fs::copy(db_path, &target).map_err(|err| RemoveError::from_io(&target, err))?;
        (target, Some(lock))
    } else {
        (db_path.to_path_buf(), None)
    };

    preflight(&target, request, &plan)?;
    advance(&mut state, MutationState::Applying);

    let db = Database::open_for_write(&target)?;
    if !plan.strip.is_empty() {
        db.ensure_helper_columns()?;
    }

    let tx = db.connection().unchecked_transaction()?;
    progress::emit(
        reporter,
        StatusChannel::Remove,
        "removing",
        10,
        format!("Removing {} records", request.ids.len()),
    );
    let removed = db.delete_records(&request.ids, batch_size)?;

    let mut staged = StagedMono::default();
    let mut failed_files = Vec::new();
    for (n, target_file) in plan.strip.iter().enumerate() {
        let path = PathBuf::from(&target_file.path);
        let tmp = mono_temp_path(&path);
        match audio::strip_to_mono(&path, &tmp) {
            Ok(()) => {
                staged.0.push((tmp, path));
                db.mark_mono(target_file.id)?;
            }
            Err(err) => {
                warn!("Could not strip {} to mono: {}", path.display(), err);
                if tmp.exists() {
                    let _ = fs::remove_file(&tmp);
                }
                failed_files.push(target_file.path.clone());
            }
        }
        progress::emit(
            reporter,
            StatusChannel::Remove,
            "dual_mono",
            20 + progress::percent(n + 1, plan.strip.len()) * 20 / 100,
            format!("Stripped {}/{}", n + 1, plan.strip.len()),
        );
    }

    let mut moves = MoveLog::default();
    let mut disposed = 0usize;
    let files_result = dispose_files(&plan, request.delete, &mut moves, &mut disposed, reporter)
        .and_then(|()| tx.commit().map_err(RemoveError::from));

    if let Err(err) = files_result {
        let unrestored = moves.revert();
        advance(&mut state, MutationState::RolledBack);
        progress::emit(reporter, StatusChannel::Remove, "rolled_back", 100, err.to_string());
        warn!(
            "Removal rolled back after {} files were moved ({} could not be restored): {}",
            disposed, unrestored, err
        );
        return Err(match err {
            RemoveError::Permission { .. } | RemoveError::RolledBack(_) => err,
            other => RemoveError::RolledBack(other.to_string()),
        });
    }

    for (path, err) in moves.finish(request.delete) {
        debug!("Disposal of {} failed after commit: {}", path.display(), err);
        disposed = disposed.saturating_sub(1);
        failed_files.push(path.to_string_lossy().into_owned());
    }

    let mut stripped = 0;
    for (tmp, dest) in staged.0.drain(..).collect::<Vec<_>>() {
        match fs::rename(&tmp, &dest) {
            Ok(()) => stripped += 1,
            Err(err) => {
                warn!("Could not replace {} with its mono copy: {}", dest.display(), err);
                let _ = fs::remove_file(&tmp);
                failed_files.push(dest.to_string_lossy().into_owned());
            }
        }
    }

    advance(&mut state, MutationState::Committed);
    progress::emit(
        reporter,
        StatusChannel::Remove,
        "complete",
        100,
        format!("Removed {} records", removed),
    );
    info!(
        "Removal committed to {}: {} records, {} files, {} stripped",
        target.display(),
        removed,
        disposed,
        stripped
    );

    Ok(RemoveOutcome {
        db_path: target,
        removed,
        files_disposed: disposed,
        stripped,
        failed_files,
        state,
    })
}

fn check_shape(request: &RemoveRequest) -> Result<(), RemoveError> {
    let stripping = request.strip_dual_mono && !request.dual_mono.is_empty();
    if request.ids.is_empty() && !stripping {
        return Err(RemoveError::Validation("nothing to remove".to_string()));
    }
    if request.delete == Disposition::Archive && request.archive_dir.is_none() {
        return Err(RemoveError::Validation(
            "archiving files needs an archive folder".to_string(),
        ));
    }
    if request.clone && request.clone_tag.trim().is_empty() {
        return Err(RemoveError::Validation(
            "a safety copy needs a non-empty tag".to_string(),
        ));
    }
    Ok(())
}

fn validate(db_path: &Path, request: &RemoveRequest) -> Result<Plan, RemoveError> {
    let db = Database::open_for_load(db_path)?;

    let unique: AHashSet<i64> = request.ids.iter().copied().collect();
    let existing: AHashSet<i64> = db.existing_ids(&request.ids)?.into_iter().collect();
    let mut missing: Vec<i64> = unique.difference(&existing).copied().collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(RemoveError::Validation(format!(
            "records not in database: {:?}",
            missing
        )));
    }

    let files: Vec<PathBuf> = match request.delete {
        Disposition::Keep => Vec::new(),
        _ if !request.files.is_empty() => request.files.iter().map(PathBuf::from).collect(),
        _ => db
            .load_records_by_id(&request.ids)?
            .iter()
            .map(|r| r.full_path())
            .collect(),
    };

    let strip: Vec<DualMonoTarget> = if request.strip_dual_mono {
        request
            .dual_mono
            .iter()
            .filter(|t| !unique.contains(&t.id))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    let archive_dir = match (request.delete, &request.archive_dir) {
        (Disposition::Archive, Some(dir)) => Some(
            dir.join(
                chrono::Local::now()
                    .format("%Y-%m-%d_%H%M%S")
                    .to_string(),
            ),
        ),
        _ => None,
    };

    Ok(Plan {
        files,
        strip,
        archive_dir,
    })
}

/// Fail early on permission problems, before anything is changed.
fn preflight(target: &Path, request: &RemoveRequest, plan: &Plan) -> Result<(), RemoveError> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(parent) = target.parent() {
        dirs.push(parent.to_path_buf());
    }
    if request.delete != Disposition::Keep {
        dirs.extend(
            plan.files
                .iter()
                .filter(|f| f.exists())
                .filter_map(|f| f.parent().map(Path::to_path_buf)),
        );
    }
    dirs.extend(
        plan.strip
            .iter()
            .filter_map(|t| Path::new(&t.path).parent().map(Path::to_path_buf)),
    );
    if let Some(archive) = &plan.archive_dir {
        fs::create_dir_all(archive).map_err(|err| RemoveError::from_io(archive, err))?;
        dirs.push(archive.clone());
    }

    dirs.sort();
    dirs.dedup();
    for dir in dirs.iter().filter(|d| d.is_dir()) {
        check_writable(dir)?;
    }
    debug!("Pre-flight checked {} directories", dirs.len());
    Ok(())
}

fn dispose_files(
    plan: &Plan,
    disposition: Disposition,
    moves: &mut MoveLog,
    disposed: &mut usize,
    reporter: &dyn StatusReporter,
) -> Result<(), RemoveError> {
    if disposition == Disposition::Keep {
        return Ok(());
    }
    let total = plan.files.len();
    for (n, path) in plan.files.iter().enumerate() {
        if !path.exists() {
            warn!("File {} no longer exists, skipping", path.display());
            continue;
        }
        match (disposition, &plan.archive_dir) {
            (Disposition::Archive, Some(dir)) => moves.archive(path, dir)?,
            _ => moves.set_aside(path)?,
        };
        *disposed += 1;
        if (n + 1) % RECORD_DIVISOR == 0 {
            progress::emit(
                reporter,
                StatusChannel::Remove,
                "files",
                40 + progress::percent(n + 1, total) * 60 / 100,
                format!("Processed {}/{} files", n + 1, total),
            );
        }
    }
    Ok(())
}
