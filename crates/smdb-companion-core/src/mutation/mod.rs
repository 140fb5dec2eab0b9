pub mod disposition;
pub mod lock;
pub mod remove;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::models::{DualMonoTarget, RecordId};

pub use disposition::Disposition;
pub use lock::DbLock;
pub use remove::{clone_path, remove};

/// A fully specified, already confirmed removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveRequest {
    pub ids: Vec<RecordId>,
    /// Apply every change to a copy of the database instead of the original.
    pub clone: bool,
    pub clone_tag: String,
    pub delete: Disposition,
    /// Files to dispose of. Looked up from `ids` when empty.
    pub files: Vec<String>,
    pub dual_mono: Vec<DualMonoTarget>,
    pub strip_dual_mono: bool,
    pub archive_dir: Option<PathBuf>,
}

impl Default for RemoveRequest {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            clone: false,
            clone_tag: "thinned".to_string(),
            delete: Disposition::Keep,
            files: Vec::new(),
            dual_mono: Vec::new(),
            strip_dual_mono: false,
            archive_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationState {
    Requested,
    Validated,
    SafetyCopy,
    Applying,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveOutcome {
    /// The database that is now authoritative: the original, or its clone.
    pub db_path: PathBuf,
    pub removed: usize,
    pub files_disposed: usize,
    pub stripped: usize,
    /// Files that could not be stripped to mono, whose records are unchanged, and files
    /// that could not be trashed or deleted after their records were removed.
    pub failed_files: Vec<String>,
    pub state: MutationState,
}
