use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::{self, AppConfig};
use crate::detect::DetectorSet;
use crate::error::Error;
use crate::license::{self, Registration};
use crate::metadata::{self, Metadata};
use crate::mutation::{self, remove::DEFAULT_BATCH_SIZE, DbLock, RemoveOutcome, RemoveRequest};
use crate::platform;
use crate::preferences::Preferences;
use crate::progress::{CancelToken, SilentReporter, StatusReporter};
use crate::resolve::SearchResults;
use crate::search::{self, SearchOptions};
use crate::storage::models::FileRecord;
use crate::storage::Database;
use crate::store::{self, Source};

/// The databases a front end currently works on.
#[derive(Debug, Default, Clone)]
pub struct Session {
    pub db: Option<PathBuf>,
    pub compare: Option<PathBuf>,
}

/// Command surface over one session. Commands run one at a time; cancellation does
/// not wait for the running command.
pub struct Companion {
    session: Mutex<Session>,
    cancel: CancelToken,
    reporter: Arc<dyn StatusReporter>,
    decode_threads: usize,
    ignore_patterns: Vec<String>,
    batch_size: usize,
}

impl Default for Companion {
    fn default() -> Self {
        Self::new(Arc::new(SilentReporter))
    }
}

impl Companion {
    pub fn new(reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            session: Mutex::new(Session::default()),
            cancel: CancelToken::new(),
            reporter,
            decode_threads: config::resolve_decode_threads(0),
            ignore_patterns: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn from_config(config: &AppConfig, reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            session: Mutex::new(Session {
                db: config.database.clone(),
                compare: config.compare_database.clone(),
            }),
            decode_threads: config.decode_threads(),
            ignore_patterns: config.ignore_patterns.clone(),
            batch_size: config.preferences.batch_size,
            ..Self::new(reporter)
        }
    }

    fn session(&self) -> Result<MutexGuard<'_, Session>, Error> {
        self.session
            .lock()
            .map_err(|_| Error::Other("session lock poisoned".to_string()))
    }

    pub fn current_db(&self) -> Result<Option<PathBuf>, Error> {
        Ok(self.session()?.db.clone())
    }

    fn require_db(session: &Session) -> Result<PathBuf, Error> {
        session.db.clone().ok_or(Error::NoDatabase)
    }

    // ── Session ──────────────────────────────────────────────────

    /// Open a database as the working or the compare database. Returns its name.
    pub fn open_db(&self, path: &Path, is_compare: bool) -> Result<String, Error> {
        let mut session = self.session()?;
        let count = store::size(path)?;
        if is_compare {
            session.compare = Some(path.to_path_buf());
        } else {
            session.db = Some(path.to_path_buf());
        }
        info!(
            "Opened {} database {} ({} records)",
            if is_compare { "compare" } else { "working" },
            path.display(),
            count
        );
        Ok(path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    pub fn close_db(&self) -> Result<(), Error> {
        let mut session = self.session()?;
        if let Some(db) = session.db.take() {
            debug!("Closed {}", db.display());
        }
        Ok(())
    }

    pub fn get_db_size(&self) -> Result<usize, Error> {
        let db = Self::require_db(&*self.session()?)?;
        Ok(store::size(&db)?)
    }

    pub fn get_columns(&self) -> Result<Vec<String>, Error> {
        let db = Self::require_db(&*self.session()?)?;
        Ok(store::columns(&db)?)
    }

    // ── Search ───────────────────────────────────────────────────

    /// Search the working database, returning display groups.
    pub fn search(&self, detectors: DetectorSet, pref: &Preferences) -> Result<Vec<Vec<FileRecord>>, Error> {
        let results = self.search_results(detectors, pref)?;
        Ok(display_groups(&results, pref))
    }

    /// Search the working database, returning the full results.
    pub fn search_results(
        &self,
        mut detectors: DetectorSet,
        pref: &Preferences,
    ) -> Result<SearchResults, Error> {
        let session = self.session()?;
        let db = Self::require_db(&session)?;
        if let Some(compare) = &session.compare {
            detectors.set_default_compare_db(compare.clone());
        }
        self.run_search(&Source::Database(db), &detectors, pref)
    }

    /// Search audio files under `folders` instead of a database.
    pub fn search_file_system(
        &self,
        detectors: DetectorSet,
        pref: &Preferences,
        folders: Vec<PathBuf>,
    ) -> Result<Vec<Vec<FileRecord>>, Error> {
        let results = self.search_file_system_results(detectors, pref, folders)?;
        Ok(display_groups(&results, pref))
    }

    pub fn search_file_system_results(
        &self,
        mut detectors: DetectorSet,
        pref: &Preferences,
        folders: Vec<PathBuf>,
    ) -> Result<SearchResults, Error> {
        let session = self.session()?;
        if let Some(compare) = &session.compare {
            detectors.set_default_compare_db(compare.clone());
        }
        self.run_search(&Source::Folders(folders), &detectors, pref)
    }

    fn run_search(
        &self,
        source: &Source,
        detectors: &DetectorSet,
        pref: &Preferences,
    ) -> Result<SearchResults, Error> {
        self.cancel.reset();
        let opts = SearchOptions {
            ignore_patterns: &self.ignore_patterns,
            decode_threads: self.decode_threads,
            cancel: &self.cancel,
            reporter: self.reporter.as_ref(),
        };
        search::search(source, detectors, pref, &opts)
    }

    pub fn cancel_search(&self) {
        info!("Search cancellation requested");
        self.cancel.cancel();
    }

    /// A handle other threads can use to cancel the running search.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // ── Metadata ─────────────────────────────────────────────────

    /// Records of the working database whose `column` contains `find`. Records in safe
    /// folders are left out.
    pub fn find_metadata(
        &self,
        find: &str,
        column: &str,
        case_sensitive: bool,
        pref: &Preferences,
    ) -> Result<Vec<FileRecord>, Error> {
        let db = Self::require_db(&*self.session()?)?;
        let records = metadata::find(&db, find, column, case_sensitive)?;
        Ok(records
            .into_iter()
            .filter(|r| !pref.is_safe(&r.full_path()))
            .collect())
    }

    pub fn replace_metadata(&self, request: &Metadata) -> Result<usize, Error> {
        let db = Self::require_db(&*self.session()?)?;
        Ok(metadata::replace(&db, request)?)
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Remove records. When a safety copy was made it becomes the working database.
    pub fn remove_records(&self, request: &RemoveRequest) -> Result<RemoveOutcome, Error> {
        let mut session = self.session()?;
        let db = Self::require_db(&session)?;
        let outcome = mutation::remove(&db, request, self.batch_size, self.reporter.as_ref())?;
        if outcome.db_path != db {
            info!("Working database is now {}", outcome.db_path.display());
        }
        session.db = Some(outcome.db_path.clone());
        Ok(outcome)
    }

    /// Forget cached fingerprints and dual-mono results of the working database so the
    /// next search recomputes them. Returns how many records held a cached result.
    pub fn clear_fingerprints(&self) -> Result<usize, Error> {
        let db_path = Self::require_db(&*self.session()?)?;
        let _lock = DbLock::acquire(&db_path)?;
        let cleared = Database::open_for_write(&db_path)?.clear_cache()?;
        info!(
            "Cleared cached results of {} records in {}",
            cleared,
            db_path.display()
        );
        Ok(cleared)
    }

    pub fn reveal_files(&self, paths: &[PathBuf]) -> Result<usize, Error> {
        Ok(platform::reveal_files(paths)?)
    }

    pub fn check_reg(&self, registration: &Registration) -> bool {
        license::check_registration(registration)
    }
}

fn display_groups(results: &SearchResults, pref: &Preferences) -> Vec<Vec<FileRecord>> {
    if pref.display_all_records {
        results.groups()
    } else {
        results.relevant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_need_an_open_database() {
        let companion = Companion::default();
        assert!(matches!(companion.get_db_size(), Err(Error::NoDatabase)));
        assert!(matches!(companion.get_columns(), Err(Error::NoDatabase)));
        assert!(matches!(
            companion.search(DetectorSet::default(), &Preferences::default()),
            Err(Error::NoDatabase)
        ));
        assert!(matches!(companion.clear_fingerprints(), Err(Error::NoDatabase)));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let companion = Companion::default();
        let token = companion.cancel_token();
        companion.cancel_search();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_open_missing_db_keeps_session() {
        let companion = Companion::default();
        assert!(companion.open_db(Path::new("/no/such/library.sqlite"), false).is_err());
        assert_eq!(companion.current_db().unwrap(), None);
    }
}
