use ahash::AHashMap;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::audio;
use crate::config;
use crate::error::LoadError;
use crate::preferences::Preferences;
use crate::scanner;
use crate::storage::models::{format_duration, Algorithm, FileRecord, RecordId};
use crate::storage::sqlite::REQUIRED_COLUMNS;
use crate::storage::Database;

/// Where records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Database(PathBuf),
    Folders(Vec<PathBuf>),
}

/// An immutable snapshot of records, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<FileRecord>,
    index: AHashMap<RecordId, usize>,
    columns: Vec<String>,
}

impl RecordSet {
    pub fn new(records: Vec<FileRecord>, columns: Vec<String>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id, i))
            .collect();
        Self {
            records,
            index,
            columns,
        }
    }

    /// Ordered column names of the source.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [FileRecord] {
        &mut self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&FileRecord> {
        self.index.get(&id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut FileRecord> {
        self.index.get(&id).map(|&i| &mut self.records[i])
    }

    pub fn into_records(self) -> Vec<FileRecord> {
        self.records
    }
}

/// Materialize the records of `source`. Read-only.
pub fn load(
    source: &Source,
    pref: &Preferences,
    ignore_patterns: &[String],
) -> Result<RecordSet, LoadError> {
    let set = match source {
        Source::Database(path) => load_database(path, pref)?,
        Source::Folders(folders) => load_folders(folders, pref, ignore_patterns)?,
    };
    info!("Loaded {} records", set.size());
    Ok(set)
}

fn load_database(path: &Path, pref: &Preferences) -> Result<RecordSet, LoadError> {
    let db = Database::open_for_load(path)?;
    let as_load_error = |err: rusqlite::Error| crate::storage::sqlite::classify_open_error(path, err);

    let columns = db.visible_columns().map_err(as_load_error)?;
    let records = db
        .load_records(&pref.data_requirements(), pref.fetch_waveforms)
        .map_err(as_load_error)?;

    let total = records.len();
    let records: Vec<FileRecord> = records
        .into_iter()
        .filter(|r| !pref.is_safe(&r.full_path()))
        .collect();
    if records.len() < total {
        debug!("Skipped {} records in safe folders", total - records.len());
    }
    Ok(RecordSet::new(records, columns))
}

fn load_folders(
    folders: &[PathBuf],
    pref: &Preferences,
    ignore_patterns: &[String],
) -> Result<RecordSet, LoadError> {
    if folders.is_empty() || folders.iter().all(|f| !f.exists()) {
        return Err(LoadError::NotFound(
            folders.first().cloned().unwrap_or_default(),
        ));
    }

    let roots = config::non_overlapping_directories(
        folders
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect(),
    );
    info!("Walking folders: {:?}", roots);
    let root_slices: Vec<&str> = roots.iter().map(|s| s.as_str()).collect();
    let ignore_slices: Vec<&str> = ignore_patterns.iter().map(|s| s.as_str()).collect();

    let files = scanner::collect_audio_files(&root_slices, &ignore_slices).map_err(|err| {
        match err.kind() {
            io::ErrorKind::PermissionDenied => LoadError::PermissionDenied(folders[0].clone()),
            io::ErrorKind::NotFound => LoadError::NotFound(folders[0].clone()),
            _ => LoadError::corrupt(&folders[0], err),
        }
    })?;

    let files: Vec<PathBuf> = files.into_iter().filter(|p| !pref.is_safe(p)).collect();
    let records: Vec<FileRecord> = files
        .par_iter()
        .enumerate()
        .map(|(i, path)| probe_record(i as RecordId + 1, path))
        .collect();

    let columns = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    Ok(RecordSet::new(records, columns))
}

fn probe_record(id: RecordId, path: &Path) -> FileRecord {
    let mut record = FileRecord::from_full_path(id, &path.to_string_lossy());
    record
        .data
        .insert("FilePath".to_string(), path.to_string_lossy().into_owned());
    record
        .data
        .insert("Pathname".to_string(), record.path.clone());

    match audio::probe(path) {
        Ok(info) => {
            record.samplerate = info.sample_rate;
            record.channels = info.channels;
            record.bitdepth = info.bit_depth;
            record.duration = format_duration(info.duration_secs);
        }
        Err(err) => {
            warn!("Could not read audio properties of {}: {}", path.display(), err);
            record.tag(Algorithm::Errored);
        }
    }
    record
}

/// Visible columns of a database without loading its records.
pub fn columns(path: &Path) -> Result<Vec<String>, LoadError> {
    let db = Database::open_for_load(path)?;
    db.visible_columns()
        .map_err(|err| crate::storage::sqlite::classify_open_error(path, err))
}

/// Record count of a database without loading its records.
pub fn size(path: &Path) -> Result<usize, LoadError> {
    let db = Database::open_for_load(path)?;
    db.record_count()
        .map_err(|err| crate::storage::sqlite::classify_open_error(path, err))
}
