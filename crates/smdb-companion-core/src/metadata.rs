use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::ReplaceError;
use crate::storage::models::{Algorithm, FileRecord, RecordId};
use crate::storage::Database;

/// A find/replace request against one column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub find: String,
    pub replace: String,
    pub column: String,
    pub case_sensitive: bool,
    /// Set `_Dirty = 1` on changed rows so Soundminer rewrites the file metadata.
    pub mark_dirty: bool,
}

/// Records whose `column` contains `text`, tagged `Replace`.
pub fn find(
    db_path: &Path,
    text: &str,
    column: &str,
    case_sensitive: bool,
) -> Result<Vec<FileRecord>, ReplaceError> {
    if text.is_empty() {
        return Err(ReplaceError::EmptyFind);
    }
    let db = Database::open_for_load(db_path)?;
    let column = checked_column(&db, column)?;
    let mut records = if case_sensitive {
        db.find_records(&column, text)?
    } else {
        db.find_records_matching(&column, &matcher(text, false)?)?
    };
    for record in &mut records {
        record.untag(Algorithm::Keep);
        record.tag(Algorithm::Replace);
    }
    info!("Found '{}' in {} of {} rows", text, records.len(), column);
    Ok(records)
}

/// Replace every occurrence of `find` in `column`. All rows change or none do.
pub fn replace(db_path: &Path, request: &Metadata) -> Result<usize, ReplaceError> {
    if request.find.is_empty() {
        return Err(ReplaceError::EmptyFind);
    }
    let db = Database::open_for_write(db_path)?;
    let column = checked_column(&db, &request.column)?;
    if request.mark_dirty {
        db.ensure_helper_columns()?;
    }

    let matcher = matcher(&request.find, request.case_sensitive)?;

    let tx = db.connection().unchecked_transaction()?;
    let mut changed: Vec<RecordId> = Vec::new();
    for (id, value) in db.column_values(&column)? {
        if !matcher.is_match(&value) {
            continue;
        }
        let updated = matcher.replace_all(&value, NoExpand(&request.replace));
        db.update_value(id, &column, &updated)?;
        changed.push(id);
    }

    if is_path_column(&column) {
        sync_paths(&db, &column, &changed)?;
    }
    if request.mark_dirty {
        for id in &changed {
            db.mark_dirty(*id)?;
        }
    }
    tx.commit()?;

    info!(
        "Replaced '{}' with '{}' in {} rows of {}",
        request.find,
        request.replace,
        changed.len(),
        column
    );
    Ok(changed.len())
}

/// Literal `text`, folding Unicode case unless `case_sensitive`.
fn matcher(text: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&regex::escape(text))
        .case_insensitive(!case_sensitive)
        .build()
}

fn checked_column(db: &Database, column: &str) -> Result<String, ReplaceError> {
    db.resolve_column(column)?
        .ok_or_else(|| ReplaceError::UnknownColumn(column.to_string()))
}

fn is_path_column(column: &str) -> bool {
    ["FilePath", "Filename", "Pathname"]
        .iter()
        .any(|c| c.eq_ignore_ascii_case(column))
}

/// Keep `FilePath = Pathname + Filename` for rows where one of them changed.
fn sync_paths(db: &Database, column: &str, ids: &[RecordId]) -> Result<(), rusqlite::Error> {
    for record in db.load_records_by_id(ids)? {
        let pathname = record.data.get("Pathname").cloned().unwrap_or_default();
        if column.eq_ignore_ascii_case("FilePath") {
            let file_path = record.data.get("FilePath").cloned().unwrap_or_default();
            let (dir, name) = split_file_path(&file_path, pathname.ends_with('/'));
            db.update_value(record.id, "Pathname", &dir)?;
            db.update_value(record.id, "Filename", &name)?;
        } else {
            db.update_value(record.id, "FilePath", &join_file_path(&pathname, &record.filename))?;
        }
    }
    debug!("Synchronised path columns of {} rows", ids.len());
    Ok(())
}

fn join_file_path(pathname: &str, filename: &str) -> String {
    if pathname.is_empty() || pathname.ends_with('/') {
        format!("{}{}", pathname, filename)
    } else {
        format!("{}/{}", pathname, filename)
    }
}

fn split_file_path(file_path: &str, trailing_slash: bool) -> (String, String) {
    match file_path.rsplit_once('/') {
        Some((dir, name)) if trailing_slash => (format!("{}/", dir), name.to_string()),
        Some((dir, name)) => (dir.to_string(), name.to_string()),
        None => (String::new(), file_path.to_string()),
    }
}
