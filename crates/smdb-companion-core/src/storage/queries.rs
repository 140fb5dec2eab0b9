use super::models::*;
use super::sqlite::{
    quote_ident, Database, DIRTY_COLUMN, DUAL_MONO_COLUMN, FINGERPRINT_COLUMN, TABLE,
};
use regex::Regex;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Result, Row};
use tracing::debug;

/// Built-in columns selected for every record, in row order.
const BASE_SELECT: &str = "rowid, FilePath, Filename, Pathname, Duration, Description, \
                           Channels, BitDepth, SampleRate";
const BASE_COUNT: usize = 9;

/// Detector results cached back into the database.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Fingerprint(String),
    DualMono(bool),
}

impl Database {
    // ── Schema ───────────────────────────────────────────────────

    /// Every column of the metadata table in schema order, helper columns included.
    pub fn table_columns(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .connection()
            .prepare(&format!("PRAGMA table_info({})", TABLE))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// User-facing columns: helper columns starting with `_` are hidden, the rest sorted.
    pub fn visible_columns(&self) -> Result<Vec<String>> {
        let mut columns: Vec<String> = self
            .table_columns()?
            .into_iter()
            .filter(|c| !c.starts_with('_'))
            .collect();
        columns.sort();
        Ok(columns)
    }

    /// Match a column name case-insensitively against the schema.
    pub fn resolve_column(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .table_columns()?
            .into_iter()
            .find(|c| c.eq_ignore_ascii_case(name)))
    }

    pub fn has_column(&self, name: &str) -> Result<bool> {
        Ok(self.resolve_column(name)?.is_some())
    }

    /// Add the engine's cache and dirty-flag columns if they are missing.
    pub fn ensure_helper_columns(&self) -> Result<()> {
        for (column, ty) in [
            (FINGERPRINT_COLUMN, "TEXT"),
            (DUAL_MONO_COLUMN, "TEXT"),
            (DIRTY_COLUMN, "INTEGER"),
        ] {
            if !self.has_column(column)? {
                self.connection().execute(
                    &format!("ALTER TABLE {} ADD COLUMN {} {}", TABLE, quote_ident(column), ty),
                    [],
                )?;
                debug!("Added helper column {} to {}", column, self.path().display());
            }
        }
        Ok(())
    }

    // ── Records ──────────────────────────────────────────────────

    pub fn record_count(&self) -> Result<usize> {
        let count: i64 = self.connection().query_row(
            &format!("SELECT COUNT(*) FROM {}", TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Load every record. `extra_columns` are fetched into `FileRecord::data` under the
    /// requested name; names absent from the schema are skipped.
    pub fn load_records(
        &self,
        extra_columns: &[String],
        fetch_cache: bool,
    ) -> Result<Vec<FileRecord>> {
        self.query_records("", Vec::new(), extra_columns, fetch_cache)
    }

    /// Load the records whose rowid is in `ids`, in rowid order.
    pub fn load_records_by_id(&self, ids: &[RecordId]) -> Result<Vec<FileRecord>> {
        self.records_by_id(ids, &[])
    }

    fn records_by_id(&self, ids: &[RecordId], extra_columns: &[String]) -> Result<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let values = chunk.iter().map(|id| Value::Integer(*id)).collect();
            records.extend(self.query_records(
                &format!("WHERE rowid IN ({})", placeholders),
                values,
                extra_columns,
                false,
            )?);
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Records whose `column` contains `text`, byte for byte. The column must already
    /// be validated.
    pub fn find_records(&self, column: &str, text: &str) -> Result<Vec<FileRecord>> {
        self.query_records(
            &format!("WHERE {} GLOB ?1", quote_ident(column)),
            vec![Value::Text(format!("*{}*", escape_glob(text)))],
            &[column.to_string()],
            false,
        )
    }

    /// Records whose `column` value `matcher` matches, tested in process so matching
    /// agrees with in-process replacement.
    pub fn find_records_matching(&self, column: &str, matcher: &Regex) -> Result<Vec<FileRecord>> {
        let ids: Vec<RecordId> = self
            .column_values(column)?
            .into_iter()
            .filter(|(_, value)| matcher.is_match(value))
            .map(|(id, _)| id)
            .collect();
        self.records_by_id(&ids, &[column.to_string()])
    }

    fn query_records(
        &self,
        clause: &str,
        values: Vec<Value>,
        extra_columns: &[String],
        fetch_cache: bool,
    ) -> Result<Vec<FileRecord>> {
        let schema = self.table_columns()?;
        let resolve = |name: &str| schema.iter().find(|c| c.eq_ignore_ascii_case(name)).cloned();

        let extras: Vec<(String, String)> = extra_columns
            .iter()
            .filter_map(|requested| resolve(requested).map(|actual| (requested.clone(), actual)))
            .collect();
        let fingerprint_col = fetch_cache.then(|| resolve(FINGERPRINT_COLUMN)).flatten();
        let dual_mono_col = fetch_cache.then(|| resolve(DUAL_MONO_COLUMN)).flatten();

        let mut select = String::from(BASE_SELECT);
        for (_, actual) in &extras {
            select.push_str(", ");
            select.push_str(&quote_ident(actual));
        }
        for cache_col in [&fingerprint_col, &dual_mono_col].into_iter().flatten() {
            select.push_str(", ");
            select.push_str(&quote_ident(cache_col));
        }

        let sql = format!("SELECT {} FROM {} {} ORDER BY rowid", select, TABLE, clause);
        let mut stmt = self.connection().prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let mut record = record_from_row(row)?;
                let mut idx = BASE_COUNT;
                for (requested, _) in &extras {
                    if let Some(value) = text_at(row, idx)? {
                        record.data.insert(requested.clone(), value);
                    }
                    idx += 1;
                }
                if fingerprint_col.is_some() {
                    record.fingerprint = text_at(row, idx)?.filter(|s| !s.is_empty());
                    idx += 1;
                }
                if dual_mono_col.is_some() {
                    record.dual_mono = match text_at(row, idx)?.as_deref() {
                        Some("1") => Some(true),
                        Some("0") => Some(false),
                        _ => None,
                    };
                }
                Ok(record)
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Of `ids`, those that exist in the table.
    pub fn existing_ids(&self, ids: &[RecordId]) -> Result<Vec<RecordId>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut stmt = self
            .connection()
            .prepare_cached(&format!("SELECT 1 FROM {} WHERE rowid = ?1", TABLE))?;
        for id in ids {
            if stmt.exists(params![id])? {
                found.push(*id);
            }
        }
        Ok(found)
    }

    // ── Detector cache ───────────────────────────────────────────

    /// Write cached detector results. Helper columns are created on demand.
    pub fn store_cache(&self, writes: &[(RecordId, CacheValue)]) -> Result<usize> {
        if writes.is_empty() {
            return Ok(0);
        }
        self.ensure_helper_columns()?;
        let tx = self.connection().unchecked_transaction()?;
        {
            let mut fingerprint_stmt = tx.prepare_cached(&format!(
                "UPDATE {} SET {} = ?1 WHERE rowid = ?2",
                TABLE,
                quote_ident(FINGERPRINT_COLUMN)
            ))?;
            let mut dual_mono_stmt = tx.prepare_cached(&format!(
                "UPDATE {} SET {} = ?1 WHERE rowid = ?2",
                TABLE,
                quote_ident(DUAL_MONO_COLUMN)
            ))?;
            for (id, value) in writes {
                match value {
                    CacheValue::Fingerprint(fp) => fingerprint_stmt.execute(params![fp, id])?,
                    CacheValue::DualMono(dm) => {
                        dual_mono_stmt.execute(params![if *dm { "1" } else { "0" }, id])?
                    }
                };
            }
        }
        tx.commit()?;
        debug!("Cached {} detector results", writes.len());
        Ok(writes.len())
    }

    /// Forget cached fingerprints and dual-mono results. Returns the rows that held any.
    pub fn clear_cache(&self) -> Result<usize> {
        let mut columns = Vec::new();
        for column in [FINGERPRINT_COLUMN, DUAL_MONO_COLUMN] {
            if let Some(actual) = self.resolve_column(column)? {
                columns.push(quote_ident(&actual));
            }
        }
        if columns.is_empty() {
            return Ok(0);
        }
        let set: Vec<String> = columns.iter().map(|c| format!("{} = NULL", c)).collect();
        let held: Vec<String> = columns.iter().map(|c| format!("{} IS NOT NULL", c)).collect();
        let cleared = self.connection().execute(
            &format!(
                "UPDATE {} SET {} WHERE {}",
                TABLE,
                set.join(", "),
                held.join(" OR ")
            ),
            [],
        )?;
        debug!("Cleared cached results of {} records", cleared);
        Ok(cleared)
    }

    // ── Mutation ─────────────────────────────────────────────────
    // These run inside a transaction opened by the caller on the same connection.

    /// Delete rows by id, `batch_size` ids per statement.
    pub fn delete_records(&self, ids: &[RecordId], batch_size: usize) -> Result<usize> {
        let mut deleted = 0;
        for chunk in ids.chunks(batch_size.max(1)) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            deleted += self.connection().execute(
                &format!("DELETE FROM {} WHERE rowid IN ({})", TABLE, placeholders),
                params_from_iter(chunk.iter()),
            )?;
        }
        Ok(deleted)
    }

    /// Record that a file was rewritten as mono.
    pub fn mark_mono(&self, id: RecordId) -> Result<usize> {
        self.connection().execute(
            &format!(
                "UPDATE {} SET Channels = 1, {} = 1 WHERE rowid = ?1",
                TABLE,
                quote_ident(DIRTY_COLUMN)
            ),
            params![id],
        )
    }

    /// Rows with a text value in `column`, for in-process replacement.
    pub fn column_values(&self, column: &str) -> Result<Vec<(RecordId, String)>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT rowid, {} FROM {} WHERE {} IS NOT NULL",
            quote_ident(column),
            TABLE,
            quote_ident(column)
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, text_at(row, 1)?)))?
            .filter_map(|r| match r {
                Ok((id, Some(text))) => Some(Ok((id, text))),
                Ok((_, None)) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_value(&self, id: RecordId, column: &str, value: &str) -> Result<usize> {
        self.connection().execute(
            &format!("UPDATE {} SET {} = ?1 WHERE rowid = ?2", TABLE, quote_ident(column)),
            params![value, id],
        )
    }

    pub fn mark_dirty(&self, id: RecordId) -> Result<usize> {
        self.connection().execute(
            &format!("UPDATE {} SET {} = 1 WHERE rowid = ?1", TABLE, quote_ident(DIRTY_COLUMN)),
            params![id],
        )
    }
}

fn record_from_row(row: &Row) -> Result<FileRecord> {
    let id: i64 = row.get(0)?;
    let file_path = text_at(row, 1)?.unwrap_or_default();
    let filename = text_at(row, 2)?.unwrap_or_default();
    let pathname = text_at(row, 3)?.unwrap_or_default();

    let mut record = if file_path.is_empty() {
        FileRecord::from_full_path(id, &format!("{}/{}", pathname.trim_end_matches('/'), filename))
    } else {
        FileRecord::from_full_path(id, &file_path)
    };
    if !filename.is_empty() {
        record.filename = filename;
    }
    record.duration = text_at(row, 4)?.unwrap_or_default();
    record.description = text_at(row, 5)?.unwrap_or_default();
    record.channels = number_at(row, 6)?;
    record.bitdepth = number_at(row, 7)?;
    record.samplerate = number_at(row, 8)?;

    record.data.insert("FilePath".to_string(), file_path);
    record.data.insert("Pathname".to_string(), pathname);
    Ok(record)
}

/// Any SQLite value rendered as text; NULL becomes `None`.
fn text_at(row: &Row, idx: usize) -> Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    })
}

fn number_at(row: &Row, idx: usize) -> Result<u32> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => i.clamp(0, u32::MAX as i64) as u32,
        ValueRef::Real(f) => f.max(0.0) as u32,
        ValueRef::Text(t) => String::from_utf8_lossy(t)
            .trim()
            .parse::<f64>()
            .map(|f| f.max(0.0) as u32)
            .unwrap_or(0),
        _ => 0,
    })
}

/// Escape GLOB metacharacters so the text matches literally.
pub(crate) fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}
