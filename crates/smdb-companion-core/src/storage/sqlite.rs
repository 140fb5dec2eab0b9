use rusqlite::{Connection, OpenFlags, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::LoadError;

/// Soundminer keeps one flat metadata table per database.
pub const TABLE: &str = "justinmetadata";

/// Columns every Soundminer database is expected to carry.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "FilePath",
    "Filename",
    "Pathname",
    "Duration",
    "Description",
    "Channels",
    "BitDepth",
    "SampleRate",
];

pub const FINGERPRINT_COLUMN: &str = "_fingerprint";
pub const DUAL_MONO_COLUMN: &str = "_DualMono";
pub const DIRTY_COLUMN: &str = "_Dirty";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open an existing database for writing. Never creates a new file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let db = Database {
            conn,
            path: path.to_path_buf(),
        };
        db.configure_pragmas()?;
        Ok(db)
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let db = Database {
            conn,
            path: path.to_path_buf(),
        };
        db.configure_pragmas()?;
        Ok(db)
    }

    /// Open for loading and confirm the file is a Soundminer database.
    pub fn open_for_load(path: &Path) -> std::result::Result<Self, LoadError> {
        let db = Self::open_checked(path, false)?;
        db.validate_schema()?;
        Ok(db)
    }

    /// Open for writing and confirm the file is a Soundminer database.
    pub fn open_for_write(path: &Path) -> std::result::Result<Self, LoadError> {
        let db = Self::open_checked(path, true)?;
        db.validate_schema()?;
        Ok(db)
    }

    fn open_checked(path: &Path, writable: bool) -> std::result::Result<Self, LoadError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(LoadError::corrupt(path, "not a file")),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound(path.to_path_buf()))
            }
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                return Err(LoadError::PermissionDenied(path.to_path_buf()))
            }
            Err(err) => return Err(LoadError::corrupt(path, err)),
        }

        let opened = if writable {
            Self::open(path)
        } else {
            Self::open_read_only(path)
        };
        opened.map_err(|err| classify_open_error(path, err))
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        debug!("SQLite connection configured for {}", self.path.display());
        Ok(())
    }

    fn validate_schema(&self) -> std::result::Result<(), LoadError> {
        let columns = self
            .table_columns()
            .map_err(|err| classify_open_error(&self.path, err))?;
        if columns.is_empty() {
            return Err(LoadError::corrupt(
                &self.path,
                format!("table '{}' is missing", TABLE),
            ));
        }
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !columns.iter().any(|c| c.eq_ignore_ascii_case(required)))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::corrupt(
                &self.path,
                format!("missing columns: {}", missing.join(", ")),
            ));
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Map an SQLite failure while opening or probing to the load taxonomy.
pub(crate) fn classify_open_error(path: &Path, err: rusqlite::Error) -> LoadError {
    use rusqlite::ErrorCode;
    match &err {
        rusqlite::Error::SqliteFailure(code, _) => match code.code {
            ErrorCode::CannotOpen | ErrorCode::PermissionDenied | ErrorCode::ReadOnly => {
                if path.exists() {
                    LoadError::PermissionDenied(path.to_path_buf())
                } else {
                    LoadError::NotFound(path.to_path_buf())
                }
            }
            _ => LoadError::corrupt(path, err),
        },
        _ => LoadError::corrupt(path, err),
    }
}

/// Quote an identifier for interpolation. Callers validate the name against the schema first.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
