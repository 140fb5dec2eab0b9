#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// One row of a fixture database.
pub struct Row<'a> {
    pub id: i64,
    pub path: &'a Path,
    pub duration: &'a str,
    pub description: &'a str,
    pub channels: u32,
}

impl<'a> Row<'a> {
    pub fn new(id: i64, path: &'a Path) -> Self {
        Row {
            id,
            path,
            duration: "0:01.000",
            description: "",
            channels: 1,
        }
    }

    pub fn duration(mut self, duration: &'a str) -> Self {
        self.duration = duration;
        self
    }

    pub fn description(mut self, description: &'a str) -> Self {
        self.description = description;
        self
    }

    pub fn channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }
}

/// Create a Soundminer-shaped database at `db_path` holding `rows`.
pub fn create_db(db_path: &Path, rows: &[Row]) {
    let conn = Connection::open(db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE justinmetadata (
            FilePath TEXT,
            Filename TEXT,
            Pathname TEXT,
            Duration TEXT,
            Description TEXT,
            Channels INTEGER,
            BitDepth INTEGER,
            SampleRate INTEGER,
            Category TEXT,
            BWDate TEXT
        );",
    )
    .unwrap();
    for row in rows {
        let filename = row.path.file_name().unwrap().to_string_lossy().into_owned();
        let pathname = format!("{}/", row.path.parent().unwrap().display());
        conn.execute(
            "INSERT INTO justinmetadata
                (rowid, FilePath, Filename, Pathname, Duration, Description, Channels,
                 BitDepth, SampleRate, Category, BWDate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 16, 48000, 'SFX', '')",
            params![
                row.id,
                row.path.to_string_lossy(),
                filename,
                pathname,
                row.duration,
                row.description,
                row.channels
            ],
        )
        .unwrap();
    }
}

/// Write a 16-bit WAV. `sample(frame, channel)` gives each sample.
pub fn write_wav<F: Fn(usize, usize) -> i16>(path: &Path, channels: u16, frames: usize, sample: F) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: 48000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for frame in 0..frames {
        for channel in 0..channels as usize {
            writer.write_sample(sample(frame, channel)).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// A deterministic pseudo-random mono signal; `seed` picks the signal.
pub fn noise(seed: u32) -> impl Fn(usize, usize) -> i16 {
    move |frame, _| {
        let mut x = (frame as u32).wrapping_mul(2_654_435_761).wrapping_add(seed.wrapping_mul(40_503));
        x ^= x >> 13;
        x = x.wrapping_mul(0x5bd1_e995);
        x ^= x >> 15;
        (x % 20_000) as i16 - 10_000
    }
}

pub fn ids(records: &[smdb_companion_core::FileRecord]) -> Vec<i64> {
    records.iter().map(|r| r.id).collect()
}

pub fn row_ids(db_path: &Path) -> Vec<i64> {
    let conn = Connection::open(db_path).unwrap();
    let mut stmt = conn
        .prepare("SELECT rowid FROM justinmetadata ORDER BY rowid")
        .unwrap();
    let rows = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    rows
}

pub fn text_column(db_path: &Path, id: i64, column: &str) -> Option<String> {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(
        &format!("SELECT \"{}\" FROM justinmetadata WHERE rowid = ?1", column),
        params![id],
        |row| row.get::<_, Option<String>>(0),
    )
    .unwrap()
}

pub fn touch(path: &Path) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"RIFF").unwrap();
    path.to_path_buf()
}

pub fn int_column(db_path: &Path, id: i64, column: &str) -> Option<i64> {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(
        &format!("SELECT \"{}\" FROM justinmetadata WHERE rowid = ?1", column),
        params![id],
        |row| row.get::<_, Option<i64>>(0),
    )
    .unwrap()
}
