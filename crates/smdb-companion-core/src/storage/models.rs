use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// SQLite rowid of a record; stable for the lifetime of a database.
pub type RecordId = i64;

/// Tags recorded on a FileRecord. `Keep` marks the survivor; every other tag names
/// the detector that matched the record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Algorithm {
    Waveforms,
    Basic,
    SimilarFilename,
    Tags,
    FileTags,
    Compare,
    Duration,
    InvalidPath,
    DualMono,
    Replace,
    Errored,
    Keep,
}

impl Algorithm {
    /// Flags that mark a record for removal on their own, independent of clustering.
    pub fn is_removal_flag(&self) -> bool {
        matches!(
            self,
            Algorithm::FileTags | Algorithm::Compare | Algorithm::Duration | Algorithm::InvalidPath
        )
    }

    /// Tags that annotate a record without affecting its keep decision.
    pub fn is_informational(&self) -> bool {
        matches!(self, Algorithm::DualMono | Algorithm::Errored)
    }
}

/// One row of audio metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: RecordId,
    pub filename: String,
    /// Directory containing the file, without the filename.
    pub path: String,
    pub description: String,
    pub duration: String,
    pub samplerate: u32,
    pub bitdepth: u32,
    pub channels: u32,
    pub algorithm: Vec<Algorithm>,

    /// Normalized filename shared by numbered, copied and audiosuite-processed variants.
    #[serde(skip)]
    pub root: String,
    /// Extra column values fetched for match criteria and preservation rules.
    #[serde(skip)]
    pub data: AHashMap<String, String>,
    #[serde(skip)]
    pub fingerprint: Option<String>,
    #[serde(skip)]
    pub dual_mono: Option<bool>,
}

impl FileRecord {
    pub fn from_full_path(id: RecordId, full_path: &str) -> Self {
        let path = Path::new(full_path);
        FileRecord {
            id,
            filename: path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.filename)
    }

    pub fn stem(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.filename,
        }
    }

    pub fn extension(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }

    pub fn has(&self, algorithm: Algorithm) -> bool {
        self.algorithm.contains(&algorithm)
    }

    /// Add a tag, keeping the list sorted and free of duplicates.
    pub fn tag(&mut self, algorithm: Algorithm) {
        if let Err(pos) = self.algorithm.binary_search(&algorithm) {
            self.algorithm.insert(pos, algorithm);
        }
    }

    pub fn untag(&mut self, algorithm: Algorithm) {
        self.algorithm.retain(|a| *a != algorithm);
    }

    pub fn is_kept(&self) -> bool {
        self.has(Algorithm::Keep)
    }

    /// True for unique records that nothing matched; the "Relevant" view hides them.
    pub fn is_pure_keep(&self) -> bool {
        self.algorithm == [Algorithm::Keep]
    }

    pub fn has_removal_flag(&self) -> bool {
        self.algorithm.iter().any(Algorithm::is_removal_flag)
    }

    pub fn duration_secs(&self) -> Option<f64> {
        parse_duration(&self.duration)
    }

    /// Value of a metadata column. Fetched columns win over the built-in fields.
    pub fn value(&self, column: &str) -> Option<Cow<'_, str>> {
        if let Some(v) = self.data.get(column) {
            return Some(Cow::Borrowed(v.as_str()));
        }
        match column.to_ascii_lowercase().as_str() {
            "filename" => Some(Cow::Borrowed(&self.filename)),
            "pathname" | "path" => Some(Cow::Borrowed(&self.path)),
            "filepath" => Some(Cow::Owned(self.full_path().to_string_lossy().into_owned())),
            "description" => Some(Cow::Borrowed(&self.description)),
            "duration" => Some(Cow::Borrowed(&self.duration)),
            "samplerate" => Some(Cow::Owned(self.samplerate.to_string())),
            "bitdepth" => Some(Cow::Owned(self.bitdepth.to_string())),
            "channels" => Some(Cow::Owned(self.channels.to_string())),
            _ => None,
        }
    }
}

/// A dual-mono file scheduled for channel stripping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualMonoTarget {
    pub id: RecordId,
    pub path: String,
}

/// Parse a Soundminer duration: `M:SS.mmm`, `H:MM:SS.mmm`, or plain seconds.
pub fn parse_duration(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parts: Vec<&str> = value.split(':').collect();
    let secs = match parts.as_slice() {
        [secs] => secs.parse::<f64>().ok()?,
        [mins, secs] => mins.parse::<f64>().ok()? * 60.0 + secs.parse::<f64>().ok()?,
        [hours, mins, secs] => {
            hours.parse::<f64>().ok()? * 3600.0
                + mins.parse::<f64>().ok()? * 60.0
                + secs.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}

/// Inverse of `parse_duration`, in the `M:SS.mmm` form Soundminer writes.
pub fn format_duration(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let minutes = total_ms / 60_000;
    let rem_ms = total_ms % 60_000;
    format!("{}:{:02}.{:03}", minutes, rem_ms / 1000, rem_ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("0:03.250"), Some(3.25));
        assert_eq!(parse_duration("1:02:03.5"), Some(3723.5));
        assert_eq!(parse_duration("12.5"), Some(12.5));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
    }

    #[test]
    fn test_format_duration_round_trips_through_parse() {
        assert_eq!(format_duration(3.25), "0:03.250");
        assert_eq!(format_duration(75.0), "1:15.000");
        assert_eq!(parse_duration(&format_duration(61.5)), Some(61.5));
    }

    #[test]
    fn test_tags_stay_sorted_and_unique() {
        let mut record = FileRecord::default();
        record.tag(Algorithm::Keep);
        record.tag(Algorithm::Basic);
        record.tag(Algorithm::Keep);
        assert_eq!(record.algorithm, vec![Algorithm::Basic, Algorithm::Keep]);

        record.untag(Algorithm::Keep);
        assert!(!record.is_kept());
    }

    #[test]
    fn test_value_prefers_fetched_columns() {
        let mut record = FileRecord::from_full_path(1, "/lib/boom.wav");
        assert_eq!(record.value("Filename").as_deref(), Some("boom.wav"));
        assert_eq!(record.value("Pathname").as_deref(), Some("/lib"));
        assert_eq!(record.value("Category"), None);

        record.data.insert("Pathname".into(), "/lib/".into());
        assert_eq!(record.value("Pathname").as_deref(), Some("/lib/"));
    }

    #[test]
    fn test_stem_and_extension() {
        let record = FileRecord::from_full_path(1, "/lib/door.slam.01.wav");
        assert_eq!(record.stem(), "door.slam.01");
        assert_eq!(record.extension(), "wav");

        let bare = FileRecord::from_full_path(2, "/lib/README");
        assert_eq!(bare.stem(), "README");
        assert_eq!(bare.extension(), "");
    }
}
