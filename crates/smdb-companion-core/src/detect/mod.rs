pub mod basic;
pub mod compare;
pub mod dual_mono;
pub mod filename;
pub mod flags;
pub mod waveform;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{DetectorError, Error, SearchAborted};
use crate::preferences::Preferences;
use crate::progress::{self, CancelToken, StatusChannel, StatusReporter};
use crate::storage::models::{Algorithm, FileRecord};
use crate::storage::CacheValue;

pub const DEFAULT_MIN_DURATION: f64 = 0.5;

fn default_min_dur() -> f64 {
    DEFAULT_MIN_DURATION
}

/// An enabled detector and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum DetectorConfig {
    Basic,
    /// Similar filenames: numbered, copied and renamed variants share a root.
    Filename,
    Audiosuite,
    Waveform,
    DualMono,
    Filetags,
    Invalidpath,
    Duration {
        #[serde(default = "default_min_dur")]
        min_dur: f64,
    },
    Dbcompare {
        #[serde(default)]
        db: Option<PathBuf>,
    },
}

impl DetectorConfig {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            DetectorConfig::Basic => Algorithm::Basic,
            DetectorConfig::Filename => Algorithm::SimilarFilename,
            DetectorConfig::Audiosuite => Algorithm::Tags,
            DetectorConfig::Waveform => Algorithm::Waveforms,
            DetectorConfig::DualMono => Algorithm::DualMono,
            DetectorConfig::Filetags => Algorithm::FileTags,
            DetectorConfig::Invalidpath => Algorithm::InvalidPath,
            DetectorConfig::Duration { .. } => Algorithm::Duration,
            DetectorConfig::Dbcompare { .. } => Algorithm::Compare,
        }
    }

    /// Search stage reported while this detector runs.
    pub fn stage(&self) -> &'static str {
        match self {
            DetectorConfig::Waveform => "waveform",
            DetectorConfig::DualMono => "dual_mono",
            DetectorConfig::Dbcompare { .. } => "compare",
            _ => "dupes",
        }
    }
}

/// The loose `{ id, enabled, min_dur?, db? }` shape a UI sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlgorithmEntry {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_dur: Option<f64>,
    #[serde(default)]
    pub db: Option<PathBuf>,
}

impl TryFrom<&AlgorithmEntry> for DetectorConfig {
    type Error = Error;

    fn try_from(entry: &AlgorithmEntry) -> Result<Self, Self::Error> {
        Ok(match entry.id.as_str() {
            "basic" => DetectorConfig::Basic,
            "filename" => DetectorConfig::Filename,
            "audiosuite" => DetectorConfig::Audiosuite,
            "waveform" => DetectorConfig::Waveform,
            "dual_mono" => DetectorConfig::DualMono,
            "filetags" => DetectorConfig::Filetags,
            "invalidpath" => DetectorConfig::Invalidpath,
            "duration" => DetectorConfig::Duration {
                min_dur: entry.min_dur.unwrap_or(DEFAULT_MIN_DURATION),
            },
            "dbcompare" => DetectorConfig::Dbcompare {
                db: entry.db.clone(),
            },
            other => return Err(Error::UnknownDetector(other.to_string())),
        })
    }
}

/// The detectors enabled for one search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorSet {
    configs: Vec<DetectorConfig>,
}

impl DetectorSet {
    pub fn new(configs: Vec<DetectorConfig>) -> Self {
        let mut set = DetectorSet::default();
        for config in configs {
            set.push(config);
        }
        set
    }

    /// Build from UI entries. Disabled entries are dropped; an unknown id is an error
    /// even when disabled.
    pub fn from_entries(entries: &[AlgorithmEntry]) -> Result<Self, Error> {
        let mut set = DetectorSet::default();
        for entry in entries {
            let config = DetectorConfig::try_from(entry)?;
            if entry.enabled {
                set.push(config);
            }
        }
        Ok(set)
    }

    fn push(&mut self, config: DetectorConfig) {
        let algorithm = config.algorithm();
        self.configs.retain(|c| c.algorithm() != algorithm);
        self.configs.push(config);
    }

    pub fn configs(&self) -> &[DetectorConfig] {
        &self.configs
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn is_enabled(&self, algorithm: Algorithm) -> bool {
        self.configs.iter().any(|c| c.algorithm() == algorithm)
    }

    /// Filename-based detectors switch the Basic key to the normalized root.
    pub fn uses_roots(&self) -> bool {
        self.is_enabled(Algorithm::SimilarFilename) || self.is_enabled(Algorithm::Tags)
    }

    pub fn compare_db(&self) -> Option<&PathBuf> {
        self.configs.iter().find_map(|c| match c {
            DetectorConfig::Dbcompare { db } => db.as_ref(),
            _ => None,
        })
    }

    /// Fill in the compare database when the config left it open.
    pub fn set_default_compare_db(&mut self, path: PathBuf) {
        for config in &mut self.configs {
            if let DetectorConfig::Dbcompare { db: db @ None } = config {
                *db = Some(path.clone());
            }
        }
    }
}

/// Shared, read-only inputs every detector runs against.
pub struct SearchContext<'a> {
    pub records: &'a [FileRecord],
    pub pref: &'a Preferences,
    pub detectors: &'a DetectorSet,
    pub cancel: &'a CancelToken,
    pub reporter: &'a dyn StatusReporter,
    pub decode_pool: &'a rayon::ThreadPool,
}

/// What one detector found. Indices refer to `SearchContext::records`.
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    pub algorithm: Algorithm,
    /// Sets of records this detector considers duplicates of each other.
    pub groups: Vec<Vec<usize>>,
    /// Records tagged outright, independent of clustering.
    pub flags: Vec<usize>,
    /// Records tagged only if they end up as a non-keeper in a cluster.
    pub marks: Vec<usize>,
    pub errors: Vec<DetectorError>,
    pub cache: Vec<(usize, CacheValue)>,
}

impl DetectorOutput {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            groups: Vec::new(),
            flags: Vec::new(),
            marks: Vec::new(),
            errors: Vec::new(),
            cache: Vec::new(),
        }
    }
}

/// Run every enabled detector in parallel.
pub fn run_all(ctx: &SearchContext) -> Result<Vec<DetectorOutput>, SearchAborted> {
    let runnable: Vec<&DetectorConfig> = ctx
        .detectors
        .configs()
        .iter()
        .filter(|config| match config {
            DetectorConfig::Filename | DetectorConfig::Audiosuite
                if !ctx.detectors.is_enabled(Algorithm::Basic) =>
            {
                warn!("{:?} requires the basic detector; skipping", config.algorithm());
                false
            }
            _ => true,
        })
        .collect();

    let total = runnable.len();
    let outputs = runnable
        .par_iter()
        .enumerate()
        .map(|(n, config)| -> Result<DetectorOutput, SearchAborted> {
            ctx.cancel.check()?;
            progress::emit(
                ctx.reporter,
                StatusChannel::Search,
                config.stage(),
                20 + progress::percent(n, total) * 60 / 100,
                format!("Running {:?} detection", config.algorithm()),
            );
            let output = run(config, ctx)?;
            debug!(
                "{:?}: {} groups, {} flags, {} errors",
                output.algorithm,
                output.groups.len(),
                output.flags.len(),
                output.errors.len()
            );
            Ok(output)
        })
        .collect::<Result<Vec<_>, _>>()?;

    ctx.cancel.check()?;
    Ok(outputs)
}

fn run(config: &DetectorConfig, ctx: &SearchContext) -> Result<DetectorOutput, SearchAborted> {
    match config {
        DetectorConfig::Basic => Ok(basic::detect(ctx)),
        DetectorConfig::Filename => Ok(filename::detect_similar(ctx)),
        DetectorConfig::Audiosuite => Ok(filename::detect_audiosuite(ctx)),
        DetectorConfig::Waveform => waveform::detect(ctx),
        DetectorConfig::DualMono => dual_mono::detect(ctx),
        DetectorConfig::Filetags => Ok(flags::detect_file_tags(ctx)),
        DetectorConfig::Invalidpath => Ok(flags::detect_invalid_paths(ctx)),
        DetectorConfig::Duration { min_dur } => Ok(flags::detect_short(ctx, *min_dur)),
        DetectorConfig::Dbcompare { db } => match db {
            Some(db) => compare::detect(ctx, db),
            None => Err(SearchAborted::Failed(
                "database compare is enabled but no compare database is open".to_string(),
            )),
        },
    }
}

/// Build a per-record error and log it.
pub(crate) fn record_error(
    record: &FileRecord,
    algorithm: Algorithm,
    message: impl ToString,
) -> DetectorError {
    let message = message.to_string();
    warn!(
        "{:?} failed on {}: {}",
        algorithm,
        record.full_path().display(),
        message
    );
    DetectorError {
        record_id: record.id,
        algorithm,
        message,
    }
}
