use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::detect::DetectorConfig;
use crate::preferences::Preferences;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: Option<PathBuf>,
    pub compare_database: Option<PathBuf>,
    /// Roots for filesystem searches.
    pub folders: Vec<String>,
    pub ignore_patterns: Vec<String>,
    /// Worker threads for audio decoding. 0 picks a default.
    pub decode_threads: usize,
    pub preferences: Preferences,
    pub detectors: Vec<DetectorConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            compare_database: None,
            folders: Vec::new(),
            ignore_patterns: Vec::new(),
            decode_threads: 0,
            preferences: Preferences::default(),
            detectors: vec![DetectorConfig::Basic],
        }
    }
}

impl AppConfig {
    pub fn decode_threads(&self) -> usize {
        resolve_decode_threads(self.decode_threads)
    }
}

/// Layer `Config.toml` (optional) and `SMDB__*` environment variables over the defaults.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from("Config")
}

pub fn load_configuration_from(name: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(name).required(false))
        .add_source(
            Environment::with_prefix("SMDB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Available parallelism capped at 8 when `requested` is 0.
pub fn resolve_decode_threads(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8)
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}
