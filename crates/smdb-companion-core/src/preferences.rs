use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How waveform fingerprints are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaveformMode {
    #[default]
    Exact,
    Similar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
    IsEmpty,
    IsNotEmpty,
    Largest,
    Smallest,
}

/// One step of the keep-selection cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservationRule {
    pub column: String,
    pub operator: Operator,
    #[serde(default)]
    pub variable: String,
}

impl PreservationRule {
    pub fn new(column: &str, operator: Operator, variable: &str) -> Self {
        Self {
            column: column.to_string(),
            operator,
            variable: variable.to_string(),
        }
    }
}

/// User preferences that drive detection and resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub match_criteria: Vec<String>,
    pub ignore_filetype: bool,
    /// Audiosuite suffixes that mark a processed copy of a file.
    pub tags: Vec<String>,
    /// Path fragments that flag a record for removal.
    pub autoselects: Vec<String>,
    pub preservation_order: Vec<PreservationRule>,
    pub display_all_records: bool,
    pub waveform_search_type: WaveformMode,
    /// Percent of matching fingerprint bits for `Similar` mode.
    pub similarity_threshold: f64,
    pub store_waveforms: bool,
    pub fetch_waveforms: bool,
    /// Records under these directories are never loaded.
    pub safe_folders: Vec<PathBuf>,
    /// Row ids per DELETE statement.
    pub batch_size: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        use Operator::*;
        Self {
            match_criteria: vec!["Filename".into(), "Channels".into(), "Duration".into()],
            ignore_filetype: false,
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
            autoselects: Vec::new(),
            preservation_order: vec![
                PreservationRule::new("Description", IsNotEmpty, ""),
                PreservationRule::new("Pathname", DoesNotContain, "Audio Files"),
                PreservationRule::new("Pathname", Contains, "LIBRARIES"),
                PreservationRule::new("Pathname", Contains, "LIBRARY"),
                PreservationRule::new("Pathname", Contains, "/LIBRARY"),
                PreservationRule::new("Pathname", Contains, "LIBRARY/"),
                PreservationRule::new("Duration", Largest, ""),
                PreservationRule::new("Channels", Largest, ""),
                PreservationRule::new("SampleRate", Largest, ""),
                PreservationRule::new("BitDepth", Largest, ""),
                PreservationRule::new("BWDate", Smallest, ""),
                PreservationRule::new("ScannedDate", Smallest, ""),
            ],
            display_all_records: true,
            waveform_search_type: WaveformMode::Exact,
            similarity_threshold: 80.0,
            store_waveforms: true,
            fetch_waveforms: true,
            safe_folders: Vec::new(),
            batch_size: 1000,
        }
    }
}

impl Preferences {
    /// True if `name` contains any audiosuite tag.
    pub fn has_audiosuite_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| !tag.is_empty() && name.contains(tag.as_str()))
    }

    /// Extra columns the match criteria and preservation rules read from each record.
    pub fn data_requirements(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let wanted = self
            .match_criteria
            .iter()
            .chain(self.preservation_order.iter().map(|rule| &rule.column));
        for column in wanted {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                columns.push(column.clone());
            }
        }
        columns
    }

    /// True if `path` lies inside a safe folder.
    pub fn is_safe(&self, path: &std::path::Path) -> bool {
        self.safe_folders.iter().any(|folder| path.starts_with(folder))
    }
}

/// ProTools audiosuite process suffixes.
pub const DEFAULT_TAGS: &[&str] = &[
    "-1eqa_", "-6030_", "-7eqa_", "-A2sA_", "-A44m_", "-A44s_", "-Alt7S_", "-ASMA_", "-AVrP_",
    "-AVrT_", "-AVSt_", "-Altvrb8_", "-DUPL_", "-DVerb_", "-GAIN_", "-Gain_", "-M2DN_", "-NORM_",
    "-NYCT_", "-PiSh_", "-PnT2_", "-PnTPro_", "-ProQ2_", "-PSh_", "-RVRS_", "-RX7Cnct_",
    "-spce_", "-TCEX_", "-TiSh_", "-TmShft_", "-VariFi_", "-VlhllVV_", "-VSPD_", "-VitmnMn_",
    "-VtmnStr_", "-X2mA_", "-X2sA_", "-XForm_", "-Z2N5_", "-Z2S5_", "-Z4n2_", "-ZXN5_",
];
