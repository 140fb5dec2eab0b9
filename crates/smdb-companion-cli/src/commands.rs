use clap::{Args, Parser, Subcommand, ValueEnum};
use smdb_companion_core::Disposition;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "smdb-companion")]
#[command(about = "Find and thin duplicate records in Soundminer databases", long_about = None)]
pub struct Cli {
    /// Database to work on instead of the configured one
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search the database for duplicate records
    Search(SearchArgs),
    /// Search audio files under folders instead of a database
    Scan {
        /// Folders to walk; defaults to the configured folders
        folders: Vec<PathBuf>,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// List records whose column contains the text
    Find {
        text: String,
        #[arg(long, default_value = "Filename")]
        column: String,
        #[arg(long)]
        case_sensitive: bool,
        /// Write the matching records to a CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Replace text in one column of every record
    Replace {
        find: String,
        replace: String,
        #[arg(long, default_value = "Filename")]
        column: String,
        #[arg(long)]
        case_sensitive: bool,
        /// Flag changed rows so Soundminer rewrites their file metadata
        #[arg(long)]
        mark_dirty: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Search, then remove every record not marked Keep
    Remove(RemoveArgs),
    /// Print the columns of the database
    Columns,
    /// Print the number of records in the database
    Size,
    /// Forget cached fingerprints so the next waveform search recomputes them
    ClearCache,
    /// Check a registration key
    CheckReg {
        name: String,
        email: String,
        license: String,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Detector to enable (repeatable); defaults to the configured detectors
    #[arg(long = "detector", short = 'd')]
    pub detectors: Vec<String>,
    /// Minimum duration in seconds for the duration detector
    #[arg(long)]
    pub min_dur: Option<f64>,
    /// Database to compare against; enables the compare detector
    #[arg(long)]
    pub compare: Option<PathBuf>,
    /// Only show clusters and flagged records
    #[arg(long)]
    pub relevant: bool,
    /// Write the results to a CSV file
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub search: SearchArgs,
    /// What to do with the audio files of removed records
    #[arg(long, value_enum, default_value_t = FileAction::Keep)]
    pub files: FileAction,
    /// Apply the removal to a copy of the database named `<db>_<tag>`
    #[arg(long)]
    pub clone: Option<String>,
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,
    /// Rewrite kept dual-mono files as mono
    #[arg(long)]
    pub strip_dual_mono: bool,
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileAction {
    Keep,
    Trash,
    Delete,
    Archive,
}

impl From<FileAction> for Disposition {
    fn from(action: FileAction) -> Self {
        match action {
            FileAction::Keep => Disposition::Keep,
            FileAction::Trash => Disposition::Trash,
            FileAction::Delete => Disposition::Delete,
            FileAction::Archive => Disposition::Archive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_cache_takes_the_global_db() {
        let cli = Cli::try_parse_from(["smdb-companion", "clear-cache", "--db", "/lib.sqlite"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::ClearCache)));
        assert_eq!(cli.db, Some(PathBuf::from("/lib.sqlite")));
        assert!(Cli::try_parse_from(["smdb-companion", "clear-cache", "extra"]).is_err());
    }

    #[test]
    fn test_remove_file_action_maps_to_disposition() {
        let cli = Cli::try_parse_from(["smdb-companion", "remove", "--files", "trash", "--yes"]).unwrap();
        match cli.command {
            Some(Commands::Remove(args)) => {
                assert_eq!(Disposition::from(args.files), Disposition::Trash);
                assert!(args.yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
