pub mod audio;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod license;
pub mod metadata;
pub mod mutation;
pub mod platform;
pub mod preferences;
pub mod progress;
pub mod resolve;
pub mod scanner;
pub mod search;
pub mod storage;
pub mod store;

pub use config::AppConfig;
pub use detect::{AlgorithmEntry, DetectorConfig, DetectorSet};
pub use engine::Companion;
pub use error::{DetectorError, Error, LoadError, RemoveError, ReplaceError, SearchAborted};
pub use metadata::Metadata;
pub use mutation::{Disposition, RemoveOutcome, RemoveRequest};
pub use preferences::{Operator, Preferences, PreservationRule, WaveformMode};
pub use progress::{CancelToken, SilentReporter, StatusChannel, StatusReporter, StatusUpdate};
pub use resolve::SearchResults;
pub use storage::{Algorithm, DualMonoTarget, FileRecord, RecordId};
pub use store::Source;
