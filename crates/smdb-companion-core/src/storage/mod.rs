pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{Algorithm, DualMonoTarget, FileRecord, RecordId};
pub use queries::CacheValue;
pub use sqlite::Database;
