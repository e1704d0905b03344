pub mod core;
mod duplicate;
mod job;
mod record;
mod schema;
mod store;

// Re-export Database and the types its queries return
pub use self::core::Database;
pub use self::duplicate::{ResolutionAction, StoredDuplicateGroup};
pub use self::job::DEFAULT_JOB_LIMIT;
pub use self::record::RecordQuery;
