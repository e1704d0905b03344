pub mod assembler;
pub mod name;
pub mod types;
pub mod validation;

pub use assembler::{assemble, assemble_candidate, group_entities, Rejection};
pub use types::*;

// Module-level constants
pub const TARGET_RECORD: &str = "record";
