pub mod db;
pub mod duplicate;
pub mod entity;
pub mod environment;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod recognition;
pub mod record;

pub const TARGET_RECOGNITION: &str = "recognition_request";
pub const TARGET_PIPELINE: &str = "pipeline";
pub const TARGET_DB: &str = "db_query";
