use std::io;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::duplicate::TARGET_DUPLICATE;
use crate::entity::TARGET_ENTITY;
use crate::record::TARGET_RECORD;
use crate::{TARGET_PIPELINE, TARGET_RECOGNITION};

/// Install stdout and daily-rolling file logging.
///
/// `RUST_LOG` replaces the stdout filter when set.
pub fn configure_logging(log_dir: &str) {
    let stdout_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,recognition_request=info,db_query=warn,sqlx=off")
    });

    // Stdout log configuration
    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_filter(stdout_filter);

    // File log configuration
    let file_appender = rolling::daily(log_dir, "contactscan.log");
    let file_log = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(file_filter()));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();
}

/// The log file gets debug output from every crate target
fn file_filter() -> String {
    let debug_targets = [
        TARGET_PIPELINE,
        TARGET_RECOGNITION,
        TARGET_RECORD,
        TARGET_ENTITY,
        TARGET_DUPLICATE,
    ];
    let directives: Vec<String> = debug_targets.iter().map(|target| format!("{}=debug", target)).collect();
    format!("info,{},sqlx=info", directives.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_filter_covers_crate_targets() {
        let filter = file_filter();
        for target in ["pipeline", "recognition_request", "record", "entity", "duplicate"] {
            assert!(filter.contains(&format!("{}=debug", target)), "{} missing from {}", target, filter);
        }
        assert!(EnvFilter::try_new(&filter).is_ok());
    }
}
