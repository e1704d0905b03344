use anyhow::{anyhow, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_PATH: &str = "contactscan.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_GROUP_SIZE: usize = 25;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".pdf"];

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_path: String,
    /// Only needed when documents are actually processed
    pub recognition_endpoint: Option<String>,
    pub recognition_api_token: Option<String>,
    pub recognition_timeout: Duration,
    pub recognition_max_retries: u32,
    pub default_group_size: usize,
    pub max_concurrent_requests: usize,
    pub max_file_size: u64,
    /// Lowercased, each with a leading dot
    pub allowed_extensions: Vec<String>,
    pub log_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            recognition_endpoint: None,
            recognition_api_token: None,
            recognition_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            recognition_max_retries: DEFAULT_MAX_RETRIES,
            default_group_size: DEFAULT_GROUP_SIZE,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build settings from any variable source. Unset or blank variables fall
    /// back to their defaults; unparseable numbers are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        let allowed_extensions = match get("ALLOWED_EXTENSIONS") {
            Some(raw) => split_list(&raw, ';')
                .into_iter()
                .map(|ext| normalize_extension(&ext))
                .collect(),
            None => defaults.allowed_extensions,
        };

        let max_concurrent_requests = parse_var(&get, "MAX_CONCURRENT_REQUESTS", defaults.max_concurrent_requests)?;
        if max_concurrent_requests == 0 {
            return Err(anyhow!("MAX_CONCURRENT_REQUESTS must be at least 1"));
        }

        Ok(Settings {
            database_path: get("DATABASE_PATH").unwrap_or(defaults.database_path),
            recognition_endpoint: get("RECOGNITION_ENDPOINT"),
            recognition_api_token: get("RECOGNITION_API_TOKEN"),
            recognition_timeout: Duration::from_secs(parse_var(
                &get,
                "RECOGNITION_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            recognition_max_retries: parse_var(&get, "RECOGNITION_MAX_RETRIES", defaults.recognition_max_retries)?,
            default_group_size: parse_var(&get, "DEFAULT_GROUP_SIZE", defaults.default_group_size)?,
            max_concurrent_requests,
            max_file_size: parse_var(&get, "MAX_FILE_SIZE", defaults.max_file_size)?,
            allowed_extensions,
            log_dir: get("LOG_DIR").unwrap_or(defaults.log_dir),
        })
    }

    /// Whether `file_name` ends in one of the allowed extensions
    pub fn is_allowed_extension(&self, file_name: &str) -> bool {
        let file_name = file_name.to_lowercase();
        self.allowed_extensions.iter().any(|ext| file_name.ends_with(ext.as_str()))
    }
}

fn parse_var<G, T>(get: &G, var: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", raw, var, e)),
        None => Ok(default),
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Split a delimited list, trimming entries and skipping empty ones.
pub fn split_list(value: &str, delimiter: char) -> Vec<String> {
    value
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
