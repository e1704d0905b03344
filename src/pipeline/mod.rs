pub mod processor;
pub mod runner;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::duplicate::DuplicateGroup;
use crate::record::ContactRecord;

pub use processor::DocumentProcessor;
pub use runner::JobRunner;

pub const MIN_GROUP_SIZE: usize = 1;
pub const MAX_GROUP_SIZE: usize = 100;

/// Number of documents processed per group, within `1..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSize(usize);

impl GroupSize {
    pub fn new(size: usize) -> Result<Self> {
        if !(MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(&size) {
            return Err(anyhow!(
                "Group size must be between {} and {}, got {}",
                MIN_GROUP_SIZE,
                MAX_GROUP_SIZE,
                size
            ));
        }
        Ok(GroupSize(size))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for GroupSize {
    fn default() -> Self {
        GroupSize(crate::environment::DEFAULT_GROUP_SIZE)
    }
}

impl fmt::Display for GroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to one document
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    Extracted {
        file_name: String,
        records: Vec<ContactRecord>,
    },
    Failed {
        file_name: String,
        error: String,
    },
}

impl DocumentOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            DocumentOutcome::Extracted { file_name, .. } | DocumentOutcome::Failed { file_name, .. } => file_name,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DocumentOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Pending and processing jobs may still be cancelled
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" | "canceled" => JobStatus::Cancelled,
            _ => JobStatus::Pending,
        }
    }
}

/// A processing job as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub group_size: usize,
    pub total_files: usize,
    pub processed_files: usize,
    pub total_records: usize,
    pub duplicates_found: usize,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Totals for one finished job run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
    pub records_extracted: usize,
    pub duplicates_found: usize,
    /// The job was cancelled before its records were saved
    pub cancelled: bool,
}

/// Persistence port used by [`JobRunner`]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Mark the job as processing
    async fn start_job(&self, job_id: Uuid, total_files: usize) -> Result<()>;

    async fn update_progress(&self, job_id: Uuid, processed_files: usize) -> Result<()>;

    /// Store the job's records, replacing any saved by an earlier run
    async fn save_records(&self, job_id: Uuid, records: &[ContactRecord]) -> Result<()>;

    /// Store the job's duplicate groups, replacing any saved by an earlier run

    async fn save_duplicate_groups(&self, job_id: Uuid, groups: &[DuplicateGroup]) -> Result<()>;

    async fn complete_job(&self, job_id: Uuid, total_records: usize, duplicates_found: usize) -> Result<()>;

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Checked between groups; a cancelled job stops without saving records
    async fn is_cancelled(&self, _job_id: Uuid) -> Result<bool> {
        Ok(false)
    }
}
