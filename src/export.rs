use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::RecordQuery;
use crate::record::ContactRecord;

/// Which records go out to an export writer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilter {
    pub job_id: Option<Uuid>,
    /// Restrict to these records when non-empty
    pub record_ids: Vec<Uuid>,
    pub include_duplicates: bool,
    pub include_invalid: bool,
}

impl ExportFilter {
    pub fn for_job(job_id: Uuid) -> Self {
        ExportFilter {
            job_id: Some(job_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &ContactRecord) -> bool {
        if self.job_id.is_some() && record.job_id != self.job_id {
            return false;
        }
        if !self.record_ids.is_empty() && !self.record_ids.contains(&record.id) {
            return false;
        }
        (self.include_duplicates || !record.is_duplicate) && (self.include_invalid || record.is_valid)
    }

    pub fn select<'a>(&self, records: &'a [ContactRecord]) -> Vec<&'a ContactRecord> {
        records.iter().filter(|record| self.matches(record)).collect()
    }

    /// Query for every record the filter could select; [`ExportFilter::select`]
    /// narrows the result to the chosen records.
    pub fn candidate_query(&self) -> RecordQuery {
        RecordQuery {
            job_id: self.job_id,
            include_duplicates: true,
            include_invalid: true,
            ..Default::default()
        }
    }
}

/// Counts describing one export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Records considered before filtering
    pub total: usize,
    /// Records passing the filter
    pub filtered: usize,
    /// Duplicates among all considered records
    pub duplicates: usize,
    pub exported_at: DateTime<Utc>,
}

impl ExportSummary {
    pub fn new(records: &[ContactRecord], filter: &ExportFilter) -> Self {
        ExportSummary {
            total: records.len(),
            filtered: filter.select(records).len(),
            duplicates: records.iter().filter(|r| r.is_duplicate).count(),
            exported_at: Utc::now(),
        }
    }
}
