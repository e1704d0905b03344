use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{DocumentOutcome, DocumentProcessor, GroupSize, JobReport, RecordStore};
use crate::duplicate::DuplicateDetector;
use crate::recognition::Document;
use crate::record::ContactRecord;
use crate::TARGET_PIPELINE;

/// Drives a whole job: documents in groups, then duplicate detection over
/// everything the job produced, then persistence.
pub struct JobRunner {
    processor: DocumentProcessor,
    store: Arc<dyn RecordStore>,
    group_size: GroupSize,
    detector: DuplicateDetector,
}

impl JobRunner {
    pub fn new(processor: DocumentProcessor, store: Arc<dyn RecordStore>) -> Self {
        JobRunner {
            processor,
            store,
            group_size: GroupSize::default(),
            detector: DuplicateDetector::new(),
        }
    }

    pub fn with_group_size(mut self, group_size: GroupSize) -> Self {
        self.group_size = group_size;
        self
    }

    /// Run the job. Document failures are counted and do not stop the job;
    /// a store failure marks the job failed and is returned.
    pub async fn run(&self, job_id: Uuid, documents: &[Document]) -> Result<JobReport> {
        match self.run_inner(job_id, documents).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(target: TARGET_PIPELINE, "Job {} failed: {:#}", job_id, e);
                if let Err(mark_err) = self.store.fail_job(job_id, &format!("{:#}", e)).await {
                    warn!(
                        target: TARGET_PIPELINE,
                        "Could not mark job {} as failed: {:#}", job_id, mark_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_inner(&self, job_id: Uuid, documents: &[Document]) -> Result<JobReport> {
        let mut report = JobReport {
            job_id,
            total_files: documents.len(),
            ..JobReport::default()
        };

        if self.store.is_cancelled(job_id).await? {
            info!(target: TARGET_PIPELINE, "Job {} was cancelled before it started", job_id);
            report.cancelled = true;
            return Ok(report);
        }

        self.store.start_job(job_id, documents.len()).await?;
        info!(
            target: TARGET_PIPELINE,
            "Job {}: processing {} documents in groups of {}", job_id, documents.len(), self.group_size
        );

        let mut records: Vec<ContactRecord> = Vec::new();
        for (group_index, group) in documents.chunks(self.group_size.get()).enumerate() {
            if group_index > 0 && self.store.is_cancelled(job_id).await? {
                info!(
                    target: TARGET_PIPELINE,
                    "Job {} cancelled after {} documents; records discarded",
                    job_id,
                    report.processed_files + report.failed_files
                );
                report.cancelled = true;
                return Ok(report);
            }

            info!(
                target: TARGET_PIPELINE,
                "Job {}: group {} ({} documents)", job_id, group_index + 1, group.len()
            );

            for outcome in self.processor.process_group(job_id, group).await {
                match outcome {
                    DocumentOutcome::Extracted { records: extracted, .. } => {
                        report.processed_files += 1;
                        records.extend(extracted);
                    }
                    DocumentOutcome::Failed { .. } => report.failed_files += 1,
                }
            }

            self.store
                .update_progress(job_id, report.processed_files + report.failed_files)
                .await?;
        }

        report.duplicates_found = self.detector.detect_duplicates(&mut records);
        report.records_extracted = records.len();
        let groups = self.detector.duplicate_groups(&records);

        self.store.save_records(job_id, &records).await?;
        self.store.save_duplicate_groups(job_id, &groups).await?;
        self.store
            .complete_job(job_id, report.records_extracted, report.duplicates_found)
            .await?;

        info!(
            target: TARGET_PIPELINE,
            "Job {} completed: {} of {} documents processed, {} failed, {} records, {} duplicates",
            job_id,
            report.processed_files,
            report.total_files,
            report.failed_files,
            report.records_extracted,
            report.duplicates_found
        );

        Ok(report)
    }
}
