use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::core::Database;
use crate::duplicate::DuplicateGroup;
use crate::pipeline::{JobStatus, RecordStore};
use crate::record::ContactRecord;

#[async_trait]
impl RecordStore for Database {
    async fn start_job(&self, job_id: Uuid, total_files: usize) -> Result<()> {
        let result = sqlx::query("UPDATE processing_jobs SET total_files = ?1 WHERE id = ?2")
            .bind(total_files as i64)
            .bind(job_id.to_string())
            .execute(self.pool())
            .await
            .with_context(|| format!("Failed to start job {}", job_id))?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Unknown job {}", job_id));
        }
        self.set_job_status(job_id, JobStatus::Processing).await
    }

    async fn update_progress(&self, job_id: Uuid, processed_files: usize) -> Result<()> {
        sqlx::query("UPDATE processing_jobs SET processed_files = ?1 WHERE id = ?2")
            .bind(processed_files as i64)
            .bind(job_id.to_string())
            .execute(self.pool())
            .await
            .with_context(|| format!("Failed to record progress for job {}", job_id))?;
        Ok(())
    }

    async fn save_records(&self, job_id: Uuid, records: &[ContactRecord]) -> Result<()> {
        self.replace_job_records(job_id, records).await
    }

    async fn save_duplicate_groups(&self, job_id: Uuid, groups: &[DuplicateGroup]) -> Result<()> {
        self.insert_duplicate_groups(job_id, groups).await
    }

    async fn complete_job(&self, job_id: Uuid, total_records: usize, duplicates_found: usize) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = ?1, total_records = ?2, duplicates_found = ?3, completed_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(JobStatus::Completed.to_string())
        .bind(total_records as i64)
        .bind(duplicates_found as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id.to_string())
        .execute(self.pool())
        .await
        .with_context(|| format!("Failed to complete job {}", job_id))?;
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE processing_jobs SET error_message = ?1 WHERE id = ?2")
            .bind(error)
            .bind(job_id.to_string())
            .execute(self.pool())
            .await
            .with_context(|| format!("Failed to record error for job {}", job_id))?;
        self.set_job_status(job_id, JobStatus::Failed).await
    }

    async fn is_cancelled(&self, job_id: Uuid) -> Result<bool> {
        Ok(self
            .get_job(job_id)
            .await?
            .is_some_and(|job| job.status == JobStatus::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordQuery;
    use crate::entity::{Entity, EntityType, ExtractedEntities};
    use crate::pipeline::{DocumentProcessor, GroupSize, JobRunner};
    use crate::recognition::{Document, RecognitionService};
    use std::sync::Arc;

    struct StubRecognizer;

    #[async_trait]
    impl RecognitionService for StubRecognizer {
        async fn extract_entities(&self, document: &Document) -> Result<ExtractedEntities> {
            if document.file_name == "broken.pdf" {
                return Err(anyhow!("service unavailable"));
            }
            Ok(ExtractedEntities::from(vec![
                Entity::new(EntityType::Name, "John Smith", 0.9),
                Entity::new(EntityType::Mobile, "0412 345 678", 0.9),
                Entity::new(EntityType::Address, "12 Example Street Brisbane", 0.9),
                Entity::new(EntityType::Name, "Mary Jones", 0.9),
                Entity::new(EntityType::Mobile, "0499 999 999", 0.9),
                Entity::new(EntityType::Address, "7/44 Harbour Road Sydney", 0.9),
            ]))
        }
    }

    #[tokio::test]
    async fn test_job_run_against_database() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let job = db.create_job(GroupSize::new(2).unwrap(), 3).await.unwrap();
        let documents: Vec<Document> = ["one.pdf", "broken.pdf", "two.pdf"]
            .iter()
            .map(|name| Document::new(name, b"%PDF".to_vec()))
            .collect();

        let processor = DocumentProcessor::new(Arc::new(StubRecognizer), 2);
        let report = JobRunner::new(processor, db.clone())
            .with_group_size(GroupSize::new(2).unwrap())
            .run(job.id, &documents)
            .await
            .unwrap();

        assert_eq!(report.processed_files, 2);
        assert_eq!(report.failed_files, 1);
        assert_eq!(report.records_extracted, 4);
        assert_eq!(report.duplicates_found, 2);

        let stored = db.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.processed_files, 3);
        assert_eq!(stored.total_records, 4);
        assert_eq!(stored.duplicates_found, 2);
        assert!(stored.completed_at.is_some());

        let unique = db.list_records(&RecordQuery::for_job(job.id)).await.unwrap();
        assert_eq!(unique.len(), 2);
        assert!(unique.iter().all(|r| r.source_file.as_deref() == Some("one.pdf")));

        let groups = db.list_duplicate_groups(job.id).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.group.record_count() == 2));
    }

    #[tokio::test]
    async fn test_rerun_replaces_job_records() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let job = db.create_job(GroupSize::default(), 1).await.unwrap();
        let documents = vec![Document::new("one.pdf", b"%PDF".to_vec())];

        for _ in 0..2 {
            let processor = DocumentProcessor::new(Arc::new(StubRecognizer), 2);
            let report = JobRunner::new(processor, db.clone()).run(job.id, &documents).await.unwrap();
            assert_eq!(report.records_extracted, 2);
            assert_eq!(report.duplicates_found, 0);
        }

        let stored = db.list_records(&RecordQuery::all_for_job(job.id)).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| !r.is_duplicate));
        assert!(db.list_duplicate_groups(job.id).await.unwrap().is_empty());

        let summary = db.records_summary(Some(job.id)).await.unwrap();
        assert_eq!(summary.total, 2);
    }

    #[tokio::test]
    async fn test_cancelled_job_is_not_run() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let job = db.create_job(GroupSize::default(), 1).await.unwrap();
        assert!(db.cancel_job(job.id).await.unwrap());

        let processor = DocumentProcessor::new(Arc::new(StubRecognizer), 2);
        let report = JobRunner::new(processor, db.clone())
            .run(job.id, &[Document::new("one.pdf", b"%PDF".to_vec())])
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(db.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Cancelled);
        assert!(db.list_records(&RecordQuery::all_for_job(job.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_unknown_job_fails() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.start_job(Uuid::new_v4(), 1).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_job_records_message() {
        let db = Database::in_memory().await.unwrap();
        let job = db.create_job(GroupSize::default(), 1).await.unwrap();

        db.start_job(job.id, 1).await.unwrap();
        db.fail_job(job.id, "recognition endpoint refused connection").await.unwrap();

        let stored = db.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("recognition endpoint refused connection"));
    }
}
