use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

use super::core::{parse_timestamp, parse_uuid, Database};
use crate::pipeline::{GroupSize, Job, JobStatus};
use crate::TARGET_DB;

const JOB_COLUMNS: &str = "id, status, group_size, total_files, processed_files, total_records, \
     duplicates_found, error_message, created_at, completed_at";

/// Page size used when listing jobs without an explicit limit
pub const DEFAULT_JOB_LIMIT: i64 = 50;

impl Database {
    /// Create a pending job and return it
    pub async fn create_job(&self, group_size: GroupSize, total_files: usize) -> Result<Job> {
        let job = Job {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            group_size: group_size.get(),
            total_files,
            processed_files: 0,
            total_records: 0,
            duplicates_found: 0,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO processing_jobs (id, status, group_size, total_files, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.status.to_string())
        .bind(job.group_size as i64)
        .bind(job.total_files as i64)
        .bind(job.created_at.to_rfc3339())
        .execute(self.pool())
        .await
        .context("Failed to create job")?;

        info!(target: TARGET_DB, "Created job {} for {} files", job.id, total_files);
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {} FROM processing_jobs WHERE id = ?1", JOB_COLUMNS))
            .bind(job_id.to_string())
            .fetch_optional(self.pool())
            .await
            .with_context(|| format!("Failed to load job {}", job_id))?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Jobs newest first, optionally only those in `status`
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: i64, offset: i64) -> Result<Vec<Job>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM processing_jobs", JOB_COLUMNS));

        if let Some(status) = status {
            builder.push(" WHERE status = ").push_bind(status.to_string());
        }
        builder.push(" ORDER BY created_at DESC, rowid DESC");
        builder.push(" LIMIT ").push_bind(limit);
        builder.push(" OFFSET ").push_bind(offset.max(0));

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .context("Failed to list jobs")?;

        rows.iter().map(job_from_row).collect()
    }

    /// Cancel a pending or processing job. Returns `Ok(false)` for an unknown
    /// job or one that already finished.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = ?1, completed_at = ?2
            WHERE id = ?3 AND status IN (?4, ?5)
            "#,
        )
        .bind(JobStatus::Cancelled.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(job_id.to_string())
        .bind(JobStatus::Pending.to_string())
        .bind(JobStatus::Processing.to_string())
        .execute(self.pool())
        .await
        .with_context(|| format!("Failed to cancel job {}", job_id))?;

        let cancelled = result.rows_affected() > 0;
        if cancelled {
            info!(target: TARGET_DB, "Cancelled job {}", job_id);
        } else {
            debug!(target: TARGET_DB, "Job {} is unknown or no longer active", job_id);
        }
        Ok(cancelled)
    }

    /// Delete a job together with its records and duplicate groups
    pub async fn delete_job(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM processing_jobs WHERE id = ?1")
            .bind(job_id.to_string())
            .execute(self.pool())
            .await
            .with_context(|| format!("Failed to delete job {}", job_id))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(target: TARGET_DB, "Deleted job {}", job_id);
        }
        Ok(deleted)
    }

    /// Set a job's status; terminal states also stamp `completed_at`
    pub(crate) async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<()> {
        let completed_at = match status {
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => Some(Utc::now().to_rfc3339()),
            JobStatus::Pending | JobStatus::Processing => None,
        };

        sqlx::query("UPDATE processing_jobs SET status = ?1, completed_at = ?2 WHERE id = ?3")
            .bind(status.to_string())
            .bind(completed_at)
            .bind(job_id.to_string())
            .execute(self.pool())
            .await
            .with_context(|| format!("Failed to set job {} to {}", job_id, status))?;

        debug!(target: TARGET_DB, "Job {} is now {}", job_id, status);
        Ok(())
    }
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(Job {
        id: parse_uuid(&id)?,
        status: JobStatus::from(status.as_str()),
        group_size: row.try_get::<i64, _>("group_size")? as usize,
        total_files: row.try_get::<i64, _>("total_files")? as usize,
        processed_files: row.try_get::<i64, _>("processed_files")? as usize,
        total_records: row.try_get::<i64, _>("total_records")? as usize,
        duplicates_found: row.try_get::<i64, _>("duplicates_found")? as usize,
        error_message: row.try_get("error_message")?,
        created_at: parse_timestamp(&created_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordQuery;
    use crate::record::{Address, ContactRecord, PersonName, PhoneNumber};

    #[tokio::test]
    async fn test_create_and_get_job() {
        let db = Database::in_memory().await.unwrap();
        let job = db.create_job(GroupSize::new(10).unwrap(), 42).await.unwrap();

        let loaded = db.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.group_size, 10);
        assert_eq!(loaded.total_files, 42);
        assert_eq!(loaded.processed_files, 0);
        assert!(loaded.completed_at.is_none());

        assert!(db.get_job(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_job_status() {
        let db = Database::in_memory().await.unwrap();
        let job = db.create_job(GroupSize::default(), 1).await.unwrap();

        db.set_job_status(job.id, JobStatus::Processing).await.unwrap();
        let loaded = db.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert!(loaded.completed_at.is_none());

        db.set_job_status(job.id, JobStatus::Completed).await.unwrap();
        let loaded = db.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let db = Database::in_memory().await.unwrap();
        let first = db.create_job(GroupSize::default(), 1).await.unwrap();
        let second = db.create_job(GroupSize::default(), 2).await.unwrap();
        let third = db.create_job(GroupSize::default(), 3).await.unwrap();
        db.set_job_status(second.id, JobStatus::Completed).await.unwrap();

        let ids: Vec<Uuid> = db
            .list_jobs(None, DEFAULT_JOB_LIMIT, 0)
            .await
            .unwrap()
            .iter()
            .map(|job| job.id)
            .collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let pending = db.list_jobs(Some(JobStatus::Pending), DEFAULT_JOB_LIMIT, 0).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|job| job.status == JobStatus::Pending));

        let page = db.list_jobs(None, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);
    }

    #[tokio::test]
    async fn test_cancel_job() {
        let db = Database::in_memory().await.unwrap();
        let pending = db.create_job(GroupSize::default(), 1).await.unwrap();
        let finished = db.create_job(GroupSize::default(), 1).await.unwrap();
        db.set_job_status(finished.id, JobStatus::Completed).await.unwrap();

        assert!(db.cancel_job(pending.id).await.unwrap());
        let loaded = db.get_job(pending.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Cancelled);
        assert!(loaded.completed_at.is_some());

        assert!(!db.cancel_job(pending.id).await.unwrap());
        assert!(!db.cancel_job(finished.id).await.unwrap());
        assert_eq!(db.get_job(finished.id).await.unwrap().unwrap().status, JobStatus::Completed);
        assert!(!db.cancel_job(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_job_removes_records() {
        let db = Database::in_memory().await.unwrap();
        let job = db.create_job(GroupSize::default(), 1).await.unwrap();
        let record = ContactRecord::new(
            PersonName::parse("John Smith").unwrap(),
            PhoneNumber::parse("0412345678").unwrap(),
            Address::parse("12 Example Street Brisbane").unwrap(),
        )
        .with_source("scan.pdf", job.id);
        db.replace_job_records(job.id, &[record.clone()]).await.unwrap();

        assert!(db.delete_job(job.id).await.unwrap());
        assert!(db.get_job(job.id).await.unwrap().is_none());
        assert!(db.get_record(record.id).await.unwrap().is_none());
        assert!(db
            .list_records(&RecordQuery::all_for_job(job.id))
            .await
            .unwrap()
            .is_empty());

        assert!(!db.delete_job(job.id).await.unwrap());
    }
}
