use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processing_jobs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending', -- pending, processing, completed, failed, cancelled
                group_size INTEGER NOT NULL,
                total_files INTEGER NOT NULL DEFAULT 0,
                processed_files INTEGER NOT NULL DEFAULT 0,
                total_records INTEGER NOT NULL DEFAULT 0,
                duplicates_found INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_processing_jobs_status ON processing_jobs (status);

            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                job_id TEXT,
                source_file TEXT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                mobile TEXT NOT NULL,
                landline TEXT,
                address TEXT NOT NULL,
                email TEXT,
                date_of_birth TEXT,
                last_seen_date TEXT,
                is_duplicate BOOLEAN NOT NULL DEFAULT 0,
                is_valid BOOLEAN NOT NULL DEFAULT 1,
                is_reviewed BOOLEAN NOT NULL DEFAULT 0,
                reviewer_notes TEXT,
                confidence_score REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (job_id) REFERENCES processing_jobs (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_records_job_id ON records (job_id);
            CREATE INDEX IF NOT EXISTS idx_records_mobile ON records (mobile);
            CREATE INDEX IF NOT EXISTS idx_records_job_flags ON records (job_id, is_duplicate, is_valid);

            -- Members are the job's records sharing the mobile number
            CREATE TABLE IF NOT EXISTS duplicate_groups (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                mobile_number TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                is_resolved BOOLEAN NOT NULL DEFAULT 0,
                resolution_action TEXT, -- keep_first, manual
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                UNIQUE (job_id, mobile_number),
                FOREIGN KEY (job_id) REFERENCES processing_jobs (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_duplicate_groups_job_id ON duplicate_groups (job_id);
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
