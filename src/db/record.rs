use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

use super::core::{parse_timestamp, parse_uuid, placeholders, Database};
use crate::record::{
    Address, ContactRecord, Email, PersonName, PhoneNumber, RecordUpdate, RecordsSummary,
};
use crate::TARGET_DB;

const RECORD_COLUMNS: &str = "id, job_id, source_file, first_name, last_name, mobile, landline, \
     address, email, date_of_birth, last_seen_date, is_duplicate, is_valid, is_reviewed, \
     reviewer_notes, confidence_score, created_at, updated_at";

/// Filter for listing records. By default duplicates and invalid records
/// are left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub job_id: Option<Uuid>,
    pub include_duplicates: bool,
    pub include_invalid: bool,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl RecordQuery {
    pub fn for_job(job_id: Uuid) -> Self {
        RecordQuery {
            job_id: Some(job_id),
            ..Default::default()
        }
    }

    /// Every record of the job, duplicates and invalid ones included
    pub fn all_for_job(job_id: Uuid) -> Self {
        RecordQuery {
            job_id: Some(job_id),
            include_duplicates: true,
            include_invalid: true,
            ..Default::default()
        }
    }
}

impl Database {
    /// Replace everything stored for `job_id` with `records`, in one transaction
    pub async fn replace_job_records(&self, job_id: Uuid, records: &[ContactRecord]) -> Result<()> {
        let mut transaction = self.pool().begin().await?;

        let removed = sqlx::query("DELETE FROM records WHERE job_id = ?1")
            .bind(job_id.to_string())
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Failed to clear records of job {}", job_id))?
            .rows_affected();

        for record in records {
            insert_record(&mut *transaction, record)
                .await
                .with_context(|| format!("Failed to insert record {}", record.id))?;
        }
        transaction.commit().await?;

        if removed > 0 {
            debug!(target: TARGET_DB, "Replaced {} earlier records of job {}", removed, job_id);
        }
        info!(target: TARGET_DB, "Saved {} records for job {}", records.len(), job_id);
        Ok(())
    }

    pub async fn get_record(&self, record_id: Uuid) -> Result<Option<ContactRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS))
            .bind(record_id.to_string())
            .fetch_optional(self.pool())
            .await
            .with_context(|| format!("Failed to load record {}", record_id))?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Records in insertion order, filtered by `query`
    pub async fn list_records(&self, query: &RecordQuery) -> Result<Vec<ContactRecord>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM records WHERE 1 = 1", RECORD_COLUMNS));

        if let Some(job_id) = query.job_id {
            builder.push(" AND job_id = ").push_bind(job_id.to_string());
        }
        if !query.include_duplicates {
            builder.push(" AND is_duplicate = 0");
        }
        if !query.include_invalid {
            builder.push(" AND is_valid = 1");
        }
        builder.push(" ORDER BY rowid");
        // SQLite only accepts OFFSET after a LIMIT; -1 means unlimited
        builder.push(" LIMIT ").push_bind(query.limit.unwrap_or(-1));
        builder.push(" OFFSET ").push_bind(query.offset.max(0));

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .context("Failed to list records")?;

        rows.iter().map(record_from_row).collect()
    }

    /// Every record of a job sharing `mobile`, in insertion order
    pub(crate) async fn records_with_mobile(&self, job_id: Uuid, mobile: &str) -> Result<Vec<ContactRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records WHERE job_id = ?1 AND mobile = ?2 ORDER BY rowid",
            RECORD_COLUMNS
        ))
        .bind(job_id.to_string())
        .bind(mobile)
        .fetch_all(self.pool())
        .await
        .with_context(|| format!("Failed to load records for {}", mobile))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Apply a review edit. Returns `Ok(None)` for an unknown record and an
    /// error, leaving the row untouched, when an edited field is invalid.
    pub async fn update_record(&self, record_id: Uuid, update: &RecordUpdate) -> Result<Option<ContactRecord>> {
        let Some(mut record) = self.get_record(record_id).await? else {
            return Ok(None);
        };

        update
            .apply(&mut record)
            .with_context(|| format!("Rejected update for record {}", record_id))?;

        sqlx::query(
            r#"
            UPDATE records
            SET first_name = ?1, last_name = ?2, mobile = ?3, landline = ?4, address = ?5,
                email = ?6, date_of_birth = ?7, last_seen_date = ?8, is_valid = ?9,
                is_reviewed = ?10, reviewer_notes = ?11, updated_at = ?12
            WHERE id = ?13
            "#,
        )
        .bind(record.first_name())
        .bind(record.last_name())
        .bind(record.mobile.as_str())
        .bind(record.landline.as_ref().map(PhoneNumber::as_str))
        .bind(record.address.as_str())
        .bind(record.email.as_ref().map(Email::as_str))
        .bind(record.date_of_birth.as_deref())
        .bind(record.last_seen_date.as_deref())
        .bind(record.is_valid)
        .bind(record.is_reviewed)
        .bind(record.reviewer_notes.as_deref())
        .bind(record.updated_at.to_rfc3339())
        .bind(record_id.to_string())
        .execute(self.pool())
        .await
        .with_context(|| format!("Failed to update record {}", record_id))?;

        debug!(target: TARGET_DB, "Updated record {}", record_id);
        Ok(Some(record))
    }

    /// Returns whether the record exists
    pub async fn set_record_validity(&self, record_id: Uuid, is_valid: bool) -> Result<bool> {
        Ok(self.bulk_set_validity(&[record_id], is_valid).await? > 0)
    }

    /// Mark records valid or invalid; returns how many rows changed
    pub async fn bulk_set_validity(&self, record_ids: &[Uuid], is_valid: bool) -> Result<u64> {
        if record_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE records SET is_valid = ?, is_reviewed = 1, updated_at = ? WHERE id IN ({})",
            placeholders(record_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(is_valid).bind(Utc::now().to_rfc3339());
        for id in record_ids {
            query = query.bind(id.to_string());
        }

        let result = query
            .execute(self.pool())
            .await
            .context("Failed to set record validity")?;

        info!(
            target: TARGET_DB,
            "Marked {} records as {}",
            result.rows_affected(),
            if is_valid { "valid" } else { "invalid" }
        );
        Ok(result.rows_affected())
    }

    /// Returns whether the record existed
    pub async fn delete_record(&self, record_id: Uuid) -> Result<bool> {
        Ok(self.bulk_delete_records(&[record_id]).await? > 0)
    }

    pub async fn bulk_delete_records(&self, record_ids: &[Uuid]) -> Result<u64> {
        if record_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM records WHERE id IN ({})", placeholders(record_ids.len()));
        let mut query = sqlx::query(&sql);
        for id in record_ids {
            query = query.bind(id.to_string());
        }

        let result = query
            .execute(self.pool())
            .await
            .context("Failed to delete records")?;

        info!(target: TARGET_DB, "Deleted {} records", result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Counts for one job, or over every record when `job_id` is `None`
    pub async fn records_summary(&self, job_id: Option<Uuid>) -> Result<RecordsSummary> {
        let (total, valid, duplicates, reviewed): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN is_valid THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN is_duplicate THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN is_reviewed THEN 1 ELSE 0 END), 0)
            FROM records
            WHERE ?1 IS NULL OR job_id = ?1
            "#,
        )
        .bind(job_id.map(|id| id.to_string()))
        .fetch_one(self.pool())
        .await
        .context("Failed to summarise records")?;

        Ok(RecordsSummary {
            total,
            valid,
            invalid: total - valid,
            duplicates,
            reviewed,
            unreviewed: total - reviewed,
        })
    }

    /// Write back the duplicate flags of `records`
    pub(crate) async fn set_duplicate_flags(&self, records: &[ContactRecord]) -> Result<()> {
        let mut transaction = self.pool().begin().await?;
        let now = Utc::now().to_rfc3339();
        for record in records {
            sqlx::query("UPDATE records SET is_duplicate = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(record.is_duplicate)
                .bind(now.as_str())
                .bind(record.id.to_string())
                .execute(&mut *transaction)
                .await?;
        }
        transaction.commit().await?;
        Ok(())
    }
}

async fn insert_record(conn: &mut SqliteConnection, record: &ContactRecord) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO records ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        RECORD_COLUMNS
    ))
    .bind(record.id.to_string())
    .bind(record.job_id.map(|id| id.to_string()))
    .bind(record.source_file.as_deref())
    .bind(record.first_name())
    .bind(record.last_name())
    .bind(record.mobile.as_str())
    .bind(record.landline.as_ref().map(PhoneNumber::as_str))
    .bind(record.address.as_str())
    .bind(record.email.as_ref().map(Email::as_str))
    .bind(record.date_of_birth.as_deref())
    .bind(record.last_seen_date.as_deref())
    .bind(record.is_duplicate)
    .bind(record.is_valid)
    .bind(record.is_reviewed)
    .bind(record.reviewer_notes.as_deref())
    .bind(record.confidence_score)
    .bind(record.created_at.to_rfc3339())
    .bind(record.updated_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

/// Stored rows go back through the field checks
fn record_from_row(row: &SqliteRow) -> Result<ContactRecord> {
    let id: String = row.try_get("id")?;
    let job_id: Option<String> = row.try_get("job_id")?;
    let first_name: String = row.try_get("first_name")?;
    let last_name: String = row.try_get("last_name")?;
    let mobile: String = row.try_get("mobile")?;
    let landline: Option<String> = row.try_get("landline")?;
    let address: String = row.try_get("address")?;
    let email: Option<String> = row.try_get("email")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ContactRecord {
        id: parse_uuid(&id)?,
        job_id: job_id.as_deref().map(parse_uuid).transpose()?,
        source_file: row.try_get("source_file")?,
        name: PersonName::new(&first_name, &last_name)?,
        mobile: PhoneNumber::try_from(mobile)?,
        landline: landline.map(PhoneNumber::try_from).transpose()?,
        address: Address::try_from(address)?,
        email: email.map(Email::try_from).transpose()?,
        date_of_birth: row.try_get("date_of_birth")?,
        last_seen_date: row.try_get("last_seen_date")?,
        is_duplicate: row.try_get("is_duplicate")?,
        is_valid: row.try_get("is_valid")?,
        is_reviewed: row.try_get("is_reviewed")?,
        reviewer_notes: row.try_get("reviewer_notes")?,
        confidence_score: row.try_get("confidence_score")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
