use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use super::core::{parse_timestamp, parse_uuid, Database};
use crate::duplicate::{DuplicateDetector, DuplicateGroup};
use crate::TARGET_DB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Set by the pipeline: the first record encountered is kept
    KeepFirst,
    /// A reviewer picked the record to keep
    Manual,
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionAction::KeepFirst => write!(f, "keep_first"),
            ResolutionAction::Manual => write!(f, "manual"),
        }
    }
}

impl From<&str> for ResolutionAction {
    fn from(s: &str) -> Self {
        match s.trim() {
            "manual" => ResolutionAction::Manual,
            _ => ResolutionAction::KeepFirst,
        }
    }
}

/// A persisted duplicate group together with its current members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDuplicateGroup {
    pub id: Uuid,
    pub job_id: Uuid,
    pub is_resolved: bool,
    pub resolution_action: Option<ResolutionAction>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub group: DuplicateGroup,
}

impl Database {
    /// Store the groups found for a job. Re-running a job replaces its groups.
    pub async fn insert_duplicate_groups(&self, job_id: Uuid, groups: &[DuplicateGroup]) -> Result<()> {
        let mut transaction = self.pool().begin().await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query("DELETE FROM duplicate_groups WHERE job_id = ?1")
            .bind(job_id.to_string())
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Failed to clear duplicate groups of job {}", job_id))?;

        for group in groups {
            sqlx::query(
                r#"
                INSERT INTO duplicate_groups (id, job_id, mobile_number, record_count, resolution_action, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(job_id.to_string())
            .bind(group.mobile_number.as_str())
            .bind(group.record_count() as i64)
            .bind(ResolutionAction::KeepFirst.to_string())
            .bind(now.as_str())
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Failed to save duplicate group {}", group.mobile_number))?;
        }

        transaction.commit().await?;
        info!(target: TARGET_DB, "Saved {} duplicate groups for job {}", groups.len(), job_id);
        Ok(())
    }

    /// Groups for a job, largest first, with their member records loaded
    pub async fn list_duplicate_groups(&self, job_id: Uuid) -> Result<Vec<StoredDuplicateGroup>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, mobile_number, is_resolved, resolution_action, created_at, resolved_at
            FROM duplicate_groups
            WHERE job_id = ?1
            ORDER BY record_count DESC, rowid
            "#,
        )
        .bind(job_id.to_string())
        .fetch_all(self.pool())
        .await
        .context("Failed to list duplicate groups")?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            groups.push(self.stored_group_from_row(row).await?);
        }
        Ok(groups)
    }

    pub async fn get_duplicate_group(&self, group_id: Uuid) -> Result<Option<StoredDuplicateGroup>> {
        let row = sqlx::query(
            r#"
            SELECT id, job_id, mobile_number, is_resolved, resolution_action, created_at, resolved_at
            FROM duplicate_groups
            WHERE id = ?1
            "#,
        )
        .bind(group_id.to_string())
        .fetch_optional(self.pool())
        .await
        .with_context(|| format!("Failed to load duplicate group {}", group_id))?;

        match row {
            Some(row) => Ok(Some(self.stored_group_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    /// Keep `keep_record_id` and flag the rest of the group as duplicates.
    ///
    /// Returns `Ok(false)` when the group does not exist or the record is not
    /// one of its members.
    pub async fn resolve_duplicate_group(&self, group_id: Uuid, keep_record_id: Uuid) -> Result<bool> {
        let Some(mut stored) = self.get_duplicate_group(group_id).await? else {
            debug!(target: TARGET_DB, "No duplicate group {}", group_id);
            return Ok(false);
        };

        if !DuplicateDetector::new().resolve_duplicates(&mut stored.group, keep_record_id) {
            return Ok(false);
        }

        self.set_duplicate_flags(&stored.group.records).await?;

        sqlx::query(
            r#"
            UPDATE duplicate_groups
            SET is_resolved = 1, resolution_action = ?1, resolved_at = ?2, record_count = ?3
            WHERE id = ?4
            "#,
        )
        .bind(ResolutionAction::Manual.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(stored.group.record_count() as i64)
        .bind(group_id.to_string())
        .execute(self.pool())
        .await
        .with_context(|| format!("Failed to mark duplicate group {} resolved", group_id))?;

        info!(
            target: TARGET_DB,
            "Resolved duplicate group {}: kept record {}", group_id, keep_record_id
        );
        Ok(true)
    }

    async fn stored_group_from_row(&self, row: &SqliteRow) -> Result<StoredDuplicateGroup> {
        let id: String = row.try_get("id")?;
        let job_id = parse_uuid(&row.try_get::<String, _>("job_id")?)?;
        let mobile_number: String = row.try_get("mobile_number")?;
        let resolution_action: Option<String> = row.try_get("resolution_action")?;
        let created_at: String = row.try_get("created_at")?;
        let resolved_at: Option<String> = row.try_get("resolved_at")?;

        let records = self.records_with_mobile(job_id, &mobile_number).await?;

        Ok(StoredDuplicateGroup {
            id: parse_uuid(&id)?,
            job_id,
            is_resolved: row.try_get("is_resolved")?,
            resolution_action: resolution_action.as_deref().map(ResolutionAction::from),
            created_at: parse_timestamp(&created_at)?,
            resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
            group: DuplicateGroup {
                mobile_number,
                records,
            },
        })
    }
}
