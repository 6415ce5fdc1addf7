//! MySQL implementation of the assignment store.
//!
//! UUIDs are stored as CHAR(36) and round-tripped through strings; the
//! conditional bulk update generates an `IN (...)` placeholder list because
//! MySQL has no array binds.

use super::{AssignmentStore, SqlAssignmentStore};
use crate::{
    Result,
    assignment::{
        ARCHIVED_KIND, AssignedInfluencer, AssignmentId, MIN_CONTACT_ATTEMPTS, Status, StatusId,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySql};

#[derive(FromRow, Clone)]
pub(crate) struct AssignmentRow {
    pub id: String, // MySQL uses CHAR(36) for UUID
    pub list_id: String,
    pub influencer_id: String,
    pub attempts_made: i32,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub kind: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub status_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentRow {
    pub fn into_assignment(self) -> Result<AssignedInfluencer> {
        Ok(AssignedInfluencer {
            id: uuid::Uuid::parse_str(&self.id)?,
            list_id: uuid::Uuid::parse_str(&self.list_id)?,
            influencer_id: uuid::Uuid::parse_str(&self.influencer_id)?,
            attempts_made: self.attempts_made,
            last_contacted_at: self.last_contacted_at,
            kind: self.kind,
            archived_at: self.archived_at,
            status_id: self
                .status_id
                .map(|s| uuid::Uuid::parse_str(&s))
                .transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct StatusRow {
    pub id: String,
    pub model: String,
    pub name: String,
}

impl StatusRow {
    pub fn into_status(self) -> Result<Status> {
        Ok(Status {
            id: uuid::Uuid::parse_str(&self.id)?,
            model: self.model,
            name: self.name,
        })
    }
}

const SELECT_COLUMNS: &str = "id, list_id, influencer_id, attempts_made, last_contacted_at, kind, archived_at, status_id, created_at, updated_at";

#[async_trait]
impl AssignmentStore for SqlAssignmentStore<MySql> {
    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assigned_influencers (
                id CHAR(36) PRIMARY KEY,
                list_id CHAR(36) NOT NULL,
                influencer_id CHAR(36) NOT NULL,
                attempts_made INT NOT NULL DEFAULT 0,
                last_contacted_at TIMESTAMP(6) NULL,
                kind VARCHAR(50) NOT NULL DEFAULT 'assigned',
                archived_at TIMESTAMP(6) NULL,
                status_id CHAR(36) NULL,
                created_at TIMESTAMP(6) NOT NULL,
                updated_at TIMESTAMP(6) NOT NULL,
                INDEX idx_archive_scan (archived_at, last_contacted_at),
                INDEX idx_list (list_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS statuses (
                id CHAR(36) PRIMARY KEY,
                model VARCHAR(100) NOT NULL,
                name VARCHAR(100) NOT NULL,
                UNIQUE KEY idx_statuses_model_name (model, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_assignment(&self, assignment: AssignedInfluencer) -> Result<AssignmentId> {
        sqlx::query(
            r#"
            INSERT INTO assigned_influencers
            (id, list_id, influencer_id, attempts_made, last_contacted_at, kind, archived_at, status_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(assignment.id.to_string())
        .bind(assignment.list_id.to_string())
        .bind(assignment.influencer_id.to_string())
        .bind(assignment.attempts_made)
        .bind(assignment.last_contacted_at)
        .bind(&assignment.kind)
        .bind(assignment.archived_at)
        .bind(assignment.status_id.map(|id| id.to_string()))
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(assignment.id)
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<AssignedInfluencer>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM assigned_influencers WHERE id = ?");
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.into_assignment()).transpose()
    }

    async fn insert_status(&self, status: Status) -> Result<StatusId> {
        sqlx::query("INSERT INTO statuses (id, model, name) VALUES (?, ?, ?)")
            .bind(status.id.to_string())
            .bind(&status.model)
            .bind(&status.name)
            .execute(&self.pool)
            .await?;

        Ok(status.id)
    }

    async fn resolve_status(&self, model: &str, name: &str) -> Result<Option<Status>> {
        let row = sqlx::query_as::<_, StatusRow>(
            "SELECT id, model, name FROM statuses WHERE model = ? AND name = ?",
        )
        .bind(model)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_status()).transpose()
    }

    async fn find_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>> {
        let base = format!(
            "SELECT {SELECT_COLUMNS} FROM assigned_influencers WHERE attempts_made >= ? AND archived_at IS NULL AND kind <> ? AND last_contacted_at IS NOT NULL AND (? IS NULL OR last_contacted_at > ?) AND last_contacted_at <= ? ORDER BY last_contacted_at ASC"
        );
        let sql = match limit {
            Some(_) => format!("{base} LIMIT ?"),
            None => base,
        };

        let mut query = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(MIN_CONTACT_ATTEMPTS)
            .bind(ARCHIVED_KIND)
            .bind(min_time)
            .bind(min_time)
            .bind(max_time);
        if let Some(limit) = limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(|row| row.into_assignment()).collect()
    }

    async fn count_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
    ) -> Result<u64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM assigned_influencers WHERE attempts_made >= ? AND archived_at IS NULL AND kind <> ? AND last_contacted_at IS NOT NULL AND (? IS NULL OR last_contacted_at > ?) AND last_contacted_at <= ?"
        )
        .bind(MIN_CONTACT_ATTEMPTS)
        .bind(ARCHIVED_KIND)
        .bind(min_time)
        .bind(min_time)
        .bind(max_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 as u64)
    }

    async fn oldest_candidate(&self) -> Result<Option<AssignedInfluencer>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM assigned_influencers WHERE attempts_made >= ? AND archived_at IS NULL AND kind <> ? AND last_contacted_at IS NOT NULL ORDER BY last_contacted_at ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(MIN_CONTACT_ATTEMPTS)
            .bind(ARCHIVED_KIND)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.into_assignment()).transpose()
    }

    async fn archive_assignments(
        &self,
        ids: &[AssignmentId],
        status_id: StatusId,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        // One conditional statement with a generated placeholder list; the
        // archived_at IS NULL guard is the idempotency re-check.
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "UPDATE assigned_influencers SET kind = ?, archived_at = ?, status_id = ?, updated_at = ? WHERE archived_at IS NULL AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(ARCHIVED_KIND)
            .bind(now)
            .bind(status_id.to_string())
            .bind(now);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let result = query.execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
