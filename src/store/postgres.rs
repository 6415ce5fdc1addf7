//! PostgreSQL implementation of the assignment store.
//!
//! Uses native UUID columns, `= ANY($1)` id lists for the conditional bulk
//! update, and a partial index covering the archive scan predicate.

use super::{AssignmentStore, SqlAssignmentStore};
use crate::{
    Result,
    assignment::{
        ARCHIVED_KIND, AssignedInfluencer, AssignmentId, MIN_CONTACT_ATTEMPTS, Status, StatusId,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres};

#[derive(FromRow, Clone)]
pub(crate) struct AssignmentRow {
    pub id: uuid::Uuid,
    pub list_id: uuid::Uuid,
    pub influencer_id: uuid::Uuid,
    pub attempts_made: i32,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub kind: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub status_id: Option<uuid::Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentRow {
    pub fn into_assignment(self) -> AssignedInfluencer {
        AssignedInfluencer {
            id: self.id,
            list_id: self.list_id,
            influencer_id: self.influencer_id,
            attempts_made: self.attempts_made,
            last_contacted_at: self.last_contacted_at,
            kind: self.kind,
            archived_at: self.archived_at,
            status_id: self.status_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct StatusRow {
    pub id: uuid::Uuid,
    pub model: String,
    pub name: String,
}

impl StatusRow {
    pub fn into_status(self) -> Status {
        Status {
            id: self.id,
            model: self.model,
            name: self.name,
        }
    }
}

#[async_trait]
impl AssignmentStore for SqlAssignmentStore<Postgres> {
    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assigned_influencers (
                id UUID PRIMARY KEY,
                list_id UUID NOT NULL,
                influencer_id UUID NOT NULL,
                attempts_made INTEGER NOT NULL DEFAULT 0,
                last_contacted_at TIMESTAMPTZ,
                kind VARCHAR(50) NOT NULL DEFAULT 'assigned',
                archived_at TIMESTAMPTZ,
                status_id UUID,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE TABLE IF NOT EXISTS statuses (
                id UUID PRIMARY KEY,
                model VARCHAR(100) NOT NULL,
                name VARCHAR(100) NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_statuses_model_name
            ON statuses (model, name);

            CREATE INDEX IF NOT EXISTS idx_assigned_influencers_archive_scan
            ON assigned_influencers (last_contacted_at) WHERE archived_at IS NULL;

            CREATE INDEX IF NOT EXISTS idx_assigned_influencers_list
            ON assigned_influencers (list_id);
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.list_id)
        .bind(assignment.influencer_id)
        .bind(assignment.attempts_made)
        .bind(assignment.last_contacted_at)
        .bind(&assignment.kind)
        .bind(assignment.archived_at)
        .bind(assignment.status_id)
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(assignment.id)
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<AssignedInfluencer>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            "SELECT id, list_id, influencer_id, attempts_made, last_contacted_at, kind, archived_at, status_id, created_at, updated_at FROM assigned_influencers WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into_assignment()))
    }

    async fn insert_status(&self, status: Status) -> Result<StatusId> {
        sqlx::query("INSERT INTO statuses (id, model, name) VALUES ($1, $2, $3)")
            .bind(status.id)
            .bind(&status.model)
            .bind(&status.name)
            .execute(&self.pool)
            .await?;

        Ok(status.id)
    }

    async fn resolve_status(&self, model: &str, name: &str) -> Result<Option<Status>> {
        let row = sqlx::query_as::<_, StatusRow>(
            "SELECT id, model, name FROM statuses WHERE model = $1 AND name = $2",
        )
        .bind(model)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into_status()))
    }

    async fn find_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT id, list_id, influencer_id, attempts_made, last_contacted_at, kind, archived_at, status_id, created_at, updated_at FROM assigned_influencers WHERE attempts_made >= $1 AND archived_at IS NULL AND kind <> $2 AND last_contacted_at IS NOT NULL AND ($3::timestamptz IS NULL OR last_contacted_at > $3) AND last_contacted_at <= $4 ORDER BY last_contacted_at ASC LIMIT $5"
        )
        .bind(MIN_CONTACT_ATTEMPTS)
        .bind(ARCHIVED_KIND)
        .bind(min_time)
        .bind(max_time)
        .bind(limit.map(i64::from))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into_assignment()).collect())
    }

    async fn count_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
    ) -> Result<u64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM assigned_influencers WHERE attempts_made >= $1 AND archived_at IS NULL AND kind <> $2 AND last_contacted_at IS NOT NULL AND ($3::timestamptz IS NULL OR last_contacted_at > $3) AND last_contacted_at <= $4"
        )
        .bind(MIN_CONTACT_ATTEMPTS)
        .bind(ARCHIVED_KIND)
        .bind(min_time)
        .bind(max_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 as u64)
    }

    async fn oldest_candidate(&self) -> Result<Option<AssignedInfluencer>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            "SELECT id, list_id, influencer_id, attempts_made, last_contacted_at, kind, archived_at, status_id, created_at, updated_at FROM assigned_influencers WHERE attempts_made >= $1 AND archived_at IS NULL AND kind <> $2 AND last_contacted_at IS NOT NULL ORDER BY last_contacted_at ASC LIMIT 1"
        )
        .bind(MIN_CONTACT_ATTEMPTS)
        .bind(ARCHIVED_KIND)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into_assignment()))
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

        // Single conditional statement; the archived_at IS NULL guard is the
        // idempotency re-check, so rows claimed by a concurrent sweep simply
        // drop out of the affected count.
        let result = sqlx::query(
            "UPDATE assigned_influencers SET kind = $2, archived_at = $3, status_id = $4, updated_at = $3 WHERE id = ANY($1) AND archived_at IS NULL"
        )
        .bind(ids)
        .bind(ARCHIVED_KIND)
        .bind(now)
        .bind(status_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
