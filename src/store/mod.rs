//! Assignment persistence with database-specific backends.
//!
//! All reads and mutations the archival subsystem performs go through the
//! [`AssignmentStore`] trait. PostgreSQL and MySQL implementations live in
//! feature-gated submodules with backend-specific SQL; an in-memory
//! implementation for deterministic tests sits behind the `test` feature.

use crate::{
    Result,
    assignment::{AssignedInfluencer, AssignmentId, Status, StatusId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Pool};
use std::marker::PhantomData;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "test")]
pub mod test;

/// Database operations consumed by the archival subsystem.
///
/// Candidate scans are pure reads over the eligibility predicate
/// (`attempts_made >= 3 AND archived_at IS NULL AND kind != 'archived' AND
/// last_contacted_at IS NOT NULL`) narrowed to a contact-time range. The one
/// mutation, [`archive_assignments`](AssignmentStore::archive_assignments),
/// re-checks `archived_at IS NULL` row-wise inside the update itself, so
/// overlapping sweeps never double-archive a record.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    // Schema and seeding
    /// Create both tables and their indexes if they do not exist yet.
    async fn create_tables(&self) -> Result<()>;

    async fn insert_assignment(&self, assignment: AssignedInfluencer) -> Result<AssignmentId>;
    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<AssignedInfluencer>>;
    async fn insert_status(&self, status: Status) -> Result<StatusId>;

    /// Look up a status row by its `(model, name)` pair.
    async fn resolve_status(&self, model: &str, name: &str) -> Result<Option<Status>>;

    // Candidate scans (pure reads)
    /// Eligible records with `last_contacted_at` in `(min_time, max_time]`,
    /// oldest first. `min_time = None` means unbounded age, used by the
    /// emergency sweep; `limit` pushes the batch cap into the query.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use mothball::store::AssignmentStore;
    /// use chrono::{Duration, Utc};
    ///
    /// # async fn example(store: &impl AssignmentStore) -> mothball::Result<()> {
    /// let now = Utc::now();
    /// let page = store
    ///     .find_candidates(Some(now - Duration::hours(49)), now - Duration::hours(48), Some(500))
    ///     .await?;
    /// println!("{} candidates in the band", page.len());
    /// # Ok(())
    /// # }
    /// ```
    async fn find_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>>;

    /// Count of eligible records in `(min_time, max_time]`.
    async fn count_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
    ) -> Result<u64>;

    /// The single oldest eligible record by `last_contacted_at`, if any.
    async fn oldest_candidate(&self) -> Result<Option<AssignedInfluencer>>;

    // The only mutation
    /// Atomically archive every listed record that is still unarchived:
    /// set `kind = 'archived'`, `archived_at = now`, `status_id` and
    /// `updated_at` in one conditional statement guarded by
    /// `archived_at IS NULL`. Returns the number of rows actually changed;
    /// a count lower than `ids.len()` means a concurrent sweep archived
    /// some of the listed records first.
    async fn archive_assignments(
        &self,
        ids: &[AssignmentId],
        status_id: StatusId,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

/// SQL-backed [`AssignmentStore`] over a shared connection pool.
///
/// The concrete trait implementations live in the `postgres` and `mysql`
/// submodules; this struct only carries the pool.
///
/// # Examples
///
/// ```rust,no_run
/// use mothball::store::SqlAssignmentStore;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # #[cfg(feature = "postgres")]
/// # {
/// let pool = sqlx::PgPool::connect("postgresql://localhost/outreach").await?;
/// let store = SqlAssignmentStore::new(pool);
/// # }
/// # Ok(())
/// # }
/// ```
pub struct SqlAssignmentStore<DB: Database> {
    pub pool: Pool<DB>,
    pub(crate) _phantom: PhantomData<DB>,
}

impl<DB: Database> Clone for SqlAssignmentStore<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<DB: Database> SqlAssignmentStore<DB> {
    /// Creates a store over the given connection pool.
    pub fn new(pool: Pool<DB>) -> Self {
        Self {
            pool,
            _phantom: PhantomData,
        }
    }
}
