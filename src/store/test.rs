//! In-memory test implementation of the assignment store.
//!
//! This module provides a [`TestStore`] that implements the
//! [`AssignmentStore`] trait entirely in memory, making it ideal for unit
//! tests and development without requiring a database connection, together
//! with a [`MockClock`] for deterministic control over "now".
//!
//! # Examples
//!
//! ```rust
//! use mothball::store::test::{MockClock, TestStore};
//! use mothball::store::AssignmentStore;
//! use mothball::{AssignedInfluencer, Status};
//! use chrono::Duration;
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = MockClock::new();
//! let store = TestStore::with_clock(clock.clone());
//!
//! let status = Status::archived_assignment();
//! let status_id = store.insert_status(status).await?;
//!
//! let assignment = AssignedInfluencer::new(Uuid::new_v4(), Uuid::new_v4())
//!     .with_attempts(3)
//!     .with_kind("sent")
//!     .with_last_contacted(clock.now() - Duration::hours(48));
//! let id = store.insert_assignment(assignment).await?;
//!
//! let archived = store
//!     .archive_assignments(&[id], status_id, clock.now())
//!     .await?;
//! assert_eq!(archived, 1);
//! # Ok(())
//! # }
//! ```

use crate::{
    Result,
    assignment::{AssignedInfluencer, AssignmentId, Status, StatusId},
    store::AssignmentStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::RwLock;

/// Mock clock for controlling time in tests.
///
/// Window selection and archival both take explicit `now` values, so tests
/// derive every timestamp from one shared clock and advance it to simulate
/// the passage of hours or days without waiting.
///
/// # Examples
///
/// ```rust
/// use mothball::store::test::MockClock;
/// use chrono::Duration;
///
/// let clock = MockClock::new();
/// let initial_time = clock.now();
///
/// clock.advance(Duration::hours(6));
///
/// assert_eq!((clock.now() - initial_time).num_hours(), 6);
/// ```
#[derive(Clone, Debug)]
pub struct MockClock {
    current_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current time.
    pub fn new() -> Self {
        Self {
            current_time: Arc::new(Mutex::new(Utc::now())),
        }
    }

    /// Get the current mock time.
    pub fn now(&self) -> DateTime<Utc> {
        *self.current_time.lock().unwrap()
    }

    /// Advance the mock time by the given duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.current_time.lock().unwrap();
        *time += duration;
    }

    /// Set the mock time to a specific instant.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mothball::store::test::MockClock;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let clock = MockClock::new();
    /// let specific_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    /// clock.set_time(specific_time);
    ///
    /// assert_eq!(clock.now(), specific_time);
    /// ```
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.current_time.lock().unwrap() = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory tables for the test store
#[derive(Debug, Default)]
struct TestData {
    assignments: HashMap<AssignmentId, AssignedInfluencer>,
    statuses: Vec<Status>,
}

/// In-memory [`AssignmentStore`] with deterministic ordering.
///
/// Candidate scans apply the same eligibility predicate and half-open window
/// semantics as the SQL backends; ties on `last_contacted_at` are broken by
/// id so results are stable across runs.
#[derive(Clone)]
pub struct TestStore {
    data: Arc<RwLock<TestData>>,
    clock: MockClock,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_clock(MockClock::new())
    }

    /// Create a test store sharing the given clock.
    pub fn with_clock(clock: MockClock) -> Self {
        Self {
            data: Arc::new(RwLock::new(TestData::default())),
            clock,
        }
    }

    /// The clock this store was built with.
    pub fn clock(&self) -> &MockClock {
        &self.clock
    }

    /// Snapshot of every stored assignment, for assertions.
    pub async fn all_assignments(&self) -> Vec<AssignedInfluencer> {
        let data = self.data.read().await;
        let mut assignments: Vec<_> = data.assignments.values().cloned().collect();
        assignments.sort_by_key(|a| a.id);
        assignments
    }

    /// Number of assignments with `archived_at` set.
    pub async fn archived_count(&self) -> u64 {
        let data = self.data.read().await;
        data.assignments
            .values()
            .filter(|a| a.archived_at.is_some())
            .count() as u64
    }

    fn candidates_in(
        data: &TestData,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
    ) -> Vec<AssignedInfluencer> {
        let mut matches: Vec<_> = data
            .assignments
            .values()
            .filter(|a| a.is_archive_eligible())
            .filter(|a| {
                let Some(contacted) = a.last_contacted_at else {
                    return false;
                };
                let after_lower = match min_time {
                    Some(min) => contacted > min,
                    None => true,
                };
                after_lower && contacted <= max_time
            })
            .cloned()
            .collect();
        matches.sort_by_key(|a| (a.last_contacted_at, a.id));
        matches
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssignmentStore for TestStore {
    async fn create_tables(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_assignment(&self, assignment: AssignedInfluencer) -> Result<AssignmentId> {
        let mut data = self.data.write().await;
        let id = assignment.id;
        data.assignments.insert(id, assignment);
        Ok(id)
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<AssignedInfluencer>> {
        let data = self.data.read().await;
        Ok(data.assignments.get(&id).cloned())
    }

    async fn insert_status(&self, status: Status) -> Result<StatusId> {
        let mut data = self.data.write().await;
        let id = status.id;
        data.statuses.push(status);
        Ok(id)
    }

    async fn resolve_status(&self, model: &str, name: &str) -> Result<Option<Status>> {
        let data = self.data.read().await;
        Ok(data
            .statuses
            .iter()
            .find(|s| s.model == model && s.name == name)
            .cloned())
    }

    async fn find_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>> {
        let data = self.data.read().await;
        let mut matches = Self::candidates_in(&data, min_time, max_time);
        if let Some(limit) = limit {
            matches.truncate(limit as usize);
        }
        Ok(matches)
    }

    async fn count_candidates(
        &self,
        min_time: Option<DateTime<Utc>>,
        max_time: DateTime<Utc>,
    ) -> Result<u64> {
        let data = self.data.read().await;
        Ok(Self::candidates_in(&data, min_time, max_time).len() as u64)
    }

    async fn oldest_candidate(&self) -> Result<Option<AssignedInfluencer>> {
        let data = self.data.read().await;
        Ok(data
            .assignments
            .values()
            .filter(|a| a.is_archive_eligible())
            .min_by_key(|a| (a.last_contacted_at, a.id))
            .cloned())
    }

    async fn archive_assignments(
        &self,
        ids: &[AssignmentId],
        status_id: StatusId,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut data = self.data.write().await;
        let mut archived = 0;
        for id in ids {
            if let Some(assignment) = data.assignments.get_mut(id) {
                // Row-level guard, same as the SQL backends: already-archived
                // records fall out of the affected count silently.
                if assignment.archived_at.is_none() {
                    assignment.kind = crate::assignment::ARCHIVED_KIND.to_string();
                    assignment.archived_at = Some(now);
                    assignment.status_id = Some(status_id);
                    assignment.updated_at = now;
                    archived += 1;
                }
            }
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn seeded(clock: &MockClock, hours_ago: i64) -> AssignedInfluencer {
        AssignedInfluencer::new(Uuid::new_v4(), Uuid::new_v4())
            .with_attempts(3)
            .with_kind("sent")
            .with_last_contacted(clock.now() - Duration::hours(hours_ago))
    }

    #[test]
    fn test_mock_clock_advance_and_set() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now() - start, Duration::minutes(90));

        clock.set_time(start);
        assert_eq!(clock.now(), start);
    }

    #[tokio::test]
    async fn test_find_applies_window_and_eligibility() {
        let clock = MockClock::new();
        let store = TestStore::with_clock(clock.clone());
        let now = clock.now();

        let inside = store.insert_assignment(seeded(&clock, 48)).await.unwrap();
        store.insert_assignment(seeded(&clock, 10)).await.unwrap();
        store
            .insert_assignment(seeded(&clock, 48).with_attempts(2))
            .await
            .unwrap();

        let found = store
            .find_candidates(
                Some(now - Duration::hours(49)),
                now - Duration::hours(47),
                None,
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inside);
    }

    #[tokio::test]
    async fn test_window_bounds_are_half_open() {
        let clock = MockClock::new();
        let store = TestStore::with_clock(clock.clone());
        let now = clock.now();

        let on_lower = store.insert_assignment(seeded(&clock, 49)).await.unwrap();
        let on_upper = store.insert_assignment(seeded(&clock, 47)).await.unwrap();

        let found = store
            .find_candidates(
                Some(now - Duration::hours(49)),
                now - Duration::hours(47),
                None,
            )
            .await
            .unwrap();

        let ids: Vec<_> = found.iter().map(|a| a.id).collect();
        assert!(!ids.contains(&on_lower), "lower bound must be exclusive");
        assert!(ids.contains(&on_upper), "upper bound must be inclusive");
    }

    #[tokio::test]
    async fn test_archive_sets_all_columns_once() {
        let clock = MockClock::new();
        let store = TestStore::with_clock(clock.clone());
        let now = clock.now();

        let status_id = store
            .insert_status(Status::archived_assignment())
            .await
            .unwrap();
        let id = store.insert_assignment(seeded(&clock, 50)).await.unwrap();

        assert_eq!(
            store.archive_assignments(&[id], status_id, now).await.unwrap(),
            1
        );
        let archived = store.get_assignment(id).await.unwrap().unwrap();
        assert_eq!(archived.kind, crate::assignment::ARCHIVED_KIND);
        assert_eq!(archived.archived_at, Some(now));
        assert_eq!(archived.status_id, Some(status_id));

        // Second call is a no-op thanks to the row-level guard.
        let later = now + Duration::hours(1);
        assert_eq!(
            store
                .archive_assignments(&[id], status_id, later)
                .await
                .unwrap(),
            0
        );
        let unchanged = store.get_assignment(id).await.unwrap().unwrap();
        assert_eq!(unchanged.archived_at, Some(now));
    }

    #[tokio::test]
    async fn test_oldest_candidate_ignores_archived() {
        let clock = MockClock::new();
        let store = TestStore::with_clock(clock.clone());

        let oldest = store.insert_assignment(seeded(&clock, 400)).await.unwrap();
        store.insert_assignment(seeded(&clock, 100)).await.unwrap();

        let found = store.oldest_candidate().await.unwrap().unwrap();
        assert_eq!(found.id, oldest);

        let status_id = store
            .insert_status(Status::archived_assignment())
            .await
            .unwrap();
        store
            .archive_assignments(&[oldest], status_id, clock.now())
            .await
            .unwrap();

        let next = store.oldest_candidate().await.unwrap().unwrap();
        assert_ne!(next.id, oldest);
    }
}
