//! Test utilities for seeding the in-memory assignment store.

#[cfg(feature = "test")]
use chrono::Duration;
#[cfg(feature = "test")]
use mothball::store::AssignmentStore;
#[cfg(feature = "test")]
use mothball::store::test::{MockClock, TestStore};
#[cfg(feature = "test")]
use mothball::{AssignedInfluencer, AssignmentId, Status, StatusId};
#[cfg(feature = "test")]
use uuid::Uuid;

/// An archive-eligible assignment last contacted `age` before the clock's
/// current time.
#[cfg(feature = "test")]
#[allow(dead_code)]
pub fn stale_assignment(clock: &MockClock, age: Duration) -> AssignedInfluencer {
    AssignedInfluencer::new(Uuid::new_v4(), Uuid::new_v4())
        .with_attempts(3)
        .with_kind("sent")
        .with_last_contacted(clock.now() - age)
}

#[cfg(feature = "test")]
#[allow(dead_code)]
pub async fn seed_archived_status(store: &TestStore) -> StatusId {
    store
        .insert_status(Status::archived_assignment())
        .await
        .expect("insert archived status")
}

#[cfg(feature = "test")]
#[allow(dead_code)]
pub async fn seed_stale(store: &TestStore, clock: &MockClock, age: Duration) -> AssignmentId {
    store
        .insert_assignment(stale_assignment(clock, age))
        .await
        .expect("insert assignment")
}
