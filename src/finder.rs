//! Candidate selection for archive sweeps.
//!
//! The finder resolves an [`ArchiveWindow`] against an explicit `now` and
//! asks the store for eligible records inside it. It performs no writes, so
//! calling it with overlapping windows from concurrent sweeps is safe: the
//! archiver re-checks `archived_at IS NULL` at write time rather than
//! trusting anything read here.

use crate::{
    Result, assignment::AssignedInfluencer, store::AssignmentStore, window::ArchiveWindow,
    window::duration_from_hours,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct CandidateFinder<S> {
    store: Arc<S>,
}

impl<S> Clone for CandidateFinder<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: AssignmentStore> CandidateFinder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Candidates in the regular band: records last contacted between
    /// `hours_threshold - tolerance` and `hours_threshold + tolerance` hours
    /// ago (47.5h-48.5h at the 48h/0.5h defaults). This is the hourly
    /// steady-state scan; `limit` pushes the batch cap into the store.
    pub async fn find_to_archive(
        &self,
        now: DateTime<Utc>,
        hours_threshold: u32,
        tolerance_hours: f64,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>> {
        self.find_in_window(now, ArchiveWindow::regular(hours_threshold, tolerance_hours), limit)
            .await
    }

    /// Count-only variant of [`find_to_archive`](Self::find_to_archive).
    pub async fn count_to_archive(
        &self,
        now: DateTime<Utc>,
        hours_threshold: u32,
        tolerance_hours: f64,
    ) -> Result<u64> {
        self.count_in_window(now, ArchiveWindow::regular(hours_threshold, tolerance_hours))
            .await
    }

    /// Candidates in an explicit `[min_hours, max_hours]` age range; used by
    /// the backlog sweeps to recover specific brackets.
    pub async fn find_in_range(
        &self,
        now: DateTime<Utc>,
        min_hours: f64,
        max_hours: f64,
        tolerance_hours: f64,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>> {
        self.find_in_window(
            now,
            ArchiveWindow::range(min_hours, max_hours, tolerance_hours),
            limit,
        )
        .await
    }

    /// Count-only variant of [`find_in_range`](Self::find_in_range).
    pub async fn count_in_range(
        &self,
        now: DateTime<Utc>,
        min_hours: f64,
        max_hours: f64,
        tolerance_hours: f64,
    ) -> Result<u64> {
        self.count_in_window(now, ArchiveWindow::range(min_hours, max_hours, tolerance_hours))
            .await
    }

    /// Candidates inside an already-built window.
    pub async fn find_in_window(
        &self,
        now: DateTime<Utc>,
        window: ArchiveWindow,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>> {
        let (lower, upper) = window.bounds(now);
        self.store.find_candidates(Some(lower), upper, limit).await
    }

    /// Count of candidates inside an already-built window.
    pub async fn count_in_window(&self, now: DateTime<Utc>, window: ArchiveWindow) -> Result<u64> {
        let (lower, upper) = window.bounds(now);
        self.store.count_candidates(Some(lower), upper).await
    }

    /// Candidates older than `max_age_days`, with no lower bound on age.
    /// Only the emergency sweep scans unbounded like this.
    pub async fn find_older_than(
        &self,
        now: DateTime<Utc>,
        max_age_days: u32,
        limit: Option<u32>,
    ) -> Result<Vec<AssignedInfluencer>> {
        let cutoff = now - duration_from_hours(f64::from(max_age_days) * 24.0);
        self.store.find_candidates(None, cutoff, limit).await
    }

    /// Count-only variant of [`find_older_than`](Self::find_older_than).
    pub async fn count_older_than(&self, now: DateTime<Utc>, max_age_days: u32) -> Result<u64> {
        let cutoff = now - duration_from_hours(f64::from(max_age_days) * 24.0);
        self.store.count_candidates(None, cutoff).await
    }

    /// Count of eligible records last contacted at least `min_age_hours` ago,
    /// with no upper bound on age.
    pub async fn count_older_than_hours(
        &self,
        now: DateTime<Utc>,
        min_age_hours: f64,
    ) -> Result<u64> {
        let cutoff = now - duration_from_hours(min_age_hours);
        self.store.count_candidates(None, cutoff).await
    }

    /// The single oldest eligible record, if any.
    pub async fn oldest_candidate(&self) -> Result<Option<AssignedInfluencer>> {
        self.store.oldest_candidate().await
    }
}
