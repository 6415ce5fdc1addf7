//! Archive run orchestration: the regular, range, and emergency policies.
//!
//! Each policy resolves the archived status, selects candidates through the
//! [`CandidateFinder`](crate::finder::CandidateFinder), archives them through
//! the [`BatchArchiver`](crate::archiver::BatchArchiver), and produces a
//! [`RunReport`] describing what happened. Read failures propagate as errors;
//! write failures are captured in the report so a scheduler tick can log and
//! move on.

use crate::{
    assignment::{AssignmentId, StatusId, ARCHIVED_STATUS_NAME, ASSIGNMENT_STATUS_MODEL},
    finder::CandidateFinder,
    store::AssignmentStore,
    Result,
};
use crate::archiver::BatchArchiver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which processing policy produced a [`RunReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Hourly steady-state run over the tolerance band around the threshold.
    Regular,
    /// Caller-supplied age window, used for backlog brackets.
    Range,
    /// Paging drain of everything older than a cutoff.
    Emergency,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Regular => write!(f, "regular"),
            PolicyKind::Range => write!(f, "range"),
            PolicyKind::Emergency => write!(f, "emergency"),
        }
    }
}

/// Outcome of one archive run, shared by all three policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub policy: PolicyKind,
    /// False when the archived status is missing or any write failed.
    pub success: bool,
    /// Candidates matching the window at the start of the run, before the
    /// batch cap.
    pub candidates: u64,
    /// Records actually fetched and submitted for archiving.
    pub processed: u64,
    /// Rows changed by the conditional updates.
    pub archived: u64,
    /// Candidates left behind by the batch cap, picked up by later runs.
    pub remaining_candidates: u64,
    /// Archive pages submitted; always 0 or 1 outside the emergency policy.
    pub pages: u32,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Options for the regular hourly policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoArchiveOptions {
    /// Upper bound on records archived per run.
    pub batch_size: u32,
    /// Age at which an assignment becomes stale, in hours.
    pub hours_threshold: u32,
    /// Widens the scan band toward older records to absorb late ticks.
    pub tolerance_hours: f64,
}

impl Default for AutoArchiveOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            hours_threshold: 48,
            tolerance_hours: 0.5,
        }
    }
}

/// Options for a single caller-supplied age window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeArchiveOptions {
    /// Youngest age to include, in hours.
    pub min_hours: f64,
    /// Oldest age to include before the tolerance widening, in hours.
    pub max_hours: f64,
    pub tolerance_hours: f64,
    pub batch_size: u32,
}

impl RangeArchiveOptions {
    pub fn new(min_hours: f64, max_hours: f64) -> Self {
        Self {
            min_hours,
            max_hours,
            tolerance_hours: 0.0,
            batch_size: 1000,
        }
    }

    pub fn with_tolerance(mut self, tolerance_hours: f64) -> Self {
        self.tolerance_hours = tolerance_hours;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Options for the emergency drain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergencyCleanupOptions {
    /// Records last contacted more than this many days ago are drained.
    pub max_age_days: u32,
    /// Page size; the loop stops at the first page smaller than this.
    pub batch_size: u32,
}

impl Default for EmergencyCleanupOptions {
    fn default() -> Self {
        Self {
            max_age_days: 90,
            batch_size: 1000,
        }
    }
}

/// Runs archive policies against a store.
pub struct ArchiveProcessor<S> {
    store: Arc<S>,
    finder: CandidateFinder<S>,
    archiver: BatchArchiver<S>,
}

impl<S> Clone for ArchiveProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            finder: self.finder.clone(),
            archiver: self.archiver.clone(),
        }
    }
}

impl<S: AssignmentStore> ArchiveProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            finder: CandidateFinder::new(store.clone()),
            archiver: BatchArchiver::new(store.clone()),
            store,
        }
    }

    pub fn finder(&self) -> &CandidateFinder<S> {
        &self.finder
    }

    /// Regular policy: archive at most `batch_size` records whose contact age
    /// falls in the tolerance band around `hours_threshold`.
    pub async fn process_auto_archive(
        &self,
        now: DateTime<Utc>,
        opts: AutoArchiveOptions,
    ) -> Result<RunReport> {
        let timer = Instant::now();
        debug!(
            "Starting regular archive run: threshold {}h, tolerance {}h, batch {}",
            opts.hours_threshold, opts.tolerance_hours, opts.batch_size
        );

        let Some(status_id) = self.archived_status_id().await? else {
            return Ok(Self::missing_status_report(PolicyKind::Regular, now, timer));
        };

        let candidates = self
            .finder
            .count_to_archive(now, opts.hours_threshold, opts.tolerance_hours)
            .await?;
        if candidates == 0 {
            debug!("No archive candidates in the regular band");
            return Ok(Self::empty_report(PolicyKind::Regular, now, timer));
        }
        if candidates > u64::from(opts.batch_size) {
            warn!(
                "{} candidates exceed batch size {}; archiving the oldest {} and leaving the rest for the next run",
                candidates, opts.batch_size, opts.batch_size
            );
        }

        let batch = self
            .finder
            .find_to_archive(
                now,
                opts.hours_threshold,
                opts.tolerance_hours,
                Some(opts.batch_size),
            )
            .await?;

        Ok(self
            .archive_single_page(PolicyKind::Regular, now, timer, candidates, status_id, batch)
            .await)
    }

    /// Range policy: one pass over a caller-supplied age window.
    pub async fn process_range_archive(
        &self,
        now: DateTime<Utc>,
        opts: RangeArchiveOptions,
    ) -> Result<RunReport> {
        let timer = Instant::now();
        debug!(
            "Starting range archive run: {}h-{}h, tolerance {}h, batch {}",
            opts.min_hours, opts.max_hours, opts.tolerance_hours, opts.batch_size
        );

        let Some(status_id) = self.archived_status_id().await? else {
            return Ok(Self::missing_status_report(PolicyKind::Range, now, timer));
        };

        let candidates = self
            .finder
            .count_in_range(now, opts.min_hours, opts.max_hours, opts.tolerance_hours)
            .await?;
        if candidates == 0 {
            debug!(
                "No archive candidates between {}h and {}h",
                opts.min_hours, opts.max_hours
            );
            return Ok(Self::empty_report(PolicyKind::Range, now, timer));
        }
        if candidates > u64::from(opts.batch_size) {
            warn!(
                "{} candidates in range exceed batch size {}; processing the oldest {}",
                candidates, opts.batch_size, opts.batch_size
            );
        }

        let batch = self
            .finder
            .find_in_range(
                now,
                opts.min_hours,
                opts.max_hours,
                opts.tolerance_hours,
                Some(opts.batch_size),
            )
            .await?;

        Ok(self
            .archive_single_page(PolicyKind::Range, now, timer, candidates, status_id, batch)
            .await)
    }

    /// Emergency policy: drain everything older than `max_age_days`, one
    /// page at a time, until a short page signals the backlog is gone.
    pub async fn emergency_cleanup(
        &self,
        now: DateTime<Utc>,
        opts: EmergencyCleanupOptions,
    ) -> Result<RunReport> {
        let timer = Instant::now();
        info!(
            "Starting emergency cleanup: records older than {} days, page size {}",
            opts.max_age_days, opts.batch_size
        );

        let Some(status_id) = self.archived_status_id().await? else {
            return Ok(Self::missing_status_report(
                PolicyKind::Emergency,
                now,
                timer,
            ));
        };

        let candidates = self.finder.count_older_than(now, opts.max_age_days).await?;
        let mut processed = 0u64;
        let mut archived = 0u64;
        let mut pages = 0u32;
        let mut errors = Vec::new();

        loop {
            let page = self
                .finder
                .find_older_than(now, opts.max_age_days, Some(opts.batch_size))
                .await?;
            if page.is_empty() {
                break;
            }
            pages += 1;
            processed += page.len() as u64;

            let ids: Vec<AssignmentId> = page.iter().map(|a| a.id).collect();
            let outcome = self.archiver.archive(&ids, status_id, now).await;
            archived += outcome.archived;
            if !outcome.errors.is_empty() {
                // A failed page would be re-fetched verbatim; stop instead of
                // spinning and report what was drained so far.
                errors.extend(outcome.errors);
                break;
            }
            if (page.len() as u64) < u64::from(opts.batch_size) {
                break;
            }
        }

        let success = errors.is_empty();
        if success {
            info!(
                "Emergency cleanup archived {} of {} records in {} pages",
                archived, candidates, pages
            );
        } else {
            warn!(
                "Emergency cleanup stopped after {} pages with errors; archived {} of {}",
                pages, archived, candidates
            );
        }

        Ok(RunReport {
            policy: PolicyKind::Emergency,
            success,
            candidates,
            processed,
            archived,
            remaining_candidates: candidates.saturating_sub(processed),
            pages,
            errors,
            started_at: now,
            duration: timer.elapsed(),
        })
    }

    async fn archived_status_id(&self) -> Result<Option<StatusId>> {
        Ok(self
            .store
            .resolve_status(ASSIGNMENT_STATUS_MODEL, ARCHIVED_STATUS_NAME)
            .await?
            .map(|status| status.id))
    }

    async fn archive_single_page(
        &self,
        policy: PolicyKind,
        now: DateTime<Utc>,
        timer: Instant,
        candidates: u64,
        status_id: StatusId,
        batch: Vec<crate::assignment::AssignedInfluencer>,
    ) -> RunReport {
        let processed = batch.len() as u64;
        let ids: Vec<AssignmentId> = batch.iter().map(|a| a.id).collect();
        let outcome = self.archiver.archive(&ids, status_id, now).await;
        let success = outcome.errors.is_empty();

        if success {
            info!(
                "{} archive run archived {} of {} candidates ({} processed)",
                policy, outcome.archived, candidates, processed
            );
        }

        RunReport {
            policy,
            success,
            candidates,
            processed,
            archived: outcome.archived,
            remaining_candidates: candidates.saturating_sub(processed),
            pages: if processed > 0 { 1 } else { 0 },
            errors: outcome.errors,
            started_at: now,
            duration: timer.elapsed(),
        }
    }

    fn missing_status_report(
        policy: PolicyKind,
        started_at: DateTime<Utc>,
        timer: Instant,
    ) -> RunReport {
        warn!(
            "Skipping {} archive run: no '{}' status row exists for model '{}'",
            policy, ARCHIVED_STATUS_NAME, ASSIGNMENT_STATUS_MODEL
        );
        let mut report = Self::empty_report(policy, started_at, timer);
        report.success = false;
        report.errors.push(format!(
            "No '{}' status found for model '{}'",
            ARCHIVED_STATUS_NAME, ASSIGNMENT_STATUS_MODEL
        ));
        report
    }

    fn empty_report(policy: PolicyKind, started_at: DateTime<Utc>, timer: Instant) -> RunReport {
        RunReport {
            policy,
            success: true,
            candidates: 0,
            processed: 0,
            archived: 0,
            remaining_candidates: 0,
            pages: 0,
            errors: Vec::new(),
            started_at,
            duration: timer.elapsed(),
        }
    }
}
