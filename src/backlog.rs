//! Read-only backlog inspection for operators.
//!
//! The analyzer answers "how far behind is archiving?" by bucketing eligible
//! records into fixed age brackets and surfacing the single oldest record, so
//! an operator can size an emergency cleanup before running one.

use crate::{
    assignment::AssignmentId, finder::CandidateFinder, store::AssignmentStore, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Age at which a record first counts toward the backlog, in hours.
pub const BACKLOG_THRESHOLD_HOURS: f64 = 48.0;

// Label, lower bound, upper bound (hours). Shared boundaries with zero
// tolerance keep the brackets a strict partition of 48h-365d.
const BRACKETS: [(&str, f64, f64); 4] = [
    ("48h-7d", 48.0, 168.0),
    ("7d-30d", 168.0, 720.0),
    ("30d-90d", 720.0, 2160.0),
    ("90d-365d", 2160.0, 8760.0),
];

/// One age bracket of the backlog report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogBracket {
    pub label: String,
    pub min_hours: f64,
    pub max_hours: f64,
    pub count: u64,
}

/// The single oldest eligible record, with its age spelled out both ways.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OldestCandidate {
    pub id: AssignmentId,
    pub last_contacted_at: DateTime<Utc>,
    pub age_hours: f64,
    pub age_days: f64,
}

/// Snapshot of the archive backlog at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogReport {
    /// Eligible records older than 48 hours, with no upper bound on age.
    /// Can exceed the bracket sum when records are older than 365 days.
    pub total_candidates: u64,
    pub brackets: Vec<BacklogBracket>,
    pub oldest: Option<OldestCandidate>,
    pub generated_at: DateTime<Utc>,
}

impl BacklogReport {
    pub fn has_backlog(&self) -> bool {
        self.total_candidates > 0
    }
}

/// Builds [`BacklogReport`]s. Performs no writes.
pub struct BacklogAnalyzer<S> {
    finder: CandidateFinder<S>,
}

impl<S> Clone for BacklogAnalyzer<S> {
    fn clone(&self) -> Self {
        Self {
            finder: self.finder.clone(),
        }
    }
}

impl<S: AssignmentStore> BacklogAnalyzer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            finder: CandidateFinder::new(store),
        }
    }

    /// Count the backlog bracket by bracket and locate the oldest candidate.
    pub async fn analyze(&self, now: DateTime<Utc>) -> Result<BacklogReport> {
        let total_candidates = self
            .finder
            .count_older_than_hours(now, BACKLOG_THRESHOLD_HOURS)
            .await?;

        let mut brackets = Vec::with_capacity(BRACKETS.len());
        for (label, min_hours, max_hours) in BRACKETS {
            let count = self
                .finder
                .count_in_range(now, min_hours, max_hours, 0.0)
                .await?;
            brackets.push(BacklogBracket {
                label: label.to_string(),
                min_hours,
                max_hours,
                count,
            });
        }

        let oldest = self.finder.oldest_candidate().await?.and_then(|record| {
            record.last_contacted_at.map(|contacted| {
                let age_hours = (now - contacted).num_seconds() as f64 / 3600.0;
                OldestCandidate {
                    id: record.id,
                    last_contacted_at: contacted,
                    age_hours,
                    age_days: age_hours / 24.0,
                }
            })
        });

        debug!(
            "Backlog analysis: {} candidates older than {}h",
            total_candidates, BACKLOG_THRESHOLD_HOURS
        );

        Ok(BacklogReport {
            total_candidates,
            brackets,
            oldest,
            generated_at: now,
        })
    }
}
