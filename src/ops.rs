//! Operator-facing entry points: inspect, force, preview, tune, probe.
//!
//! Everything here works against live settings and the live store; the only
//! operation that writes data is [`ArchiveOps::force_run`], and the only one
//! that changes configuration is [`ArchiveOps::update_settings`].

use crate::{
    assignment::{AssignedInfluencer, AssignmentId},
    backlog::{BacklogAnalyzer, BacklogReport},
    finder::CandidateFinder,
    processor::RunReport,
    scheduler::{ArchiveScheduler, ArchiveSettings},
    store::AssignmentStore,
    window::ArchiveWindow,
    Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Current selection pressure: the regular band plus the full backlog.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOverview {
    /// Candidates in the regular band right now.
    pub current_band: u64,
    pub backlog: BacklogReport,
    pub settings: ArchiveSettings,
    pub generated_at: DateTime<Utc>,
}

/// One candidate row, trimmed for display.
#[derive(Debug, Clone, Serialize)]
pub struct CandidatePreview {
    pub id: AssignmentId,
    pub list_id: Uuid,
    pub influencer_id: Uuid,
    pub attempts_made: i32,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub age_hours: Option<f64>,
}

impl CandidatePreview {
    fn from_assignment(assignment: &AssignedInfluencer, now: DateTime<Utc>) -> Self {
        Self {
            id: assignment.id,
            list_id: assignment.list_id,
            influencer_id: assignment.influencer_id,
            attempts_made: assignment.attempts_made,
            last_contacted_at: assignment.last_contacted_at,
            age_hours: assignment
                .contact_age(now)
                .map(|age| age.num_seconds() as f64 / 3600.0),
        }
    }
}

/// Partial settings change; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub batch_size: Option<u32>,
    pub hours_threshold: Option<u32>,
    pub tolerance_hours: Option<f64>,
    pub run_minute: Option<u32>,
    pub enable_backlog_processing: Option<bool>,
    pub aggressive_mode: Option<bool>,
    pub backlog_batch_multiplier: Option<u32>,
    pub max_backlog_age_days: Option<u32>,
    pub timezone: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, settings: &mut ArchiveSettings) {
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(hours_threshold) = self.hours_threshold {
            settings.hours_threshold = hours_threshold;
        }
        if let Some(tolerance_hours) = self.tolerance_hours {
            settings.tolerance_hours = tolerance_hours;
        }
        if let Some(run_minute) = self.run_minute {
            settings.run_minute = run_minute;
        }
        if let Some(enabled) = self.enable_backlog_processing {
            settings.enable_backlog_processing = enabled;
        }
        if let Some(aggressive) = self.aggressive_mode {
            settings.aggressive_mode = aggressive;
        }
        if let Some(multiplier) = self.backlog_batch_multiplier {
            settings.backlog_batch_multiplier = multiplier;
        }
        if let Some(max_age) = self.max_backlog_age_days {
            settings.max_backlog_age_days = max_age;
        }
        if let Some(timezone) = &self.timezone {
            settings.timezone = timezone.clone();
        }
    }
}

/// Result of probing an arbitrary window without writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct QueryProbe {
    pub window: ArchiveWindow,
    pub lower_bound: DateTime<Utc>,
    pub upper_bound: DateTime<Utc>,
    pub matched: u64,
    pub sample: Vec<CandidatePreview>,
}

/// Operator facade over a scheduler and its store.
pub struct ArchiveOps<S> {
    scheduler: ArchiveScheduler<S>,
    finder: CandidateFinder<S>,
    analyzer: BacklogAnalyzer<S>,
}

impl<S: AssignmentStore + 'static> ArchiveOps<S> {
    pub fn new(store: Arc<S>, scheduler: ArchiveScheduler<S>) -> Self {
        Self {
            scheduler,
            finder: CandidateFinder::new(store.clone()),
            analyzer: BacklogAnalyzer::new(store),
        }
    }

    pub fn scheduler(&self) -> &ArchiveScheduler<S> {
        &self.scheduler
    }

    /// Count the regular band and analyze the backlog in one pass.
    pub async fn candidate_overview(&self) -> Result<CandidateOverview> {
        let settings = self.scheduler.settings().await;
        let now = Utc::now();
        let current_band = self
            .finder
            .count_to_archive(now, settings.hours_threshold, settings.tolerance_hours)
            .await?;
        let backlog = self.analyzer.analyze(now).await?;

        Ok(CandidateOverview {
            current_band,
            backlog,
            settings,
            generated_at: now,
        })
    }

    /// Run the regular archive policy immediately. `batch_size` overrides the
    /// configured batch for this run only.
    pub async fn force_run(&self, batch_size: Option<u32>) -> Result<RunReport> {
        info!(
            "Forcing a regular archive run{}",
            batch_size
                .map(|b| format!(" with batch size {}", b))
                .unwrap_or_default()
        );
        self.scheduler.run_regular_now(batch_size).await
    }

    /// Show the oldest candidates in the regular band without touching them.
    pub async fn preview_candidates(&self, limit: u32) -> Result<Vec<CandidatePreview>> {
        let settings = self.scheduler.settings().await;
        let now = Utc::now();
        let candidates = self
            .finder
            .find_to_archive(
                now,
                settings.hours_threshold,
                settings.tolerance_hours,
                Some(limit),
            )
            .await?;
        Ok(candidates
            .iter()
            .map(|c| CandidatePreview::from_assignment(c, now))
            .collect())
    }

    /// Patch the scheduler settings. The merged result is validated as a
    /// whole before anything is applied; a rejected update changes nothing.
    /// Returns the settings now in effect.
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<ArchiveSettings> {
        let mut settings = self.scheduler.settings().await;
        update.apply_to(&mut settings);
        self.scheduler.update_settings(settings.clone()).await?;
        info!("Archive settings updated");
        Ok(settings)
    }

    /// Resolve an arbitrary window against the store: how many records match,
    /// with a small sample. Never writes.
    pub async fn test_query(
        &self,
        min_hours: f64,
        max_hours: f64,
        tolerance_hours: f64,
        sample_limit: u32,
    ) -> Result<QueryProbe> {
        let window = ArchiveWindow::range(min_hours, max_hours, tolerance_hours);
        window.validate()?;

        let now = Utc::now();
        let (lower_bound, upper_bound) = window.bounds(now);
        let matched = self.finder.count_in_window(now, window).await?;
        let sample = self
            .finder
            .find_in_window(now, window, Some(sample_limit))
            .await?
            .iter()
            .map(|c| CandidatePreview::from_assignment(c, now))
            .collect();

        Ok(QueryProbe {
            window,
            lower_bound,
            upper_bound,
            matched,
            sample,
        })
    }
}
