//! The archive scheduler: recurring regular and backlog sweeps.

use crate::{
    assignment::{ARCHIVED_STATUS_NAME, ASSIGNMENT_STATUS_MODEL},
    error::MothballError,
    processor::{ArchiveProcessor, AutoArchiveOptions, RangeArchiveOptions, RunReport},
    runtime::{JobDefinition, JobRuntime},
    scheduler::{JobDescriptor, Scheduler, SchedulerStatus},
    store::AssignmentStore,
    trigger::{validate_timezone, Trigger, TriggerSpec},
    window::ArchiveWindow,
    Result,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Job id of the hourly regular sweep.
pub const REGULAR_JOB_ID: &str = "archive:regular";

/// Job id of the four-times-daily backlog sweep.
pub const BACKLOG_JOB_ID: &str = "archive:backlog";

// Hours of day the backlog job fires at.
const BACKLOG_RUN_HOURS: [u32; 4] = [0, 6, 12, 18];

/// Tunable settings for the archive scheduler.
///
/// Every field has a default, so a partial config file only needs to name
/// the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Records archived per regular run at most.
    pub batch_size: u32,
    /// Contact age at which an assignment goes stale, in hours.
    pub hours_threshold: u32,
    /// Widening of the regular scan band toward older records, in hours.
    pub tolerance_hours: f64,
    /// Minute of the hour both jobs fire at.
    pub run_minute: u32,
    /// Whether the backlog job is registered at all.
    pub enable_backlog_processing: bool,
    /// Adds the old-backlog tier (7 days to `max_backlog_age_days`) to each
    /// backlog run.
    pub aggressive_mode: bool,
    /// Backlog runs use `batch_size * backlog_batch_multiplier`.
    pub backlog_batch_multiplier: u32,
    /// Upper age bound of the old-backlog tier, in days.
    pub max_backlog_age_days: u32,
    /// IANA timezone the triggers are evaluated in.
    pub timezone: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            hours_threshold: 48,
            tolerance_hours: 0.5,
            run_minute: 10,
            enable_backlog_processing: true,
            aggressive_mode: false,
            backlog_batch_multiplier: 2,
            max_backlog_age_days: 90,
            timezone: "UTC".to_string(),
        }
    }
}

impl ArchiveSettings {
    /// Reject out-of-range values before they reach a trigger or a query.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(MothballError::Settings(format!(
                "batch_size must be between 1 and 10000, got {}",
                self.batch_size
            )));
        }
        if self.hours_threshold == 0 {
            return Err(MothballError::Settings(
                "hours_threshold must be at least 1".to_string(),
            ));
        }
        if !(0.1..=24.0).contains(&self.tolerance_hours) {
            return Err(MothballError::Settings(format!(
                "tolerance_hours must be between 0.1 and 24, got {}",
                self.tolerance_hours
            )));
        }
        if self.run_minute > 59 {
            return Err(MothballError::Settings(format!(
                "run_minute must be between 0 and 59, got {}",
                self.run_minute
            )));
        }
        if self.backlog_batch_multiplier == 0 {
            return Err(MothballError::Settings(
                "backlog_batch_multiplier must be at least 1".to_string(),
            ));
        }
        if self.max_backlog_age_days == 0 || self.max_backlog_age_days > 365 {
            return Err(MothballError::Settings(format!(
                "max_backlog_age_days must be between 1 and 365, got {}",
                self.max_backlog_age_days
            )));
        }
        validate_timezone(&self.timezone).map_err(|e| MothballError::Settings(e.to_string()))?;
        Ok(())
    }
}

/// Cumulative counters and most recent run reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveStats {
    pub total_processed: u64,
    pub total_archived: u64,
    pub backlog_processed: u64,
    pub error_count: u64,
    pub last_regular_run: Option<RunReport>,
    pub last_backlog_runs: Vec<RunReport>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
struct Attachment {
    runtime: Arc<JobRuntime>,
    job_ids: Vec<String>,
}

struct SchedulerInner<S> {
    name: String,
    store: Arc<S>,
    processor: ArchiveProcessor<S>,
    settings: Mutex<ArchiveSettings>,
    stats: Mutex<ArchiveStats>,
    attachment: Mutex<Option<Attachment>>,
}

/// Schedules the hourly regular sweep and the four-times-daily backlog sweep.
///
/// Clones share state, so the closure a job runs and the handle an operator
/// holds see the same settings and counters.
pub struct ArchiveScheduler<S> {
    inner: Arc<SchedulerInner<S>>,
}

impl<S> Clone for ArchiveScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: AssignmentStore + 'static> ArchiveScheduler<S> {
    pub fn new(store: Arc<S>, settings: ArchiveSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                name: "archive".to_string(),
                processor: ArchiveProcessor::new(store.clone()),
                store,
                settings: Mutex::new(settings),
                stats: Mutex::new(ArchiveStats::default()),
                attachment: Mutex::new(None),
            }),
        })
    }

    pub fn with_default_settings(store: Arc<S>) -> Self {
        // Defaults always pass validation.
        Self {
            inner: Arc::new(SchedulerInner {
                name: "archive".to_string(),
                processor: ArchiveProcessor::new(store.clone()),
                store,
                settings: Mutex::new(ArchiveSettings::default()),
                stats: Mutex::new(ArchiveStats::default()),
                attachment: Mutex::new(None),
            }),
        }
    }

    pub async fn settings(&self) -> ArchiveSettings {
        self.inner.settings.lock().await.clone()
    }

    pub async fn stats(&self) -> ArchiveStats {
        self.inner.stats.lock().await.clone()
    }

    /// Swap in new settings after validating them. Rejected settings leave
    /// the current ones untouched. When jobs are already registered they are
    /// re-registered so new trigger times and batch sizes take effect.
    pub async fn update_settings(&self, settings: ArchiveSettings) -> Result<()> {
        settings.validate()?;
        {
            let mut current = self.inner.settings.lock().await;
            *current = settings;
        }

        let attachment = self.inner.attachment.lock().await.clone();
        if let Some(att) = attachment {
            info!(
                "Re-registering scheduler '{}' jobs after settings update",
                self.inner.name
            );
            self.register_jobs(att.runtime).await?;
        }
        Ok(())
    }

    /// Run the regular policy immediately, outside the schedule. Used by the
    /// hourly job and by operator tooling; `batch_size` overrides the
    /// configured batch for this run only.
    pub async fn run_regular_now(&self, batch_size: Option<u32>) -> Result<RunReport> {
        let settings = self.settings().await;
        let opts = AutoArchiveOptions {
            batch_size: batch_size.unwrap_or(settings.batch_size),
            hours_threshold: settings.hours_threshold,
            tolerance_hours: settings.tolerance_hours,
        };
        let report = self
            .inner
            .processor
            .process_auto_archive(Utc::now(), opts)
            .await?;
        self.apply_regular_report(&report).await;
        Ok(report)
    }

    /// Run the backlog tiers immediately: the extended tier always, the old
    /// tier when aggressive mode is on. Returns one report per tier.
    pub async fn run_backlog_now(&self) -> Result<Vec<RunReport>> {
        let settings = self.settings().await;
        let batch = settings
            .batch_size
            .saturating_mul(settings.backlog_batch_multiplier);
        let mut reports = Vec::new();

        let extended =
            ArchiveWindow::extended_backlog(settings.hours_threshold, settings.tolerance_hours);
        reports.push(self.process_window(extended, batch).await?);

        if settings.aggressive_mode {
            let old = ArchiveWindow::old_backlog(settings.max_backlog_age_days);
            reports.push(self.process_window(old, batch).await?);
        }

        let mut stats = self.inner.stats.lock().await;
        stats.last_backlog_runs = reports.clone();
        Ok(reports)
    }

    async fn process_window(&self, window: ArchiveWindow, batch_size: u32) -> Result<RunReport> {
        let opts = RangeArchiveOptions {
            min_hours: window.min_hours,
            max_hours: window.max_hours,
            tolerance_hours: window.tolerance_hours,
            batch_size,
        };
        let report = self
            .inner
            .processor
            .process_range_archive(Utc::now(), opts)
            .await?;
        self.apply_backlog_report(&report).await;
        Ok(report)
    }

    // Job bodies. Errors stop here: they are logged and counted, never
    // propagated, so a failed run cannot take down the timer or the process.
    async fn run_regular(&self) {
        debug!("Scheduler '{}' regular tick", self.inner.name);
        if let Err(e) = self.run_regular_now(None).await {
            self.record_failure("regular", &e).await;
        }
    }

    async fn run_backlog(&self) {
        debug!("Scheduler '{}' backlog tick", self.inner.name);
        if let Err(e) = self.run_backlog_now().await {
            self.record_failure("backlog", &e).await;
        }
    }

    async fn apply_regular_report(&self, report: &RunReport) {
        let mut stats = self.inner.stats.lock().await;
        stats.total_processed += report.processed;
        stats.total_archived += report.archived;
        stats.last_regular_run = Some(report.clone());
        if !report.success {
            stats.error_count += 1;
            stats.last_error = Some(report.errors.join("; "));
        }
    }

    async fn apply_backlog_report(&self, report: &RunReport) {
        let mut stats = self.inner.stats.lock().await;
        stats.total_processed += report.processed;
        stats.total_archived += report.archived;
        stats.backlog_processed += report.processed;
        if !report.success {
            stats.error_count += 1;
            stats.last_error = Some(report.errors.join("; "));
        }
    }

    async fn record_failure(&self, job: &str, err: &MothballError) {
        error!(
            "Scheduler '{}' {} run failed: {}",
            self.inner.name, job, err
        );
        let mut stats = self.inner.stats.lock().await;
        stats.error_count += 1;
        stats.last_error = Some(err.to_string());
    }
}

#[async_trait]
impl<S: AssignmentStore + 'static> Scheduler for ArchiveScheduler<S> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn initialize(&self) -> Result<bool> {
        let settings = self.settings().await;
        settings.validate()?;

        match self
            .inner
            .store
            .resolve_status(ASSIGNMENT_STATUS_MODEL, ARCHIVED_STATUS_NAME)
            .await?
        {
            Some(_) => {
                info!("Scheduler '{}' initialized", self.inner.name);
                Ok(true)
            }
            None => {
                warn!(
                    "Scheduler '{}' is not ready: no '{}' status row for model '{}'",
                    self.inner.name, ARCHIVED_STATUS_NAME, ASSIGNMENT_STATUS_MODEL
                );
                Ok(false)
            }
        }
    }

    async fn register_jobs(&self, runtime: Arc<JobRuntime>) -> Result<Vec<String>> {
        let settings = self.settings().await;
        let mut job_ids = Vec::new();

        let regular_trigger = Trigger::with_timezone(
            TriggerSpec::Hourly {
                minute: settings.run_minute,
            },
            &settings.timezone,
        )?;
        let scheduler = self.clone();
        runtime
            .add_job(JobDefinition::new(
                REGULAR_JOB_ID,
                "Regular archive sweep",
                regular_trigger,
                move || {
                    let scheduler = scheduler.clone();
                    async move { scheduler.run_regular().await }
                },
            ))
            .await;
        job_ids.push(REGULAR_JOB_ID.to_string());

        if settings.enable_backlog_processing {
            let backlog_trigger = Trigger::with_timezone(
                TriggerSpec::DailyAtHours {
                    hours: BACKLOG_RUN_HOURS.to_vec(),
                    minute: settings.run_minute,
                },
                &settings.timezone,
            )?;
            let scheduler = self.clone();
            runtime
                .add_job(JobDefinition::new(
                    BACKLOG_JOB_ID,
                    "Backlog recovery sweep",
                    backlog_trigger,
                    move || {
                        let scheduler = scheduler.clone();
                        async move { scheduler.run_backlog().await }
                    },
                ))
                .await;
            job_ids.push(BACKLOG_JOB_ID.to_string());
        } else {
            // A previous registration may have installed the backlog job.
            runtime.remove_job(BACKLOG_JOB_ID).await;
        }

        info!(
            "Scheduler '{}' registered jobs: {:?}",
            self.inner.name, job_ids
        );

        let mut attachment = self.inner.attachment.lock().await;
        *attachment = Some(Attachment {
            runtime,
            job_ids: job_ids.clone(),
        });

        Ok(job_ids)
    }

    async fn job_definitions(&self) -> Vec<JobDescriptor> {
        let settings = self.settings().await;
        let mut definitions = vec![JobDescriptor {
            id: REGULAR_JOB_ID.to_string(),
            name: "Regular archive sweep".to_string(),
            expression: TriggerSpec::Hourly {
                minute: settings.run_minute,
            }
            .expression(),
            description: format!(
                "Archives up to {} assignments last contacted about {}h ago (tolerance {}h)",
                settings.batch_size, settings.hours_threshold, settings.tolerance_hours
            ),
        }];

        if settings.enable_backlog_processing {
            definitions.push(JobDescriptor {
                id: BACKLOG_JOB_ID.to_string(),
                name: "Backlog recovery sweep".to_string(),
                expression: TriggerSpec::DailyAtHours {
                    hours: BACKLOG_RUN_HOURS.to_vec(),
                    minute: settings.run_minute,
                }
                .expression(),
                description: format!(
                    "Recovers assignments missed by the regular sweep, {} per tier{}",
                    settings.batch_size * settings.backlog_batch_multiplier,
                    if settings.aggressive_mode {
                        ", including the old-backlog tier"
                    } else {
                        ""
                    }
                ),
            });
        }

        definitions
    }

    async fn cleanup(&self) -> Result<()> {
        let mut attachment = self.inner.attachment.lock().await;
        if let Some(att) = attachment.take() {
            for id in &att.job_ids {
                att.runtime.remove_job(id).await;
            }
            info!(
                "Scheduler '{}' deregistered {} jobs",
                self.inner.name,
                att.job_ids.len()
            );
        }
        Ok(())
    }

    async fn status(&self) -> SchedulerStatus {
        let stats = self.stats().await;
        let settings = self.settings().await;
        let registered_jobs = self
            .inner
            .attachment
            .lock()
            .await
            .as_ref()
            .map(|att| att.job_ids.clone())
            .unwrap_or_default();
        let healthy = !registered_jobs.is_empty() && stats.last_error.is_none();

        SchedulerStatus {
            name: self.inner.name.clone(),
            healthy,
            registered_jobs,
            last_error: stats.last_error,
            details: serde_json::json!({
                "total_processed": stats.total_processed,
                "total_archived": stats.total_archived,
                "backlog_processed": stats.backlog_processed,
                "error_count": stats.error_count,
                "batch_size": settings.batch_size,
                "hours_threshold": settings.hours_threshold,
                "backlog_enabled": settings.enable_backlog_processing,
                "aggressive_mode": settings.aggressive_mode,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = ArchiveSettings::default();
        assert_eq!(settings.batch_size, 1000);
        assert_eq!(settings.hours_threshold, 48);
        assert_eq!(settings.tolerance_hours, 0.5);
        assert_eq!(settings.run_minute, 10);
        assert!(settings.enable_backlog_processing);
        assert!(!settings.aggressive_mode);
        assert_eq!(settings.backlog_batch_multiplier, 2);
        assert_eq!(settings.max_backlog_age_days, 90);
        assert_eq!(settings.timezone, "UTC");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation_bounds() {
        let ok = ArchiveSettings::default();

        let mut bad = ok.clone();
        bad.batch_size = 0;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.batch_size = 10_001;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.hours_threshold = 0;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.tolerance_hours = 0.05;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.tolerance_hours = 25.0;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.run_minute = 60;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.backlog_batch_multiplier = 0;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.max_backlog_age_days = 366;
        assert!(bad.validate().is_err());

        bad = ok.clone();
        bad.timezone = "Mars/OlympusMons".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_partial_settings_fill_with_defaults() {
        let settings: ArchiveSettings = toml::from_str("batch_size = 500").unwrap();
        assert_eq!(settings.batch_size, 500);
        assert_eq!(settings.hours_threshold, 48);
        assert_eq!(settings.timezone, "UTC");
    }

    #[test]
    fn test_validation_messages_name_the_field() {
        let mut settings = ArchiveSettings::default();
        settings.tolerance_hours = 100.0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("tolerance_hours"));
    }
}
