//! Scheduler, runtime, and manager lifecycle tests over the in-memory store.

#![cfg(feature = "test")]

mod test_utils;

use chrono::Duration;
use mothball::scheduler::archive::{BACKLOG_JOB_ID, REGULAR_JOB_ID};
use mothball::store::test::{MockClock, TestStore};
use mothball::{ArchiveScheduler, ArchiveSettings, JobRuntime, Scheduler, SchedulerManager};
use std::sync::Arc;
use test_utils::{seed_archived_status, seed_stale};

#[tokio::test]
async fn test_initialize_requires_the_archived_status() {
    let store = Arc::new(TestStore::new());
    let scheduler = ArchiveScheduler::with_default_settings(store.clone());

    assert!(!scheduler.initialize().await.unwrap());

    seed_archived_status(&store).await;
    assert!(scheduler.initialize().await.unwrap());
}

#[tokio::test]
async fn test_register_jobs_installs_both_sweeps() {
    let store = Arc::new(TestStore::new());
    let scheduler = ArchiveScheduler::with_default_settings(store);
    let runtime = Arc::new(JobRuntime::new());

    let job_ids = scheduler.register_jobs(runtime.clone()).await.unwrap();

    assert_eq!(job_ids, vec![REGULAR_JOB_ID, BACKLOG_JOB_ID]);
    assert!(runtime.has_job(REGULAR_JOB_ID).await);
    assert!(runtime.has_job(BACKLOG_JOB_ID).await);
}

#[tokio::test]
async fn test_disabling_backlog_removes_the_stale_job() {
    let store = Arc::new(TestStore::new());
    let scheduler = ArchiveScheduler::with_default_settings(store);
    let runtime = Arc::new(JobRuntime::new());
    scheduler.register_jobs(runtime.clone()).await.unwrap();
    assert!(runtime.has_job(BACKLOG_JOB_ID).await);

    let mut settings = scheduler.settings().await;
    settings.enable_backlog_processing = false;
    scheduler.update_settings(settings).await.unwrap();

    assert!(runtime.has_job(REGULAR_JOB_ID).await);
    assert!(!runtime.has_job(BACKLOG_JOB_ID).await);

    let definitions = scheduler.job_definitions().await;
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].id, REGULAR_JOB_ID);
}

#[tokio::test]
async fn test_update_settings_rejects_invalid_and_keeps_current() {
    let store = Arc::new(TestStore::new());
    let scheduler = ArchiveScheduler::with_default_settings(store);

    let mut bad = scheduler.settings().await;
    bad.batch_size = 0;
    assert!(scheduler.update_settings(bad).await.is_err());

    assert_eq!(scheduler.settings().await.batch_size, 1000);
}

#[tokio::test]
async fn test_update_settings_reregisters_with_the_new_trigger() {
    let store = Arc::new(TestStore::new());
    let scheduler = ArchiveScheduler::with_default_settings(store);
    let runtime = Arc::new(JobRuntime::new());
    scheduler.register_jobs(runtime.clone()).await.unwrap();

    let mut settings = scheduler.settings().await;
    settings.run_minute = 25;
    scheduler.update_settings(settings).await.unwrap();

    let snapshot = runtime.job_snapshot().await;
    let regular = snapshot.iter().find(|j| j.id == REGULAR_JOB_ID).unwrap();
    assert_eq!(regular.expression, "0 25 * * * *");
}

#[tokio::test]
async fn test_run_regular_now_updates_stats() {
    let clock = MockClock::new();
    let store = Arc::new(TestStore::with_clock(clock.clone()));
    seed_archived_status(&store).await;
    seed_stale(&store, &clock, Duration::hours(48) + Duration::minutes(15)).await;

    let scheduler = ArchiveScheduler::with_default_settings(store.clone());
    let report = scheduler.run_regular_now(None).await.unwrap();

    assert!(report.success);
    assert_eq!(report.archived, 1);

    let stats = scheduler.stats().await;
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_archived, 1);
    assert_eq!(stats.error_count, 0);
    assert!(stats.last_regular_run.is_some());
    assert_eq!(store.archived_count().await, 1);
}

#[tokio::test]
async fn test_backlog_run_covers_the_extended_tier() {
    let clock = MockClock::new();
    let store = Arc::new(TestStore::with_clock(clock.clone()));
    seed_archived_status(&store).await;

    // Past the regular band, inside the extended tier.
    seed_stale(&store, &clock, Duration::hours(60)).await;
    // Past the extended tier; only the old tier reaches this.
    seed_stale(&store, &clock, Duration::hours(300)).await;

    let scheduler = ArchiveScheduler::with_default_settings(store.clone());
    let reports = scheduler.run_backlog_now().await.unwrap();

    assert_eq!(reports.len(), 1, "aggressive mode off runs one tier");
    assert_eq!(reports[0].archived, 1);
    assert_eq!(store.archived_count().await, 1);

    let stats = scheduler.stats().await;
    assert_eq!(stats.backlog_processed, 1);
    assert_eq!(stats.last_backlog_runs.len(), 1);
}

#[tokio::test]
async fn test_aggressive_mode_adds_the_old_tier() {
    let clock = MockClock::new();
    let store = Arc::new(TestStore::with_clock(clock.clone()));
    seed_archived_status(&store).await;
    seed_stale(&store, &clock, Duration::hours(60)).await;
    seed_stale(&store, &clock, Duration::hours(300)).await;

    let settings = ArchiveSettings {
        aggressive_mode: true,
        ..Default::default()
    };
    let scheduler = ArchiveScheduler::new(store.clone(), settings).unwrap();
    let reports = scheduler.run_backlog_now().await.unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].archived, 1, "extended tier takes the 60h record");
    assert_eq!(reports[1].archived, 1, "old tier takes the 300h record");
    assert_eq!(store.archived_count().await, 2);
}

#[tokio::test]
async fn test_backlog_batch_uses_the_multiplier() {
    let clock = MockClock::new();
    let store = Arc::new(TestStore::with_clock(clock.clone()));
    seed_archived_status(&store).await;
    for hours in [50i64, 52, 54, 56, 58] {
        seed_stale(&store, &clock, Duration::hours(hours)).await;
    }

    let settings = ArchiveSettings {
        batch_size: 2,
        backlog_batch_multiplier: 2,
        ..Default::default()
    };
    let scheduler = ArchiveScheduler::new(store.clone(), settings).unwrap();
    let reports = scheduler.run_backlog_now().await.unwrap();

    assert_eq!(reports[0].candidates, 5);
    assert_eq!(reports[0].processed, 4, "batch is batch_size * multiplier");
    assert_eq!(reports[0].remaining_candidates, 1);
}

#[tokio::test]
async fn test_failed_run_marks_the_scheduler_unhealthy() {
    let store = Arc::new(TestStore::new());
    let scheduler = ArchiveScheduler::with_default_settings(store);
    let runtime = Arc::new(JobRuntime::new());
    scheduler.register_jobs(runtime).await.unwrap();

    // No archived status row: the run reports failure without erroring.
    let report = scheduler.run_regular_now(None).await.unwrap();
    assert!(!report.success);

    let status = scheduler.status().await;
    assert!(!status.healthy);
    assert!(status.last_error.is_some());
    assert_eq!(scheduler.stats().await.error_count, 1);
}

#[tokio::test]
async fn test_scheduler_status_reports_counters() {
    let clock = MockClock::new();
    let store = Arc::new(TestStore::with_clock(clock.clone()));
    seed_archived_status(&store).await;
    seed_stale(&store, &clock, Duration::hours(48) + Duration::minutes(15)).await;

    let scheduler = ArchiveScheduler::with_default_settings(store);
    let runtime = Arc::new(JobRuntime::new());
    scheduler.register_jobs(runtime).await.unwrap();
    scheduler.run_regular_now(None).await.unwrap();

    let status = scheduler.status().await;
    assert_eq!(status.name, "archive");
    assert!(status.healthy);
    assert_eq!(
        status.registered_jobs,
        vec![REGULAR_JOB_ID, BACKLOG_JOB_ID]
    );
    assert_eq!(status.details["total_archived"], 1);
    assert_eq!(status.details["batch_size"], 1000);
}

#[tokio::test]
async fn test_manager_runs_the_archive_scheduler_end_to_end() {
    let clock = MockClock::new();
    let store = Arc::new(TestStore::with_clock(clock.clone()));
    seed_archived_status(&store).await;
    seed_stale(&store, &clock, Duration::hours(48) + Duration::minutes(15)).await;

    let scheduler = ArchiveScheduler::with_default_settings(store.clone());
    let manager = SchedulerManager::new();
    manager.add_scheduler(Arc::new(scheduler.clone())).await;
    manager.start_all().await;

    let status = manager.overall_status().await;
    assert!(status.running);
    let ids: Vec<_> = status.jobs.iter().map(|j| j.id.as_str()).collect();
    assert!(ids.contains(&REGULAR_JOB_ID));
    assert!(ids.contains(&BACKLOG_JOB_ID));
    assert_eq!(status.schedulers.len(), 1);
    assert!(status.schedulers[0].healthy);

    // Drive a sweep out of band instead of waiting for the trigger.
    let report = scheduler.run_regular_now(None).await.unwrap();
    assert_eq!(report.archived, 1);
    assert_eq!(store.archived_count().await, 1);

    manager.stop_all().await;
    assert!(!manager.is_running().await);
    assert!(manager.overall_status().await.jobs.is_empty());
}

#[tokio::test]
async fn test_manager_skips_registration_until_the_status_row_exists() {
    let store = Arc::new(TestStore::new());
    let manager = SchedulerManager::new();
    manager
        .add_scheduler(Arc::new(ArchiveScheduler::with_default_settings(
            store.clone(),
        )))
        .await;
    manager.start_all().await;

    let status = manager.overall_status().await;
    assert!(status.running);
    assert!(status.jobs.is_empty(), "no jobs until the store is seeded");
    assert!(!status.schedulers[0].healthy);
    assert!(
        status.schedulers[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("not ready")
    );

    // Seeding and restarting brings the scheduler up.
    seed_archived_status(&store).await;
    manager.restart_all().await;
    let status = manager.overall_status().await;
    assert!(status.schedulers[0].healthy);
    assert_eq!(status.jobs.len(), 2);

    manager.stop_all().await;
}
