//! Shared timer runtime that drives every registered recurring job.
//!
//! Each job id owns one task: sleep until the trigger's next fire time, run
//! the callback inline, repeat. Because the callback is awaited inside the
//! loop, a job can never overlap itself; a slow run simply delays its own
//! next tick. Unrelated jobs fire independently.

use crate::trigger::Trigger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How long [`JobRuntime::shutdown`] waits for a running job before aborting
/// its task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub type JobCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A recurring job: a stable id, a trigger, and the callback to run.
#[derive(Clone)]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    pub callback: JobCallback,
}

impl JobDefinition {
    pub fn new<F, Fut>(
        id: impl Into<String>,
        name: impl Into<String>,
        trigger: Trigger,
        callback: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            trigger,
            callback: Arc::new(move || {
                Box::pin(callback()) as Pin<Box<dyn Future<Output = ()> + Send>>
            }),
        }
    }
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("expression", &self.trigger.expression())
            .finish()
    }
}

/// Point-in-time view of one registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub name: String,
    pub expression: String,
    pub timezone: String,
    pub next_fire: Option<DateTime<Utc>>,
    pub running: bool,
}

enum JobState {
    /// Registered while the runtime is stopped; spawned on [`JobRuntime::start`].
    Pending(JobDefinition),
    Running {
        definition: JobDefinition,
        shutdown_tx: mpsc::Sender<()>,
        handle: JoinHandle<()>,
    },
}

impl JobState {
    fn definition(&self) -> &JobDefinition {
        match self {
            JobState::Pending(definition) => definition,
            JobState::Running { definition, .. } => definition,
        }
    }
}

struct RuntimeState {
    started: bool,
    jobs: HashMap<String, JobState>,
}

/// Owns the timer tasks for all registered jobs.
pub struct JobRuntime {
    state: Mutex<RuntimeState>,
}

impl JobRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RuntimeState {
                started: false,
                jobs: HashMap::new(),
            }),
        }
    }

    /// Register a job, replacing any existing job with the same id. The
    /// replaced job's timer is signalled to stop first.
    pub async fn add_job(&self, definition: JobDefinition) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.jobs.remove(&definition.id) {
            Self::signal_stop(&definition.id, previous);
        }
        let entry = if state.started {
            debug!("Spawning timer for job '{}'", definition.id);
            Self::spawn_job(definition)
        } else {
            JobState::Pending(definition)
        };
        state.jobs.insert(entry.definition().id.clone(), entry);
    }

    /// Deregister a job and stop its timer. Returns false when no job with
    /// that id exists.
    pub async fn remove_job(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.jobs.remove(id) {
            Some(entry) => {
                Self::signal_stop(id, entry);
                true
            }
            None => false,
        }
    }

    pub async fn has_job(&self, id: &str) -> bool {
        self.state.lock().await.jobs.contains_key(id)
    }

    pub async fn is_started(&self) -> bool {
        self.state.lock().await.started
    }

    /// Spawn timers for every pending job and accept future jobs as live.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.started {
            return;
        }
        state.started = true;

        let ids: Vec<String> = state.jobs.keys().cloned().collect();
        for id in ids {
            if let Some(entry) = state.jobs.remove(&id) {
                let entry = match entry {
                    JobState::Pending(definition) => {
                        debug!("Spawning timer for job '{}'", id);
                        Self::spawn_job(definition)
                    }
                    running => running,
                };
                state.jobs.insert(id, entry);
            }
        }
    }

    /// Stop every timer, waiting up to a grace period per job before
    /// aborting its task. Clears all registrations; callers re-register on
    /// the next start.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, JobState)> = {
            let mut state = self.state.lock().await;
            state.started = false;
            state.jobs.drain().collect()
        };

        let mut handles = Vec::new();
        for (id, entry) in drained {
            if let JobState::Running {
                shutdown_tx,
                handle,
                ..
            } = entry
            {
                if shutdown_tx.send(()).await.is_err() {
                    warn!("Failed to send shutdown signal to job '{}'", id);
                }
                handles.push((id, handle));
            }
        }

        for (id, handle) in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Job '{}' did not stop within grace period; aborting", id);
                abort.abort();
            }
        }
    }

    /// Snapshot every registered job with its next fire time.
    pub async fn job_snapshot(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().await;
        let now = Utc::now();
        let mut jobs: Vec<JobSnapshot> = state
            .jobs
            .values()
            .map(|entry| {
                let definition = entry.definition();
                JobSnapshot {
                    id: definition.id.clone(),
                    name: definition.name.clone(),
                    expression: definition.trigger.expression(),
                    timezone: definition.trigger.timezone.clone(),
                    next_fire: definition.trigger.next_fire(now),
                    running: matches!(entry, JobState::Running { .. }),
                }
            })
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    fn signal_stop(id: &str, entry: JobState) {
        if let JobState::Running { shutdown_tx, .. } = entry {
            // Capacity-1 channel and we send at most once per timer, so a
            // full buffer means a stop is already queued.
            if shutdown_tx.try_send(()).is_err() {
                debug!("Job '{}' already has a stop signal queued", id);
            }
        }
    }

    fn spawn_job(definition: JobDefinition) -> JobState {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let id = definition.id.clone();
        let trigger = definition.trigger.clone();
        let callback = definition.callback.clone();

        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = trigger.next_fire(Utc::now()) else {
                    warn!("Job '{}' has no next fire time; stopping its timer", id);
                    break;
                };
                let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Job '{}' timer shutting down", id);
                        break;
                    }
                    _ = sleep(delay) => {
                        debug!("Job '{}' firing", id);
                        callback().await;
                    }
                }
            }
        });

        JobState::Running {
            definition,
            shutdown_tx,
            handle,
        }
    }
}

impl Default for JobRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hourly_job(id: &str, counter: Arc<AtomicUsize>) -> JobDefinition {
        let trigger = Trigger::hourly(0).unwrap();
        JobDefinition::new(id, format!("{id} job"), trigger, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test]
    async fn test_add_and_remove_jobs() {
        let runtime = JobRuntime::new();
        let counter = Arc::new(AtomicUsize::new(0));

        runtime.add_job(hourly_job("a", counter.clone())).await;
        runtime.add_job(hourly_job("b", counter.clone())).await;
        assert!(runtime.has_job("a").await);
        assert!(runtime.has_job("b").await);
        assert_eq!(runtime.job_snapshot().await.len(), 2);

        assert!(runtime.remove_job("a").await);
        assert!(!runtime.remove_job("a").await);
        assert_eq!(runtime.job_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_job_replaces_same_id() {
        let runtime = JobRuntime::new();
        let counter = Arc::new(AtomicUsize::new(0));

        runtime.add_job(hourly_job("a", counter.clone())).await;
        let replacement =
            JobDefinition::new("a", "replacement", Trigger::hourly(30).unwrap(), || async {});
        runtime.add_job(replacement).await;

        let jobs = runtime.job_snapshot().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "replacement");
        assert_eq!(jobs[0].expression, "0 30 * * * *");
    }

    #[tokio::test]
    async fn test_pending_jobs_are_not_running() {
        let runtime = JobRuntime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        runtime.add_job(hourly_job("a", counter)).await;

        let jobs = runtime.job_snapshot().await;
        assert!(!jobs[0].running);
        assert!(jobs[0].next_fire.is_some());
        assert!(!runtime.is_started().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_job_fires() {
        let runtime = JobRuntime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        runtime.add_job(hourly_job("a", counter.clone())).await;
        runtime.start().await;

        assert!(runtime.job_snapshot().await[0].running);

        // Paused tokio time auto-advances past the timer sleeps.
        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_jobs() {
        let runtime = JobRuntime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        runtime.add_job(hourly_job("a", counter.clone())).await;
        runtime.start().await;

        runtime.shutdown().await;
        assert!(!runtime.is_started().await);
        assert!(runtime.job_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_is_harmless() {
        let runtime = JobRuntime::new();
        runtime.start().await;
        runtime.start().await;
        assert!(runtime.is_started().await);
    }
}
