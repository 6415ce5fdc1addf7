//! Coordinates any number of [`Scheduler`]s over one shared [`JobRuntime`].
//!
//! The manager only speaks the trait: it never special-cases a concrete
//! scheduler, and a failure in one scheduler is recorded without blocking
//! the others.

use crate::{
    runtime::{JobRuntime, JobSnapshot},
    scheduler::{Scheduler, SchedulerStatus},
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Combined view over the manager, its schedulers, and the live jobs.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub running: bool,
    pub schedulers: Vec<SchedulerStatus>,
    pub jobs: Vec<JobSnapshot>,
}

/// Holds schedulers by name and drives them through their lifecycle.
pub struct SchedulerManager {
    schedulers: Mutex<HashMap<String, Arc<dyn Scheduler>>>,
    runtime: Mutex<Option<Arc<JobRuntime>>>,
    // Manager-side failures (initialize, register) per scheduler name; a
    // scheduler's own run errors live in its status instead.
    registration_errors: Mutex<HashMap<String, String>>,
}

impl SchedulerManager {
    pub fn new() -> Self {
        Self {
            schedulers: Mutex::new(HashMap::new()),
            runtime: Mutex::new(None),
            registration_errors: Mutex::new(HashMap::new()),
        }
    }

    /// Add a scheduler, replacing any scheduler with the same name. When the
    /// manager is already running the new scheduler is initialized and
    /// registered immediately.
    pub async fn add_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        let name = scheduler.name().to_string();
        let previous = {
            let mut schedulers = self.schedulers.lock().await;
            schedulers.insert(name.clone(), scheduler.clone())
        };
        if let Some(previous) = previous {
            warn!("Replacing scheduler '{}'", name);
            if let Err(e) = previous.cleanup().await {
                warn!("Cleanup of replaced scheduler '{}' failed: {}", name, e);
            }
        }

        let runtime = self.runtime.lock().await.clone();
        if let Some(runtime) = runtime {
            if runtime.is_started().await {
                self.attach(&runtime, &scheduler).await;
            }
        }
    }

    /// Remove a scheduler by name, running its cleanup. Returns false when
    /// no scheduler with that name exists.
    pub async fn remove_scheduler(&self, name: &str) -> bool {
        let removed = { self.schedulers.lock().await.remove(name) };
        self.registration_errors.lock().await.remove(name);
        match removed {
            Some(scheduler) => {
                if let Err(e) = scheduler.cleanup().await {
                    warn!("Cleanup of scheduler '{}' failed: {}", name, e);
                }
                info!("Removed scheduler '{}'", name);
                true
            }
            None => false,
        }
    }

    pub async fn scheduler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schedulers.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_scheduler(&self, name: &str) -> Option<Arc<dyn Scheduler>> {
        self.schedulers.lock().await.get(name).cloned()
    }

    pub async fn is_running(&self) -> bool {
        match self.runtime.lock().await.as_ref() {
            Some(runtime) => runtime.is_started().await,
            None => false,
        }
    }

    /// Initialize and register every scheduler, then start the shared
    /// runtime. Per-scheduler failures are logged and recorded; they never
    /// stop the remaining schedulers from registering.
    pub async fn start_all(&self) {
        let runtime = {
            let mut guard = self.runtime.lock().await;
            guard
                .get_or_insert_with(|| Arc::new(JobRuntime::new()))
                .clone()
        };

        let schedulers: Vec<Arc<dyn Scheduler>> =
            { self.schedulers.lock().await.values().cloned().collect() };
        info!("Starting {} scheduler(s)", schedulers.len());

        for scheduler in &schedulers {
            self.attach(&runtime, scheduler).await;
        }

        runtime.start().await;
        info!("Scheduler runtime started");
    }

    /// Shut the runtime down and clean up every scheduler. The runtime is
    /// kept for a later start.
    pub async fn stop_all(&self) {
        let runtime = self.runtime.lock().await.clone();
        if let Some(runtime) = runtime {
            runtime.shutdown().await;
        }

        let schedulers: Vec<Arc<dyn Scheduler>> =
            { self.schedulers.lock().await.values().cloned().collect() };
        for scheduler in schedulers {
            if let Err(e) = scheduler.cleanup().await {
                warn!("Cleanup of scheduler '{}' failed: {}", scheduler.name(), e);
            }
        }
        info!("All schedulers stopped");
    }

    pub async fn restart_all(&self) {
        info!("Restarting all schedulers");
        self.stop_all().await;
        self.start_all().await;
    }

    /// Per-scheduler status plus the live job list.
    pub async fn overall_status(&self) -> ManagerStatus {
        let schedulers: Vec<Arc<dyn Scheduler>> =
            { self.schedulers.lock().await.values().cloned().collect() };

        let mut statuses = Vec::with_capacity(schedulers.len());
        for scheduler in schedulers {
            let mut status = scheduler.status().await;
            if let Some(err) = self
                .registration_errors
                .lock()
                .await
                .get(status.name.as_str())
            {
                status.healthy = false;
                if status.last_error.is_none() {
                    status.last_error = Some(err.clone());
                }
            }
            statuses.push(status);
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));

        let runtime = self.runtime.lock().await.clone();
        let (running, jobs) = match runtime {
            Some(runtime) => (runtime.is_started().await, runtime.job_snapshot().await),
            None => (false, Vec::new()),
        };

        ManagerStatus {
            running,
            schedulers: statuses,
            jobs,
        }
    }

    async fn attach(&self, runtime: &Arc<JobRuntime>, scheduler: &Arc<dyn Scheduler>) {
        let name = scheduler.name().to_string();
        match scheduler.initialize().await {
            Ok(true) => match scheduler.register_jobs(runtime.clone()).await {
                Ok(job_ids) => {
                    info!("Scheduler '{}' registered {} job(s)", name, job_ids.len());
                    self.registration_errors.lock().await.remove(&name);
                }
                Err(e) => {
                    error!("Scheduler '{}' failed to register jobs: {}", name, e);
                    self.registration_errors
                        .lock()
                        .await
                        .insert(name, e.to_string());
                }
            },
            Ok(false) => {
                warn!("Scheduler '{}' is not ready; skipping job registration", name);
                self.registration_errors
                    .lock()
                    .await
                    .insert(name, "not ready at startup".to_string());
            }
            Err(e) => {
                error!("Scheduler '{}' failed to initialize: {}", name, e);
                self.registration_errors
                    .lock()
                    .await
                    .insert(name, e.to_string());
            }
        }
    }
}

impl Default for SchedulerManager {
    fn default() -> Self {
        Self::new()
    }
}
