//! The scheduler abstraction and its implementations.
//!
//! A [`Scheduler`] owns a family of recurring jobs and knows how to register
//! them against a shared [`JobRuntime`](crate::runtime::JobRuntime). The
//! [`SchedulerManager`](crate::manager::SchedulerManager) drives any number
//! of schedulers through this trait without knowing their concrete types.

pub mod archive;

pub use archive::{ArchiveScheduler, ArchiveSettings, ArchiveStats};

use crate::{runtime::JobRuntime, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Static description of one job a scheduler registers.
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptor {
    pub id: String,
    pub name: String,
    pub expression: String,
    pub description: String,
}

/// Health and bookkeeping snapshot of one scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub name: String,
    pub healthy: bool,
    pub registered_jobs: Vec<String>,
    pub last_error: Option<String>,
    pub details: serde_json::Value,
}

/// A named family of recurring jobs.
///
/// Implementations must keep every failure inside the job boundary: a job
/// callback that errors records the error and returns, it never panics or
/// propagates. The manager treats `initialize` returning `Ok(false)` as
/// "not ready" and skips job registration without failing the other
/// schedulers.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Stable name, also the manager's registry key.
    fn name(&self) -> &str;

    /// Check preconditions. `Ok(true)` means ready to register jobs,
    /// `Ok(false)` means not ready yet, `Err` means the check itself failed.
    async fn initialize(&self) -> Result<bool>;

    /// Register this scheduler's jobs against the runtime, replacing any
    /// previously registered jobs with the same ids. Returns the job ids.
    async fn register_jobs(&self, runtime: Arc<JobRuntime>) -> Result<Vec<String>>;

    /// Describe the jobs this scheduler would register under its current
    /// settings, without touching any runtime.
    async fn job_definitions(&self) -> Vec<JobDescriptor>;

    /// Deregister jobs and release any held runtime handle.
    async fn cleanup(&self) -> Result<()>;

    /// Current health and counters.
    async fn status(&self) -> SchedulerStatus;
}
