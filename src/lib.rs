//! # Mothball
//!
//! A database-driven archival service for stale influencer assignments, built for
//! steady unattended operation.
//!
//! ## Features
//!
//! - **Multi-database support**: PostgreSQL and MySQL backends with feature flags
//! - **Tolerance-band selection**: time-window candidate queries that never pick a
//!   record before its archive window opens
//! - **Idempotent archiving**: one atomic conditional bulk update, safe under
//!   concurrent overlapping sweeps
//! - **Backlog recovery**: tiered catch-up sweeps for records missed during outages
//! - **Cron scheduling**: hourly and multiple-times-daily jobs with timezone awareness
//! - **Operator tooling**: backlog analysis, forced runs, candidate previews, and
//!   live settings updates
//! - **Async/await**: built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mothball::{
//!     config::MothballConfig, manager::SchedulerManager, scheduler::ArchiveScheduler,
//!     store::SqlAssignmentStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     # #[cfg(feature = "postgres")]
//!     # {
//!     // Setup database connection (requires PostgreSQL or MySQL)
//!     let pool = sqlx::PgPool::connect("postgresql://localhost/influencers").await?;
//!     let store = Arc::new(SqlAssignmentStore::new(pool));
//!
//!     // Initialize database tables
//!     {
//!         use mothball::store::AssignmentStore;
//!         store.create_tables().await?;
//!     }
//!
//!     // Build the archive scheduler from configuration
//!     let config = MothballConfig::from_env()?;
//!     let scheduler = ArchiveScheduler::new(store, config.archive)?;
//!
//!     // Register it with the manager and start the recurring jobs
//!     let manager = SchedulerManager::new();
//!     manager.add_scheduler(Arc::new(scheduler)).await;
//!     manager.start_all().await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     manager.stop_all().await;
//!     # }
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Assignments
//!
//! An assigned influencer links an influencer to a campaign list. Once outreach
//! has been attempted enough times and the record sits untouched past the
//! configured threshold, it becomes an archive candidate. Archiving stamps the
//! record in place; nothing is deleted or moved.
//!
//! ### Windows and policies
//!
//! Candidate selection always goes through an age window with an exclusive lower
//! bound and an inclusive upper bound, so adjacent windows partition the timeline.
//! Three policies drive the windows: the hourly regular sweep over a narrow
//! tolerance band, ranged backlog sweeps for catch-up, and a paging emergency
//! drain for deliberate one-off cleanups.
//!
//! ### Schedulers
//!
//! The [`Scheduler`](scheduler::Scheduler) trait describes a named family of
//! recurring jobs. The [`SchedulerManager`](manager::SchedulerManager) runs any
//! number of them over one shared timer runtime; a failure in one scheduler never
//! blocks the others.
//!
//! ## Feature Flags
//!
//! - `postgres` - Enable PostgreSQL database support
//! - `mysql` - Enable MySQL database support
//! - `test` - Enable the in-memory test store and mock clock

pub mod archiver;
pub mod assignment;
pub mod backlog;
pub mod config;
pub mod error;
pub mod finder;
pub mod manager;
pub mod ops;
pub mod processor;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod trigger;
pub mod window;

pub use archiver::{ArchiveOutcome, BatchArchiver};
pub use assignment::{AssignedInfluencer, AssignmentId, Status, StatusId};
pub use backlog::{BacklogAnalyzer, BacklogBracket, BacklogReport, OldestCandidate};
pub use config::{DatabaseConfig, MothballConfig};
pub use error::MothballError;
pub use finder::CandidateFinder;
pub use manager::{ManagerStatus, SchedulerManager};
pub use ops::{ArchiveOps, CandidateOverview, CandidatePreview, QueryProbe, SettingsUpdate};
pub use processor::{
    ArchiveProcessor, AutoArchiveOptions, EmergencyCleanupOptions, PolicyKind, RangeArchiveOptions,
    RunReport,
};
pub use runtime::{JobDefinition, JobRuntime, JobSnapshot};
pub use scheduler::{
    ArchiveScheduler, ArchiveSettings, ArchiveStats, JobDescriptor, Scheduler, SchedulerStatus,
};
pub use store::SqlAssignmentStore;
pub use trigger::{Trigger, TriggerError, TriggerSpec};
pub use window::ArchiveWindow;

/// Convenient type alias for Results with [`MothballError`] as the error type.
///
/// This is used throughout the crate for consistent error handling.
pub type Result<T> = std::result::Result<T, MothballError>;
