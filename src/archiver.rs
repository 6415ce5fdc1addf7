//! The idempotent bulk archive operation.

use crate::{
    assignment::{AssignmentId, StatusId},
    store::AssignmentStore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Result of one bulk archive call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveOutcome {
    /// Rows actually changed by the conditional update; lower than the
    /// number of submitted ids when a concurrent sweep already archived
    /// some of them.
    pub archived: u64,
    /// Error strings captured from the store. Non-empty means the whole
    /// batch rolled back and nothing was archived by this call.
    pub errors: Vec<String>,
}

impl ArchiveOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Performs the single atomic conditional bulk update that archives a batch.
///
/// All-or-nothing per call: a persistence failure rolls the batch back and
/// is captured in the outcome instead of propagating, so callers decide
/// whether to retry or report. Batching across calls is the caller's
/// responsibility.
pub struct BatchArchiver<S> {
    store: Arc<S>,
}

impl<S> Clone for BatchArchiver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: AssignmentStore> BatchArchiver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Archive every listed record that is still unarchived, stamping
    /// `archived_at = now` and the resolved status id.
    ///
    /// The row-level `archived_at IS NULL` guard runs inside the update
    /// itself, so records claimed by a parallel run reduce the archived
    /// count silently; that is expected steady-state behavior, not an error.
    pub async fn archive(
        &self,
        ids: &[AssignmentId],
        archived_status_id: StatusId,
        now: DateTime<Utc>,
    ) -> ArchiveOutcome {
        if ids.is_empty() {
            return ArchiveOutcome::default();
        }

        match self
            .store
            .archive_assignments(ids, archived_status_id, now)
            .await
        {
            Ok(archived) => {
                if archived < ids.len() as u64 {
                    debug!(
                        "Archived {} of {} submitted assignments; the rest were already archived",
                        archived,
                        ids.len()
                    );
                }
                ArchiveOutcome {
                    archived,
                    errors: Vec::new(),
                }
            }
            Err(err) => {
                error!("Bulk archive of {} assignments failed: {}", ids.len(), err);
                ArchiveOutcome {
                    archived: 0,
                    errors: vec![err.to_string()],
                }
            }
        }
    }
}
