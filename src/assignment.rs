use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AssignmentId = Uuid;
pub type StatusId = Uuid;

/// Minimum number of contact attempts before an assignment can be archived.
pub const MIN_CONTACT_ATTEMPTS: i32 = 3;

/// Terminal lifecycle tag written by the archiver.
pub const ARCHIVED_KIND: &str = "archived";

/// `Status.model` value under which assignment statuses are registered.
pub const ASSIGNMENT_STATUS_MODEL: &str = "assigned_influencer";

/// `Status.name` of the archived status, resolved once per archive run.
pub const ARCHIVED_STATUS_NAME: &str = "archived";

/// One outreach-agent-to-influencer assignment within a campaign list.
///
/// The archival subsystem only ever flips `kind`, `archived_at`, `status_id`
/// and `updated_at`; every other column belongs to the outreach side and is
/// carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedInfluencer {
    pub id: AssignmentId,
    pub list_id: Uuid,
    pub influencer_id: Uuid,
    /// Contact attempts made so far; increased by the outreach subsystem.
    pub attempts_made: i32,
    /// Most recent contact attempt, `None` until first contact.
    pub last_contacted_at: Option<DateTime<Utc>>,
    /// Free-text lifecycle tag; `"archived"` is terminal.
    pub kind: String,
    /// Set exactly once when the record is archived; `None` means live.
    /// The bulk archive update is guarded on this column.
    pub archived_at: Option<DateTime<Utc>>,
    pub status_id: Option<StatusId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignedInfluencer {
    pub fn new(list_id: Uuid, influencer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            list_id,
            influencer_id,
            attempts_made: 0,
            last_contacted_at: None,
            kind: "assigned".to_string(),
            archived_at: None,
            status_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_attempts(mut self, attempts_made: i32) -> Self {
        self.attempts_made = attempts_made;
        self
    }

    pub fn with_last_contacted(mut self, at: DateTime<Utc>) -> Self {
        self.last_contacted_at = Some(at);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_status(mut self, status_id: StatusId) -> Self {
        self.status_id = Some(status_id);
        self
    }

    /// Whether this record satisfies the archival precondition, regardless of
    /// any time window: at least [`MIN_CONTACT_ATTEMPTS`] attempts, not
    /// already archived, not tagged archived, and contacted at least once.
    ///
    /// Time windows narrow *which* eligible records a sweep touches; they
    /// never relax this predicate.
    pub fn is_archive_eligible(&self) -> bool {
        self.attempts_made >= MIN_CONTACT_ATTEMPTS
            && self.archived_at.is_none()
            && self.kind != ARCHIVED_KIND
            && self.last_contacted_at.is_some()
    }

    /// Age of the most recent contact relative to `now`, if any.
    pub fn contact_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_contacted_at.map(|at| now - at)
    }
}

/// Lookup entity identified by a `(model, name)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub id: StatusId,
    pub model: String,
    pub name: String,
}

impl Status {
    pub fn new(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            name: name.into(),
        }
    }

    /// The status row the archiver resolves before every run. Its absence in
    /// the store is a deployment error, not a runtime condition.
    pub fn archived_assignment() -> Self {
        Self::new(ASSIGNMENT_STATUS_MODEL, ARCHIVED_STATUS_NAME)
    }
}
