//! Types shared by the job store, the in-memory board and the supervisor.

use serde::Serialize;

use super::ids::{new_row_id, new_unique_id};

/// Format profile recorded for every job.
pub const DEFAULT_FORMAT_ID: &str = "best";

/// Lifecycle state of a job.
///
/// Stored as four boolean columns (`active`, `completed`, `failed`,
/// `isPaused`); the enum is the only way the crate writes them, so at most one
/// of active/completed/failed is ever set and a paused job is never active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Active,
    Paused,
    Completed,
    Failed,
}

/// Column-level view of a [`JobStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub active: bool,
    pub completed: bool,
    pub failed: bool,
    pub is_paused: bool,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn flags(self) -> StatusFlags {
        let mut f = StatusFlags::default();
        match self {
            JobStatus::Queued => {}
            JobStatus::Active => f.active = true,
            JobStatus::Paused => f.is_paused = true,
            JobStatus::Completed => f.completed = true,
            JobStatus::Failed => f.failed = true,
        }
        f
    }

    /// Decode stored flags. Rows written by other tools may carry conflicting
    /// flags; terminal flags win over paused, paused over active.
    pub fn from_flags(f: StatusFlags) -> Self {
        if f.completed {
            JobStatus::Completed
        } else if f.failed {
            JobStatus::Failed
        } else if f.is_paused {
            JobStatus::Paused
        } else if f.active {
            JobStatus::Active
        } else {
            JobStatus::Queued
        }
    }

    /// Whether `resume` may spawn a fresh attempt from this state.
    pub fn is_resumable(self) -> bool {
        matches!(self, JobStatus::Paused | JobStatus::Failed)
    }
}

/// One download job, as stored and as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: i64,
    pub unique_id: String,
    pub url: String,
    pub title: String,
    pub tracking_message: String,
    pub format_id: String,
    pub active: bool,
    pub completed: bool,
    pub failed: bool,
    pub is_paused: bool,
}

impl JobRecord {
    /// Fresh job for `url` with newly generated ids, already marked Active.
    pub fn new(url: &str) -> Self {
        let mut rec = Self {
            id: new_row_id(),
            unique_id: new_unique_id(),
            url: url.to_string(),
            title: "Initializing...".to_string(),
            tracking_message: "Queued...".to_string(),
            format_id: DEFAULT_FORMAT_ID.to_string(),
            active: false,
            completed: false,
            failed: false,
            is_paused: false,
        };
        rec.set_status(JobStatus::Active);
        rec
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_flags(self.flags())
    }

    pub fn flags(&self) -> StatusFlags {
        StatusFlags {
            active: self.active,
            completed: self.completed,
            failed: self.failed,
            is_paused: self.is_paused,
        }
    }

    pub fn set_status(&mut self, status: JobStatus) {
        let f = status.flags();
        self.active = f.active;
        self.completed = f.completed;
        self.failed = f.failed;
        self.is_paused = f.is_paused;
    }

    /// Apply the fields present in `patch`; others keep their value.
    pub fn apply(&mut self, patch: &JobPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(msg) = &patch.tracking_message {
            self.tracking_message.clone_from(msg);
        }
        if let Some(format_id) = &patch.format_id {
            self.format_id.clone_from(format_id);
        }
        if let Some(status) = patch.status {
            self.set_status(status);
        }
    }
}

/// Partial update of a job. `None` fields are left untouched; a status
/// rewrites all four flag columns together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub title: Option<String>,
    pub tracking_message: Option<String>,
    pub format_id: Option<String>,
    pub status: Option<JobStatus>,
}

impl JobPatch {
    /// Status change with an accompanying tracking message.
    pub fn transition(status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            tracking_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.tracking_message.is_none()
            && self.format_id.is_none()
            && self.status.is_none()
    }
}
