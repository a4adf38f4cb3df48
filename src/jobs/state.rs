//! Job records and their lifecycle
//!
//! ```text
//! PENDING ──► RUNNING ──► DONE
//!                 │
//!                 └─────► FAILED
//! ```
//!
//! A job can also fail straight from PENDING when its worker never starts.
//! DONE and FAILED are terminal.

use crate::engine::ProtectOutcome;
use crate::evidence::TamperReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// The allowed edges of the lifecycle
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Done)
                | (JobState::Running, JobState::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Protect,
    Verify,
    Custom,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Protect => "protect",
            JobKind::Verify => "verify",
            JobKind::Custom => "custom",
        }
    }
}

/// Payload of a finished job
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum JobOutput {
    Protected(ProtectOutcome),
    Verified(TamperReport),
}

/// Snapshot of one job
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub result: Option<JobOutput>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn pending(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            state: JobState::Pending,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// PENDING -> RUNNING. Returns false if the edge is not allowed.
    pub fn start(&mut self) -> bool {
        if !self.state.can_transition_to(JobState::Running) {
            return false;
        }
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// RUNNING -> DONE
    pub fn complete(&mut self, output: JobOutput) -> bool {
        if !self.state.can_transition_to(JobState::Done) {
            return false;
        }
        self.state = JobState::Done;
        self.result = Some(output);
        self.finished_at = Some(Utc::now());
        true
    }

    /// PENDING or RUNNING -> FAILED
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.state.can_transition_to(JobState::Failed) {
            return false;
        }
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        true
    }
}
