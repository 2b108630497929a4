//! Domain models for persisted session records.
//!
//! Every run persists one self-describing record: a shared envelope (id, file,
//! timestamps) plus a payload tagged by `mode`. Records are grouped into four
//! archive kinds; the batch archive holds batch, program and recover runs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::batch::BatchSummary;
use super::controller::ControllerSession;
use super::goal::Portfolio;
use super::governance::GovernanceSession;
use super::program::ProgramSummary;

/// Archive a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    Session,
    BatchSession,
    ControllerSession,
    GovernanceSession,
}

impl SessionKind {
    pub const ALL: [Self; 4] = [
        Self::Session,
        Self::BatchSession,
        Self::ControllerSession,
        Self::GovernanceSession,
    ];

    /// Directory name under the auto archive root.
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Session => "close-loop-sessions",
            Self::BatchSession => "close-loop-batch-sessions",
            Self::ControllerSession => "close-loop-controller-sessions",
            Self::GovernanceSession => "governance-sessions",
        }
    }

    /// Prefix used for generated record ids.
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Session => "cl",
            Self::BatchSession => "batch",
            Self::ControllerSession => "ctl",
            Self::GovernanceSession => "gov",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::BatchSession => "batch-session",
            Self::ControllerSession => "controller-session",
            Self::GovernanceSession => "governance-session",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session" | "sessions" => Ok(Self::Session),
            "batch" | "batch-session" | "batch-sessions" => Ok(Self::BatchSession),
            "controller" | "controller-session" | "controller-sessions" => {
                Ok(Self::ControllerSession)
            }
            "governance" | "governance-session" | "governance-sessions" => {
                Ok(Self::GovernanceSession)
            }
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

/// Reference to a persisted record: an id, a file path, or the newest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRef {
    Latest,
    Id(String),
    Path(PathBuf),
}

impl SessionRef {
    /// Parse a user-supplied reference. The literal `latest` selects the newest record.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("latest") {
            Self::Latest
        } else if raw.contains('/') || raw.contains('\\') || raw.ends_with(".json") {
            Self::Path(PathBuf::from(raw))
        } else {
            Self::Id(raw.to_string())
        }
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Id(id) => f.write_str(id),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Lifecycle status shared by all record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Planned,
    Running,
    Completed,
    PartialFailed,
    Failed,
    Stopped,
    Converged,
    Exhausted,
    Observed,
}

impl RecordStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PartialFailed => "partial-failed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::Observed => "observed",
        }
    }

    /// The run may still be progressing or is resumable.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running)
    }

    /// The run finished with its goal met.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::Converged)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
            .map_err(|_| format!("unknown status: {s}"))
    }
}

/// Pointer to a persisted record, embedded in results and in other records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub id: String,
    pub file: PathBuf,
}

/// Single-goal close-loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseLoopSession {
    pub status: RecordStatus,
    pub goal: String,
    pub complexity_score: u32,
    pub sub_spec_count: usize,
    pub portfolio: Portfolio,
    pub resumed: bool,
    pub resumed_from_session: Option<String>,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mode-specific payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RecordPayload {
    Session(CloseLoopSession),
    Batch(BatchSummary),
    Program(ProgramSummary),
    Recover(ProgramSummary),
    Controller(ControllerSession),
    Governance(GovernanceSession),
}

impl RecordPayload {
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::Session(_) => "session",
            Self::Batch(_) => "batch",
            Self::Program(_) => "program",
            Self::Recover(_) => "recover",
            Self::Controller(_) => "controller",
            Self::Governance(_) => "governance",
        }
    }

    /// Archive this payload is stored in.
    pub const fn kind(&self) -> SessionKind {
        match self {
            Self::Session(_) => SessionKind::Session,
            Self::Batch(_) | Self::Program(_) | Self::Recover(_) => SessionKind::BatchSession,
            Self::Controller(_) => SessionKind::ControllerSession,
            Self::Governance(_) => SessionKind::GovernanceSession,
        }
    }

    pub const fn status(&self) -> RecordStatus {
        match self {
            Self::Session(s) => s.status,
            Self::Batch(b) => b.status,
            Self::Program(p) | Self::Recover(p) => p.batch.status,
            Self::Controller(c) => c.status,
            Self::Governance(g) => g.status,
        }
    }

    /// Batch portion of batch-like payloads.
    pub const fn batch(&self) -> Option<&BatchSummary> {
        match self {
            Self::Batch(b) => Some(b),
            Self::Program(p) | Self::Recover(p) => Some(&p.batch),
            _ => None,
        }
    }

    /// Program portion of program and recover payloads.
    pub const fn program(&self) -> Option<&ProgramSummary> {
        match self {
            Self::Program(p) | Self::Recover(p) => Some(p),
            _ => None,
        }
    }
}

/// Persisted record: shared envelope plus mode-tagged payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub file: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: RecordPayload,
}

impl SessionRecord {
    pub const fn status(&self) -> RecordStatus {
        self.payload.status()
    }

    pub const fn kind(&self) -> SessionKind {
        self.payload.kind()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id.clone(),
            file: self.file.clone(),
        }
    }

    /// Age in whole days relative to `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            file: self.file.clone(),
            mode: self.payload.mode().to_string(),
            status: self.status(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            headline: headline(&self.payload),
        }
    }
}

fn headline(payload: &RecordPayload) -> String {
    match payload {
        RecordPayload::Session(s) => s.goal.clone(),
        RecordPayload::Batch(b) => format!("{}/{} goals processed", b.processed_goals, b.total_goals),
        RecordPayload::Program(p) | RecordPayload::Recover(p) => format!(
            "{}/{} goals, risk {}",
            p.batch.completed_goals, p.batch.total_goals, p.program_kpi.risk_level
        ),
        RecordPayload::Controller(c) => format!(
            "{} processed, {} pending",
            c.processed_goals, c.pending_goals
        ),
        RecordPayload::Governance(g) => format!(
            "{}/{} rounds, {}",
            g.performed_rounds,
            g.max_rounds,
            g.stop_reason.map_or("in progress", |r| r.as_str())
        ),
    }
}

/// List item for a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub file: PathBuf,
    pub mode: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub headline: String,
}

/// Filter for archive listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub status: Option<RecordStatus>,
    pub limit: Option<usize>,
}

/// Archive listing, newest first. `total` counts matches before the limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionListing {
    pub kind: SessionKind,
    pub total: usize,
    pub items: Vec<SessionSummary>,
}

/// One spec directory in the spec archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecEntry {
    pub id: String,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecListing {
    pub total: usize,
    pub specs: Vec<SpecEntry>,
}
