mod summary;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::{STATUS_CREATED, STATUS_FAILED, STATUS_PENDING};
use crate::error::StoreError;
use crate::store::TargetId;

pub use summary::{PipelineSummary, ProcessSummary};

/// Primary key of an [`AsyncProcess`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a process.
///
/// `Created` and `Failed` are terminal. `Transient` labels are free text
/// written while a run is in progress, e.g. "Sorting frames".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Pending,
    Created,
    Failed,
    Transient(String),
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Created | Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Created => STATUS_CREATED,
            Self::Failed => STATUS_FAILED,
            Self::Transient(label) => label,
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            STATUS_PENDING => Self::Pending,
            STATUS_CREATED => Self::Created,
            STATUS_FAILED => Self::Failed,
            _ => Self::Transient(s),
        }
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Transient(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record of one deferred unit of work and its outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AsyncProcess {
    pub id: ProcessId,
    pub identifier: String,
    pub status: Status,
    pub created: DateTime<Utc>,
    /// Instant the status first became terminal.
    pub terminal_timestamp: Option<DateTime<Utc>>,
    pub failure_message: String,
    pub target: Option<TargetId>,
    /// Stamped by the store on every save.
    pub last_update: DateTime<Utc>,
}

impl AsyncProcess {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Set `failed` together with its message. Persisting is up to the caller.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = Status::Failed;
        self.failure_message = message.into();
    }
}

#[derive(Clone, Debug, Default)]
pub struct NewProcess {
    pub identifier: String,
    pub target: Option<TargetId>,
}

/// Validate and normalise a process about to be written.
///
/// Every [`Store`](crate::store::Store) implementation must call this from its
/// save path: it rejects transitions out of a terminal state, keeps `created`
/// immutable and stamps `terminal_timestamp` exactly once, whichever code set
/// the status.
pub fn check_transition(
    previous: &AsyncProcess,
    next: &mut AsyncProcess,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    if previous.is_terminal() && next.status != previous.status {
        return Err(StoreError::TerminalState {
            id: previous.id,
            from: previous.status.to_string(),
            to: next.status.to_string(),
        });
    }

    next.created = previous.created;
    next.terminal_timestamp = if next.is_terminal() {
        previous.terminal_timestamp.or(Some(now))
    } else {
        None
    };
    if next.status != Status::Failed {
        next.failure_message.clear();
    }
    next.last_update = now;
    Ok(())
}
