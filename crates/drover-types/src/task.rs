use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task. Both terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Phases are still being driven
    Running,
    /// Execution phase finished cleanly
    Completed,
    /// A phase or the orchestration itself failed
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Why a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// A phase ran past its deadline and was killed
    Timeout,
    /// Credential/session failure reported in agent output
    AuthExpired,
    /// Upstream rate limiting or quota exhaustion reported in agent output
    CapacityReached,
    /// Agent process exited non-zero with no classified cause
    ExitCode,
    /// Orchestration-level fault not attributable to the agent process
    Unknown,
}

/// Externally observable record of one task.
///
/// Exactly one record exists per identifier for the lifetime of the process.
/// The record is replaced whole by the single flow driving that task; readers
/// never mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub started: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<TaskErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    pub log_file: String,
}

impl TaskRecord {
    pub fn new(id: String, prompt: String, log_file: String) -> Self {
        Self {
            id,
            prompt,
            status: TaskStatus::Running,
            started: Utc::now(),
            finished: None,
            error_type: None,
            error: None,
            pr_url: None,
            log_file,
        }
    }
}
