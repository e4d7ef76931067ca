//! Workflow engine client API
//!
//! The capability set an orchestration core consumes from a durable
//! execution engine: start a run under a stable workflow id, describe the
//! latest run for an id, and wait for a run's terminal outcome.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::registry::RegistryError;
use super::replay::ReplayError;
use crate::workflow::WorkflowError;

/// Default overall run timeout
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// What happens when a start request targets a workflow id that already has runs
///
/// | policy            | live run under id     | closed run under id |
/// |-------------------|-----------------------|---------------------|
/// | `AllowDuplicate`  | attach to the live run | start a new run     |
/// | `RejectDuplicate` | conflict               | conflict            |
/// | `Fail`            | conflict               | start a new run     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Re-runs are allowed; a live run is reused rather than duplicated
    AllowDuplicate,
    /// An id is only ever run once
    RejectDuplicate,
    /// At most one live run per id; closed runs may be followed by new ones
    Fail,
}

impl ConflictPolicy {
    /// Engine policy for ids whose previous run is closed
    pub fn reuse_policy(self) -> IdReusePolicy {
        match self {
            Self::AllowDuplicate | Self::Fail => IdReusePolicy::AllowDuplicate,
            Self::RejectDuplicate => IdReusePolicy::RejectDuplicate,
        }
    }

    /// Engine policy for ids with a live run
    pub fn conflict_policy(self) -> IdConflictPolicy {
        match self {
            Self::AllowDuplicate => IdConflictPolicy::UseExisting,
            Self::RejectDuplicate | Self::Fail => IdConflictPolicy::Fail,
        }
    }
}

/// Engine policy for starting a run when the id's previous run is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdReusePolicy {
    /// Start a new run
    AllowDuplicate,
    /// Reject the start request
    RejectDuplicate,
}

/// Engine policy for starting a run when the id has a live run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdConflictPolicy {
    /// Return a handle to the live run instead of starting another
    UseExisting,
    /// Reject the start request
    Fail,
}

/// Options for a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartWorkflowOptions {
    /// Stable workflow id (deduplication and addressing key)
    pub id: String,

    /// Task queue whose workers execute the run
    pub task_queue: String,

    /// Policy when the id's previous run is closed
    pub id_reuse_policy: IdReusePolicy,

    /// Policy when the id has a live run
    pub id_conflict_policy: IdConflictPolicy,

    /// Upper bound on the run's total wall-clock duration
    #[serde(with = "crate::workflow::action::duration_serde")]
    pub run_timeout: Duration,
}

impl StartWorkflowOptions {
    /// Options with `AllowDuplicate` semantics and the default run timeout
    pub fn new(id: impl Into<String>, task_queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_queue: task_queue.into(),
            id_reuse_policy: IdReusePolicy::AllowDuplicate,
            id_conflict_policy: IdConflictPolicy::UseExisting,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Apply both engine policies from a [`ConflictPolicy`]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.id_reuse_policy = policy.reuse_policy();
        self.id_conflict_policy = policy.conflict_policy();
        self
    }

    /// Set the run timeout
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }
}

/// Address of one run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    /// Stable workflow id
    pub workflow_id: String,

    /// Engine-assigned id of this particular run
    pub run_id: Uuid,
}

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is executing or waiting on an activity
    Running,

    /// Run completed successfully
    Completed,

    /// Run failed
    Failed,

    /// Run exceeded its run timeout
    TimedOut,
}

impl RunStatus {
    /// Whether the run has reached a terminal state
    pub fn is_closed(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Status information for the latest run under a workflow id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescription {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub workflow_type: String,
    pub task_queue: String,
    pub status: RunStatus,
    pub history_length: usize,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub status: RunStatus,

    /// Result payload, set when `status` is `Completed`
    pub result: Option<serde_json::Value>,

    /// Failure, set when `status` is `Failed` or `TimedOut`
    pub error: Option<WorkflowError>,
}

/// Errors from engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A start request collided with an existing run under the same id
    #[error("workflow {workflow_id} already has a run ({run_id}) and its policy rejects another")]
    Conflict { workflow_id: String, run_id: Uuid },

    /// No worker polls the requested task queue
    #[error("unknown task queue: {0}")]
    UnknownTaskQueue(String),

    /// No run exists for the id or handle
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// The run's driver stopped without recording an outcome
    #[error("run {0} was abandoned before it closed")]
    RunAbandoned(Uuid),

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Recorded history does not replay deterministically
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A durable execution engine, seen from its clients
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Start (or attach to) a run of `workflow_type` under `options.id`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Conflict`] when the id's policies reject the
    /// request; no activity of the rejected request is ever executed.
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<RunHandle, EngineError>;

    /// Describe the latest run under a workflow id
    async fn describe_run(&self, workflow_id: &str) -> Result<RunDescription, EngineError>;

    /// Wait for a run to close and return its outcome
    async fn await_run(&self, handle: &RunHandle) -> Result<RunOutcome, EngineError>;
}
