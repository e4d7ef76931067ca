//! Workflow trait definition

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::WorkflowAction;
use crate::activity::ActivityError;

/// Why a run failed
///
/// Recorded in history and compared during replay, so it holds only values
/// that a replay reproduces exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    pub message: String,

    /// Machine-readable cause, e.g. `RUN_TIMEOUT`
    pub code: Option<String>,
}

impl WorkflowError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Build a workflow error from an exhausted activity, prefixed with step context
    ///
    /// The activity's error type, if any, becomes the workflow error code.
    pub fn from_activity(context: &str, error: &ActivityError) -> Self {
        Self {
            message: format!("{}: {}", context, error.message),
            code: error.error_type.clone(),
        }
    }

    /// Prefix the message with additional context, keeping the code
    pub fn wrap(mut self, context: &str) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WorkflowError {}

/// A deterministic state machine driven by activity results
///
/// The engine calls `on_start` once, then feeds back the outcome of each
/// scheduled activity. Every callback answers with the actions to take next.
///
/// Replay rebuilds a run by constructing a fresh instance from the recorded
/// input and feeding it the recorded outcomes, so identical inputs must yield
/// identical actions. Anything non-deterministic (clock, randomness,
/// environment, I/O) has to happen inside an activity.
///
/// Transient activity failures never reach the workflow: `on_activity_failed`
/// fires only once the step's retry budget is gone.
///
/// ```ignore
/// impl Workflow for PingWorkflow {
///     const TYPE: &'static str = "ping";
///     type Input = PingInput;
///     type Output = bool;
///
///     fn new(input: PingInput) -> Self {
///         Self { host: input.host, reachable: None }
///     }
///
///     fn on_start(&mut self) -> Vec<WorkflowAction> {
///         vec![WorkflowAction::schedule_activity("probe-1", "probe", json!({ "host": self.host }))]
///     }
///
///     fn on_activity_completed(&mut self, _id: &str, result: Value) -> Vec<WorkflowAction> {
///         self.reachable = result.as_bool();
///         vec![WorkflowAction::complete(result)]
///     }
///     // ...
/// }
/// ```
pub trait Workflow: Send + Sync + 'static {
    /// Registry key; also recorded as the run's workflow type
    const TYPE: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Clone;

    type Output: Serialize + DeserializeOwned + Send;

    fn new(input: Self::Input) -> Self;

    fn on_start(&mut self) -> Vec<WorkflowAction>;

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction>;

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction>;

    /// True once the workflow has emitted a terminal action
    fn is_completed(&self) -> bool;

    fn result(&self) -> Option<Self::Output>;

    fn error(&self) -> Option<WorkflowError> {
        None
    }
}
