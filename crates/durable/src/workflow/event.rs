//! Run history

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ActivityOptions, WorkflowError};
use crate::activity::ActivityError;

/// One entry in a run's append-only history
///
/// Only some entries feed decisions back into the workflow:
/// `WorkflowStarted`, `ActivityCompleted`, and `ActivityFailed` with
/// `will_retry == false`. Attempt-level entries (`ActivityStarted`,
/// `ActivityTimedOut`, retried failures) are bookkeeping for operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        input: Value,
    },
    WorkflowCompleted {
        result: Value,
    },
    WorkflowFailed {
        error: WorkflowError,
    },
    WorkflowTimedOut {
        run_timeout_ms: u64,
    },

    ActivityScheduled {
        activity_id: String,
        activity_type: String,
        input: Value,
        options: ActivityOptions,
    },
    /// `attempt` is 1-based
    ActivityStarted {
        activity_id: String,
        attempt: u32,
    },
    ActivityCompleted {
        activity_id: String,
        result: Value,
    },
    ActivityFailed {
        activity_id: String,
        error: ActivityError,
        /// False once the step's attempt budget is spent or the error is
        /// non-retryable
        will_retry: bool,
    },
    ActivityTimedOut {
        activity_id: String,
        attempt: u32,
    },
}
