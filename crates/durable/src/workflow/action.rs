//! Commands a workflow hands back to its engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WorkflowError;
use crate::reliability::RetryPolicy;

/// What a workflow asks the engine to do next
///
/// A callback may return several actions; the engine carries them out one
/// after another in the order returned, and the next activity only starts
/// once the previous one has closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowAction {
    ScheduleActivity {
        /// Unique within the run
        activity_id: String,
        /// Name the dispatcher resolves to an implementation
        activity_type: String,
        input: Value,
        options: ActivityOptions,
    },

    CompleteWorkflow { result: Value },

    FailWorkflow { error: WorkflowError },
}

impl WorkflowAction {
    /// Schedule an activity under default options
    pub fn schedule_activity(
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::ScheduleActivity {
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            input,
            options: ActivityOptions::default(),
        }
    }

    /// Set the options of a `ScheduleActivity`; other actions pass through
    pub fn with_options(mut self, new_options: ActivityOptions) -> Self {
        if let Self::ScheduleActivity { options, .. } = &mut self {
            *options = new_options;
        }
        self
    }

    pub fn complete(result: Value) -> Self {
        Self::CompleteWorkflow { result }
    }

    pub fn fail(error: WorkflowError) -> Self {
        Self::FailWorkflow { error }
    }
}

/// Per-step execution limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    pub retry_policy: RetryPolicy,

    /// Limit on a single attempt; an attempt that overruns counts as failed
    #[serde(with = "duration_serde")]
    pub start_to_close_timeout: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            start_to_close_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl ActivityOptions {
    /// Attempt timeout plus attempt budget, the two knobs every step sets
    pub fn new(start_to_close_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            retry_policy: RetryPolicy::default().with_max_attempts(max_attempts),
            start_to_close_timeout,
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }
}

/// `Duration` as whole milliseconds
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
