//! Deterministic replay of recorded run history
//!
//! A fresh workflow instance is rebuilt from the `WorkflowStarted` input and
//! fed the decision events in order (`ActivityCompleted`, and
//! `ActivityFailed` once retries are exhausted). Every action it emits must
//! line up with what the history recorded. Any divergence is reported as
//! non-determinism.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

use super::registry::{RegistryError, WorkflowRegistry};
use crate::workflow::{WorkflowAction, WorkflowEvent};

/// Error code recorded when a run runs out of actions without completing
pub const STALLED_ERROR_CODE: &str = "WORKFLOW_STALLED";

/// Errors from replay
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// History does not begin with `WorkflowStarted`
    #[error("history does not start with a workflow_started event")]
    MissingStartEvent,

    /// The workflow emitted something other than what history recorded
    #[error("non-deterministic workflow at event {index}: expected {expected}, history has {actual}")]
    Nondeterminism {
        index: usize,
        expected: String,
        actual: String,
    },

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Summary of a successful replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome {
    /// Events consumed from history
    pub events_replayed: usize,

    /// `ActivityScheduled` events matched against the workflow's actions
    pub activities_verified: usize,

    /// Whether the rebuilt workflow reached a terminal state
    pub completed: bool,
}

/// Replay `history` against a fresh instance of `workflow_type`
///
/// Histories of runs that are still open or were cut off by their run
/// timeout replay up to their last recorded event.
pub fn replay(
    registry: &WorkflowRegistry,
    workflow_type: &str,
    history: &[WorkflowEvent],
) -> Result<ReplayOutcome, ReplayError> {
    let input = match history.first() {
        Some(WorkflowEvent::WorkflowStarted { input }) => input.clone(),
        _ => return Err(ReplayError::MissingStartEvent),
    };

    let mut workflow = registry.create(workflow_type, input)?;
    let mut pending: VecDeque<WorkflowAction> = workflow.start().into();
    let mut activities_verified = 0;

    for (index, event) in history.iter().enumerate().skip(1) {
        match event {
            WorkflowEvent::ActivityScheduled {
                activity_id,
                activity_type,
                input,
                ..
            } => {
                let actual = format!("schedule {activity_type} ({activity_id})");
                match pending.pop_front() {
                    Some(WorkflowAction::ScheduleActivity {
                        activity_id: expected_id,
                        activity_type: expected_type,
                        input: expected_input,
                        ..
                    }) if expected_id == *activity_id
                        && expected_type == *activity_type
                        && expected_input == *input =>
                    {
                        activities_verified += 1;
                    }
                    other => {
                        return Err(ReplayError::Nondeterminism {
                            index,
                            expected: describe(other.as_ref()),
                            actual,
                        })
                    }
                }
            }

            WorkflowEvent::ActivityCompleted {
                activity_id,
                result,
            } => {
                pending.extend(workflow.activity_completed(activity_id, result.clone()));
            }

            WorkflowEvent::ActivityFailed {
                activity_id,
                error,
                will_retry,
            } => {
                if !will_retry {
                    pending.extend(workflow.activity_failed(activity_id, error));
                }
            }

            WorkflowEvent::WorkflowCompleted { result } => match pending.pop_front() {
                Some(WorkflowAction::CompleteWorkflow { result: expected }) if expected == *result => {}
                other => {
                    return Err(ReplayError::Nondeterminism {
                        index,
                        expected: describe(other.as_ref()),
                        actual: "complete".to_string(),
                    })
                }
            },

            WorkflowEvent::WorkflowFailed { error } => match pending.pop_front() {
                Some(WorkflowAction::FailWorkflow { error: expected }) if expected == *error => {}
                None if error.code.as_deref() == Some(STALLED_ERROR_CODE) => {}
                other => {
                    return Err(ReplayError::Nondeterminism {
                        index,
                        expected: describe(other.as_ref()),
                        actual: format!("fail: {}", error.message),
                    })
                }
            },

            WorkflowEvent::WorkflowStarted { .. } => {
                return Err(ReplayError::Nondeterminism {
                    index,
                    expected: describe(pending.front()),
                    actual: "a second workflow_started".to_string(),
                })
            }

            WorkflowEvent::WorkflowTimedOut { .. }
            | WorkflowEvent::ActivityStarted { .. }
            | WorkflowEvent::ActivityTimedOut { .. } => {}
        }
    }

    debug!(
        workflow_type,
        events = history.len(),
        activities_verified,
        "replay verified"
    );

    Ok(ReplayOutcome {
        events_replayed: history.len(),
        activities_verified,
        completed: workflow.is_closed(),
    })
}

fn describe(action: Option<&WorkflowAction>) -> String {
    match action {
        Some(WorkflowAction::ScheduleActivity {
            activity_id,
            activity_type,
            ..
        }) => format!("schedule {activity_type} ({activity_id})"),
        Some(WorkflowAction::CompleteWorkflow { .. }) => "complete".to_string(),
        Some(WorkflowAction::FailWorkflow { error }) => format!("fail: {}", error.message),
        None => "no further action".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityError;
    use crate::workflow::{ActivityOptions, Workflow, WorkflowError};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct CountInput {
        steps: u32,
    }

    /// Schedules `steps` activities one after another, then completes
    struct CountWorkflow {
        steps: u32,
        done: u32,
        failed: Option<WorkflowError>,
    }

    impl Workflow for CountWorkflow {
        const TYPE: &'static str = "count";
        type Input = CountInput;
        type Output = u32;

        fn new(input: Self::Input) -> Self {
            Self {
                steps: input.steps,
                done: 0,
                failed: None,
            }
        }

        fn on_start(&mut self) -> Vec<WorkflowAction> {
            vec![WorkflowAction::schedule_activity("step-1", "tick", json!({ "n": 1 }))]
        }

        fn on_activity_completed(&mut self, _activity_id: &str, _result: Value) -> Vec<WorkflowAction> {
            self.done += 1;
            if self.done == self.steps {
                return vec![WorkflowAction::complete(json!(self.done))];
            }
            let n = self.done + 1;
            vec![WorkflowAction::schedule_activity(
                format!("step-{n}"),
                "tick",
                json!({ "n": n }),
            )]
        }

        fn on_activity_failed(&mut self, _activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
            let error = WorkflowError::from_activity("tick failed", error);
            self.failed = Some(error.clone());
            vec![WorkflowAction::fail(error)]
        }

        fn is_completed(&self) -> bool {
            self.done == self.steps || self.failed.is_some()
        }

        fn result(&self) -> Option<Self::Output> {
            (self.done == self.steps).then_some(self.done)
        }

        fn error(&self) -> Option<WorkflowError> {
            self.failed.clone()
        }
    }

    fn registry() -> WorkflowRegistry {
        let mut registry = WorkflowRegistry::new();
        registry.register::<CountWorkflow>();
        registry
    }

    fn scheduled(n: u32) -> WorkflowEvent {
        WorkflowEvent::ActivityScheduled {
            activity_id: format!("step-{n}"),
            activity_type: "tick".to_string(),
            input: json!({ "n": n }),
            options: ActivityOptions::default(),
        }
    }

    fn completed(n: u32) -> WorkflowEvent {
        WorkflowEvent::ActivityCompleted {
            activity_id: format!("step-{n}"),
            result: json!(null),
        }
    }

    #[test]
    fn test_replay_completed_history() {
        let history = vec![
            WorkflowEvent::WorkflowStarted { input: json!({ "steps": 2 }) },
            scheduled(1),
            WorkflowEvent::ActivityStarted { activity_id: "step-1".into(), attempt: 1 },
            completed(1),
            scheduled(2),
            WorkflowEvent::ActivityStarted { activity_id: "step-2".into(), attempt: 1 },
            completed(2),
            WorkflowEvent::WorkflowCompleted { result: json!(2) },
        ];

        let outcome = replay(&registry(), "count", &history).unwrap();
        assert_eq!(outcome.activities_verified, 2);
        assert!(outcome.completed);
    }

    #[test]
    fn test_replay_ignores_retried_failures() {
        let transient = ActivityError::retryable("flaky");
        let history = vec![
            WorkflowEvent::WorkflowStarted { input: json!({ "steps": 1 }) },
            scheduled(1),
            WorkflowEvent::ActivityFailed {
                activity_id: "step-1".into(),
                error: transient,
                will_retry: true,
            },
            completed(1),
            WorkflowEvent::WorkflowCompleted { result: json!(1) },
        ];

        assert!(replay(&registry(), "count", &history).is_ok());
    }

    #[test]
    fn test_replay_final_failure() {
        let error = ActivityError::non_retryable("boom");
        let history = vec![
            WorkflowEvent::WorkflowStarted { input: json!({ "steps": 1 }) },
            scheduled(1),
            WorkflowEvent::ActivityFailed {
                activity_id: "step-1".into(),
                error: error.clone(),
                will_retry: false,
            },
            WorkflowEvent::WorkflowFailed {
                error: WorkflowError::from_activity("tick failed", &error),
            },
        ];

        assert!(replay(&registry(), "count", &history).is_ok());
    }

    #[test]
    fn test_replay_detects_changed_input() {
        let history = vec![
            WorkflowEvent::WorkflowStarted { input: json!({ "steps": 1 }) },
            WorkflowEvent::ActivityScheduled {
                activity_id: "step-1".into(),
                activity_type: "tick".into(),
                input: json!({ "n": 99 }),
                options: ActivityOptions::default(),
            },
        ];

        let err = replay(&registry(), "count", &history).unwrap_err();
        assert!(matches!(err, ReplayError::Nondeterminism { index: 1, .. }));
    }

    #[test]
    fn test_replay_detects_extra_activity() {
        let history = vec![
            WorkflowEvent::WorkflowStarted { input: json!({ "steps": 1 }) },
            scheduled(1),
            completed(1),
            scheduled(2),
        ];

        let err = replay(&registry(), "count", &history).unwrap_err();
        match err {
            ReplayError::Nondeterminism { index, expected, .. } => {
                assert_eq!(index, 3);
                assert_eq!(expected, "complete");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_replay_partial_history() {
        let history = vec![
            WorkflowEvent::WorkflowStarted { input: json!({ "steps": 3 }) },
            scheduled(1),
            completed(1),
            scheduled(2),
            WorkflowEvent::WorkflowTimedOut { run_timeout_ms: 1000 },
        ];

        let outcome = replay(&registry(), "count", &history).unwrap();
        assert_eq!(outcome.activities_verified, 2);
        assert!(!outcome.completed);
    }

    #[test]
    fn test_replay_requires_start_event() {
        let err = replay(&registry(), "count", &[scheduled(1)]).unwrap_err();
        assert!(matches!(err, ReplayError::MissingStartEvent));

        let err = replay(&registry(), "count", &[]).unwrap_err();
        assert!(matches!(err, ReplayError::MissingStartEvent));
    }

    #[test]
    fn test_replay_unknown_type() {
        let history = vec![WorkflowEvent::WorkflowStarted { input: json!({}) }];
        let err = replay(&registry(), "missing", &history).unwrap_err();
        assert!(matches!(err, ReplayError::Registry(_)));
    }
}
