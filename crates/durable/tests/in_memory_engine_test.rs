//! Integration tests for InMemoryEngine
//!
//! Time is paused in tests that exercise retries and timeouts, so backoff
//! delays and slow activities resolve instantly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gram_durable::prelude::*;

// =============================================================================
// Test Fixtures
// =============================================================================

/// How a scripted activity behaves on each attempt
#[derive(Clone)]
enum Step {
    Succeed(Value),
    Fail,
    FailPermanently,
    Hang,
    Panic,
}

/// Dispatcher that plays back a script per activity type and counts calls
#[derive(Default)]
struct ScriptedActivities {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedActivities {
    fn script(self, activity_type: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().insert(activity_type.to_string(), steps);
        self
    }

    fn calls(&self, activity_type: &str) -> u32 {
        self.calls.lock().get(activity_type).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl ActivityDispatcher for ScriptedActivities {
    async fn dispatch(
        &self,
        ctx: &ActivityContext,
        activity_type: &str,
        _input: Value,
    ) -> Result<Value, ActivityError> {
        *self.calls.lock().entry(activity_type.to_string()).or_default() += 1;

        let step = self
            .scripts
            .lock()
            .get(activity_type)
            .and_then(|steps| steps.get(ctx.attempt as usize - 1).cloned())
            .unwrap_or(Step::Succeed(json!(null)));

        match step {
            Step::Succeed(value) => Ok(value),
            Step::Fail => Err(ActivityError::retryable(format!(
                "{activity_type} attempt {} failed",
                ctx.attempt
            ))),
            Step::FailPermanently => Err(ActivityError::non_retryable("rejected").with_type("REJECTED")),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!(null))
            }
            Step::Panic => panic!("{activity_type} attempt {} panicked", ctx.attempt),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProvisionInput {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ProvisionOutput {
    address: String,
}

/// check (60s, 3 attempts) then allocate (180s, 1 attempt)
struct ProvisionWorkflow {
    name: String,
    address: Option<String>,
    error: Option<WorkflowError>,
}

impl Workflow for ProvisionWorkflow {
    const TYPE: &'static str = "provision";
    type Input = ProvisionInput;
    type Output = ProvisionOutput;

    fn new(input: Self::Input) -> Self {
        Self {
            name: input.name,
            address: None,
            error: None,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        vec![
            WorkflowAction::schedule_activity("check-1", "check", json!({ "name": self.name }))
                .with_options(ActivityOptions::new(Duration::from_secs(60), 3)),
        ]
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        match activity_id {
            "check-1" => vec![WorkflowAction::schedule_activity(
                "allocate-2",
                "allocate",
                json!({ "name": self.name }),
            )
            .with_options(ActivityOptions::new(Duration::from_secs(180), 1))],
            _ => {
                let address = result.as_str().unwrap_or_default().to_string();
                self.address = Some(address.clone());
                vec![WorkflowAction::complete(json!({ "address": address }))]
            }
        }
    }

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        let context = match activity_id {
            "check-1" => "failed to check name",
            _ => "failed to allocate address",
        };
        let error = WorkflowError::from_activity(context, error);
        self.error = Some(error.clone());
        vec![WorkflowAction::fail(error)]
    }

    fn is_completed(&self) -> bool {
        self.address.is_some() || self.error.is_some()
    }

    fn result(&self) -> Option<Self::Output> {
        self.address.clone().map(|address| ProvisionOutput { address })
    }

    fn error(&self) -> Option<WorkflowError> {
        self.error.clone()
    }
}

fn engine_with(activities: Arc<ScriptedActivities>) -> InMemoryEngine {
    let mut registry = WorkflowRegistry::new();
    registry.register::<ProvisionWorkflow>();
    InMemoryEngine::new("main", registry, activities)
}

fn options(id: &str) -> StartWorkflowOptions {
    StartWorkflowOptions::new(id, "main")
}

fn input() -> Value {
    json!({ "name": "docs.example.com" })
}

// =============================================================================
// Execution
// =============================================================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_happy_path() {
    let activities = Arc::new(
        ScriptedActivities::default().script("allocate", vec![Step::Succeed(json!("10.0.0.7"))]),
    );
    let engine = engine_with(activities.clone());

    let handle = engine
        .start_workflow(options("provision:a"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    let outcome = engine.await_run(&handle).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.result, Some(json!({ "address": "10.0.0.7" })));
    assert_eq!(activities.calls("check"), 1);
    assert_eq!(activities.calls("allocate"), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_transient_failures_are_retried() {
    let activities = Arc::new(
        ScriptedActivities::default().script("check", vec![Step::Fail, Step::Fail, Step::Succeed(json!(true))]),
    );
    let engine = engine_with(activities.clone());

    let handle = engine
        .start_workflow(options("provision:b"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    let outcome = engine.await_run(&handle).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(activities.calls("check"), 3);

    let retried = engine
        .history(&handle)
        .unwrap()
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::ActivityFailed { will_retry: true, .. }))
        .count();
    assert_eq!(retried, 2);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_retry_budget_is_never_exceeded() {
    let activities = Arc::new(
        ScriptedActivities::default().script("check", vec![Step::Fail, Step::Fail, Step::Fail, Step::Fail]),
    );
    let engine = engine_with(activities.clone());

    let handle = engine
        .start_workflow(options("provision:c"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    let outcome = engine.await_run(&handle).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(activities.calls("check"), 3);
    assert_eq!(activities.calls("allocate"), 0);

    let error = outcome.error.unwrap();
    assert_eq!(error.message, "failed to check name: check attempt 3 failed");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_single_attempt_step_is_not_retried() {
    let activities = Arc::new(ScriptedActivities::default().script("allocate", vec![Step::Fail, Step::Succeed(json!("x"))]));
    let engine = engine_with(activities.clone());

    let handle = engine
        .start_workflow(options("provision:d"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    let outcome = engine.await_run(&handle).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(activities.calls("allocate"), 1);
    assert!(outcome.error.unwrap().message.starts_with("failed to allocate address: "));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_non_retryable_error_skips_remaining_attempts() {
    let activities = Arc::new(ScriptedActivities::default().script("check", vec![Step::FailPermanently]));
    let engine = engine_with(activities.clone());

    let handle = engine
        .start_workflow(options("provision:e"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    let outcome = engine.await_run(&handle).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(activities.calls("check"), 1);
    assert_eq!(outcome.error.unwrap().code.as_deref(), Some("REJECTED"));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_attempt_timeout_counts_as_failed_attempt() {
    let activities = Arc::new(
        ScriptedActivities::default().script("check", vec![Step::Hang, Step::Succeed(json!(true))]),
    );
    let engine = engine_with(activities.clone());

    let handle = engine
        .start_workflow(options("provision:f"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    let outcome = engine.await_run(&handle).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(activities.calls("check"), 2);

    let history = engine.history(&handle).unwrap();
    assert!(history
        .iter()
        .any(|e| matches!(e, WorkflowEvent::ActivityTimedOut { attempt: 1, .. })));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_run_timeout() {
    let activities = Arc::new(ScriptedActivities::default().script("check", vec![Step::Succeed(json!(true))]).script("allocate", vec![Step::Hang]));
    let engine = engine_with(activities.clone());

    let handle = engine
        .start_workflow(
            options("provision:g").with_run_timeout(Duration::from_secs(90)),
            ProvisionWorkflow::TYPE,
            input(),
        )
        .await
        .unwrap();
    let outcome = engine.await_run(&handle).await.unwrap();

    assert_eq!(outcome.status, RunStatus::TimedOut);
    assert_eq!(outcome.error.unwrap().code.as_deref(), Some("RUN_TIMEOUT"));
    assert!(matches!(
        engine.history(&handle).unwrap().last(),
        Some(WorkflowEvent::WorkflowTimedOut { run_timeout_ms: 90_000 })
    ));
}

// =============================================================================
// Identity and Conflict Policies
// =============================================================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_allow_duplicate_reruns_closed_id() {
    let activities = Arc::new(ScriptedActivities::default());
    let engine = engine_with(activities.clone());
    let opts = options("provision:h").with_conflict_policy(ConflictPolicy::AllowDuplicate);

    let first = engine.start_workflow(opts.clone(), ProvisionWorkflow::TYPE, input()).await.unwrap();
    engine.await_run(&first).await.unwrap();

    let second = engine.start_workflow(opts, ProvisionWorkflow::TYPE, input()).await.unwrap();
    engine.await_run(&second).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(engine.run_count("provision:h"), 2);
    assert_eq!(engine.describe_run("provision:h").await.unwrap().run_id, second.run_id);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_allow_duplicate_attaches_to_running_id() {
    let activities = Arc::new(ScriptedActivities::default().script("check", vec![Step::Hang]));
    let engine = engine_with(activities.clone());
    let opts = options("provision:i").with_conflict_policy(ConflictPolicy::AllowDuplicate);

    let first = engine.start_workflow(opts.clone(), ProvisionWorkflow::TYPE, input()).await.unwrap();
    let second = engine.start_workflow(opts, ProvisionWorkflow::TYPE, input()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.run_count("provision:i"), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_reject_duplicate_never_runs_twice() {
    let activities = Arc::new(ScriptedActivities::default());
    let engine = engine_with(activities.clone());
    let opts = options("provision:j").with_conflict_policy(ConflictPolicy::RejectDuplicate);

    let first = engine.start_workflow(opts.clone(), ProvisionWorkflow::TYPE, input()).await.unwrap();
    engine.await_run(&first).await.unwrap();
    let calls_after_first = activities.total_calls();

    let err = engine.start_workflow(opts, ProvisionWorkflow::TYPE, input()).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { run_id, .. } if run_id == first.run_id));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(activities.total_calls(), calls_after_first);
    assert_eq!(engine.run_count("provision:j"), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_fail_policy_rejects_while_running() {
    let activities = Arc::new(ScriptedActivities::default().script("check", vec![Step::Hang]));
    let engine = engine_with(activities.clone());
    let opts = options("provision:k").with_conflict_policy(ConflictPolicy::Fail);

    engine.start_workflow(opts.clone(), ProvisionWorkflow::TYPE, input()).await.unwrap();
    tokio::task::yield_now().await;

    let err = engine.start_workflow(opts, ProvisionWorkflow::TYPE, input()).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));
    assert_eq!(activities.calls("check"), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_panicking_activity_fails_run_and_frees_id() {
    let activities = Arc::new(
        ScriptedActivities::default().script("check", vec![Step::Panic, Step::Succeed(json!(true))]),
    );
    let engine = engine_with(activities.clone());
    let opts = options("provision:p").with_conflict_policy(ConflictPolicy::Fail);

    let first = engine.start_workflow(opts.clone(), ProvisionWorkflow::TYPE, input()).await.unwrap();
    let outcome = engine.await_run(&first).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.error.unwrap().code.as_deref(), Some("ACTIVITY_PANICKED"));
    assert_eq!(activities.calls("check"), 1);
    assert_eq!(engine.describe_run("provision:p").await.unwrap().status, RunStatus::Failed);

    activities.scripts.lock().remove("check");
    let second = engine.start_workflow(opts, ProvisionWorkflow::TYPE, input()).await.unwrap();
    let outcome = engine.await_run(&second).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(outcome.status, RunStatus::Completed);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_concurrent_starts_produce_one_run() {
    let activities = Arc::new(ScriptedActivities::default());
    let engine = engine_with(activities.clone());
    let opts = options("provision:l").with_conflict_policy(ConflictPolicy::RejectDuplicate);

    let starts = (0..8).map(|_| {
        let engine = engine.clone();
        let opts = opts.clone();
        tokio::spawn(async move { engine.start_workflow(opts, ProvisionWorkflow::TYPE, input()).await })
    });

    let mut accepted = 0;
    for start in starts {
        if start.await.unwrap().is_ok() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(engine.run_count("provision:l"), 1);
}

// =============================================================================
// Replay
// =============================================================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_recorded_history_replays() {
    let activities = Arc::new(
        ScriptedActivities::default()
            .script("check", vec![Step::Fail, Step::Succeed(json!(true))])
            .script("allocate", vec![Step::Succeed(json!("10.0.0.9"))]),
    );
    let engine = engine_with(activities);

    let handle = engine
        .start_workflow(options("provision:m"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    engine.await_run(&handle).await.unwrap();

    let outcome = engine.verify_replay(&handle).unwrap();
    assert_eq!(outcome.activities_verified, 2);
    assert!(outcome.completed);

    let history = engine.history(&handle).unwrap();
    let again = replay(engine.registry(), ProvisionWorkflow::TYPE, &history).unwrap();
    assert_eq!(again, outcome);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_replay_detects_tampered_history() {
    let engine = engine_with(Arc::new(ScriptedActivities::default()));

    let handle = engine
        .start_workflow(options("provision:n"), ProvisionWorkflow::TYPE, input())
        .await
        .unwrap();
    engine.await_run(&handle).await.unwrap();

    let mut history = engine.history(&handle).unwrap();
    history[0] = WorkflowEvent::WorkflowStarted {
        input: json!({ "name": "other.example.com" }),
    };

    let err = replay(engine.registry(), ProvisionWorkflow::TYPE, &history).unwrap_err();
    assert!(matches!(err, ReplayError::Nondeterminism { index: 1, .. }));
}
