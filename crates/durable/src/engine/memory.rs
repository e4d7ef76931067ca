//! In-process workflow engine
//!
//! Runs are driven on the tokio runtime of the caller. History lives in
//! memory only, so this engine suits tests, local tooling and single-process
//! deployments; it offers the same start, conflict and retry semantics as a
//! durable backend without surviving a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use super::client::{
    EngineError, IdConflictPolicy, IdReusePolicy, RunDescription, RunHandle, RunOutcome,
    RunStatus, StartWorkflowOptions, WorkflowEngine,
};
use super::registry::{ErasedWorkflow, WorkflowRegistry};
use super::replay::{replay, ReplayOutcome, STALLED_ERROR_CODE};
use crate::activity::{ActivityContext, ActivityDispatcher, ActivityError};
use crate::workflow::{ActivityOptions, WorkflowAction, WorkflowError, WorkflowEvent};

/// Error type recorded for attempts that exceed their start-to-close timeout
const ATTEMPT_TIMEOUT_ERROR_TYPE: &str = "START_TO_CLOSE_TIMEOUT";

/// Error type recorded for attempts whose activity panicked
const PANIC_ERROR_TYPE: &str = "ACTIVITY_PANICKED";

/// Error code recorded for runs that exceed their run timeout
const RUN_TIMEOUT_ERROR_CODE: &str = "RUN_TIMEOUT";

struct RunRecord {
    run_id: Uuid,
    workflow_type: String,
    task_queue: String,
    status: RunStatus,
    history: Vec<WorkflowEvent>,
    started_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

struct Inner {
    task_queue: String,
    registry: WorkflowRegistry,
    dispatcher: Arc<dyn ActivityDispatcher>,
    /// Runs per workflow id, oldest first
    runs: RwLock<HashMap<String, Vec<RunRecord>>>,
}

/// Workflow engine that executes runs in-process
///
/// Cloning is cheap; clones share the same runs.
#[derive(Clone)]
pub struct InMemoryEngine {
    inner: Arc<Inner>,
}

impl InMemoryEngine {
    /// Create an engine serving one task queue
    pub fn new(
        task_queue: impl Into<String>,
        registry: WorkflowRegistry,
        dispatcher: Arc<dyn ActivityDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                task_queue: task_queue.into(),
                registry,
                dispatcher,
                runs: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Task queue served by this engine
    pub fn task_queue(&self) -> &str {
        &self.inner.task_queue
    }

    /// Registered workflow types
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.inner.registry
    }

    /// Number of runs ever started under a workflow id
    pub fn run_count(&self, workflow_id: &str) -> usize {
        self.inner
            .runs
            .read()
            .get(workflow_id)
            .map_or(0, |runs| runs.len())
    }

    /// Recorded history of a run
    pub fn history(&self, handle: &RunHandle) -> Result<Vec<WorkflowEvent>, EngineError> {
        let runs = self.inner.runs.read();
        let record = find_run(&runs, handle)?;
        Ok(record.history.clone())
    }

    /// Replay a run's history against a fresh workflow instance
    pub fn verify_replay(&self, handle: &RunHandle) -> Result<ReplayOutcome, EngineError> {
        let (workflow_type, history) = {
            let runs = self.inner.runs.read();
            let record = find_run(&runs, handle)?;
            (record.workflow_type.clone(), record.history.clone())
        };

        Ok(replay(&self.inner.registry, &workflow_type, &history)?)
    }
}

impl std::fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("task_queue", &self.inner.task_queue)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

#[async_trait]
impl WorkflowEngine for InMemoryEngine {
    #[instrument(skip(self, options, input), fields(workflow_id = %options.id))]
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        workflow_type: &str,
        input: Value,
    ) -> Result<RunHandle, EngineError> {
        if options.task_queue != self.inner.task_queue {
            return Err(EngineError::UnknownTaskQueue(options.task_queue));
        }

        let workflow = self.inner.registry.create(workflow_type, input.clone())?;
        let (tx, rx) = watch::channel(None);

        let handle = {
            let mut runs = self.inner.runs.write();
            let existing = runs.entry(options.id.clone()).or_default();

            if let Some(latest) = existing.last() {
                let handle = RunHandle {
                    workflow_id: options.id.clone(),
                    run_id: latest.run_id,
                };

                if !latest.status.is_closed() {
                    match options.id_conflict_policy {
                        IdConflictPolicy::UseExisting => {
                            info!(
                                workflow_id = %handle.workflow_id,
                                run_id = %handle.run_id,
                                "attached to running workflow"
                            );
                            return Ok(handle);
                        }
                        IdConflictPolicy::Fail => {
                            warn!(
                                workflow_id = %handle.workflow_id,
                                run_id = %handle.run_id,
                                "start rejected: workflow is already running"
                            );
                            return Err(EngineError::Conflict {
                                workflow_id: handle.workflow_id,
                                run_id: handle.run_id,
                            });
                        }
                    }
                }

                if options.id_reuse_policy == IdReusePolicy::RejectDuplicate {
                    warn!(
                        workflow_id = %handle.workflow_id,
                        run_id = %handle.run_id,
                        status = %latest.status,
                        "start rejected: workflow id was already used"
                    );
                    return Err(EngineError::Conflict {
                        workflow_id: handle.workflow_id,
                        run_id: handle.run_id,
                    });
                }
            }

            let run_id = Uuid::now_v7();
            existing.push(RunRecord {
                run_id,
                workflow_type: workflow_type.to_string(),
                task_queue: options.task_queue.clone(),
                status: RunStatus::Running,
                history: vec![WorkflowEvent::WorkflowStarted { input }],
                started_at: Utc::now(),
                closed_at: None,
                outcome: rx,
            });

            RunHandle {
                workflow_id: options.id.clone(),
                run_id,
            }
        };

        info!(
            workflow_id = %handle.workflow_id,
            run_id = %handle.run_id,
            workflow_type,
            "workflow started"
        );

        let span = info_span!(
            "workflow_run",
            workflow_id = %handle.workflow_id,
            run_id = %handle.run_id,
            workflow_type,
        );
        let inner = Arc::clone(&self.inner);
        let run = handle.clone();
        tokio::spawn(
            async move { inner.drive(run, workflow, options.run_timeout, tx).await }
                .instrument(span),
        );

        Ok(handle)
    }

    #[instrument(skip(self))]
    async fn describe_run(&self, workflow_id: &str) -> Result<RunDescription, EngineError> {
        let runs = self.inner.runs.read();
        let record = runs
            .get(workflow_id)
            .and_then(|runs| runs.last())
            .ok_or_else(|| EngineError::RunNotFound(workflow_id.to_string()))?;

        Ok(RunDescription {
            workflow_id: workflow_id.to_string(),
            run_id: record.run_id,
            workflow_type: record.workflow_type.clone(),
            task_queue: record.task_queue.clone(),
            status: record.status,
            history_length: record.history.len(),
            started_at: record.started_at,
            closed_at: record.closed_at,
        })
    }

    #[instrument(skip(self, handle), fields(workflow_id = %handle.workflow_id, run_id = %handle.run_id))]
    async fn await_run(&self, handle: &RunHandle) -> Result<RunOutcome, EngineError> {
        let mut outcome = {
            let runs = self.inner.runs.read();
            find_run(&runs, handle)?.outcome.clone()
        };

        let outcome = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| EngineError::RunAbandoned(handle.run_id))?
            .clone();

        outcome.ok_or(EngineError::RunAbandoned(handle.run_id))
    }
}

impl Inner {
    /// Drive a run to its terminal state and publish the outcome
    async fn drive(
        &self,
        handle: RunHandle,
        mut workflow: Box<dyn ErasedWorkflow>,
        run_timeout: Duration,
        tx: watch::Sender<Option<RunOutcome>>,
    ) {
        let executed = tokio::time::timeout(run_timeout, self.execute(&handle, workflow.as_mut())).await;

        let (status, result, error, event) = match executed {
            Ok(Ok(result)) => (
                RunStatus::Completed,
                Some(result.clone()),
                None,
                WorkflowEvent::WorkflowCompleted { result },
            ),
            Ok(Err(error)) => (
                RunStatus::Failed,
                None,
                Some(error.clone()),
                WorkflowEvent::WorkflowFailed { error },
            ),
            Err(_) => (
                RunStatus::TimedOut,
                None,
                Some(
                    WorkflowError::new(format!("workflow run timed out after {run_timeout:?}"))
                        .with_code(RUN_TIMEOUT_ERROR_CODE),
                ),
                WorkflowEvent::WorkflowTimedOut {
                    run_timeout_ms: run_timeout.as_millis() as u64,
                },
            ),
        };

        self.close(&handle, status, event);

        match status {
            RunStatus::Completed => info!("workflow completed"),
            _ => warn!(
                %status,
                error = error.as_ref().map(|e| e.message.as_str()).unwrap_or_default(),
                "workflow closed without success"
            ),
        }

        tx.send_replace(Some(RunOutcome {
            workflow_id: handle.workflow_id,
            run_id: handle.run_id,
            status,
            result,
            error,
        }));
    }

    /// Execute workflow actions in order until one of them ends the run
    async fn execute(
        &self,
        handle: &RunHandle,
        workflow: &mut dyn ErasedWorkflow,
    ) -> Result<Value, WorkflowError> {
        let mut pending: VecDeque<WorkflowAction> = workflow.start().into();

        while let Some(action) = pending.pop_front() {
            match action {
                WorkflowAction::ScheduleActivity {
                    activity_id,
                    activity_type,
                    input,
                    options,
                } => {
                    self.record(
                        handle,
                        WorkflowEvent::ActivityScheduled {
                            activity_id: activity_id.clone(),
                            activity_type: activity_type.clone(),
                            input: input.clone(),
                            options: options.clone(),
                        },
                    );

                    let next = match self
                        .run_activity(handle, &activity_id, &activity_type, input, &options)
                        .await
                    {
                        Ok(result) => {
                            self.record(
                                handle,
                                WorkflowEvent::ActivityCompleted {
                                    activity_id: activity_id.clone(),
                                    result: result.clone(),
                                },
                            );
                            workflow.activity_completed(&activity_id, result)
                        }
                        Err(error) => workflow.activity_failed(&activity_id, &error),
                    };

                    pending.extend(next);
                }
                WorkflowAction::CompleteWorkflow { result } => return Ok(result),
                WorkflowAction::FailWorkflow { error } => return Err(error),
            }
        }

        Err(WorkflowError::new("workflow stopped issuing actions before completing")
            .with_code(STALLED_ERROR_CODE))
    }

    /// Run one activity step under its retry policy and attempt timeout
    ///
    /// Returns the final error once the attempt budget is exhausted or the
    /// error is not retryable.
    async fn run_activity(
        &self,
        handle: &RunHandle,
        activity_id: &str,
        activity_type: &str,
        input: Value,
        options: &ActivityOptions,
    ) -> Result<Value, ActivityError> {
        let policy = &options.retry_policy;
        let mut attempt = 1;

        loop {
            let delay = policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.record(
                handle,
                WorkflowEvent::ActivityStarted {
                    activity_id: activity_id.to_string(),
                    attempt,
                },
            );

            let ctx = ActivityContext::new(
                handle.workflow_id.clone(),
                handle.run_id,
                activity_id,
                attempt,
                policy.max_attempts,
            );

            // Each attempt runs on its own task so a panic fails the attempt
            // instead of unwinding the run.
            let dispatcher = Arc::clone(&self.dispatcher);
            let dispatch_type = activity_type.to_string();
            let attempt_input = input.clone();
            let mut task = tokio::spawn(
                async move { dispatcher.dispatch(&ctx, &dispatch_type, attempt_input).await }
                    .in_current_span(),
            );

            let dispatched = tokio::time::timeout(options.start_to_close_timeout, &mut task).await;

            let error = match dispatched {
                Ok(Ok(Ok(result))) => {
                    debug!(activity_id, activity_type, attempt, "activity completed");
                    return Ok(result);
                }
                Ok(Ok(Err(error))) => error,
                Ok(Err(join_error)) => {
                    ActivityError::non_retryable(format!("activity {activity_type} panicked: {join_error}"))
                        .with_type(PANIC_ERROR_TYPE)
                }
                Err(_) => {
                    task.abort();
                    self.record(
                        handle,
                        WorkflowEvent::ActivityTimedOut {
                            activity_id: activity_id.to_string(),
                            attempt,
                        },
                    );
                    ActivityError::retryable(format!(
                        "activity {activity_type} timed out after {:?}",
                        options.start_to_close_timeout
                    ))
                    .with_type(ATTEMPT_TIMEOUT_ERROR_TYPE)
                }
            };

            let will_retry = policy.should_retry(attempt, &error);
            self.record(
                handle,
                WorkflowEvent::ActivityFailed {
                    activity_id: activity_id.to_string(),
                    error: error.clone(),
                    will_retry,
                },
            );

            if !will_retry {
                warn!(
                    activity_id,
                    activity_type,
                    attempt,
                    error = %error,
                    "activity failed"
                );
                return Err(error);
            }

            debug!(
                activity_id,
                activity_type,
                attempt,
                max_attempts = policy.max_attempts,
                error = %error,
                "activity attempt failed, retrying"
            );
            attempt += 1;
        }
    }

    fn record(&self, handle: &RunHandle, event: WorkflowEvent) {
        let mut runs = self.runs.write();
        if let Some(record) = find_run_mut(&mut runs, handle) {
            record.history.push(event);
        }
    }

    fn close(&self, handle: &RunHandle, status: RunStatus, event: WorkflowEvent) {
        let mut runs = self.runs.write();
        if let Some(record) = find_run_mut(&mut runs, handle) {
            record.history.push(event);
            record.status = status;
            record.closed_at = Some(Utc::now());
        }
    }
}

fn find_run<'a>(
    runs: &'a HashMap<String, Vec<RunRecord>>,
    handle: &RunHandle,
) -> Result<&'a RunRecord, EngineError> {
    runs.get(&handle.workflow_id)
        .and_then(|runs| runs.iter().find(|r| r.run_id == handle.run_id))
        .ok_or_else(|| {
            EngineError::RunNotFound(format!("{} ({})", handle.workflow_id, handle.run_id))
        })
}

fn find_run_mut<'a>(
    runs: &'a mut HashMap<String, Vec<RunRecord>>,
    handle: &RunHandle,
) -> Option<&'a mut RunRecord> {
    runs.get_mut(&handle.workflow_id)
        .and_then(|runs| runs.iter_mut().find(|r| r.run_id == handle.run_id))
}
