// Workflow client
//
// Derives the identity for a request, picks the kind's conflict policy and
// submits the start to the engine. Engine errors surface unmodified and
// starts are never retried here; retries belong to individual steps.

use std::sync::Arc;
use std::time::Duration;

use gram_durable::{
    ConflictPolicy, EngineError, RunDescription, RunHandle, StartWorkflowOptions, Workflow,
    WorkflowEngine,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::config::BackgroundConfig;
use crate::identity::{
    custom_domain_registration_identity, derive_identity, slack_event_identity, WorkflowKind,
};
use crate::outcome::{OutcomeError, WorkflowResult};
use crate::slack::SlackEvent;
use crate::workflows::{
    DomainRegistrationInput, DomainRegistrationWorkflow, EventCommandInput, EventCommandWorkflow,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to encode workflow input: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Outcome(#[from] OutcomeError),
}

impl ClientError {
    /// Whether the start was rejected by the id's conflict policy
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Engine(EngineError::Conflict { .. }))
    }
}

impl WorkflowKind {
    /// Registered workflow type started for this kind
    pub fn workflow_type(self) -> &'static str {
        match self {
            Self::CustomDomainRegistration => DomainRegistrationWorkflow::TYPE,
            Self::SlackEvent => EventCommandWorkflow::TYPE,
        }
    }

    /// Re-registration simply re-runs; an event must never be handled twice
    pub fn conflict_policy(self) -> ConflictPolicy {
        match self {
            Self::CustomDomainRegistration => ConflictPolicy::AllowDuplicate,
            Self::SlackEvent => ConflictPolicy::RejectDuplicate,
        }
    }
}

/// Starts and inspects background workflows
#[derive(Clone)]
pub struct BackgroundClient {
    engine: Arc<dyn WorkflowEngine>,
    config: BackgroundConfig,
}

impl BackgroundClient {
    pub fn new(engine: Arc<dyn WorkflowEngine>, config: BackgroundConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }

    /// Start a run of `kind` under the identity derived from `keys`
    #[instrument(skip(self, input), fields(workflow_id = tracing::field::Empty))]
    pub async fn start(
        &self,
        kind: WorkflowKind,
        keys: &[&str],
        policy: ConflictPolicy,
        run_timeout: Duration,
        input: Value,
    ) -> Result<RunHandle, ClientError> {
        let identity = derive_identity(kind, keys);
        tracing::Span::current().record("workflow_id", identity.as_str());

        let options = StartWorkflowOptions::new(identity, self.config.task_queue.clone())
            .with_conflict_policy(policy)
            .with_run_timeout(run_timeout);

        let handle = self
            .engine
            .start_workflow(options, kind.workflow_type(), input)
            .await?;

        info!(run_id = %handle.run_id, "workflow run started");
        Ok(handle)
    }

    /// Verify a custom domain and provision its ingress
    #[instrument(skip(self))]
    pub async fn execute_custom_domain_registration(
        &self,
        org_id: &str,
        domain: &str,
    ) -> Result<RunHandle, ClientError> {
        let kind = WorkflowKind::CustomDomainRegistration;
        let input = serde_json::to_value(DomainRegistrationInput {
            org_id: org_id.to_string(),
            domain: domain.to_string(),
        })?;

        self.start(
            kind,
            &[org_id, domain],
            kind.conflict_policy(),
            self.config.run_timeout,
            input,
        )
        .await
    }

    /// Status of the latest registration run for a domain
    #[instrument(skip(self))]
    pub async fn get_custom_domain_registration_info(
        &self,
        org_id: &str,
        domain: &str,
    ) -> Result<RunDescription, ClientError> {
        let identity = custom_domain_registration_identity(org_id, domain);
        Ok(self.engine.describe_run(identity.as_str()).await?)
    }

    /// Handle an inbound Slack event
    #[instrument(skip(self, event), fields(event_id = %event.event_id, team_id = %event.team_id))]
    pub async fn execute_event_command(&self, event: SlackEvent) -> Result<RunHandle, ClientError> {
        let kind = WorkflowKind::SlackEvent;
        let event_id = event.event_id.clone();
        let input = serde_json::to_value(EventCommandInput { event })?;

        self.start(
            kind,
            &[event_id.as_str()],
            kind.conflict_policy(),
            self.config.run_timeout,
            input,
        )
        .await
    }

    /// Status of the run handling a Slack event
    pub async fn get_event_command_info(&self, event_id: &str) -> Result<RunDescription, ClientError> {
        let identity = slack_event_identity(event_id);
        Ok(self.engine.describe_run(identity.as_str()).await?)
    }

    /// Wait for a run to close and classify its outcome
    pub async fn await_result(&self, handle: &RunHandle) -> Result<WorkflowResult, ClientError> {
        let outcome = self.engine.await_run(handle).await?;
        Ok(WorkflowResult::try_from(outcome)?)
    }
}

impl std::fmt::Debug for BackgroundClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundClient")
            .field("config", &self.config)
            .finish()
    }
}
