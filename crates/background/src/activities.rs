// Activity contracts
//
// The typed inputs and outputs of every side-effecting step, and the trait a
// host implements to provide them. `ActivityRouter` adapts an implementation
// to the engine's JSON dispatch seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gram_durable::{ActivityContext, ActivityDispatcher, ActivityError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::policy::Step;
use crate::slack::SlackEvent;

// ============================================================================
// Custom domains
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCustomDomainArgs {
    pub org_id: String,
    pub domain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomDomainIngressAction {
    Setup,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDomainIngressArgs {
    pub org_id: String,
    pub domain: String,
    pub action: CustomDomainIngressAction,
}

// ============================================================================
// Slack
// ============================================================================

/// Project a Slack workspace is connected to, with its toolsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_slug: String,
    #[serde(default)]
    pub default_toolset_slug: Option<String>,
    #[serde(default)]
    pub toolsets: Vec<ToolsetSummary>,
}

impl ProjectContext {
    pub fn toolset_slugs(&self) -> Vec<&str> {
        self.toolsets.iter().map(|t| t.slug.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsetSummary {
    pub slug: String,
    pub number_of_tools: u32,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionArgs {
    pub event: SlackEvent,
    pub prompt: String,
    pub toolset_slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMessageArgs {
    /// Workspace whose installation posts the message
    pub team_id: String,
    pub channel_id: String,
    pub message: String,
    pub thread_ts: Option<String>,
}

impl PostMessageArgs {
    /// A reply threaded under the event's message
    pub fn reply_to(event: &SlackEvent, message: impl Into<String>) -> Self {
        Self {
            team_id: event.team_id.clone(),
            channel_id: event.event.channel.clone(),
            message: message.into(),
            thread_ts: Some(event.reply_thread().to_string()),
        }
    }
}

// ============================================================================
// Activity trait
// ============================================================================

/// Side-effecting operations the background procedures depend on
///
/// Return `ActivityError::retryable` for transient failures. Whether a retry
/// actually happens is decided by the step's policy, not by the
/// implementation.
#[async_trait]
pub trait BackgroundActivities: Send + Sync + 'static {
    async fn verify_custom_domain(
        &self,
        ctx: &ActivityContext,
        args: VerifyCustomDomainArgs,
    ) -> Result<(), ActivityError>;

    async fn custom_domain_ingress(
        &self,
        ctx: &ActivityContext,
        args: CustomDomainIngressArgs,
    ) -> Result<(), ActivityError>;

    async fn get_project_context(
        &self,
        ctx: &ActivityContext,
        event: SlackEvent,
    ) -> Result<ProjectContext, ActivityError>;

    /// Returns the reply text
    async fn chat_completion(
        &self,
        ctx: &ActivityContext,
        args: ChatCompletionArgs,
    ) -> Result<String, ActivityError>;

    async fn post_message(
        &self,
        ctx: &ActivityContext,
        args: PostMessageArgs,
    ) -> Result<(), ActivityError>;
}

/// Dispatches engine activity calls to a [`BackgroundActivities`] implementation
pub struct ActivityRouter<A> {
    activities: A,
}

impl<A: BackgroundActivities> ActivityRouter<A> {
    pub fn new(activities: A) -> Self {
        Self { activities }
    }

    pub fn activities(&self) -> &A {
        &self.activities
    }
}

#[async_trait]
impl<A: BackgroundActivities> ActivityDispatcher for ActivityRouter<A> {
    async fn dispatch(
        &self,
        ctx: &ActivityContext,
        activity_type: &str,
        input: Value,
    ) -> Result<Value, ActivityError> {
        let step = Step::from_activity_type(activity_type).ok_or_else(|| {
            ActivityError::non_retryable(format!("unknown activity type: {activity_type}"))
                .with_type("UNKNOWN_ACTIVITY")
        })?;

        debug!(
            workflow_id = %ctx.workflow_id,
            activity_id = %ctx.activity_id,
            activity_type,
            attempt = ctx.attempt,
            "dispatching activity"
        );

        let a = &self.activities;
        match step {
            Step::VerifyCustomDomain => encode(a.verify_custom_domain(ctx, decode(input)?).await?),
            Step::CustomDomainIngress => {
                encode(a.custom_domain_ingress(ctx, decode(input)?).await?)
            }
            Step::GetProjectContext => encode(a.get_project_context(ctx, decode(input)?).await?),
            Step::ChatCompletion => encode(a.chat_completion(ctx, decode(input)?).await?),
            Step::PostMessage => encode(a.post_message(ctx, decode(input)?).await?),
        }
    }
}

fn decode<T: DeserializeOwned>(input: Value) -> Result<T, ActivityError> {
    Ok(serde_json::from_value(input)?)
}

fn encode<T: Serialize>(output: T) -> Result<Value, ActivityError> {
    Ok(serde_json::to_value(output)?)
}
