// Step policy table
//
// Every activity step has a fixed attempt timeout and attempt budget.
// Ingress provisioning is single-attempt: it is not safe to replay blindly
// against a partially applied setup.

use std::time::Duration;

use gram_durable::{ActivityOptions, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Activity steps issued by the workflow procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    VerifyCustomDomain,
    CustomDomainIngress,
    GetProjectContext,
    ChatCompletion,
    PostMessage,
}

/// Start-to-close timeout and attempt budget for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl StepPolicy {
    pub const fn new(timeout_secs: u64, max_attempts: u32) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_attempts,
        }
    }

    /// Engine options enforcing this policy
    pub fn activity_options(&self) -> ActivityOptions {
        ActivityOptions::default()
            .with_start_to_close_timeout(self.timeout)
            .with_retry(RetryPolicy::default().with_max_attempts(self.max_attempts))
    }
}

impl From<StepPolicy> for ActivityOptions {
    fn from(policy: StepPolicy) -> Self {
        policy.activity_options()
    }
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::VerifyCustomDomain,
        Step::CustomDomainIngress,
        Step::GetProjectContext,
        Step::ChatCompletion,
        Step::PostMessage,
    ];

    /// Activity type name the engine dispatches on
    pub fn activity_type(self) -> &'static str {
        match self {
            Self::VerifyCustomDomain => "verify_custom_domain",
            Self::CustomDomainIngress => "custom_domain_ingress",
            Self::GetProjectContext => "get_slack_project_context",
            Self::ChatCompletion => "slack_chat_completion",
            Self::PostMessage => "post_slack_message",
        }
    }

    pub fn from_activity_type(activity_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|step| step.activity_type() == activity_type)
    }

    pub fn policy(self) -> StepPolicy {
        match self {
            Self::VerifyCustomDomain => StepPolicy::new(60, 3),
            Self::CustomDomainIngress => StepPolicy::new(180, 1),
            Self::GetProjectContext | Self::ChatCompletion | Self::PostMessage => {
                StepPolicy::new(300, 1)
            }
        }
    }
}
