// Custom domain registration
//
// 1. Verify: confirm the domain points at us (60s, 3 attempts)
// 2. Provision: set up ingress for it (180s, single attempt)
//
// A failed step fails the run with the step's context. Nothing needs
// compensating: provisioning only starts once verification succeeded.

use gram_durable::{ActivityError, Workflow, WorkflowAction, WorkflowError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{complete, schedule};
use crate::activities::{CustomDomainIngressAction, CustomDomainIngressArgs, VerifyCustomDomainArgs};
use crate::outcome::ProcedureOutput;
use crate::policy::Step;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRegistrationInput {
    pub org_id: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq)]
enum RegistrationState {
    Init,
    Verifying { pending_activity: String },
    Provisioning { pending_activity: String },
    Completed,
    Failed { error: WorkflowError },
}

#[derive(Debug)]
pub struct DomainRegistrationWorkflow {
    input: DomainRegistrationInput,
    state: RegistrationState,
    activity_seq: u32,
}

impl DomainRegistrationWorkflow {
    fn next_activity_id(&mut self, prefix: &str) -> String {
        self.activity_seq += 1;
        format!("{}-{}", prefix, self.activity_seq)
    }

    fn transition_to_verify(&mut self) -> Vec<WorkflowAction> {
        let activity_id = self.next_activity_id("verify");
        self.state = RegistrationState::Verifying {
            pending_activity: activity_id.clone(),
        };

        vec![schedule(
            activity_id,
            Step::VerifyCustomDomain,
            VerifyCustomDomainArgs {
                org_id: self.input.org_id.clone(),
                domain: self.input.domain.clone(),
            },
        )]
    }

    fn transition_to_provision(&mut self) -> Vec<WorkflowAction> {
        let activity_id = self.next_activity_id("ingress");
        self.state = RegistrationState::Provisioning {
            pending_activity: activity_id.clone(),
        };

        vec![schedule(
            activity_id,
            Step::CustomDomainIngress,
            CustomDomainIngressArgs {
                org_id: self.input.org_id.clone(),
                domain: self.input.domain.clone(),
                action: CustomDomainIngressAction::Setup,
            },
        )]
    }

    fn fail(&mut self, error: WorkflowError) -> Vec<WorkflowAction> {
        self.state = RegistrationState::Failed {
            error: error.clone(),
        };
        vec![WorkflowAction::fail(error)]
    }
}

impl Workflow for DomainRegistrationWorkflow {
    const TYPE: &'static str = "custom_domain_registration";
    type Input = DomainRegistrationInput;
    type Output = ProcedureOutput;

    fn new(input: Self::Input) -> Self {
        Self {
            input,
            state: RegistrationState::Init,
            activity_seq: 0,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        self.transition_to_verify()
    }

    fn on_activity_completed(&mut self, activity_id: &str, _result: Value) -> Vec<WorkflowAction> {
        let state = self.state.clone();

        match state {
            RegistrationState::Verifying { pending_activity } if pending_activity == activity_id => {
                self.transition_to_provision()
            }
            RegistrationState::Provisioning { pending_activity }
                if pending_activity == activity_id =>
            {
                self.state = RegistrationState::Completed;
                vec![complete(ProcedureOutput::success())]
            }
            _ => vec![],
        }
    }

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        let state = self.state.clone();

        match state {
            RegistrationState::Verifying { pending_activity } if pending_activity == activity_id => {
                self.fail(WorkflowError::from_activity("failed to verify custom domain", error))
            }
            RegistrationState::Provisioning { pending_activity }
                if pending_activity == activity_id =>
            {
                self.fail(WorkflowError::from_activity(
                    "failed to create custom domain ingress",
                    error,
                ))
            }
            _ => vec![],
        }
    }

    fn is_completed(&self) -> bool {
        matches!(
            self.state,
            RegistrationState::Completed | RegistrationState::Failed { .. }
        )
    }

    fn result(&self) -> Option<Self::Output> {
        match self.state {
            RegistrationState::Completed => Some(ProcedureOutput::success()),
            _ => None,
        }
    }

    fn error(&self) -> Option<WorkflowError> {
        match &self.state {
            RegistrationState::Failed { error } => Some(error.clone()),
            _ => None,
        }
    }
}
