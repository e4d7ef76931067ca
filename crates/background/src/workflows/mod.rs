// Workflow procedures
//
// Each procedure is a deterministic state machine over activity results.
// All I/O happens in activities; the procedures only decide what to call
// next.

mod domain_registration;
mod event_command;

pub use domain_registration::{DomainRegistrationInput, DomainRegistrationWorkflow};
pub use event_command::{format_toolset_list, EventCommandInput, EventCommandWorkflow, APOLOGY_MESSAGE};

use gram_durable::{WorkflowAction, WorkflowError, WorkflowRegistry};
use serde::Serialize;

use crate::outcome::ProcedureOutput;
use crate::policy::Step;

/// Registry with every background procedure
pub fn registry() -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    registry.register::<DomainRegistrationWorkflow>();
    registry.register::<EventCommandWorkflow>();
    registry
}

/// Error code for a procedure whose own payload could not be encoded
const ENCODING_ERROR_CODE: &str = "PAYLOAD_ENCODING";

/// Schedule `step` under its table policy
///
/// A payload that fails to encode fails the run instead of scheduling the
/// step with a null input.
fn schedule(activity_id: String, step: Step, input: impl Serialize) -> WorkflowAction {
    match serde_json::to_value(input) {
        Ok(input) => WorkflowAction::schedule_activity(activity_id, step.activity_type(), input)
            .with_options(step.policy().activity_options()),
        Err(e) => encoding_failed(&format!("{} input", step.activity_type()), e),
    }
}

fn complete(output: ProcedureOutput) -> WorkflowAction {
    match serde_json::to_value(output) {
        Ok(result) => WorkflowAction::complete(result),
        Err(e) => encoding_failed("procedure output", e),
    }
}

fn encoding_failed(what: &str, error: serde_json::Error) -> WorkflowAction {
    WorkflowAction::fail(
        WorkflowError::new(format!("failed to encode {what}: {error}")).with_code(ENCODING_ERROR_CODE),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_schedule_applies_step_policy() {
        let action = schedule("verify-1".to_string(), Step::VerifyCustomDomain, serde_json::json!({}));

        match action {
            WorkflowAction::ScheduleActivity {
                activity_type,
                options,
                ..
            } => {
                assert_eq!(activity_type, Step::VerifyCustomDomain.activity_type());
                assert_eq!(options, Step::VerifyCustomDomain.policy().activity_options());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_unencodable_input_fails_the_run() {
        // JSON object keys must be strings
        let input: BTreeMap<(u8, u8), u8> = BTreeMap::from([((1, 2), 3)]);

        match schedule("chat-2".to_string(), Step::ChatCompletion, input) {
            WorkflowAction::FailWorkflow { error } => {
                assert_eq!(error.code.as_deref(), Some(ENCODING_ERROR_CODE));
                assert!(error.message.starts_with("failed to encode slack_chat_completion input: "));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
