// Slack event command
//
// Handles one inbound Slack message:
// 1. FetchContext: load the project and its toolsets
// 2. Route the text against that context; messages not meant for the bot
//    end the run without a reply
// 3. Either post the toolset list or run a chat completion and post its
//    reply
//
// Failures before the final reply are reported in-thread with an apology
// and the run completes as `failed`. A failed reply post is fatal; the
// apology is never retried so errors can't loop.

use std::fmt::Write as _;

use gram_durable::{ActivityError, Workflow, WorkflowAction, WorkflowError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{complete, schedule};
use crate::activities::{ChatCompletionArgs, PostMessageArgs, ProjectContext};
use crate::outcome::ProcedureOutput;
use crate::policy::Step;
use crate::router::{self, Intent};
use crate::slack::SlackEvent;

/// Posted in-thread when a request can't be completed
pub const APOLOGY_MESSAGE: &str = "*Error:* \n Apologies I am unable to complete your request.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCommandInput {
    pub event: SlackEvent,
}

#[derive(Debug, Clone, PartialEq)]
enum EventState {
    Init,
    FetchingContext {
        pending_activity: String,
    },
    Completing {
        pending_activity: String,
    },
    Replying {
        pending_activity: String,
        detail: String,
    },
    Apologizing {
        pending_activity: String,
        cause: WorkflowError,
    },
    Completed {
        output: ProcedureOutput,
    },
    Failed {
        error: WorkflowError,
    },
}

#[derive(Debug)]
pub struct EventCommandWorkflow {
    event: SlackEvent,
    state: EventState,
    activity_seq: u32,
}

impl EventCommandWorkflow {
    fn next_activity_id(&mut self, prefix: &str) -> String {
        self.activity_seq += 1;
        format!("{}-{}", prefix, self.activity_seq)
    }

    // =========================================================================
    // State Transitions
    // =========================================================================

    fn transition_to_fetch_context(&mut self) -> Vec<WorkflowAction> {
        let activity_id = self.next_activity_id("context");
        self.state = EventState::FetchingContext {
            pending_activity: activity_id.clone(),
        };

        vec![schedule(activity_id, Step::GetProjectContext, &self.event)]
    }

    fn transition_to_completion(
        &mut self,
        prompt: String,
        toolset_slug: Option<String>,
    ) -> Vec<WorkflowAction> {
        let activity_id = self.next_activity_id("chat");
        self.state = EventState::Completing {
            pending_activity: activity_id.clone(),
        };

        vec![schedule(
            activity_id,
            Step::ChatCompletion,
            ChatCompletionArgs {
                event: self.event.clone(),
                prompt,
                toolset_slug,
            },
        )]
    }

    fn transition_to_reply(&mut self, message: String, detail: &str) -> Vec<WorkflowAction> {
        let activity_id = self.next_activity_id("reply");
        self.state = EventState::Replying {
            pending_activity: activity_id.clone(),
            detail: detail.to_string(),
        };

        vec![schedule(
            activity_id,
            Step::PostMessage,
            PostMessageArgs::reply_to(&self.event, message),
        )]
    }

    fn transition_to_apology(&mut self, cause: WorkflowError) -> Vec<WorkflowAction> {
        let activity_id = self.next_activity_id("apology");
        self.state = EventState::Apologizing {
            pending_activity: activity_id.clone(),
            cause,
        };

        vec![schedule(
            activity_id,
            Step::PostMessage,
            PostMessageArgs::reply_to(&self.event, APOLOGY_MESSAGE),
        )]
    }

    fn finish(&mut self, output: ProcedureOutput) -> Vec<WorkflowAction> {
        self.state = EventState::Completed {
            output: output.clone(),
        };
        vec![complete(output)]
    }

    fn fail(&mut self, error: WorkflowError) -> Vec<WorkflowAction> {
        self.state = EventState::Failed {
            error: error.clone(),
        };
        vec![WorkflowAction::fail(error)]
    }

    fn ignore(&mut self, reason: router::EmptyReason) -> Vec<WorkflowAction> {
        self.finish(ProcedureOutput::success_with(format!("ignored: {reason}")))
    }

    // =========================================================================
    // Result Handlers
    // =========================================================================

    fn handle_context(&mut self, result: Value) -> Vec<WorkflowAction> {
        let context: ProjectContext = match serde_json::from_value(result) {
            Ok(context) => context,
            Err(e) => {
                return self.transition_to_apology(WorkflowError::new(format!(
                    "failed to get slack project context: {e}"
                )))
            }
        };

        let slugs = context.toolset_slugs();
        let intent = router::route(
            &self.event.event.text,
            self.event.bot_user_id(),
            self.event.channel_type(),
            context.default_toolset_slug.as_deref(),
            slugs.as_slice(),
        );

        match intent {
            Intent::Empty { reason } => self.ignore(reason),
            Intent::ListToolsets => {
                self.transition_to_reply(format_toolset_list(&context), "listed toolsets")
            }
            Intent::RunPrompt {
                toolset_slug,
                prompt,
            } => self.transition_to_completion(prompt, toolset_slug),
        }
    }

    fn handle_completion(&mut self, result: Value) -> Vec<WorkflowAction> {
        match serde_json::from_value::<String>(result) {
            Ok(reply) => self.transition_to_reply(reply, "replied"),
            Err(e) => self.transition_to_apology(WorkflowError::new(format!(
                "chat completion returned no text: {e}"
            ))),
        }
    }
}

impl Workflow for EventCommandWorkflow {
    const TYPE: &'static str = "slack_event";
    type Input = EventCommandInput;
    type Output = ProcedureOutput;

    fn new(input: Self::Input) -> Self {
        Self {
            event: input.event,
            state: EventState::Init,
            activity_seq: 0,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        self.transition_to_fetch_context()
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        let state = self.state.clone();

        match state {
            EventState::FetchingContext { pending_activity } if pending_activity == activity_id => {
                self.handle_context(result)
            }

            EventState::Completing { pending_activity } if pending_activity == activity_id => {
                self.handle_completion(result)
            }

            EventState::Replying {
                pending_activity,
                detail,
            } if pending_activity == activity_id => {
                self.finish(ProcedureOutput::success_with(detail))
            }

            EventState::Apologizing {
                pending_activity,
                cause,
            } if pending_activity == activity_id => {
                self.finish(ProcedureOutput::failed(cause.message))
            }

            _ => vec![],
        }
    }

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        let state = self.state.clone();

        match state {
            EventState::FetchingContext { pending_activity } if pending_activity == activity_id => self
                .transition_to_apology(
                WorkflowError::from_activity("failed to get slack project context", error),
            ),

            EventState::Completing { pending_activity } if pending_activity == activity_id => self
                .transition_to_apology(WorkflowError::from_activity(
                    "chat completion failed",
                    error,
                )),

            EventState::Replying {
                pending_activity, ..
            } if pending_activity == activity_id => {
                self.fail(WorkflowError::from_activity("failed to post slack response", error))
            }

            EventState::Apologizing {
                pending_activity,
                cause,
            } if pending_activity == activity_id => {
                let mut fatal = WorkflowError::from_activity("failed to post error reply", error);
                fatal.message = format!("{} (while reporting: {})", fatal.message, cause.message);
                self.fail(fatal)
            }

            _ => vec![],
        }
    }

    fn is_completed(&self) -> bool {
        matches!(
            self.state,
            EventState::Completed { .. } | EventState::Failed { .. }
        )
    }

    fn result(&self) -> Option<Self::Output> {
        match &self.state {
            EventState::Completed { output } => Some(output.clone()),
            _ => None,
        }
    }

    fn error(&self) -> Option<WorkflowError> {
        match &self.state {
            EventState::Failed { error } => Some(error.clone()),
            _ => None,
        }
    }
}

/// Render the reply to a `list` command
pub fn format_toolset_list(context: &ProjectContext) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "*Project:* `{}`", context.project_slug);
    if let Some(default) = &context.default_toolset_slug {
        let _ = writeln!(out, "*Default Toolset:* `{default}`");
    }
    out.push_str("\n*Toolsets:*\n");

    for toolset in &context.toolsets {
        let _ = writeln!(out, "• *`{}`* ({} tools)", toolset.slug, toolset.number_of_tools);
        if let Some(description) = toolset.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "  _{description}_");
        }
        let _ = writeln!(out, "  created at: `{}`", toolset.created_at.to_rfc3339());
        let _ = writeln!(out, "  updated at: `{}`\n", toolset.updated_at.to_rfc3339());
    }

    out
}
