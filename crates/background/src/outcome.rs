// Procedure results
//
// Procedures complete with a `ProcedureOutput`. A `failed` status on a
// completed run means the failure was handled and reported to the user.
// `WorkflowResult` folds that together with the run's status.

use gram_durable::{RunOutcome, RunStatus, WorkflowError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureStatus {
    Success,
    Failed,
}

/// Result payload every procedure completes with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureOutput {
    pub status: ProcedureStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProcedureOutput {
    pub fn success() -> Self {
        Self {
            status: ProcedureStatus::Success,
            detail: None,
        }
    }

    pub fn success_with(detail: impl Into<String>) -> Self {
        Self {
            status: ProcedureStatus::Success,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: ProcedureStatus::Failed,
            detail: Some(detail.into()),
        }
    }
}

/// Outcome of a procedure as seen by its caller
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowResult {
    /// The procedure did what was asked
    Success(ProcedureOutput),
    /// A step failed and the failure was reported to the user
    Recovered(ProcedureOutput),
    /// The run failed or timed out
    Fatal(WorkflowError),
}

#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("run {0} has not closed")]
    NotClosed(Uuid),

    #[error("malformed procedure output: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl TryFrom<RunOutcome> for WorkflowResult {
    type Error = OutcomeError;

    fn try_from(outcome: RunOutcome) -> Result<Self, Self::Error> {
        match outcome.status {
            RunStatus::Running => Err(OutcomeError::NotClosed(outcome.run_id)),
            RunStatus::Completed => {
                let output: ProcedureOutput =
                    serde_json::from_value(outcome.result.unwrap_or_default())?;
                Ok(match output.status {
                    ProcedureStatus::Success => Self::Success(output),
                    ProcedureStatus::Failed => Self::Recovered(output),
                })
            }
            RunStatus::Failed | RunStatus::TimedOut => Ok(Self::Fatal(outcome.error.unwrap_or_else(
                || WorkflowError::new(format!("run closed as {} without an error", outcome.status)),
            ))),
        }
    }
}
