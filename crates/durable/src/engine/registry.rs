//! Workflow lookup by type name
//!
//! Runs are started and replayed by workflow type. The registry maps each
//! type to a constructor that decodes the JSON input and returns the
//! workflow behind the object-safe [`ErasedWorkflow`] interface.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::activity::ActivityError;
use crate::workflow::{Workflow, WorkflowAction};

/// The part of [`Workflow`] an engine needs, without the associated types
///
/// Implemented for every `Workflow`.
pub trait ErasedWorkflow: Send + Sync {
    fn workflow_type(&self) -> &'static str;

    fn start(&mut self) -> Vec<WorkflowAction>;

    fn activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction>;

    /// Only called once the activity's retry budget is spent
    fn activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction>;

    fn is_closed(&self) -> bool;
}

impl<W: Workflow> ErasedWorkflow for W {
    fn workflow_type(&self) -> &'static str {
        W::TYPE
    }

    fn start(&mut self) -> Vec<WorkflowAction> {
        Workflow::on_start(self)
    }

    fn activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        Workflow::on_activity_completed(self, activity_id, result)
    }

    fn activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        Workflow::on_activity_failed(self, activity_id, error)
    }

    fn is_closed(&self) -> bool {
        Workflow::is_completed(self)
    }
}

/// Builds a workflow from its JSON input
pub type WorkflowFactory = fn(Value) -> Result<Box<dyn ErasedWorkflow>, serde_json::Error>;

fn build<W: Workflow>(input: Value) -> Result<Box<dyn ErasedWorkflow>, serde_json::Error> {
    let input: W::Input = serde_json::from_value(input)?;
    Ok(Box::new(W::new(input)))
}

/// Workflow types known to an engine
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    factories: BTreeMap<&'static str, WorkflowFactory>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `W` startable under `W::TYPE`
    ///
    /// Registering the same type twice keeps the latest registration.
    pub fn register<W: Workflow>(&mut self) -> &mut Self {
        self.factories.insert(W::TYPE, build::<W>);
        self
    }

    pub fn contains(&self, workflow_type: &str) -> bool {
        self.factories.contains_key(workflow_type)
    }

    /// Instantiate `workflow_type` from its JSON input
    pub fn create(
        &self,
        workflow_type: &str,
        input: Value,
    ) -> Result<Box<dyn ErasedWorkflow>, RegistryError> {
        let factory = self
            .factories
            .get(workflow_type)
            .ok_or_else(|| RegistryError::UnknownWorkflowType(workflow_type.to_string()))?;

        factory(input).map_err(|source| RegistryError::InvalidInput {
            workflow_type: workflow_type.to_string(),
            source,
        })
    }

    /// Registered types in sorted order
    pub fn workflow_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    #[error("invalid input for {workflow_type}: {source}")]
    InvalidInput {
        workflow_type: String,
        #[source]
        source: serde_json::Error,
    },
}
