//! Workflow abstractions and types
//!
//! This module contains the core workflow primitives:
//! - [`Workflow`] trait for defining deterministic state machines
//! - [`WorkflowAction`] enum for the commands a workflow issues
//! - [`WorkflowEvent`] enum for recorded run history

pub(crate) mod action;
mod definition;
mod event;

pub use action::{ActivityOptions, WorkflowAction};
pub use definition::{Workflow, WorkflowError};
pub use event::WorkflowEvent;
