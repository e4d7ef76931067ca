//! Workflow engine
//!
//! [`WorkflowEngine`] is the client-facing capability set. [`InMemoryEngine`]
//! implements it in-process, driving registered workflows against an
//! [`ActivityDispatcher`](crate::activity::ActivityDispatcher) and recording
//! every step in a replayable history.

mod client;
mod memory;
mod registry;
mod replay;

pub use client::{
    ConflictPolicy, EngineError, IdConflictPolicy, IdReusePolicy, RunDescription, RunHandle,
    RunOutcome, RunStatus, StartWorkflowOptions, WorkflowEngine, DEFAULT_RUN_TIMEOUT,
};
pub use memory::InMemoryEngine;
pub use registry::{ErasedWorkflow, RegistryError, WorkflowFactory, WorkflowRegistry};
pub use replay::{replay, ReplayError, ReplayOutcome, STALLED_ERROR_CODE};
