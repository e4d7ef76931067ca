//! # Durable Execution Primitives
//!
//! The engine-facing building blocks for deterministic, replayable workflows.
//!
//! ## Model
//!
//! - A [`Workflow`] is a deterministic state machine. It never performs side
//!   effects itself; it reacts to activity results by emitting
//!   [`WorkflowAction`]s.
//! - Activities are externally implemented units of work. An engine invokes
//!   them through an [`ActivityDispatcher`], retrying each step under its
//!   [`ActivityOptions`].
//! - A [`WorkflowEngine`] starts runs under a stable workflow id, enforcing a
//!   [`ConflictPolicy`] against earlier runs with the same id.
//!
//! ```text
//! ┌───────────────────────────────┐      start / describe / await
//! │        WorkflowEngine         │◄──────────────────────────────── clients
//! │ (identity + conflict policy)  │
//! └───────────────┬───────────────┘
//!                 │ drives
//!                 ▼
//! ┌───────────────────────────────┐   ScheduleActivity   ┌────────────────────┐
//! │     Workflow state machine    │─────────────────────►│ ActivityDispatcher │
//! │ (pure decisions over results) │◄─────────────────────│ (side effects)     │
//! └───────────────────────────────┘   result / error     └────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use gram_durable::prelude::*;
//!
//! let mut registry = WorkflowRegistry::new();
//! registry.register::<MyWorkflow>();
//!
//! let engine = InMemoryEngine::new("main", registry, Arc::new(MyActivities));
//! let handle = engine
//!     .start_workflow(StartWorkflowOptions::new("v1:my:key", "main"), MyWorkflow::TYPE, input)
//!     .await?;
//! let outcome = engine.await_run(&handle).await?;
//! ```

pub mod activity;
pub mod engine;
pub mod reliability;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{ActivityContext, ActivityDispatcher, ActivityError};
    pub use crate::engine::{
        replay, ConflictPolicy, EngineError, IdConflictPolicy, IdReusePolicy, InMemoryEngine,
        ReplayError, RunDescription, RunHandle, RunOutcome, RunStatus, StartWorkflowOptions,
        WorkflowEngine, WorkflowRegistry,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::workflow::{
        ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent,
    };
}

// Re-export key types at crate root
pub use activity::{ActivityContext, ActivityDispatcher, ActivityError};
pub use engine::{
    replay, ConflictPolicy, EngineError, IdConflictPolicy, IdReusePolicy, InMemoryEngine,
    ReplayError, RunDescription, RunHandle, RunOutcome, RunStatus, StartWorkflowOptions,
    WorkflowEngine, WorkflowRegistry,
};
pub use reliability::RetryPolicy;
pub use workflow::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
