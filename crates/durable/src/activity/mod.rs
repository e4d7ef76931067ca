//! Activity abstractions
//!
//! Activities are units of work implemented outside the workflow. They:
//! - Perform every side effect and every non-deterministic read
//! - May fail and be retried according to the step's retry policy
//! - Are reached by the engine through an [`ActivityDispatcher`]

mod context;
mod definition;

pub use context::ActivityContext;
pub use definition::{ActivityDispatcher, ActivityError};
