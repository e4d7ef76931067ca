// Gram background procedures
//
// Long-running work that outlives a request, expressed as deterministic
// workflows over gram_durable:
//
// - custom domain registration: verify the domain, then provision ingress
// - Slack event commands: address, classify, complete, reply
//
// Every side effect is an activity behind `BackgroundActivities`. Runs are
// started under a stable identity so repeated requests for the same domain or
// event resolve to the same workflow id.

pub mod activities;
pub mod client;
pub mod config;
pub mod identity;
pub mod outcome;
pub mod policy;
pub mod router;
pub mod slack;
pub mod telemetry;
pub mod workflows;

pub use activities::{ActivityRouter, BackgroundActivities};
pub use client::{BackgroundClient, ClientError};
pub use config::{BackgroundConfig, ConfigError};
pub use identity::{derive_identity, WorkflowIdentity, WorkflowKind};
pub use outcome::{ProcedureOutput, ProcedureStatus, WorkflowResult};
pub use policy::{Step, StepPolicy};
pub use router::{route, ChannelType, EmptyReason, Intent};
pub use slack::SlackEvent;
