//! Reliability patterns for activity execution
//!
//! - [`RetryPolicy`] - attempt budget with exponential backoff

mod retry;

pub use retry::RetryPolicy;
