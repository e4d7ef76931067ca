//! Activity error and dispatch seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ActivityContext;

/// Failure of a single activity attempt
///
/// Recorded in history, so it crosses the engine boundary as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    pub message: String,

    /// Becomes the workflow error code when the step is exhausted
    pub error_type: Option<String>,

    /// A non-retryable error ends the step even with attempts left
    pub retryable: bool,

    pub details: Option<serde_json::Value>,
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: true,
            details: None,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: false,
            details: None,
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<serde_json::Error> for ActivityError {
    fn from(err: serde_json::Error) -> Self {
        Self::non_retryable(err.to_string()).with_type("SERIALIZATION")
    }
}

/// Entry point from an engine into activity implementations
///
/// An engine hands every attempt of every scheduled activity to its
/// dispatcher, keyed by the activity type the workflow named. Dispatchers
/// are constructed by the host process and passed to the engine explicitly,
/// so tests can substitute fakes.
///
/// # Example
///
/// ```ignore
/// struct EchoActivities;
///
/// #[async_trait]
/// impl ActivityDispatcher for EchoActivities {
///     async fn dispatch(
///         &self,
///         _ctx: &ActivityContext,
///         activity_type: &str,
///         input: serde_json::Value,
///     ) -> Result<serde_json::Value, ActivityError> {
///         match activity_type {
///             "echo" => Ok(input),
///             other => Err(ActivityError::non_retryable(format!("unknown activity: {other}"))),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ActivityDispatcher: Send + Sync + 'static {
    /// Execute one attempt of an activity
    ///
    /// # Errors
    ///
    /// Return `ActivityError::retryable()` for transient failures that should
    /// be retried, `ActivityError::non_retryable()` for permanent ones.
    async fn dispatch(
        &self,
        ctx: &ActivityContext,
        activity_type: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ActivityError>;
}
