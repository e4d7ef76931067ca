//! Activity execution context

use uuid::Uuid;

/// Context provided to activities during execution
///
/// Identifies the run and step an attempt belongs to, so implementations
/// can log with correlation ids or derive idempotency keys from
/// `(workflow_id, activity_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityContext {
    /// Workflow id (stable identity) of the owning run
    pub workflow_id: String,

    /// Engine-assigned id of the owning run
    pub run_id: Uuid,

    /// Activity ID within the run
    pub activity_id: String,

    /// Current attempt number (1-based)
    pub attempt: u32,

    /// Maximum attempts allowed
    pub max_attempts: u32,
}

impl ActivityContext {
    /// Create a new activity context
    pub fn new(
        workflow_id: impl Into<String>,
        run_id: Uuid,
        activity_id: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id,
            activity_id: activity_id.into(),
            attempt,
            max_attempts,
        }
    }

    /// Whether this is the last attempt the retry budget allows
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
