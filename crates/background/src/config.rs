// Background configuration
//
// Read once at startup from the environment (after `.env` is loaded).

use std::time::Duration;

/// Task queue the background workers poll
pub const DEFAULT_TASK_QUEUE: &str = "main";

/// Upper bound on any single background run
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Configuration for starting background workflows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundConfig {
    /// Task queue runs are submitted to
    pub task_queue: String,
    /// Overall timeout applied to every run
    pub run_timeout: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl BackgroundConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `GRAM_TASK_QUEUE`: Task queue name (default: "main")
    /// - `GRAM_WORKFLOW_RUN_TIMEOUT_SECS`: Run timeout in seconds (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(task_queue) = lookup("GRAM_TASK_QUEUE") {
            let task_queue = task_queue.trim();
            if task_queue.is_empty() {
                return Err(ConfigError::InvalidValue {
                    name: "GRAM_TASK_QUEUE",
                    value: task_queue.to_string(),
                    reason: "must not be empty",
                });
            }
            config.task_queue = task_queue.to_string();
        }

        if let Some(raw) = lookup("GRAM_WORKFLOW_RUN_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "GRAM_WORKFLOW_RUN_TIMEOUT_SECS",
                value: raw.clone(),
                reason: "expected a whole number of seconds",
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "GRAM_WORKFLOW_RUN_TIMEOUT_SECS",
                    value: raw,
                    reason: "must be greater than zero",
                });
            }
            config.run_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BackgroundConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BackgroundConfig::default());
        assert_eq!(config.task_queue, "main");
        assert_eq!(config.run_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = BackgroundConfig::from_lookup(lookup(&[
            ("GRAM_TASK_QUEUE", "background"),
            ("GRAM_WORKFLOW_RUN_TIMEOUT_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(config.task_queue, "background");
        assert_eq!(config.run_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = BackgroundConfig::from_lookup(lookup(&[("GRAM_WORKFLOW_RUN_TIMEOUT_SECS", "5m")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "GRAM_WORKFLOW_RUN_TIMEOUT_SECS", .. }
        ));

        let err = BackgroundConfig::from_lookup(lookup(&[("GRAM_WORKFLOW_RUN_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_empty_task_queue() {
        assert!(BackgroundConfig::from_lookup(lookup(&[("GRAM_TASK_QUEUE", "  ")])).is_err());
    }
}
