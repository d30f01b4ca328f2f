use std::time::Duration;

use crate::config::{ReconnectConfig, SessionConfig};

/// Local retry of recoverable handshake errors
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// The error that brings the count to this value escalates
    pub max_errors: u32,
    pub pause: Duration,
}

impl RetryPolicy {
    pub fn new(max_errors: u32, pause: Duration) -> Self {
        Self { max_errors, pause }
    }

    /// A single attempt, nothing retried
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_io_retries, config.retry_pause())
    }

    pub fn escalates(&self, consecutive_errors: u32) -> bool {
        consecutive_errors >= self.max_errors
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(12, Duration::from_secs(2))
    }
}

/// Rebuilding a dropped session
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Pause after a failed reopen
    pub backoff: Duration,

    /// `None` keeps trying until stopped
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn new(backoff: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            backoff,
            max_attempts,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::try_from_secs_f64(config.backoff_secs).unwrap_or(Duration::ZERO),
            config.max_attempts,
        )
    }

    /// Whether attempt number `attempt` (1-based) may run
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), None)
    }
}

/// What to do when a pipeline stage dies
#[derive(Debug, Clone, PartialEq)]
pub enum RestartPolicy {
    /// A dead stage stops the pipeline
    Never,

    /// Restart up to `max_restarts` times, then stop the pipeline
    Limited { max_restarts: u32 },
}

impl RestartPolicy {
    pub fn allows(&self, restarts_so_far: u32) -> bool {
        match self {
            Self::Never => false,
            Self::Limited { max_restarts } => restarts_so_far < *max_restarts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_escalates_at_bound() {
        let policy = RetryPolicy::default();
        assert!(!policy.escalates(11));
        assert!(policy.escalates(12));
        assert!(RetryPolicy::once().escalates(1));
    }

    #[test]
    fn test_reconnect_unbounded_by_default() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(10_000));

        let bounded = ReconnectPolicy::new(Duration::ZERO, Some(2));
        assert!(bounded.allows(2));
        assert!(!bounded.allows(3));
    }

    #[test]
    fn test_restart_policy() {
        assert!(!RestartPolicy::Never.allows(0));

        let limited = RestartPolicy::Limited { max_restarts: 3 };
        assert!(limited.allows(2));
        assert!(!limited.allows(3));
    }
}
