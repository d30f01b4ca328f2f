use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Streaming pipeline lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Initializing,
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
        estimator_restarts: u32,
    },
    Stopping,
    Completed {
        #[serde(skip)]
        duration: Option<Duration>,
        frames_rendered: u64,
    },
    Error {
        error_msg: String,
        recoverable: bool,
    },
}

impl PipelineState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Idle, Initializing) |

            (Initializing, Running { .. }) |
            (Initializing, Error { .. }) |

            // Running -> Running records an estimator restart
            (Running { .. }, Running { .. }) |
            (Running { .. }, Stopping) |
            (Running { .. }, Error { .. }) |

            (Stopping, Completed { .. }) |
            (Stopping, Error { .. }) |

            (Completed { .. }, Idle) |
            (Error { recoverable: true, .. }, Idle)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing => "Initializing",
            Self::Running { .. } => "Running",
            Self::Stopping => "Stopping",
            Self::Completed { .. } => "Completed",
            Self::Error { .. } => "Error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let idle = PipelineState::Idle;
        let init = PipelineState::Initializing;

        assert!(idle.can_transition_to(&init));
        assert!(!init.can_transition_to(&idle));
    }

    #[test]
    fn test_running_must_stop_before_completing() {
        let running = PipelineState::Running {
            start_time: None,
            estimator_restarts: 0,
        };
        let completed = PipelineState::Completed {
            duration: None,
            frames_rendered: 10,
        };

        assert!(!running.can_transition_to(&completed));
        assert!(running.can_transition_to(&PipelineState::Stopping));
        assert!(PipelineState::Stopping.can_transition_to(&completed));
    }

    #[test]
    fn test_error_recovery() {
        let recoverable_error = PipelineState::Error {
            error_msg: "estimator crashed".to_string(),
            recoverable: true,
        };
        let unrecoverable_error = PipelineState::Error {
            error_msg: "producer failed".to_string(),
            recoverable: false,
        };

        assert!(recoverable_error.can_transition_to(&PipelineState::Idle));
        assert!(!unrecoverable_error.can_transition_to(&PipelineState::Idle));
    }
}
