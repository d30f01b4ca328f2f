use serde::{Deserialize, Serialize};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionState {
    #[default]
    Closed,
    Associating,
    Negotiating,
    Polling,
    Closing,
}

impl SessionState {
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, target),
            (Closed, Associating)
                | (Associating, Negotiating)
                | (Associating, Closing)
                | (Negotiating, Polling)
                | (Negotiating, Closing)
                | (Polling, Closing)
                | (Closing, Closed)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Associating => "Associating",
            Self::Negotiating => "Negotiating",
            Self::Polling => "Polling",
            Self::Closing => "Closing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        use SessionState::*;
        let path = [Closed, Associating, Negotiating, Polling, Closing, Closed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_cannot_skip_handshake() {
        assert!(!SessionState::Closed.can_transition_to(&SessionState::Polling));
        assert!(!SessionState::Associating.can_transition_to(&SessionState::Polling));
        assert!(!SessionState::Polling.can_transition_to(&SessionState::Associating));
    }
}
