use thiserror::Error;

/// Session failures, split by who handles them
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transient; retried locally up to a bound, then escalated
    #[error("Session I/O error: {0}")]
    Io(String),

    /// Never retried where detected; the session must be rebuilt
    #[error("Critical session error: {0}")]
    Critical(String),

    #[error("Session handshake interrupted by stop request")]
    Stopped,
}

impl SessionError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::Critical(message.into())
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical(_))
    }
}
