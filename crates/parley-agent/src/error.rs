//! Error types for parley-agent

use thiserror::Error;

/// Result type alias using parley-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during agent operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model endpoint layer
    #[error(transparent)]
    Ai(#[from] parley_ai::Error),

    /// Loading or saving conversation state failed
    #[error("Store error: {0}")]
    Store(String),

    /// Delivering a message to the chat transport failed
    #[error("Channel error: {0}")]
    Channel(String),

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error is a temporary overload / rate-limit condition
    pub fn is_overloaded(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_overloaded(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_passes_through() {
        let err: Error = parley_ai::Error::Overloaded("529".into()).into();
        assert!(err.is_overloaded());
        assert!(!Error::Other("nope".into()).is_overloaded());
        assert!(!Error::Store("disk full".into()).is_overloaded());
    }
}
