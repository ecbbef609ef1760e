//! Error types for parley-ai

use thiserror::Error;

/// Result type alias using parley-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the model endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Endpoint temporarily overloaded
    #[error("Overloaded: {0}")]
    Overloaded(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Context overflow / too many tokens
    #[error("Context overflow: {0}")]
    ContextOverflow(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Classify a failure reported as text by a response stream.
    pub fn from_stream_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if has_overload_signature(&message) {
            Error::Overloaded(message)
        } else if has_overflow_signature(&message) {
            Error::ContextOverflow(message)
        } else {
            Error::api("stream_error", message)
        }
    }

    /// Check if this error is a rate-limit or overload condition.
    ///
    /// These are temporary: the caller may shrink the request and retry later.
    pub fn is_overloaded(&self) -> bool {
        match self {
            Error::RateLimited { .. } | Error::Overloaded(_) => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                et.contains("rate_limit") || et.contains("overloaded") || has_overload_signature(message)
            }
            Error::Sse(message) => has_overload_signature(message),
            _ => false,
        }
    }

    /// Check if this error is a transient transport failure worth retrying
    /// immediately. Overload is excluded; it is handled one level up.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Sse(message) | Error::Api { message, .. } => {
                !has_overload_signature(message) && has_transient_signature(message)
            }
            _ => false,
        }
    }

    /// Check if this error indicates a context overflow / too many tokens
    pub fn is_context_overflow(&self) -> bool {
        match self {
            Error::ContextOverflow(_) => true,
            Error::Api { message, .. } => has_overflow_signature(message),
            _ => false,
        }
    }
}

/// Text patterns of rate-limit / overload failures.
///
/// Status codes only count as a leading `"429 "` / `"529 "`, the shape
/// status errors are formatted in; digits elsewhere in a message mean nothing.
fn has_overload_signature(message: &str) -> bool {
    let msg = message.trim_start().to_lowercase();
    msg.starts_with("429 ")
        || msg.starts_with("529 ")
        || msg.contains("rate limit")
        || msg.contains("rate_limit")
        || msg.contains("overloaded")
        || msg.contains("too many requests")
}

fn has_transient_signature(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.starts_with("500 ")
        || msg.starts_with("502 ")
        || msg.starts_with("503 ")
        || msg.starts_with("504 ")
        || msg.contains("service unavailable")
}

fn has_overflow_signature(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("too many tokens")
        || msg.contains("context length")
        || msg.contains("context window")
        || msg.contains("prompt is too long")
        || msg.contains("prompt too long")
        || msg.contains("request too large")
        || msg.contains("context_length_exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overloaded_typed_variants() {
        assert!(Error::RateLimited { retry_after: Some(5) }.is_overloaded());
        assert!(Error::Overloaded("busy".into()).is_overloaded());
    }

    #[test]
    fn test_overloaded_api_error_types() {
        assert!(Error::api("rate_limit_error", "slow down").is_overloaded());
        assert!(Error::api("overloaded_error", "Overloaded").is_overloaded());
    }

    #[test]
    fn test_overloaded_api_messages() {
        assert!(Error::api("error", "Rate limit exceeded, please retry").is_overloaded());
        assert!(Error::api("error", "Too many requests").is_overloaded());
        assert!(Error::api("error", "529 (overloaded_error): Overloaded").is_overloaded());
        assert!(Error::Sse("429 Too Many Requests".into()).is_overloaded());
    }

    #[test]
    fn test_not_overloaded() {
        assert!(!Error::api("authentication_error", "Invalid API key").is_overloaded());
        assert!(!Error::InvalidApiKey.is_overloaded());
        assert!(!Error::ContextOverflow("too big".into()).is_overloaded());
        assert!(!Error::UnexpectedResponse("garbage".into()).is_overloaded());
    }

    #[test]
    fn test_from_stream_message_classifies() {
        assert!(matches!(
            Error::from_stream_message("429 (rate_limit_error): Number of requests exceeded"),
            Error::Overloaded(_)
        ));
        assert!(matches!(
            Error::from_stream_message("overloaded_error: Overloaded"),
            Error::Overloaded(_)
        ));
        assert!(matches!(
            Error::from_stream_message("400 (invalid_request_error): prompt is too long"),
            Error::ContextOverflow(_)
        ));
        assert!(matches!(
            Error::from_stream_message("401 (authentication_error): invalid x-api-key"),
            Error::Api { .. }
        ));
    }

    #[test]
    fn test_status_digits_inside_message_are_not_overload() {
        let err = Error::from_stream_message(
            "400 (invalid_request_error): max_tokens: 65290 > 64000, which is the maximum allowed",
        );
        assert!(matches!(err, Error::Api { .. }));
        assert!(!err.is_overloaded());
        assert!(!err.is_retryable());

        assert!(!Error::api("invalid_request_error", "messages.429.content: empty").is_overloaded());
        assert!(!Error::Sse("unexpected id 15290".into()).is_overloaded());
    }

    #[test]
    fn test_retryable_excludes_overload() {
        assert!(Error::Sse("connection reset".into()).is_retryable());
        assert!(Error::Sse("503 Service Unavailable".into()).is_retryable());
        assert!(!Error::Sse("529 overloaded".into()).is_retryable());
        assert!(!Error::Overloaded("busy".into()).is_retryable());
        assert!(!Error::InvalidApiKey.is_retryable());
        assert!(Error::from_stream_message("502 (http_error): bad gateway").is_retryable());
        assert!(!Error::from_stream_message("400 (invalid_request_error): bad").is_retryable());
    }

    #[test]
    fn test_overflow() {
        assert!(Error::ContextOverflow("x".into()).is_context_overflow());
        assert!(Error::api("invalid_request_error", "Prompt is too long").is_context_overflow());
        assert!(!Error::api("authentication_error", "Invalid API key").is_context_overflow());
    }
}
