//! Errors from the Anthropic API client.
//!
//! [`AnthropicError`] covers rate limiting, API errors and network failures,
//! and converts into the [`GenerationError`] the executor works with.

use thiserror::Error;

use crate::generation::GenerationError;

/// Errors talking to the Anthropic API.
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Error status from the API (e.g. 401 bad key, 500 internal error).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response carried no text block.
    #[error("response {id} contained no text")]
    EmptyResponse { id: String },

    /// Underlying network failure (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

// Transport failures are transient; an empty response is malformed content.
impl From<AnthropicError> for GenerationError {
    fn from(err: AnthropicError) -> Self {
        match err {
            AnthropicError::EmptyResponse { .. } => {
                GenerationError::malformed("message", err.to_string())
            }
            AnthropicError::NetworkError(ref e) if e.is_timeout() => {
                GenerationError::Transient(format!("request timed out: {e}"))
            }
            other => GenerationError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn rate_limited_display() {
        let err = AnthropicError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn api_error_is_a_system_failure() {
        let err: GenerationError = AnthropicError::ApiError {
            status: 529,
            message: "overloaded".into(),
        }
        .into();
        assert_eq!(err.kind(), FailureKind::System);
        assert!(err.to_string().contains("status 529"));
    }

    #[test]
    fn empty_response_is_a_business_failure() {
        let err: GenerationError = AnthropicError::EmptyResponse { id: "msg_1".into() }.into();
        assert_eq!(err.kind(), FailureKind::Business);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnthropicError>();
    }
}
