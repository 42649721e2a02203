//! Error types for the translator and the proxy around it.

use thiserror::Error;

use crate::translate::messages_types::ErrorResponse;

/// Failures raised by the pure translation layer.
///
/// Every variant carries enough context (the offending field, content type or
/// raw event) for the caller to build a protocol-appropriate error response.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TranslateError {
    #[error("Schema violation at `{field}`: {message}")]
    SchemaViolation { field: String, message: String },

    #[error("Unsupported content type `{content_type}` in {context}")]
    UnsupportedContentType {
        content_type: String,
        context: String,
    },

    #[error("Stream translation error: {message}")]
    StreamTranslation { message: String, raw_event: String },

    #[error("SSE framing error: {message}")]
    Framing { message: String },

    #[error("Upstream stream interrupted: {message}")]
    UpstreamInterrupted { message: String },
}

impl TranslateError {
    pub fn schema(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn unsupported(content_type: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnsupportedContentType {
            content_type: content_type.into(),
            context: context.into(),
        }
    }

    pub fn stream(msg: impl Into<String>, raw_event: impl Into<String>) -> Self {
        Self::StreamTranslation {
            message: msg.into(),
            raw_event: raw_event.into(),
        }
    }

    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing {
            message: msg.into(),
        }
    }

    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::UpstreamInterrupted {
            message: msg.into(),
        }
    }

    /// Whether the failure was caused by the caller's payload rather than the upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. } | Self::UnsupportedContentType { .. }
        )
    }

    /// Build the Messages-API error body a client of that protocol expects.
    pub fn to_error_response(&self) -> ErrorResponse {
        if self.is_client_error() {
            ErrorResponse::invalid_request(self.to_string())
        } else {
            ErrorResponse::api_error(self.to_string())
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid model pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{0}")]
    Other(String),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Result alias for the pure translation layer.
pub type TranslateResult<T> = std::result::Result<T, TranslateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_invalid_request() {
        let err = TranslateError::unsupported("input_audio", "user message");
        assert!(err.is_client_error());
        assert_eq!(err.to_error_response().error.error_type, "invalid_request_error");

        let err = TranslateError::stream("unknown item", "{}");
        assert!(!err.is_client_error());
        assert_eq!(err.to_error_response().error.error_type, "api_error");
    }

    #[test]
    fn test_translate_error_converts_into_proxy_error() {
        let err: ProxyError = TranslateError::schema("max_tokens", "missing").into();
        assert!(matches!(err, ProxyError::Translate(_)));
        assert!(err.to_string().contains("max_tokens"));
    }
}
