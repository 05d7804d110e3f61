use http::StatusCode;
use polyglot_core::HttpError;
use thiserror::Error;

/// Errors that can occur while translating a call
#[derive(Debug, Error)]
pub enum LlmError {
    /// Client body was not JSON
    #[error("Invalid JSON body")]
    MalformedBody,

    /// Client sent JSON that does not fit its protocol
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No adapter is registered for the protocol
    #[error("unknown protocol: {protocol}")]
    UnknownProtocol { protocol: String },

    /// Source protocol was not configured and could not be detected
    #[error("could not detect the client protocol for path `{path}`")]
    UndetectedProtocol { path: String },

    /// Proxy token does not resolve to a route
    #[error("Invalid or expired proxy token")]
    RouteNotFound,

    /// Route uses a format version this gateway does not serve
    #[error("unsupported config version: {version}")]
    UnsupportedVersion { version: u32 },

    /// Route configuration cannot serve this call
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream could not be reached or its body could not be read
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        Self::Upstream(error.to_string())
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedBody
            | Self::InvalidRequest(_)
            | Self::UndetectedProtocol { .. }
            | Self::UnsupportedVersion { .. } => StatusCode::BAD_REQUEST,
            Self::RouteNotFound => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::UnknownProtocol { .. } | Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::MalformedBody | Self::InvalidRequest(_) | Self::UndetectedProtocol { .. } => "invalid_request_error",
            Self::RouteNotFound => "authentication_error",
            Self::UnsupportedVersion { .. } | Self::UnknownProtocol { .. } | Self::Config(_) => "configuration_error",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(LlmError::MalformedBody.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(LlmError::MalformedBody.client_message(), "Invalid JSON body");
        assert_eq!(LlmError::RouteNotFound.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            LlmError::UnsupportedVersion { version: 2 }.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        let error = LlmError::Internal(anyhow::anyhow!("secret stack detail"));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.client_message().contains("secret"));
    }
}
