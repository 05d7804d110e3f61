use http::StatusCode;
use serde_json::{Value, json};

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each feature crate's error type. The server layer
/// converts these into actual HTTP responses, keeping domain errors
/// decoupled from axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}

/// `OpenAI`-style error envelope
///
/// Used by every client protocol that has no error shape of its own.
pub fn openai_error_body(error: &dyn HttpError) -> Value {
    json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
            "code": Value::Null,
        }
    })
}

/// Anthropic-style error envelope
pub fn anthropic_error_body(error: &dyn HttpError) -> Value {
    json!({
        "type": "error",
        "error": {
            "type": error.error_type(),
            "message": error.client_message(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Teapot;

    impl std::fmt::Display for Teapot {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("short and stout")
        }
    }

    impl std::error::Error for Teapot {}

    impl HttpError for Teapot {
        fn status_code(&self) -> StatusCode {
            StatusCode::IM_A_TEAPOT
        }

        fn error_type(&self) -> &str {
            "teapot_error"
        }

        fn client_message(&self) -> String {
            self.to_string()
        }
    }

    #[test]
    fn openai_envelope_shape() {
        let body = openai_error_body(&Teapot);
        assert_eq!(body["error"]["type"], "teapot_error");
        assert_eq!(body["error"]["message"], "short and stout");
        assert!(body["error"]["code"].is_null());
    }

    #[test]
    fn anthropic_envelope_shape() {
        let body = anthropic_error_body(&Teapot);
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "teapot_error");
    }
}
