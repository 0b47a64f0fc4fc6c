//! Request bodies and error responses for the AG-UI gateway.

use serde::Deserialize;
use serde_json::Value;

use super::*;

/// Client error raised before any SSE headers are written.
#[derive(Debug)]
pub(super) struct ApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
}

impl ApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub(super) fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub(super) fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "input_too_large", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = if self.status.is_client_error() {
            "invalid_request_error"
        } else {
            "server_error"
        };
        (
            self.status,
            Json(json!({
                "error": {
                    "type": error_type,
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

/// `RunAgentInput` body accepted by the agent routes.
///
/// Identifiers and messages are optional here so that their absence is
/// reported with a specific error code instead of a generic parse failure.
#[derive(Debug, Deserialize)]
pub(super) struct RunAgentInput {
    #[serde(default)]
    pub(super) thread_id: Option<String>,
    #[serde(default)]
    pub(super) run_id: Option<String>,
    #[serde(default)]
    pub(super) messages: Option<Vec<RunAgentMessage>>,
    #[serde(default)]
    pub(super) state: Option<Value>,
    #[serde(default)]
    pub(super) tools: Option<Value>,
    #[serde(default)]
    pub(super) context: Option<Value>,
    #[serde(default, rename = "forwardedProps")]
    pub(super) forwarded_props: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RunAgentMessage {
    #[serde(default)]
    pub(super) id: Option<String>,
    pub(super) role: String,
    pub(super) content: String,
}
