use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Serialize,
    serde_json::Value,
    tracing::error,
};

/// The uniform response body: `{success, message, data?, error?}`.
/// `success` is false for every 4xx/5xx status.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn respond(status: StatusCode, message: &str, data: Option<Value>, error: Option<String>) -> Response {
    let envelope = Envelope {
        success: !(status.is_client_error() || status.is_server_error()),
        message: message.to_string(),
        data,
        error,
    };
    (status, Json(envelope)).into_response()
}

pub fn ok(message: &str, data: impl Serialize) -> Response {
    let data = serde_json::to_value(data).ok();
    respond(StatusCode::OK, message, data, None)
}

/// Request/domain failures surfaced to the client as an envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    /// Diagnostic detail, included only when the server exposes errors.
    detail: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            detail: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "UNAUTHORIZED".into(),
            detail: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Not Found".into(),
            detail: None,
        }
    }

    /// Unexpected failure: generic message outward, full detail in the log,
    /// and in the envelope only when `expose` is set.
    pub fn internal(message: impl Into<String>, err: impl std::fmt::Display, expose: bool) -> Self {
        let message = message.into();
        error!(error = %err, "{message}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            detail: expose.then(|| err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        respond(self.status, &self.message, None, self.detail)
    }
}
