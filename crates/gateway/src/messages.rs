use {
    axum::{
        Json,
        extract::{State, rejection::JsonRejection},
        response::Response,
    },
    serde::Deserialize,
    serde_json::json,
    tracing::error,
};

use waygate_sessions::{SessionHandle, SessionStatus};
use waygate_transport::{Address, OutboundPayload};

use crate::{
    envelope::{ApiError, ok},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub sender: String,
    pub receiver: String,
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
}

/// Resolve the sending session, rejecting when no valid credential exists
/// on disk or no live handle is registered.
pub(crate) async fn connected_session(
    state: &AppState,
    sender: &str,
) -> Result<std::sync::Arc<SessionHandle>, ApiError> {
    if matches!(state.creds.status(sender), SessionStatus::Disconnected) {
        return Err(ApiError::bad_request("Session not connected"));
    }
    state
        .registry
        .lookup(sender)
        .await
        .ok_or_else(|| ApiError::bad_request("Session not connected"))
}

/// POST /send — deliver a message to one or more `|`-separated recipients.
/// Recipients are attempted sequentially and independently; a failure for
/// one is logged and excluded, the rest still go out.
pub async fn send(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    if request.sender.is_empty() || request.receiver.is_empty() || request.message.is_empty() {
        return Err(ApiError::bad_request("Invalid request body"));
    }

    let session = connected_session(&state, &request.sender).await?;

    let payload = match &request.file {
        Some(url) => OutboundPayload::media(&request.message, url),
        None => OutboundPayload::text(&request.message),
    };

    let mut results = Vec::new();
    for recipient in request.receiver.split('|') {
        let to = Address::phone(recipient);
        match session.send(&to, &payload).await {
            Ok(receipt) => results.push(json!({
                "recipient": recipient,
                "message_id": receipt.message_id,
                "timestamp_ms": receipt.timestamp_ms,
            })),
            Err(e) => {
                error!(recipient = %recipient, error = %e, "failed to send message");
            },
        }
    }

    Ok(ok("Message sent", results))
}
