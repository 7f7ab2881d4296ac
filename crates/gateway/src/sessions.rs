use {
    axum::{
        extract::{Path, Query, State},
        response::Response,
    },
    serde::Deserialize,
    serde_json::json,
    tracing::debug,
};

use waygate_sessions::{
    CreateOutcome, QrWaiter, SessionStatus, SessionVariant, validate_session_id,
};

use crate::{
    envelope::{ApiError, ok},
    state::AppState,
};

/// Session ids become filesystem paths; reject anything unsafe before any
/// store probe.
fn checked_id(session_id: &str) -> Result<&str, ApiError> {
    validate_session_id(session_id)
        .map_err(|_| ApiError::bad_request("Invalid session id"))?;
    Ok(session_id)
}

/// GET /sessions/{id} — report connectivity by probing the on-disk
/// credential.
pub async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = checked_id(&session_id)?;
    let session = match state.creds.status(session_id) {
        SessionStatus::Connected { user } => json!({ "status": "connected", "user": user }),
        SessionStatus::Disconnected => json!({ "status": "disconnected" }),
    };
    Ok(ok("Session status retrieved", json!({ "session": session })))
}

/// POST /sessions/{id} — start or resume creation. The response is held
/// until the attempt's first resolving event: a pairing QR, a direct open,
/// or a failure.
pub async fn create(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let (waiter, outcome) = QrWaiter::channel();
    if let Err(e) = state
        .controller
        .create_session(&session_id, SessionVariant::Standard, Some(waiter))
        .await
    {
        // The waiter was completed with the failure; the match below
        // turns it into the client response.
        debug!(session_id = %session_id, error = %e, "session creation returned early");
    }

    match outcome.await {
        Ok(CreateOutcome::PairingCode(qr)) => Ok(ok("QR code generated", json!({ "qr": qr }))),
        Ok(CreateOutcome::Connected) => Ok(ok("Session connected", json!(null))),
        Ok(CreateOutcome::AlreadyActive) => Ok(ok("Session already exists", json!(null))),
        Ok(CreateOutcome::Failed(reason)) => Err(ApiError::bad_request(reason)),
        Err(recv) => Err(ApiError::internal(
            "Unable to create session.",
            recv,
            state.expose_errors(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatListQuery {
    #[serde(default)]
    pub group: bool,
}

/// GET /sessions/{id}/chats — chat metadata accumulated by the live
/// session, filtered by address kind.
pub async fn chats(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ChatListQuery>,
) -> Result<Response, ApiError> {
    let session_id = checked_id(&session_id)?;
    let handle = state
        .registry
        .lookup(session_id)
        .await
        .ok_or_else(|| ApiError::bad_request("Session not connected"))?;
    Ok(ok("Chat list retrieved", handle.chats.list(query.group)))
}

/// POST /sessions/{id}/logout — delete the session. Idempotent: deleting
/// an absent session succeeds.
pub async fn logout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = checked_id(&session_id)?;
    state
        .controller
        .delete_session(session_id, SessionVariant::Standard)
        .await
        .map_err(|e| ApiError::internal("Unable to delete session.", e, state.expose_errors()))?;
    Ok(ok("Session deleted", json!(null)))
}
