use {
    axum::{
        Json,
        extract::{State, rejection::JsonRejection},
        response::Response,
    },
    serde::Deserialize,
    serde_json::json,
};

use {
    waygate_otp::{VerifyError, render_template},
    waygate_transport::{Address, OutboundPayload},
};

use crate::{
    envelope::{ApiError, ok},
    messages::connected_session,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub sender: String,
    pub receiver: String,
    /// Message template carrying the `{otp}` placeholder.
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub sender: String,
    pub receiver: String,
    pub otp: String,
}

/// POST /otp/generate — derive a code seeded by the receiver, upsert its
/// record, and send the rendered message through the sender's session.
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    if request.sender.is_empty() || request.receiver.is_empty() || request.message.is_empty() {
        return Err(ApiError::bad_request("Invalid request body"));
    }

    let session = connected_session(&state, &request.sender).await?;

    let code = state
        .otp
        .issue(&request.receiver)
        .await
        .map_err(|e| ApiError::internal("Unable to generate OTP.", e, state.expose_errors()))?;
    let rendered = render_template(&request.message, &code);

    let to = Address::phone(&request.receiver);
    let receipt = session
        .send(&to, &OutboundPayload::text(rendered))
        .await
        .map_err(|e| {
            ApiError::internal("Unable to send verification code.", e, state.expose_errors())
        })?;

    Ok(ok(
        "Message sent",
        json!({
            "recipient": request.receiver,
            "message_id": receipt.message_id,
            "timestamp_ms": receipt.timestamp_ms,
        }),
    ))
}

/// POST /otp/verify — succeed only on an exact, unexpired match; the
/// record is consumed on success and on success only.
pub async fn verify(
    State(state): State<AppState>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    if request.sender.is_empty() || request.receiver.is_empty() || request.otp.is_empty() {
        return Err(ApiError::bad_request("Invalid request body"));
    }

    connected_session(&state, &request.sender).await?;

    match state.otp.verify(&request.receiver, &request.otp).await {
        Ok(()) => Ok(ok("OTP verified", json!(null))),
        Err(VerifyError::NotFound) => Err(ApiError::bad_request("OTP not found")),
        Err(VerifyError::Mismatch) => Err(ApiError::bad_request("Invalid OTP")),
        Err(VerifyError::Expired) => Err(ApiError::bad_request("OTP expired")),
        Err(VerifyError::Store(e)) => Err(ApiError::internal(
            "Unable to verify OTP.",
            e,
            state.expose_errors(),
        )),
    }
}
