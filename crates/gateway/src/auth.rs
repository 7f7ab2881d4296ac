use {
    axum::{
        extract::{Request, State},
        middleware::Next,
        response::{IntoResponse, Response},
    },
    tracing::warn,
};

use crate::{envelope::ApiError, state::AppState};

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    // XOR each byte and accumulate; any difference makes result non-zero.
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

/// The shared secret presented by a request: `x-api-key` header, or a
/// bearer token as a fallback.
fn provided_secret(req: &Request) -> Option<&str> {
    if let Some(key) = req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(' ').next_back())
}

/// Require the configured API key on every protected route. A server with
/// no key configured rejects everything rather than running open.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.auth.api_key.as_deref() else {
        warn!("request rejected: no api key configured");
        return ApiError::unauthorized().into_response();
    };
    match provided_secret(&req) {
        Some(given) if safe_equal(given, expected) => next.run(req).await,
        _ => ApiError::unauthorized().into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_equal_matches_exactly() {
        assert!(safe_equal("secret", "secret"));
        assert!(!safe_equal("secret", "secreT"));
        assert!(!safe_equal("secret", "secret2"));
        assert!(!safe_equal("", "x"));
        assert!(safe_equal("", ""));
    }
}
