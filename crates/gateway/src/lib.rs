//! Gateway: the REST surface over the session layer.
//!
//! Lifecycle:
//! 1. Load config, open the credential root and OTP store
//! 2. Build the session controller over the injected transport provider
//! 3. Rehydrate persisted sessions from disk
//! 4. Serve HTTP (sessions, send, OTP) behind the API-key middleware
//! 5. On shutdown, flush chat metadata snapshots
//!
//! All lifecycle logic lives in `waygate-sessions`; handlers here validate,
//! delegate, and wrap results in the response envelope.

pub mod auth;
pub mod envelope;
pub mod messages;
pub mod otp;
pub mod server;
pub mod sessions;
pub mod state;

pub use {
    server::{build_router, start_gateway},
    state::AppState,
};
