use std::sync::Arc;

use {
    waygate_config::WaygateConfig,
    waygate_otp::OtpService,
    waygate_sessions::{CredentialStore, SessionController, SessionRegistry},
};

/// Shared handler state. Everything is behind an `Arc`, so cloning per
/// request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WaygateConfig>,
    pub controller: Arc<SessionController>,
    pub registry: Arc<SessionRegistry>,
    pub creds: CredentialStore,
    pub otp: Arc<OtpService>,
}

impl AppState {
    pub fn expose_errors(&self) -> bool {
        self.config.server.expose_errors
    }
}
