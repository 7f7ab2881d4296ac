use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaygateConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub sessions: SessionsConfig,
    pub otp: OtpConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Include diagnostic detail in error envelopes. Off in production;
    /// `NODE_ENV=local` turns it on via the env overlay.
    pub expose_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            expose_errors: false,
        }
    }
}

/// Shared-secret auth for the HTTP surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// The API key every request must present. Unset means the server
    /// rejects all protected routes until one is configured.
    pub api_key: Option<String>,
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Root directory for per-session credential and snapshot files.
    pub root_dir: PathBuf,
    /// App name presented in the client identity on connect.
    pub client_name: String,
    /// Reconnect attempt budget per session; values below 1 behave as 1.
    pub max_retries: u32,
    /// Delay before a scheduled reconnect, unless the disconnect status
    /// asks for an immediate restart.
    pub reconnect_interval_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("sessions"),
            client_name: "Waygate".into(),
            max_retries: 5,
            reconnect_interval_ms: 5000,
        }
    }
}

impl SessionsConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// OTP record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Sqlite database file for OTP records.
    pub db_path: PathBuf,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("waygate.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = WaygateConfig::default();
        assert_eq!(cfg.server.port, 3000);
        assert!(!cfg.server.expose_errors);
        assert!(cfg.auth.api_key.is_none());
        assert_eq!(cfg.sessions.root_dir, PathBuf::from("sessions"));
        assert_eq!(cfg.sessions.reconnect_interval(), Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: WaygateConfig = toml::from_str(
            r#"
            [auth]
            api_key = "secret"

            [sessions]
            max_retries = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.auth.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.sessions.max_retries, 2);
        assert_eq!(cfg.server.port, 3000);
    }
}
