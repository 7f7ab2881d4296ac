use std::sync::Arc;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    thiserror::Error,
    tokio::sync::mpsc,
};

use crate::{address::Address, event::TransportEvent};

// ── Types ────────────────────────────────────────────────────────────────────

/// Fixed client identity presented to the network on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub app: String,
    pub platform: String,
    pub version: String,
}

impl ClientIdentity {
    /// Identity with the pinned platform/version pair the network accepts.
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            platform: "Chrome".into(),
            version: "103.0.5060.114".into(),
        }
    }
}

/// Opaque serialized auth material. The format is owned by the provider;
/// the session layer only moves it between the wire and disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub serde_json::Value);

impl Credentials {
    /// Fresh material for a connection that has never paired.
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

/// Everything a provider needs to open a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub identity: ClientIdentity,
    pub credentials: Credentials,
}

/// Acknowledgement for a delivered message.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub to: Address,
    pub timestamp_ms: u64,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("send rejected: {0}")]
    Rejected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

// ── Capability traits ────────────────────────────────────────────────────────

/// A live connection to the network.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// Send a wire-encoded message body. Acknowledges delivery or fails
    /// with a transient or permanent error.
    async fn send(
        &self,
        to: &Address,
        body: &serde_json::Value,
    ) -> Result<SendReceipt, TransportError>;

    /// Invalidate the credential remotely.
    async fn logout(&self) -> Result<(), TransportError>;

    /// Tear the connection down without touching the credential.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A connection plus its typed event inbox. Event order within one
/// connection matches wire order; there is no cross-connection ordering.
pub struct TransportHandle {
    pub connection: Arc<dyn TransportConnection>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Factory for connections; the integration point for a real wire adapter.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    async fn connect(&self, opts: ConnectOptions) -> Result<TransportHandle, TransportError>;
}
