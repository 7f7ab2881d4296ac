//! In-process loopback transport.
//!
//! Pairs instantly (no QR round-trip: the connection opens directly and
//! emits fresh credential material) and acknowledges every send locally.
//! This is the development transport wired by the default binary; a real
//! network adapter replaces it by implementing [`TransportProvider`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use {
    async_trait::async_trait,
    serde_json::json,
    tokio::sync::mpsc,
    tracing::debug,
};

use crate::{
    address::Address,
    connection::{
        ConnectOptions, Credentials, SendReceipt, TransportConnection, TransportError,
        TransportHandle, TransportProvider,
    },
    event::{ConnectionUpdate, TransportEvent},
};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Default)]
pub struct MemoryTransport;

impl MemoryTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportProvider for MemoryTransport {
    async fn connect(&self, opts: ConnectOptions) -> Result<TransportHandle, TransportError> {
        let (tx, rx) = mpsc::channel(16);

        let credentials = if opts.credentials.is_empty() {
            Credentials(json!({
                "me": { "id": format!("{}@s.whatsapp.net", uuid::Uuid::new_v4().simple()) },
                "paired_at_ms": now_ms(),
                "app": opts.identity.app,
            }))
        } else {
            opts.credentials
        };

        let _ = tx.send(TransportEvent::CredentialsChanged(credentials)).await;
        let _ = tx.send(TransportEvent::Connection(ConnectionUpdate::Open)).await;

        Ok(TransportHandle {
            connection: Arc::new(MemoryConnection::default()),
            events: rx,
        })
    }
}

/// Loopback connection: counts and acknowledges sends, drops the payload.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    sent: AtomicUsize,
}

impl MemoryConnection {
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn send(
        &self,
        to: &Address,
        _body: &serde_json::Value,
    ) -> Result<SendReceipt, TransportError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        debug!(to = %to, "loopback send acknowledged");
        Ok(SendReceipt {
            message_id: uuid::Uuid::new_v4().to_string(),
            to: to.clone(),
            timestamp_ms: now_ms(),
        })
    }

    async fn logout(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientIdentity;

    #[tokio::test]
    async fn fresh_connect_mints_credentials_and_opens() {
        let provider = MemoryTransport::new();
        let mut handle = provider
            .connect(ConnectOptions {
                identity: ClientIdentity::new("test"),
                credentials: Credentials::empty(),
            })
            .await
            .unwrap();

        let first = handle.events.recv().await.unwrap();
        let creds = match first {
            TransportEvent::CredentialsChanged(c) => c,
            other => panic!("expected credentials event, got {other:?}"),
        };
        assert!(!creds.is_empty());
        assert!(creds.0.get("me").is_some());

        match handle.events.recv().await.unwrap() {
            TransportEvent::Connection(ConnectionUpdate::Open) => {},
            other => panic!("expected open, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn existing_credentials_are_replayed_not_replaced() {
        let provider = MemoryTransport::new();
        let creds = Credentials(json!({ "me": { "id": "fixed" } }));
        let mut handle = provider
            .connect(ConnectOptions {
                identity: ClientIdentity::new("test"),
                credentials: creds,
            })
            .await
            .unwrap();

        match handle.events.recv().await.unwrap() {
            TransportEvent::CredentialsChanged(c) => {
                assert_eq!(c.0["me"]["id"], json!("fixed"));
            },
            other => panic!("expected credentials event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_are_acknowledged() {
        let conn = MemoryConnection::default();
        let receipt = conn
            .send(&Address::phone("628123"), &json!({ "text": "hi" }))
            .await
            .unwrap();
        assert_eq!(receipt.to.as_str(), "628123@s.whatsapp.net");
        assert_eq!(conn.sent_count(), 1);
    }
}
