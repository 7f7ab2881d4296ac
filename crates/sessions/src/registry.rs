use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::sync::RwLock;

use waygate_transport::{
    Address, OutboundPayload, SendReceipt, TransportConnection, TransportError,
    patch::patch_before_send,
};

use crate::{chats::ChatStore, credentials::SessionVariant};

// ── Session handle ───────────────────────────────────────────────────────────

/// A live session: the transport connection plus its accumulated chat
/// metadata. Owned by the registry once registered.
pub struct SessionHandle {
    pub session_id: String,
    pub variant: SessionVariant,
    pub connection: Arc<dyn TransportConnection>,
    pub chats: ChatStore,
    pub created_at_ms: u64,
}

impl SessionHandle {
    pub fn new(
        session_id: impl Into<String>,
        variant: SessionVariant,
        connection: Arc<dyn TransportConnection>,
        chats: ChatStore,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.into(),
            variant,
            connection,
            chats,
            created_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        })
    }

    /// Encode and send a payload, applying the interactive-message
    /// compatibility patch at the wire boundary.
    pub async fn send(
        &self,
        to: &Address,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, TransportError> {
        let wire = patch_before_send(payload.to_wire());
        self.connection.send(to, &wire).await
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Process-wide map of live session handles. Each operation is a single
/// lock acquisition; compound check-then-act sequences belong to the
/// controller's per-id creation guard, not here.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under its session id, returning any handle it
    /// replaced.
    pub async fn register(&self, handle: Arc<SessionHandle>) -> Option<Arc<SessionHandle>> {
        self.inner
            .write()
            .await
            .insert(handle.session_id.clone(), handle)
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.write().await.remove(id)
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }

    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
