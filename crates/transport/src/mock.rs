//! Scriptable provider for tests.
//!
//! Each `connect` pops the next scripted event sequence and preloads it
//! into the handle's inbox, so session-layer tests can replay exact wire
//! histories (pairing, open, close cascades) without a network.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    address::Address,
    connection::{
        ConnectOptions, SendReceipt, TransportConnection, TransportError, TransportHandle,
        TransportProvider,
    },
    event::TransportEvent,
};

#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
    connects: AtomicUsize,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    senders: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the event sequence the next `connect` call will replay.
    pub fn script_connection(&self, events: Vec<TransportEvent>) {
        self.scripts.lock().unwrap().push_back(events);
    }

    /// How many times `connect` has been called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The connection objects handed out so far, oldest first.
    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().unwrap().clone()
    }

    /// Push an event into the most recent connection's inbox.
    pub async fn emit(&self, event: TransportEvent) {
        let tx = self.senders.lock().unwrap().last().cloned();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl TransportProvider for MockProvider {
    async fn connect(&self, _opts: ConnectOptions) -> Result<TransportHandle, TransportError> {
        // Simulate a network round-trip so concurrent callers interleave.
        tokio::task::yield_now().await;

        let events = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(events.len() + 16);
        for event in events {
            let _ = tx.send(event).await;
        }

        let connection = Arc::new(MockConnection::default());
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connections.lock().unwrap().push(Arc::clone(&connection));
        self.senders.lock().unwrap().push(tx);

        Ok(TransportHandle {
            connection,
            events: rx,
        })
    }
}

/// Records sends; addresses in `fail_for` error instead.
#[derive(Default)]
pub struct MockConnection {
    sent: Mutex<Vec<(Address, serde_json::Value)>>,
    fail_for: Mutex<HashSet<String>>,
    logouts: AtomicUsize,
    closes: AtomicUsize,
}

impl MockConnection {
    /// Make sends to this address fail with a rejected error.
    pub fn fail_sends_to(&self, address: &Address) {
        self.fail_for
            .lock()
            .unwrap()
            .insert(address.as_str().to_string());
    }

    pub fn sent(&self) -> Vec<(Address, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnection for MockConnection {
    async fn send(
        &self,
        to: &Address,
        body: &serde_json::Value,
    ) -> Result<SendReceipt, TransportError> {
        if self.fail_for.lock().unwrap().contains(to.as_str()) {
            return Err(TransportError::Rejected(format!("scripted failure for {to}")));
        }
        self.sent.lock().unwrap().push((to.clone(), body.clone()));
        Ok(SendReceipt {
            message_id: uuid::Uuid::new_v4().to_string(),
            to: to.clone(),
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        })
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
