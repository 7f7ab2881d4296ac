use serde_json::Value;

use crate::{address::Address, connection::Credentials};

/// Why the network closed a connection. Providers map their wire-level
/// status codes onto this set; the session layer only branches on
/// [`DisconnectStatus::LoggedOut`] and [`DisconnectStatus::RestartRequired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectStatus {
    /// The credential was revoked remotely; the session is unrecoverable.
    LoggedOut,
    /// The server asked for an immediate reconnect.
    RestartRequired,
    ConnectionLost,
    ConnectionReplaced,
    TimedOut,
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Open,
    Closed(DisconnectStatus),
}

/// Delivery class of an inbound batch. Only `Notify` messages are live
/// traffic; the rest are history replays or appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Notify,
    Append,
    Other,
}

/// An inbound message as surfaced by the provider.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub remote: Address,
    pub from_me: bool,
    pub class: MessageClass,
    /// Plain body text, if any.
    pub conversation: Option<String>,
    /// Display text of a selected button reply.
    pub button_reply: Option<String>,
    /// Title of a selected list reply.
    pub list_reply: Option<String>,
}

impl InboundMessage {
    /// Resolve the display text: a list reply wins over a button reply,
    /// which wins over the plain body. Empty text resolves to `None`.
    pub fn display_text(&self) -> Option<&str> {
        self.list_reply
            .as_deref()
            .or(self.button_reply.as_deref())
            .or(self.conversation.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Typed inbox events emitted by a live connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Auth material changed; persist immediately.
    CredentialsChanged(Credentials),
    /// A pairing code was issued for an unauthenticated connection.
    PairingCode(String),
    Connection(ConnectionUpdate),
    Inbound(InboundMessage),
    /// Bulk history backfill. Only the unsupported legacy mode consumes
    /// this; carried as an opaque blob.
    HistorySync(Value),
}
