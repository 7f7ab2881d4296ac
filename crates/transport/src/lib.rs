//! Transport provider capability boundary.
//!
//! The gateway never talks to the messaging network directly; it goes through
//! the [`TransportProvider`] / [`TransportConnection`] traits defined here.
//! A provider hands back an opaque connection plus a typed event inbox, and
//! the session layer drives its state machine off that inbox. The wire
//! protocol itself (handshake, encryption, framing) is owned by whatever
//! adapter implements these traits.

pub mod address;
pub mod connection;
pub mod event;
pub mod memory;
pub mod patch;
pub mod payload;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use {
    address::Address,
    connection::{
        ClientIdentity, ConnectOptions, Credentials, SendReceipt, TransportConnection,
        TransportError, TransportHandle, TransportProvider,
    },
    event::{ConnectionUpdate, DisconnectStatus, InboundMessage, MessageClass, TransportEvent},
    payload::{FileKind, OutboundPayload},
};
