//! Session lifecycle management.
//!
//! One persistent, authenticated connection per session id. The controller
//! opens connections through the transport capability, drives a per-session
//! state machine off the typed event inbox (pairing, open, close,
//! credential updates, inbound traffic), persists credentials across
//! restarts, reconnects within a bounded budget, and hands the pairing QR
//! code to the one HTTP caller waiting on the creation attempt.
//!
//! Credentials live under the sessions root as `md_<id>/creds.json`, with
//! chat metadata snapshots beside them as `<id>_store.json`; directory
//! names double as the rehydration index at startup.

pub mod chats;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod handoff;
pub mod registry;
pub mod retry;

pub use {
    chats::{ChatEntry, ChatStore},
    controller::{
        ControllerOptions, DeliveryNotification, LogSink, NotificationSink, SessionController,
    },
    credentials::{CredentialStore, SessionStatus, SessionVariant, validate_session_id},
    error::SessionError,
    handoff::{CreateOutcome, QrWaiter},
    registry::{SessionHandle, SessionRegistry},
    retry::ReconnectPolicy,
};
