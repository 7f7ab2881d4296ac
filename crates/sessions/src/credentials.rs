use std::{
    fs, io,
    path::{Path, PathBuf},
};

use {serde_json::Value, tracing::debug};

use waygate_transport::Credentials;

use crate::error::SessionError;

const MAX_SESSION_ID_LEN: usize = 64;

/// Auth mode of a session. `Legacy` is a reserved tag: its on-disk naming
/// is recognized, but creation for it always fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVariant {
    Standard,
    Legacy,
}

impl SessionVariant {
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::Legacy)
    }
}

/// What a credential probe found on disk.
#[derive(Debug, Clone)]
pub enum SessionStatus {
    Connected { user: Option<Value> },
    Disconnected,
}

/// Session ids become path components, so they are validated before any
/// path is built from them.
pub fn validate_session_id(id: &str) -> Result<(), SessionError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok { Ok(()) } else { Err(SessionError::InvalidSessionId) }
}

/// Decode a sessions-root entry name into its variant and session id.
/// Snapshot files (`<id>_store.json`) and foreign names decode to `None`.
pub fn decode_entry_name(name: &str) -> Option<(SessionVariant, String)> {
    if name.ends_with("_store.json") {
        return None;
    }
    if let Some(id) = name.strip_prefix("md_") {
        return Some((SessionVariant::Standard, id.to_string()));
    }
    if let Some(rest) = name.strip_prefix("legacy_") {
        let id = rest.strip_suffix(".json").unwrap_or(rest);
        return Some((SessionVariant::Legacy, id.to_string()));
    }
    None
}

/// Filesystem-backed persistence for per-session auth material and chat
/// metadata snapshots.
///
/// Layout under the root: `md_<id>/creds.json` for standard sessions,
/// `legacy_<id>.json` reserved for the legacy variant, `<id>_store.json`
/// for the chat snapshot.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.root.join(format!("md_{id}"))
    }

    fn legacy_file(&self, id: &str) -> PathBuf {
        self.root.join(format!("legacy_{id}.json"))
    }

    fn creds_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("creds.json")
    }

    /// Path of the chat metadata snapshot for a session.
    pub fn snapshot_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}_store.json"))
    }

    /// Load existing auth material, or produce fresh empty material for a
    /// session that has never paired.
    pub fn load(&self, id: &str) -> Result<Credentials, SessionError> {
        let path = self.creds_path(id);
        if !path.exists() {
            return Ok(Credentials::empty());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Overwrite the stored auth material unconditionally (last-write-wins,
    /// no versioning).
    pub fn persist(&self, id: &str, credentials: &Credentials) -> Result<(), SessionError> {
        let dir = self.session_dir(id);
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string(credentials)?;
        fs::write(self.creds_path(id), data)?;
        Ok(())
    }

    /// Remove the credential directory and the snapshot file. Already-absent
    /// paths are success, not errors.
    pub fn delete_all(&self, variant: SessionVariant, id: &str) -> Result<(), SessionError> {
        match variant {
            SessionVariant::Standard => ignore_not_found(fs::remove_dir_all(self.session_dir(id)))?,
            SessionVariant::Legacy => ignore_not_found(fs::remove_file(self.legacy_file(id)))?,
        }
        ignore_not_found(fs::remove_file(self.snapshot_path(id)))?;
        debug!(session_id = %id, "on-disk session state removed");
        Ok(())
    }

    /// Probe the on-disk credential. A parseable `creds.json` means the
    /// session can resume without pairing; only the identity part of the
    /// material is surfaced, never the secrets.
    pub fn status(&self, id: &str) -> SessionStatus {
        let raw = match fs::read_to_string(self.creds_path(id)) {
            Ok(raw) => raw,
            Err(_) => return SessionStatus::Disconnected,
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(material) => SessionStatus::Connected {
                user: material.get("me").cloned(),
            },
            Err(_) => SessionStatus::Disconnected,
        }
    }

    /// Enumerate persisted sessions by decoding root entry names.
    pub fn scan(&self) -> Result<Vec<(SessionVariant, String)>, SessionError> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(decoded) = decode_entry_name(name) {
                found.push(decoded);
            }
        }
        found.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(found)
    }
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
