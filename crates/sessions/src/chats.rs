use std::{
    collections::HashMap,
    path::Path,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    anyhow::Result,
    serde::{Deserialize, Serialize},
};

use waygate_transport::Address;

/// A single chat in the metadata snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub last_message_at: u64,
    pub message_count: u32,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// In-memory chat metadata accumulated over a session's lifetime, keyed by
/// remote address. Loaded from the snapshot file at session creation and
/// written back in bulk at process shutdown — an abnormal exit loses what
/// accumulated since the last clean shutdown.
#[derive(Debug, Default)]
pub struct ChatStore {
    entries: Mutex<HashMap<String, ChatEntry>>,
}

impl ChatStore {
    /// Load the snapshot at `path`, or start empty when it is missing or
    /// unreadable.
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Serialize the snapshot to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = self.snapshot();
        let data = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Record an inbound message from `remote`, creating the chat entry on
    /// first contact.
    pub fn record_message(&self, remote: &Address) {
        let now = now_ms();
        if let Ok(mut entries) = self.entries.lock() {
            entries
                .entry(remote.as_str().to_string())
                .and_modify(|e| {
                    e.message_count += 1;
                    e.last_message_at = now;
                })
                .or_insert_with(|| ChatEntry {
                    id: remote.as_str().to_string(),
                    name: None,
                    last_message_at: now,
                    message_count: 1,
                });
        }
    }

    /// List chats of one kind (group or direct user), most recent first.
    pub fn list(&self, group: bool) -> Vec<ChatEntry> {
        let mut chats: Vec<ChatEntry> = self
            .snapshot()
            .into_values()
            .filter(|e| {
                let addr = Address::from_raw(e.id.clone());
                if group { addr.is_group() } else { addr.is_user() }
            })
            .collect();
        chats.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        chats
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> HashMap<String, ChatEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_list_split_by_kind() {
        let store = ChatStore::default();
        store.record_message(&Address::phone("628123"));
        store.record_message(&Address::phone("628123"));
        store.record_message(&Address::group("99-11"));

        let users = store.list(false);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].message_count, 2);

        let groups = store.list(true);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "99-11@g.us");
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha_store.json");

        let store = ChatStore::default();
        store.record_message(&Address::phone("628123"));
        store.save(&path).unwrap();

        let reloaded = ChatStore::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.list(false)[0].id, "628123@s.whatsapp.net");
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::load(&dir.path().join("nope.json"));
        assert!(store.is_empty());
    }
}
