//! Outbound message compatibility patch.
//!
//! Interactive (button / list) bodies must travel inside a view-once
//! envelope carrying device-list metadata, or older peers reject them.
//! Applied to every outbound body at the send boundary; non-interactive
//! bodies pass through untouched.

use serde_json::{Value, json};

const DEVICE_LIST_METADATA_VERSION: u64 = 2;

fn is_interactive(body: &Value) -> bool {
    body.get("buttonsMessage").is_some() || body.get("listMessage").is_some()
}

/// Wrap an interactive body in the view-once compatibility envelope,
/// preserving all original fields alongside the injected metadata.
pub fn patch_before_send(body: Value) -> Value {
    if !is_interactive(&body) {
        return body;
    }

    let mut inner = serde_json::Map::new();
    inner.insert(
        "messageContextInfo".into(),
        json!({
            "deviceListMetadataVersion": DEVICE_LIST_METADATA_VERSION,
            "deviceListMetadata": {},
        }),
    );
    if let Value::Object(fields) = body {
        inner.extend(fields);
    }

    json!({ "viewOnceMessage": { "message": Value::Object(inner) } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let body = json!({ "text": "hi" });
        assert_eq!(patch_before_send(body.clone()), body);
    }

    #[test]
    fn buttons_body_gets_wrapped() {
        let body = json!({ "buttonsMessage": { "contentText": "pick one" } });
        let patched = patch_before_send(body);
        let inner = &patched["viewOnceMessage"]["message"];
        assert_eq!(
            inner["messageContextInfo"]["deviceListMetadataVersion"],
            json!(2)
        );
        assert_eq!(inner["buttonsMessage"]["contentText"], json!("pick one"));
    }

    #[test]
    fn list_body_gets_wrapped() {
        let patched = patch_before_send(json!({ "listMessage": { "title": "menu" } }));
        assert!(patched["viewOnceMessage"]["message"]["listMessage"].is_object());
    }

    #[test]
    fn media_body_passes_through() {
        let body = json!({ "caption": "c", "image": { "url": "u" } });
        assert_eq!(patch_before_send(body.clone()), body);
    }
}
