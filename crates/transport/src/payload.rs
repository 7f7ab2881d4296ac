use std::path::Path;

use serde_json::{Value, json};

/// Attachment category, decided by file extension the way the network's
/// message schema expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Document,
    Unknown,
}

impl FileKind {
    const IMAGE_EXTENSIONS: &'static [&'static str] = &["jpg", "jpeg", "png", "webp"];
    const DOCUMENT_EXTENSIONS: &'static [&'static str] = &["pdf", "docx", "xlsx", "csv", "txt"];

    /// Categorize a file URL by its lowercase extension.
    pub fn from_url(url: &str) -> Self {
        let ext = Path::new(url)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if Self::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if Self::DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            Self::Document
        } else {
            Self::Unknown
        }
    }

    /// The key the wire schema uses for this category.
    pub fn key(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Unknown => "unknown",
        }
    }
}

/// An outbound message body, before wire encoding.
#[derive(Debug, Clone)]
pub enum OutboundPayload {
    /// Plain text.
    Text { body: String },
    /// Attachment by URL with a caption; the category key is derived from
    /// the file extension.
    Media { caption: String, url: String },
    /// Pre-shaped interactive body (buttons / list). Sent as-is; the
    /// compatibility patch wraps it at the send boundary.
    Interactive { body: Value },
}

impl OutboundPayload {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn media(caption: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Media {
            caption: caption.into(),
            url: url.into(),
        }
    }

    /// Encode into the wire-level JSON message body.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Text { body } => json!({ "text": body }),
            Self::Media { caption, url } => {
                let kind = FileKind::from_url(url);
                let mut map = serde_json::Map::new();
                map.insert("caption".into(), Value::String(caption.clone()));
                map.insert(kind.key().into(), json!({ "url": url }));
                Value::Object(map)
            },
            Self::Interactive { body } => body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_by_extension() {
        assert_eq!(FileKind::from_url("https://x/y/photo.JPG"), FileKind::Image);
        assert_eq!(FileKind::from_url("report.pdf"), FileKind::Document);
        assert_eq!(FileKind::from_url("archive.zip"), FileKind::Unknown);
        assert_eq!(FileKind::from_url("no-extension"), FileKind::Unknown);
    }

    #[test]
    fn text_wire_shape() {
        let wire = OutboundPayload::text("hello").to_wire();
        assert_eq!(wire, json!({ "text": "hello" }));
    }

    #[test]
    fn media_wire_shape_uses_category_key() {
        let wire = OutboundPayload::media("see this", "https://x/pic.png").to_wire();
        assert_eq!(
            wire,
            json!({ "caption": "see this", "image": { "url": "https://x/pic.png" } })
        );
    }
}
