//! Output assets produced by a generation request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The media type of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A still image.
    Image,
    /// A video clip.
    Video,
    /// An audio clip.
    Audio,
    /// Plain text.
    Text,
    /// Any other file.
    File,
}

/// A typed output asset.
///
/// Either `url` or `content` is usually set; storage middlewares may replace
/// one with the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// The media type.
    pub kind: AssetKind,

    /// Where the asset can be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Inline content (text, or base64 for small binaries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

impl Asset {
    /// Creates an empty asset of the given kind.
    #[must_use]
    pub const fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            url: None,
            content: None,
            mime: None,
            meta: None,
        }
    }

    /// Creates an asset that points at a URL.
    #[must_use]
    pub fn from_url(kind: AssetKind, url: impl Into<String>) -> Self {
        Self::new(kind).with_url(url)
    }

    /// Creates a text asset.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(AssetKind::Text)
            .with_content(content)
            .with_mime("text/plain")
    }

    /// Sets the URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the inline content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_builder() {
        let asset = Asset::from_url(AssetKind::Image, "https://cdn.example/a.png")
            .with_mime("image/png")
            .with_meta("width", serde_json::json!(512));

        assert_eq!(asset.kind, AssetKind::Image);
        assert_eq!(asset.url.as_deref(), Some("https://cdn.example/a.png"));
        assert_eq!(asset.meta.unwrap().get("width"), Some(&serde_json::json!(512)));
    }

    #[test]
    fn test_asset_serialize_skips_empty_fields() {
        let json = serde_json::to_value(Asset::text("hello")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "text", "content": "hello", "mime": "text/plain"})
        );
    }
}
