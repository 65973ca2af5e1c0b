//! Generation request types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a request identifies its target channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    /// Numeric channel id.
    Id(u64),
    /// Channel name. Must be resolved to an id before the pipeline runs.
    Name(String),
}

impl From<u64> for ChannelRef {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ChannelRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// An input file attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Raw file bytes (base64 on the wire).
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// MIME type.
    pub mime: String,
    /// Original file name.
    pub filename: String,
}

impl InputFile {
    /// Creates a new input file.
    #[must_use]
    pub fn new(data: Vec<u8>, mime: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
            filename: filename.into(),
        }
    }

    /// Returns the size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the file has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Target channel.
    pub channel: ChannelRef,
    /// The prompt text.
    #[serde(default)]
    pub prompt: String,
    /// Input files.
    #[serde(default)]
    pub files: Vec<InputFile>,
    /// Free-form generation parameters.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Requesting user id, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    /// Opaque originating session (chat platform, console, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<serde_json::Value>,
}

impl GenerationRequest {
    /// Creates a request for a channel with a prompt.
    #[must_use]
    pub fn new(channel: impl Into<ChannelRef>, prompt: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            prompt: prompt.into(),
            files: Vec::new(),
            parameters: HashMap::new(),
            uid: None,
            session: None,
        }
    }

    /// Attaches an input file.
    #[must_use]
    pub fn with_file(mut self, file: InputFile) -> Self {
        self.files.push(file);
        self
    }

    /// Sets a generation parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Sets the user id.
    #[must_use]
    pub const fn with_uid(mut self, uid: i64) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Sets the originating session.
    #[must_use]
    pub fn with_session(mut self, session: serde_json::Value) -> Self {
        self.session = Some(session);
        self
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
