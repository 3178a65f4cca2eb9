//! Resource entry extraction and serialization.
//!
//! The backup engine stores snapshots as raw bytes and never interprets
//! them itself. Diffing and selective restores go through a
//! [`ResourceCodec`], looked up by the file's [`FormatHint`] in a
//! [`CodecRegistry`]. Only a flat JSON codec ships with this crate; other
//! formats are registered by the embedding application.

use crate::error::{BackupError, BackupResult};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by an extractor or serializer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{format}: {message}")]
pub struct ResourceError {
    /// Format the codec handles.
    pub format: String,
    /// What went wrong.
    pub message: String,
}

impl ResourceError {
    pub fn new(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            message: message.into(),
        }
    }
}

/// A single localized string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceEntry {
    pub value: String,
    pub comment: Option<String>,
}

impl ResourceEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Ordered mapping of resource keys to entries, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceEntries {
    entries: IndexMap<String, ResourceEntry>,
}

impl ResourceEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build entries from `(key, value)` pairs without comments.
    pub fn from_values<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), ResourceEntry::new(v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ResourceEntry> {
        self.entries.get(key)
    }

    /// The value stored under `key`, if any.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite an entry.
    ///
    /// Overwriting keeps the key's original position; new keys are appended.
    pub fn insert(&mut self, key: impl Into<String>, entry: ResourceEntry) -> Option<ResourceEntry> {
        self.entries.insert(key.into(), entry)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, ResourceEntry)> for ResourceEntries {
    fn from_iter<T: IntoIterator<Item = (String, ResourceEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Identifies the syntax of a resource file: its lowercase extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatHint(String);

impl FormatHint {
    pub fn new(format: impl AsRef<str>) -> Self {
        Self(format.as_ref().trim_start_matches('.').to_lowercase())
    }

    /// Derive the hint from a file path or name.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        lrm_util::path::extension_of(path.as_ref()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extractor and serializer for one resource file syntax.
pub trait ResourceCodec: Send + Sync {
    /// Format name, used in error messages.
    fn format(&self) -> &str;

    /// Parse file text into ordered entries.
    fn extract_entries(&self, content: &str) -> Result<ResourceEntries, ResourceError>;

    /// Emit valid file text for the given entries.
    fn serialize_entries(&self, entries: &ResourceEntries) -> Result<String, ResourceError>;
}

/// Codecs keyed by format hint.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<FormatHint, Arc<dyn ResourceCodec>>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(FormatHint::new("json"), Arc::new(JsonCodec));
        registry
    }

    /// Register (or replace) the codec for a format.
    pub fn register(&mut self, hint: FormatHint, codec: Arc<dyn ResourceCodec>) {
        self.codecs.insert(hint, codec);
    }

    pub fn get(&self, hint: &FormatHint) -> Option<Arc<dyn ResourceCodec>> {
        self.codecs.get(hint).cloned()
    }

    pub fn supports(&self, hint: &FormatHint) -> bool {
        self.codecs.contains_key(hint)
    }

    fn require(&self, hint: &FormatHint) -> BackupResult<Arc<dyn ResourceCodec>> {
        self.get(hint)
            .ok_or_else(|| BackupError::UnsupportedFormat(hint.to_string()))
    }

    /// Extract entries from `content` using the codec for `hint`.
    pub fn extract(&self, content: &str, hint: &FormatHint) -> BackupResult<ResourceEntries> {
        Ok(self.require(hint)?.extract_entries(content)?)
    }

    /// Serialize entries using the codec for `hint`.
    pub fn serialize(&self, entries: &ResourceEntries, hint: &FormatHint) -> BackupResult<String> {
        Ok(self.require(hint)?.serialize_entries(entries)?)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<&str> = self.codecs.keys().map(FormatHint::as_str).collect();
        formats.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("formats", &formats)
            .finish()
    }
}

/// Decode snapshot or live-file bytes as UTF-8 text.
pub(crate) fn decode_text(bytes: &[u8], hint: &FormatHint) -> BackupResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        BackupError::Serialization(ResourceError::new(
            hint.as_str(),
            format!("content is not valid UTF-8: {e}"),
        ))
    })
}

/// Flat JSON resource files.
///
/// ```json
/// {
///   "Greeting": "Hello",
///   "Farewell": { "value": "Bye", "comment": "Shown on logout" }
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    const FORMAT: &'static str = "json";

    fn error(message: impl Into<String>) -> ResourceError {
        ResourceError::new(Self::FORMAT, message)
    }

    fn entry_from_value(key: &str, value: Value) -> Result<ResourceEntry, ResourceError> {
        match value {
            Value::String(s) => Ok(ResourceEntry::new(s)),
            Value::Object(mut obj) => {
                let text = match obj.remove("value") {
                    Some(Value::String(s)) => s,
                    _ => {
                        return Err(Self::error(format!(
                            "entry `{key}` must have a string `value`"
                        )))
                    }
                };
                let comment = match obj.remove("comment") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(c)) => Some(c),
                    Some(_) => {
                        return Err(Self::error(format!(
                            "comment of entry `{key}` must be a string"
                        )))
                    }
                };
                Ok(ResourceEntry {
                    value: text,
                    comment,
                })
            }
            other => Err(Self::error(format!(
                "entry `{key}` must be a string or an object, found {other}"
            ))),
        }
    }
}

impl ResourceCodec for JsonCodec {
    fn format(&self) -> &str {
        Self::FORMAT
    }

    fn extract_entries(&self, content: &str) -> Result<ResourceEntries, ResourceError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        if content.trim().is_empty() {
            return Ok(ResourceEntries::new());
        }

        let root: Value =
            serde_json::from_str(content).map_err(|e| Self::error(e.to_string()))?;
        let Value::Object(map) = root else {
            return Err(Self::error("top-level value must be an object"));
        };

        let mut entries = ResourceEntries::new();
        for (key, value) in map {
            let entry = Self::entry_from_value(&key, value)?;
            entries.insert(key, entry);
        }
        Ok(entries)
    }

    fn serialize_entries(&self, entries: &ResourceEntries) -> Result<String, ResourceError> {
        let mut map = Map::new();
        for (key, entry) in entries.iter() {
            let value = match &entry.comment {
                None => Value::String(entry.value.clone()),
                Some(comment) => {
                    let mut obj = Map::new();
                    obj.insert("value".to_string(), Value::String(entry.value.clone()));
                    obj.insert("comment".to_string(), Value::String(comment.clone()));
                    Value::Object(obj)
                }
            };
            map.insert(key.to_string(), value);
        }

        let mut text =
            serde_json::to_string_pretty(&Value::Object(map)).map_err(|e| Self::error(e.to_string()))?;
        text.push('\n');
        Ok(text)
    }
}
