//! Entity and value types shared by every message shape.
//!
//! These are plain owned records. Optional fields use `String::new()` /
//! empty collections as their "unset" value and are skipped on encode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// MIME type used by [`MessageInfo::text`] and [`MessageInfo::set_text`].
pub const TEXT_PLAIN: &str = "text/plain";

/// Returns true if `msg_type` is `part` or a sub-type of it.
///
/// Type tags are `/`-delimited: `msg/foo.bar` is of type `msg`, but
/// `msg2` is not.
pub fn is_type(msg_type: &str, part: &str) -> bool {
    match msg_type.strip_prefix(part) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Accepts `null` for any field whose type has a sensible default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// EntityInfo
// ---------------------------------------------------------------------------

/// An entity with an ID, optional names and a category tag.
///
/// The tag is short: `net`, `user`, `conn`, `member` and so on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(rename = "dispName", default, skip_serializing_if = "String::is_empty")]
    pub disp_name: String,

    #[serde(rename = "type", default)]
    pub kind: String,
}

impl EntityInfo {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// The name, or the ID when no name is set.
    pub fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// The display name, or [`name`](Self::name) when none is set.
    pub fn display_name(&self) -> &str {
        if self.disp_name.is_empty() {
            self.name()
        } else {
            &self.disp_name
        }
    }

    /// Sets the name and display name without storing redundant values.
    ///
    /// Set the ID first: `name` is cleared when it equals the ID, and the
    /// display name is cleared when it equals the resulting `name()`.
    pub fn set_name(&mut self, name: &str, display_name: &str) {
        self.name = if name == self.id {
            String::new()
        } else {
            name.to_string()
        };
        self.disp_name = if display_name == self.name() {
            String::new()
        } else {
            display_name.to_string()
        };
    }

    pub fn is_type(&self, part: &str) -> bool {
        is_type(&self.kind, part)
    }

    /// True when every field is empty.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
            && self.name.is_empty()
            && self.disp_name.is_empty()
            && self.kind.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MessageInfo
// ---------------------------------------------------------------------------

/// A message body in one MIME type. Text is UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub content: String,
}

impl Message {
    pub fn is_valid(&self) -> bool {
        !self.kind.is_empty()
    }
}

/// A message in one or more formats, at most one entry per MIME type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageInfo(pub Vec<Message>);

impl MessageInfo {
    /// A message holding only `text/plain` content.
    pub fn from_text(content: impl Into<String>) -> Self {
        let mut info = Self::default();
        info.set_text(content);
        info
    }

    /// Replaces the content for `mime` in place, or appends a new entry.
    pub fn set(&mut self, mime: &str, content: impl Into<String>) {
        let content = content.into();
        match self.0.iter_mut().find(|m| m.kind == mime) {
            Some(existing) => existing.content = content,
            None => self.0.push(Message {
                kind: mime.to_string(),
                content,
            }),
        }
    }

    pub fn set_text(&mut self, content: impl Into<String>) {
        self.set(TEXT_PLAIN, content);
    }

    /// The entry for `mime`, or an empty message.
    pub fn get(&self, mime: &str) -> Message {
        self.0
            .iter()
            .find(|m| m.kind == mime)
            .cloned()
            .unwrap_or_default()
    }

    /// The `text/plain` content, or an empty string.
    pub fn text(&self) -> &str {
        self.0
            .iter()
            .find(|m| m.kind == TEXT_PLAIN)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ValuesInfo
// ---------------------------------------------------------------------------

/// One `[key, value]` pair, encoded as a 2-element JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue(pub String, pub String);

impl KeyValue {
    pub fn key(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &str {
        &self.1
    }
}

/// Auxiliary key/value pairs in order. Keys may repeat.
///
/// Protocol-specific keys are `PROTO.*`; implementation-specific keys are
/// `x-NAME.*` or `PROTO.x-NAME.*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesInfo(pub Vec<KeyValue>);

impl ValuesInfo {
    /// The first value for `key`, if any.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|kv| kv.0 == key).map(|kv| kv.value())
    }

    /// The first value for `key`, or an empty string.
    pub fn get(&self, key: &str) -> &str {
        self.lookup(key).unwrap_or("")
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|kv| kv.0 == key)
            .map(|kv| kv.value())
            .collect()
    }

    /// Updates the first pair with `key`, or appends a new pair.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.0.iter_mut().find(|kv| kv.0 == key) {
            Some(kv) => kv.1 = value,
            None => self.0.push(KeyValue(key.to_string(), value)),
        }
        self
    }

    /// Appends a pair even if `key` already exists.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push(KeyValue(key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MediaInfo
// ---------------------------------------------------------------------------

/// Media such as an image or video, addressed by URL.
///
/// `kind` is a MIME type or a hint like `image/*`. Media without a URL
/// counts as absent and is skipped on encode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub url: String,

    #[serde(rename = "thumb", default, skip_serializing_if = "String::is_empty")]
    pub thumb_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ValuesInfo::is_empty"
    )]
    pub values: ValuesInfo,
}

impl MediaInfo {
    pub fn new(kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.url
    }

    /// The explicit name, else the file name taken from the URL.
    pub fn name(&self) -> String {
        if self.name.is_empty() {
            self.url_name()
        } else {
            self.name.clone()
        }
    }

    pub fn display_name(&self) -> String {
        self.name()
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }

    /// Last path segment of the URL with query and fragment removed,
    /// percent-decoded when that yields something, else the whole URL.
    fn url_name(&self) -> String {
        let path = match self.url.find(['?', '#']) {
            Some(end) => &self.url[..end],
            None => &self.url,
        };
        let base = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if base.is_empty() || base == "." {
            return self.url.clone();
        }
        match urlencoding::decode(&base.replace('+', " ")) {
            Ok(decoded) if !decoded.is_empty() => decoded.into_owned(),
            _ => base.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// UserInfo / MemberInfo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: EntityInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "MediaInfo::is_empty"
    )]
    pub photo: MediaInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ValuesInfo::is_empty"
    )]
    pub values: ValuesInfo,
}

/// A chat member: the user plus membership-scoped values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub info: UserInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ValuesInfo::is_empty"
    )]
    pub values: ValuesInfo,
}

// ===========================================================================
// Tests
// ===========================================================================
