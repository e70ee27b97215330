//! Directory entry and change types
//!
//! Identifiers, attribute maps and the change events produced by the consumer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Protocol-assigned entry identifier (the entryUUID carried in Sync State
/// controls). Stable across renames within a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(Vec<u8>);

impl EntryId {
    /// Create an identifier from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for EntryId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.as_bytes().to_vec())
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Uuid::from_slice(&self.0) {
            Ok(uuid) => write!(f, "{}", uuid.hyphenated()),
            Err(_) => write!(f, "{}", hex::encode(&self.0)),
        }
    }
}

/// A single attribute value as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Value the directory returned as valid UTF-8.
    Text(String),
    /// Value the directory returned as raw octets.
    Binary(Vec<u8>),
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

/// Attribute name to ordered values.
pub type AttributeMap = BTreeMap<String, Vec<AttributeValue>>;

/// Last known state of a live entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Distinguished name at the time of the last update.
    pub dn: String,
    /// Full attribute set from the last update.
    pub attributes: AttributeMap,
}

impl Entry {
    /// Create an entry from its DN and attribute set.
    pub fn new(dn: impl Into<String>, attributes: AttributeMap) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }
}

/// Kind of change detected for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The entry was not known before.
    Add,
    /// The entry was known and has been sent again.
    Modify,
    /// The entry no longer exists.
    Delete,
}

impl ChangeKind {
    /// Wire name used in the published payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected change, handed to the publisher and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// DN of the changed entry.
    pub dn: String,
    /// DN recorded with the old attributes. Differs from `dn` after a rename;
    /// `None` for add.
    pub old_dn: Option<String>,
    /// The type of change.
    pub kind: ChangeKind,
    /// Attributes before the change (empty for add).
    pub old_attributes: AttributeMap,
    /// Attributes after the change (empty for delete).
    pub new_attributes: AttributeMap,
}

impl ChangeEvent {
    /// Create a change for a newly seen entry.
    pub fn added(dn: impl Into<String>, attributes: AttributeMap) -> Self {
        Self {
            dn: dn.into(),
            old_dn: None,
            kind: ChangeKind::Add,
            old_attributes: AttributeMap::new(),
            new_attributes: attributes,
        }
    }

    /// Create a change for an entry that was sent again. `previous` is the
    /// stored state before this update.
    pub fn modified(dn: impl Into<String>, previous: Entry, new: AttributeMap) -> Self {
        Self {
            dn: dn.into(),
            old_dn: Some(previous.dn),
            kind: ChangeKind::Modify,
            old_attributes: previous.attributes,
            new_attributes: new,
        }
    }

    /// Create a change for a removed entry.
    pub fn deleted(dn: impl Into<String>, attributes: AttributeMap) -> Self {
        let dn = dn.into();
        Self {
            old_dn: Some(dn.clone()),
            dn,
            kind: ChangeKind::Delete,
            old_attributes: attributes,
            new_attributes: AttributeMap::new(),
        }
    }
}
