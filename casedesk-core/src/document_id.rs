//! Store-assigned document identities.
//!
//! Identities are random 16 byte values. Outside the store they travel as
//! bs58check strings (the external form). Inside a document the opaque
//! internal form is written as `{"$oid": "<bs58check>"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Key of the internal identity wrapper object.
pub const OID_KEY: &str = "$oid";

/// Errors that can occur with document IDs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentIdError {
    #[error("Invalid bs58check encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid document ID length: expected 16 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Identity must be a string or {{\"$oid\": string}}, got {0}")]
    UnexpectedType(String),
}

/// An opaque, store-assigned document identity.
///
/// Displays and serializes as its external bs58check string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId([u8; 16]);

impl DocumentId {
    /// Generate a new random document ID
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// Create a document ID from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a document ID from a stored BLOB column.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentIdError> {
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| DocumentIdError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Encode as the external (printable) form.
    pub fn to_external(&self) -> String {
        bs58::encode(&self.0).with_check().into_string()
    }

    /// Decode the external (printable) form.
    pub fn parse(s: &str) -> Result<Self, DocumentIdError> {
        let bytes = bs58::decode(s.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| DocumentIdError::InvalidEncoding(e.to_string()))?;

        Self::from_slice(&bytes)
    }

    /// The internal representation used inside documents.
    pub fn to_internal(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(OID_KEY.to_string(), Value::String(self.to_external()));
        Value::Object(map)
    }

    /// Resolve an identity from a document value in either form.
    ///
    /// Accepts the external string or the internal `{"$oid": ...}` object;
    /// anything else is rejected rather than coerced.
    pub fn from_value(value: &Value) -> Result<Self, DocumentIdError> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Object(map) if map.len() == 1 => match map.get(OID_KEY) {
                Some(Value::String(s)) => Self::parse(s),
                _ => Err(DocumentIdError::UnexpectedType(value.to_string())),
            },
            other => Err(DocumentIdError::UnexpectedType(other.to_string())),
        }
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_external())
    }
}

impl std::str::FromStr for DocumentId {
    type Err = DocumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DocumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_external())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}
