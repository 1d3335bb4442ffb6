//! Serialization codecs for the negotiation payload.
//!
//! The child process serializes a [`PropertiesSnapshot`] to its stdout; host
//! and child must agree on the codec, so the host passes the codec name to
//! the worker out of band. CBOR is the preferred compact binary encoding,
//! JSON the text fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable snapshot of a VM's system properties.
///
/// Obtained once per backend via the child-process negotiation and cached
/// process-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertiesSnapshot(
    /// Property name → string value.
    pub BTreeMap<String, String>,
);

impl PropertiesSnapshot {
    /// Look up a property value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of properties in the snapshot.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot holds no properties.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for PropertiesSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A property-snapshot codec usable on both ends of the negotiation.
pub trait PropsCodec: Send + Sync {
    /// Stable codec name, passed to the worker via `--codec`.
    fn name(&self) -> &'static str;

    /// Encode a snapshot into bytes.
    fn encode(&self, props: &PropertiesSnapshot) -> Result<Vec<u8>>;

    /// Decode a snapshot from bytes.
    fn decode(&self, bytes: &[u8]) -> Result<PropertiesSnapshot>;
}

/// Compact binary codec (CBOR). The preferred default.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl PropsCodec for CborCodec {
    fn name(&self) -> &'static str {
        "cbor"
    }

    fn encode(&self, props: &PropertiesSnapshot) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(props, &mut buf)
            .map_err(|e| Error::codec("encode", e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<PropertiesSnapshot> {
        ciborium::de::from_reader(bytes).map_err(|e| Error::codec("decode", e.to_string()))
    }
}

/// JSON-compatible text codec. Fallback for environments where a binary
/// payload is inconvenient to inspect.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PropsCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, props: &PropertiesSnapshot) -> Result<Vec<u8>> {
        serde_json::to_vec(props).map_err(|e| Error::codec("encode", e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<PropertiesSnapshot> {
        serde_json::from_slice(bytes).map_err(|e| Error::codec("decode", e.to_string()))
    }
}

/// The preferred codec.
pub fn default_codec() -> &'static dyn PropsCodec {
    &CborCodec
}

/// Resolve a codec by its stable name.
pub fn codec_by_name(name: &str) -> Option<&'static dyn PropsCodec> {
    match name {
        "cbor" => Some(&CborCodec),
        "json" => Some(&JsonCodec),
        _ => None,
    }
}
