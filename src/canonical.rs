//! Canonical encoder & hasher (spec §4.1).
//!
//! Produces a deterministic byte serialization of an unsigned envelope: keys
//! sorted ascending by code point, integers in decimal with no leading
//! zeros, no floating-point anywhere, no insignificant whitespace. Two
//! semantically equal unsigned envelopes always produce byte-identical
//! encodings and hashes, independent of field insertion order.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde::ser::{SerializeMap, SerializeSeq};
use sha2::{Digest, Sha256};

use crate::envelope::UnsignedEnvelope;
use crate::error::{CoreError, ProtocolError};

/// An ordered, float-free value tree used as the canonical encoding target.
#[derive(Debug, Clone, PartialEq)]
enum CanonicalValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(String),
    Arr(Vec<CanonicalValue>),
    Obj(BTreeMap<String, CanonicalValue>),
}

impl Serialize for CanonicalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CanonicalValue::Null => serializer.serialize_none(),
            CanonicalValue::Bool(b) => serializer.serialize_bool(*b),
            CanonicalValue::Int(i) => serializer.serialize_i64(*i),
            CanonicalValue::UInt(u) => serializer.serialize_u64(*u),
            CanonicalValue::Str(s) => serializer.serialize_str(s),
            CanonicalValue::Arr(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            CanonicalValue::Obj(map) => {
                let mut ser_map = serializer.serialize_map(Some(map.len()))?;
                // BTreeMap iterates in ascending key order already.
                for (k, v) in map {
                    ser_map.serialize_entry(k, v)?;
                }
                ser_map.end()
            }
        }
    }
}

fn from_json(value: serde_json::Value) -> Result<CanonicalValue, CoreError> {
    match value {
        serde_json::Value::Null => Ok(CanonicalValue::Null),
        serde_json::Value::Bool(b) => Ok(CanonicalValue::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(CanonicalValue::UInt(u))
            } else if let Some(i) = n.as_i64() {
                Ok(CanonicalValue::Int(i))
            } else {
                Err(CoreError::Protocol(ProtocolError::CanonMismatch))
            }
        }
        serde_json::Value::String(s) => Ok(CanonicalValue::Str(s)),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(item)?);
            }
            Ok(CanonicalValue::Arr(out))
        }
        serde_json::Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k, from_json(v)?);
            }
            Ok(CanonicalValue::Obj(out))
        }
    }
}

/// Encode an unsigned envelope into its canonical byte representation.
///
/// No floating-point value may appear anywhere in the body; any such value
/// is rejected with [`ProtocolError::CanonMismatch`] rather than silently
/// truncated.
pub fn encode_canonical(envelope: &UnsignedEnvelope) -> Result<Vec<u8>, CoreError> {
    let value = serde_json::to_value(envelope)
        .map_err(|_| CoreError::Protocol(ProtocolError::CanonMismatch))?;
    let canonical = from_json(value)?;
    serde_json::to_vec(&canonical).map_err(|_| CoreError::Protocol(ProtocolError::CanonMismatch))
}

/// Hash the canonical encoding of an unsigned envelope, returning lowercase hex.
pub fn hash(envelope: &UnsignedEnvelope) -> Result<String, CoreError> {
    let bytes = encode_canonical(envelope)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
