// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pluggable payload codec contract (§4.1, §9).
//!
//! Two-method contract, held as a trait object, exactly as the spec
//! describes it: "pack (arbitrary value -> string)" / "unpack (string ->
//! arbitrary value)". Concrete codecs live outside the wire-format core;
//! [`JsonCodec`] is the crate's one built-in implementation, chosen as the
//! default because every teacher-repo wire boundary reaches for
//! `serde_json` (see DESIGN.md).

use serde_json::Value;

use crate::error::ChskError;

/// A pluggable serializer for event/payload/reply values.
///
/// Implementations must be infallible to construct (no setup step) and
/// cheap to clone/share — `chsk-server` and `chsk-client` both hold one
/// behind an `Arc<dyn Codec>`.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, ChskError>;
    fn decode(&self, raw: &str) -> Result<Value, ChskError>;
}

/// The default codec: JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String, ChskError> {
        serde_json::to_string(value).map_err(|e| ChskError::Codec(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<Value, ChskError> {
        serde_json::from_str(raw).map_err(|e| ChskError::Codec(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let v = json!({"a": 1, "b": [true, null, "x"]});
        let encoded = codec.encode(&v).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), v);
    }

    #[test]
    fn json_codec_decode_error() {
        let codec = JsonCodec;
        assert!(codec.decode("not json {{{").is_err());
    }
}
