// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The packed string (pstr) wire format (§3, §4.1, §6).
//!
//! A pstr is one byte prefix (`-` unwrapped, `+` wrapped with a callback
//! correlation id) followed by the codec's encoding of either the bare
//! value (`-`) or a `[value, cb]` pair (`+`).

use serde_json::Value;

use crate::cb::CbId;
use crate::codec::Codec;
use crate::error::ChskError;

const PREFIX_UNWRAPPED: u8 = b'-';
const PREFIX_WRAPPED: u8 = b'+';

/// A packed wire string, newtyped so call sites can't accidentally treat
/// an unprefixed codec output as a valid frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pstr(String);

impl Pstr {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<Pstr> for String {
    fn from(p: Pstr) -> Self {
        p.0
    }
}

/// Pack a value (and optional callback correlation) into a [`Pstr`] (§4.1).
///
/// - No `cb` → `-`-prefixed, codec output of `value` alone.
/// - `cb` present (including the Ajax sentinel) → `+`-prefixed, codec
///   output of `[value, cb-wire]`.
pub fn pack(codec: &dyn Codec, value: &Value, cb: Option<&CbId>) -> Result<Pstr, ChskError> {
    match cb {
        None => {
            let body = codec.encode(value)?;
            Ok(Pstr(format!("{}{body}", PREFIX_UNWRAPPED as char)))
        }
        Some(cb) => {
            let wrapped = Value::Array(vec![value.clone(), cb.to_wire()]);
            let body = codec.encode(&wrapped)?;
            Ok(Pstr(format!("{}{body}", PREFIX_WRAPPED as char)))
        }
    }
}

/// Unpack a [`Pstr`] back into a value and optional callback correlation
/// (§4.1).
///
/// Server callers translate a codec failure into a `chsk/bad-package`
/// event rather than propagating it (§4.1, §7); client callers propagate
/// it directly since a malformed push from the server is a protocol
/// violation (§4.1).
pub fn unpack(codec: &dyn Codec, pstr: &str) -> Result<(Value, Option<CbId>), ChskError> {
    let mut chars = pstr.chars();
    let prefix = chars.next().ok_or_else(|| ChskError::Codec("empty pstr".to_owned()))?;
    let body = chars.as_str();

    match prefix as u32 as u8 {
        PREFIX_UNWRAPPED => Ok((codec.decode(body)?, None)),
        PREFIX_WRAPPED => {
            let decoded = codec.decode(body)?;
            let arr = decoded
                .as_array()
                .ok_or_else(|| ChskError::Codec("wrapped pstr body is not an array".to_owned()))?;
            if arr.is_empty() || arr.len() > 2 {
                return Err(ChskError::Codec(format!(
                    "wrapped pstr body has {} elements, expected 1 or 2",
                    arr.len()
                )));
            }
            let value = arr[0].clone();
            let cb = arr.get(1).and_then(CbId::from_wire);
            Ok((value, cb))
        }
        _ => Err(ChskError::Codec(format!("unknown pstr prefix {prefix:?}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde_json::json;

    fn codec() -> JsonCodec {
        JsonCodec
    }

    #[test]
    fn pack_unwrapped_has_minus_prefix() {
        let p = pack(&codec(), &json!(["app/ping"]), None).unwrap();
        assert!(p.as_str().starts_with('-'));
    }

    #[test]
    fn pack_wrapped_has_plus_prefix() {
        let p = pack(&codec(), &json!(["app/ping"]), Some(&CbId::Ajax)).unwrap();
        assert!(p.as_str().starts_with('+'));
    }

    #[test]
    fn round_trip_no_cb() {
        let v = json!(["app/ping", {"n": 1}]);
        let p = pack(&codec(), &v, None).unwrap();
        let (out, cb) = unpack(&codec(), p.as_str()).unwrap();
        assert_eq!(out, v);
        assert_eq!(cb, None);
    }

    #[test]
    fn round_trip_with_named_cb() {
        let v = json!(["app/ping"]);
        let cb = CbId::Id("abc123".to_owned());
        let p = pack(&codec(), &v, Some(&cb)).unwrap();
        let (out, out_cb) = unpack(&codec(), p.as_str()).unwrap();
        assert_eq!(out, v);
        assert_eq!(out_cb, Some(cb));
    }

    #[test]
    fn round_trip_with_ajax_cb() {
        let v = json!(["app/ping"]);
        let p = pack(&codec(), &v, Some(&CbId::Ajax)).unwrap();
        let (_, out_cb) = unpack(&codec(), p.as_str()).unwrap();
        assert_eq!(out_cb, Some(CbId::Ajax));
    }

    #[test]
    fn unpack_rejects_unknown_prefix() {
        assert!(unpack(&codec(), "*not-a-real-frame").is_err());
    }

    #[test]
    fn unpack_rejects_empty() {
        assert!(unpack(&codec(), "").is_err());
    }

    proptest::proptest! {
        #[test]
        fn round_trip_prop(s in ".*", has_cb in proptest::bool::ANY) {
            let codec = JsonCodec;
            let v = json!(s);
            let cb = if has_cb { Some(CbId::Id("x".to_owned())) } else { None };
            let packed = pack(&codec, &v, cb.as_ref()).unwrap();
            let (out_v, out_cb) = unpack(&codec, packed.as_str()).unwrap();
            proptest::prop_assert_eq!(out_v, v);
            proptest::prop_assert_eq!(out_cb, cb);
        }
    }
}
