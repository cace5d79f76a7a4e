// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback/reply-correlation types (§3, §6, §8).

use serde_json::Value;

/// The correlation id carried in a wrapped (`+`-prefixed) pstr (§3).
///
/// Either a short per-request identifier (WebSocket sends awaiting a
/// reply) or the Ajax one-shot sentinel (an HTTP POST whose response *is*
/// the reply, so no separate correlation id is needed on the wire — but
/// the receiver still needs to know "a reply is wanted").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CbId {
    Ajax,
    Id(String),
}

impl CbId {
    /// The literal wire encoding: `0` for the Ajax sentinel, the id string
    /// otherwise (§3).
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Ajax => Value::Number(0.into()),
            Self::Id(id) => Value::String(id.clone()),
        }
    }

    pub fn from_wire(v: &Value) -> Option<Self> {
        if v.as_u64() == Some(0) {
            return Some(Self::Ajax);
        }
        v.as_str().map(|s| Self::Id(s.to_owned()))
    }
}

/// The outcome of a client `send` with a callback (§3, §7, §8).
///
/// At most one variant is ever delivered for a given send — the "reply
/// exactly once" invariant. `Reply` and the three failure sentinels are
/// mutually exclusive by construction: whichever resolves the waiter
/// first wins and the waiter is removed.
#[derive(Debug, Clone, PartialEq)]
pub enum CbReply {
    /// The application (or the server itself, for `chsk/dummy-cb-200`)
    /// replied with a value.
    Reply(Value),
    /// The send was attempted while the transport was not open.
    Closed,
    /// No reply arrived before the caller's timeout elapsed.
    Timeout,
    /// The underlying transport write failed.
    Error,
}

impl CbReply {
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply(_))
    }
}

/// The server's immediate reply to an Ajax POST that did not itself
/// request a callback (§4.2, §6) — keeps the HTTP response cycle
/// well-formed without implying any application-level reply occurred.
pub fn dummy_cb_200() -> Value {
    Value::String("chsk/dummy-cb-200".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cb_id_round_trips_ajax() {
        let wire = CbId::Ajax.to_wire();
        assert_eq!(wire, json!(0));
        assert_eq!(CbId::from_wire(&wire), Some(CbId::Ajax));
    }

    #[test]
    fn cb_id_round_trips_named() {
        let id = CbId::Id("abc123".to_owned());
        let wire = id.to_wire();
        assert_eq!(CbId::from_wire(&wire), Some(id));
    }

    #[test]
    fn cb_id_from_wire_rejects_other_shapes() {
        assert_eq!(CbId::from_wire(&json!(null)), None);
        assert_eq!(CbId::from_wire(&json!(1.5)), None);
    }
}
