// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event validation (§3, §4.1).
//!
//! An event is `[id, payload?]` where `id` is a namespaced identifier
//! (`app/login`). The `chsk/*` namespace is reserved for the system.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The reserved namespace segment for system events (§3, §6).
pub const RESERVED_NS: &str = "chsk";

/// Why a candidate value failed event validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidEventReason {
    /// Not a 1- or 2-element array.
    WrongShape,
    /// The id element is not a string.
    IdNotString,
    /// The id string has no `/` separating namespace from name, or either
    /// side of the separator is empty.
    IdNotNamespaced,
}

/// A validated application or system event: `[id, payload?]` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Event {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), payload: None }
    }

    pub fn with_payload(id: impl Into<String>, payload: Value) -> Self {
        Self { id: id.into(), payload: Some(payload) }
    }

    /// The namespace segment of this event's id (the part before `/`).
    pub fn namespace(&self) -> &str {
        self.id.split('/').next().unwrap_or("")
    }

    /// Whether this event lives in the reserved `chsk/*` namespace (§3).
    pub fn is_system(&self) -> bool {
        self.namespace() == RESERVED_NS
    }

    /// Wrap an invalid inbound value as `[chsk/bad-event, original]` (§3, §4.1).
    ///
    /// Per the spec this never fails: any JSON value can be embedded as the
    /// payload of a `chsk/bad-event` event, so callers do not need to handle
    /// a parallel error path for malformed input.
    pub fn bad_event(original: Value) -> Self {
        Self::with_payload(format!("{RESERVED_NS}/bad-event"), original)
    }

    /// The `chsk/bad-package` event emitted when codec decoding fails on
    /// the server (§4.1, §7). Payload is always `null` per spec.
    pub fn bad_package() -> Self {
        Self::with_payload(format!("{RESERVED_NS}/bad-package"), Value::Null)
    }

    /// The wire shape of this event: `[id]` or `[id, payload]` (§3). Inverse
    /// of [`validate`].
    pub fn to_value(&self) -> Value {
        match &self.payload {
            Some(payload) => Value::Array(vec![Value::String(self.id.clone()), payload.clone()]),
            None => Value::Array(vec![Value::String(self.id.clone())]),
        }
    }
}

/// Validate a raw JSON value as an event shape (§4.1).
///
/// Accepts `["ns/name"]` or `["ns/name", payload]`. Anything else returns
/// the specific reason it was rejected so callers can log a useful warning
/// before falling back to [`Event::bad_event`].
pub fn validate(v: &Value) -> Result<Event, InvalidEventReason> {
    let arr = v.as_array().ok_or(InvalidEventReason::WrongShape)?;
    if arr.is_empty() || arr.len() > 2 {
        return Err(InvalidEventReason::WrongShape);
    }
    let id = arr[0].as_str().ok_or(InvalidEventReason::IdNotString)?;
    if !is_namespaced(id) {
        return Err(InvalidEventReason::IdNotNamespaced);
    }
    let payload = arr.get(1).cloned();
    Ok(Event { id: id.to_owned(), payload })
}

/// Validate a value, falling back to `[chsk/bad-event, v]` on any failure
/// so malformed input never produces a hard error (§3 invariant).
pub fn validate_or_wrap(v: Value) -> Event {
    match validate(&v) {
        Ok(event) => event,
        Err(_) => Event::bad_event(v),
    }
}

fn is_namespaced(id: &str) -> bool {
    match id.split_once('/') {
        Some((ns, name)) => !ns.is_empty() && !name.is_empty(),
        None => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_id_only() {
        let e = validate(&json!(["app/login"])).unwrap();
        assert_eq!(e.id, "app/login");
        assert_eq!(e.payload, None);
    }

    #[test]
    fn validates_id_and_payload() {
        let e = validate(&json!(["app/login", {"user": "bob"}])).unwrap();
        assert_eq!(e.id, "app/login");
        assert_eq!(e.payload, Some(json!({"user": "bob"})));
    }

    #[test]
    fn rejects_empty_array() {
        assert_eq!(validate(&json!([])), Err(InvalidEventReason::WrongShape));
    }

    #[test]
    fn rejects_too_many_elements() {
        assert_eq!(validate(&json!(["app/x", 1, 2])), Err(InvalidEventReason::WrongShape));
    }

    #[test]
    fn rejects_non_array() {
        assert_eq!(validate(&json!({"id": "app/x"})), Err(InvalidEventReason::WrongShape));
    }

    #[test]
    fn rejects_unnamespaced_id() {
        assert_eq!(validate(&json!(["login"])), Err(InvalidEventReason::IdNotNamespaced));
    }

    #[test]
    fn rejects_id_with_empty_namespace() {
        assert_eq!(validate(&json!(["/login"])), Err(InvalidEventReason::IdNotNamespaced));
    }

    #[test]
    fn rejects_non_string_id() {
        assert_eq!(validate(&json!([42])), Err(InvalidEventReason::IdNotString));
    }

    #[test]
    fn wrap_never_fails() {
        let e = validate_or_wrap(json!("not an event at all"));
        assert_eq!(e.id, "chsk/bad-event");
        assert_eq!(e.payload, Some(json!("not an event at all")));
    }

    #[test]
    fn system_namespace_detection() {
        assert!(Event::new("chsk/handshake").is_system());
        assert!(!Event::new("app/login").is_system());
    }
}
