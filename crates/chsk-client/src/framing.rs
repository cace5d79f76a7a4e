// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applying an unwrapped server→client frame — the part of §4.4/§4.5 that
//! WS and Ajax share: either the handshake tuple or a batch of buffered
//! application events. Frames carrying a `cb-uuid` are *not* handled here
//! since only the WS transport multiplexes replies over a live socket;
//! Ajax resolves its callback directly from the POST response.

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use chsk_core::{event, ids, Event, Uid};

use crate::state::SocketState;

/// Mutates the published socket state and emits `[chsk/state, new-state]`
/// on the receive channel, matching the spec's "published as a watchable
/// value; emitted on the internal receive channel whenever it changes"
/// (§3, §7 propagation policy).
pub fn publish_state_change(
    state_tx: &watch::Sender<SocketState>,
    recv_tx: &mpsc::UnboundedSender<Event>,
    mutate: impl FnOnce(&mut SocketState),
) {
    let mut after = None;
    state_tx.send_modify(|s| {
        mutate(s);
        after = Some(s.clone());
    });
    let Some(state) = after else { return };
    match serde_json::to_value(&state) {
        Ok(value) => {
            let _ = recv_tx.send(Event::with_payload(ids::STATE, value));
        }
        Err(e) => warn!(error = %e, "failed to serialize socket state for chsk/state event"),
    }
}

pub fn apply_server_frame(value: Value, state_tx: &watch::Sender<SocketState>, recv_tx: &mpsc::UnboundedSender<Event>) {
    let Some(arr) = value.as_array() else {
        warn!("expected an array frame from the server, got a scalar");
        return;
    };
    if arr.first().and_then(Value::as_str) == Some(ids::HANDSHAKE) {
        apply_handshake(arr.get(1), state_tx, recv_tx);
        return;
    }
    for item in arr {
        let decoded = event::validate_or_wrap(item.clone());
        if decoded.is_system() {
            warn!(id = %decoded.id, "dropping chsk/* event received on the client wire");
            continue;
        }
        let _ = recv_tx.send(decoded);
    }
}

fn apply_handshake(payload: Option<&Value>, state_tx: &watch::Sender<SocketState>, recv_tx: &mpsc::UnboundedSender<Event>) {
    let arr = payload.and_then(Value::as_array);
    let uid = arr
        .and_then(|a| a.first())
        .and_then(Value::as_str)
        .filter(|s| *s != Uid::Nil.as_str())
        .map(str::to_owned);
    let csrf_token = arr.and_then(|a| a.get(1)).and_then(Value::as_str).map(str::to_owned);
    let handshake_data = arr.and_then(|a| a.get(2)).cloned().filter(|v| !v.is_null());
    let first_open = arr.and_then(|a| a.get(3)).and_then(Value::as_bool).unwrap_or(false);

    publish_state_change(state_tx, recv_tx, |s| {
        s.open = true;
        s.ever_opened = true;
        s.uid = Some(Uid::from(uid));
        s.csrf_token = csrf_token;
        s.handshake_data = handshake_data;
        s.first_open = first_open;
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handshake_sets_open_and_uid() {
        let (state_tx, state_rx) = watch::channel(SocketState::default());
        let (recv_tx, _recv_rx) = mpsc::unbounded_channel();
        apply_server_frame(json!(["chsk/handshake", ["alice", "tok", {"a": 1}, true]]), &state_tx, &recv_tx);
        let s = state_rx.borrow();
        assert!(s.open);
        assert!(s.ever_opened);
        assert_eq!(s.uid, Some(Uid::known("alice")));
        assert_eq!(s.csrf_token, Some("tok".to_owned()));
        assert!(s.first_open);
    }

    #[test]
    fn handshake_also_emits_chsk_state_on_recv_channel() {
        let (state_tx, _state_rx) = watch::channel(SocketState::default());
        let (recv_tx, mut recv_rx) = mpsc::unbounded_channel();
        apply_server_frame(json!(["chsk/handshake", ["alice", "tok", Value::Null, true]]), &state_tx, &recv_tx);
        let emitted = recv_rx.try_recv().unwrap();
        assert_eq!(emitted.id, "chsk/state");
        assert_eq!(emitted.payload.as_ref().and_then(|p| p.get("open")), Some(&Value::Bool(true)));
    }

    #[test]
    fn batch_delivers_app_events_and_drops_system_ones() {
        let (state_tx, _state_rx) = watch::channel(SocketState::default());
        let (recv_tx, mut recv_rx) = mpsc::unbounded_channel();
        apply_server_frame(json!([["app/a", 1], ["chsk/bad-event", "x"], ["app/b"]]), &state_tx, &recv_tx);
        let first = recv_rx.try_recv().unwrap();
        assert_eq!(first.id, "app/a");
        let second = recv_rx.try_recv().unwrap();
        assert_eq!(second.id, "app/b");
        assert!(recv_rx.try_recv().is_err());
    }
}
