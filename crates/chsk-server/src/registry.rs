// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The connection registry: `ws[uid][client-id]` and `ajax[uid][client-id]`
//! plus the derived presence view (§3, §4.2).
//!
//! Grounded on the teacher's `broker/registry.rs` shape: a lock-guarded map
//! mutated by edge-returning methods, `#[cfg(test)]` colocated below. All
//! mutation happens under a short `parking_lot::Mutex` that never crosses a
//! network write (§5); the caller acts on the returned edge afterward.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;

use chsk_core::Uid;

use crate::channel::{AjaxChannel, WsChannel};
use crate::presence::{Presence, PresenceEdge};

struct AjaxSlot {
    channel: Option<Arc<AjaxChannel>>,
    /// Timestamp of the most recent poll that opened this slot.
    last_connected: Instant,
}

#[derive(Default)]
struct Inner {
    ws: HashMap<Uid, HashMap<String, Arc<WsChannel>>>,
    ajax: HashMap<Uid, HashMap<String, AjaxSlot>>,
}

impl Inner {
    fn has_any(&self, uid: &Uid) -> bool {
        self.ws.get(uid).is_some_and(|m| !m.is_empty()) || self.ajax.get(uid).is_some_and(|m| !m.is_empty())
    }

    fn snapshot(&self) -> Presence {
        Presence {
            ws: self.ws.iter().filter(|(_, m)| !m.is_empty()).map(|(u, _)| u.clone()).collect(),
            ajax: self.ajax.iter().filter(|(_, m)| !m.is_empty()).map(|(u, _)| u.clone()).collect(),
        }
    }
}

pub struct Registry {
    inner: Mutex<Inner>,
    presence_tx: watch::Sender<Presence>,
}

impl Registry {
    pub fn new() -> (Arc<Self>, watch::Receiver<Presence>) {
        let (tx, rx) = watch::channel(Presence::default());
        (Arc::new(Self { inner: Mutex::new(Inner::default()), presence_tx: tx }), rx)
    }

    pub fn connected_users(&self) -> Presence {
        self.presence_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Presence> {
        self.presence_tx.subscribe()
    }

    /// Registers a new WebSocket connection. Returns [`PresenceEdge::Opened`]
    /// iff this was the uid's first connection of any kind (§4.2).
    pub fn ws_open(&self, uid: Uid, client_id: String, channel: Arc<WsChannel>) -> Option<PresenceEdge> {
        let mut inner = self.inner.lock();
        let was_present = inner.has_any(&uid);
        inner.ws.entry(uid.clone()).or_default().insert(client_id, channel);
        if was_present {
            return None;
        }
        let snapshot = inner.snapshot();
        drop(inner);
        let _ = self.presence_tx.send(snapshot);
        Some(PresenceEdge::Opened)
    }

    /// Removes a WebSocket connection immediately. The 5-second grace
    /// re-check is the caller's job since it spans an async sleep (§4.2).
    pub fn ws_close(&self, uid: &Uid, client_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(m) = inner.ws.get_mut(uid) {
            m.remove(client_id);
            if m.is_empty() {
                inner.ws.remove(uid);
            }
        }
    }

    /// Re-checks presence for `uid` after a disconnect grace elapses.
    /// Emits the close edge iff the uid still has no connections (§4.2).
    pub fn recompute_after_grace(&self, uid: &Uid) -> Option<PresenceEdge> {
        let mut inner = self.inner.lock();
        if inner.has_any(uid) {
            return None;
        }
        let snapshot = inner.snapshot();
        drop(inner);
        let _ = self.presence_tx.send(snapshot);
        Some(PresenceEdge::Closed)
    }

    /// Registers (or re-registers) a long-poll GET. Returns whether this is
    /// the first time this client-id has been seen for this uid (the
    /// initial-handshake trigger, §4.2) plus any presence edge.
    pub fn ajax_open(&self, uid: Uid, client_id: String, channel: Arc<AjaxChannel>) -> (bool, Option<PresenceEdge>) {
        let mut inner = self.inner.lock();
        let was_present = inner.has_any(&uid);
        let slots = inner.ajax.entry(uid.clone()).or_default();
        let is_initial = !slots.contains_key(&client_id);
        slots.insert(client_id, AjaxSlot { channel: Some(channel), last_connected: Instant::now() });
        let edge = if was_present { None } else { Some(PresenceEdge::Opened) };
        if edge.is_none() {
            return (is_initial, None);
        }
        let snapshot = inner.snapshot();
        drop(inner);
        let _ = self.presence_tx.send(snapshot);
        (is_initial, edge)
    }

    /// Marks a long-poll slot as between polls and returns the disconnect
    /// timestamp the caller should compare against after the grace period.
    /// A reconnect updates `last_connected` past this mark via a fresh
    /// [`ajax_open`](Self::ajax_open) call.
    pub fn ajax_mark_disconnected(&self, uid: &Uid, client_id: &str) -> Option<Instant> {
        let mut inner = self.inner.lock();
        let slot = inner.ajax.get_mut(uid)?.get_mut(client_id)?;
        slot.channel = None;
        Some(Instant::now())
    }

    /// Re-checks a long-poll slot after its grace period. If no poll has
    /// reconnected since `disconnected_at`, the slot is removed and presence
    /// recomputed; if the uid has other connections, no edge fires (§4.2).
    pub fn recompute_ajax_after_grace(
        &self,
        uid: &Uid,
        client_id: &str,
        disconnected_at: Instant,
    ) -> Option<PresenceEdge> {
        let mut inner = self.inner.lock();
        let still_gone = match inner.ajax.get(uid).and_then(|s| s.get(client_id)) {
            Some(slot) => slot.channel.is_none() && slot.last_connected <= disconnected_at,
            None => false,
        };
        if !still_gone {
            return None;
        }
        if let Some(slots) = inner.ajax.get_mut(uid) {
            slots.remove(client_id);
            if slots.is_empty() {
                inner.ajax.remove(uid);
            }
        }
        if inner.has_any(uid) {
            return None;
        }
        let snapshot = inner.snapshot();
        drop(inner);
        let _ = self.presence_tx.send(snapshot);
        Some(PresenceEdge::Closed)
    }

    pub fn ws_channels(&self, uid: &Uid) -> Vec<Arc<WsChannel>> {
        let inner = self.inner.lock();
        inner.ws.get(uid).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    /// Claims every long-poll slot for `uid` that is currently holding an
    /// open response, nulling the slot so a concurrent retry round can't
    /// double-deliver to it (§4.3).
    pub fn claim_ajax_channels(&self, uid: &Uid) -> Vec<Arc<AjaxChannel>> {
        let mut inner = self.inner.lock();
        let Some(slots) = inner.ajax.get_mut(uid) else { return Vec::new() };
        slots.values_mut().filter_map(|slot| slot.channel.take()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, oneshot};

    fn ws_channel() -> Arc<WsChannel> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(WsChannel::new(tx))
    }

    fn ajax_channel() -> Arc<AjaxChannel> {
        let (tx, _rx) = oneshot::channel();
        Arc::new(AjaxChannel::new(tx))
    }

    #[test]
    fn first_ws_connection_opens_presence() {
        let (reg, _rx) = Registry::new();
        let uid = Uid::known("alice");
        let edge = reg.ws_open(uid.clone(), "c1".into(), ws_channel());
        assert_eq!(edge, Some(PresenceEdge::Opened));
        assert!(reg.connected_users().ws.contains(&uid));
    }

    #[test]
    fn second_connection_for_same_uid_does_not_reopen() {
        let (reg, _rx) = Registry::new();
        let uid = Uid::known("alice");
        reg.ws_open(uid.clone(), "c1".into(), ws_channel());
        let edge = reg.ws_open(uid.clone(), "c2".into(), ws_channel());
        assert_eq!(edge, None);
    }

    #[test]
    fn close_does_not_emit_edge_if_other_connections_remain() {
        let (reg, _rx) = Registry::new();
        let uid = Uid::known("alice");
        reg.ws_open(uid.clone(), "c1".into(), ws_channel());
        reg.ajax_open(uid.clone(), "c2".into(), ajax_channel());
        reg.ws_close(&uid, "c1");
        assert_eq!(reg.recompute_after_grace(&uid), None);
        assert!(reg.connected_users().any().contains(&uid));
    }

    #[test]
    fn close_emits_edge_once_all_connections_gone() {
        let (reg, _rx) = Registry::new();
        let uid = Uid::known("alice");
        reg.ws_open(uid.clone(), "c1".into(), ws_channel());
        reg.ws_close(&uid, "c1");
        let edge = reg.recompute_after_grace(&uid);
        assert_eq!(edge, Some(PresenceEdge::Closed));
        assert!(!reg.connected_users().any().contains(&uid));
    }

    #[test]
    fn ajax_reconnect_before_grace_check_suppresses_close() {
        let (reg, _rx) = Registry::new();
        let uid = Uid::known("alice");
        reg.ajax_open(uid.clone(), "c1".into(), ajax_channel());
        let disconnected_at = reg.ajax_mark_disconnected(&uid, "c1").unwrap();
        // a fresh poll lands before the grace check fires
        reg.ajax_open(uid.clone(), "c1".into(), ajax_channel());
        let edge = reg.recompute_ajax_after_grace(&uid, "c1", disconnected_at);
        assert_eq!(edge, None);
        assert!(reg.connected_users().any().contains(&uid));
    }

    #[test]
    fn ajax_no_reconnect_closes_after_grace() {
        let (reg, _rx) = Registry::new();
        let uid = Uid::known("alice");
        reg.ajax_open(uid.clone(), "c1".into(), ajax_channel());
        let disconnected_at = reg.ajax_mark_disconnected(&uid, "c1").unwrap();
        let edge = reg.recompute_ajax_after_grace(&uid, "c1", disconnected_at);
        assert_eq!(edge, Some(PresenceEdge::Closed));
    }

    #[test]
    fn claim_ajax_channels_nulls_the_slot() {
        let (reg, _rx) = Registry::new();
        let uid = Uid::known("alice");
        reg.ajax_open(uid.clone(), "c1".into(), ajax_channel());
        let claimed = reg.claim_ajax_channels(&uid);
        assert_eq!(claimed.len(), 1);
        assert!(reg.claim_ajax_channels(&uid).is_empty());
    }
}
