// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bundle a server factory hands back: registry, pusher, receive queue,
//! and presence view behind one `Arc` (§4.2, §9 "avoid global state").

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::warn;

use chsk_core::{ids, Event, Uid};

use crate::config::ServerConfig;
use crate::event_msg::EventMsg;
use crate::presence::{Presence, PresenceEdge};
use crate::push::{PushOpts, Pusher};
use crate::registry::Registry;

pub struct ServerState {
    pub config: ServerConfig,
    pub registry: Arc<Registry>,
    pub pusher: Arc<Pusher>,
    recv_tx: mpsc::Sender<EventMsg>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> (Arc<Self>, mpsc::Receiver<EventMsg>, watch::Receiver<Presence>) {
        let (registry, presence_rx) = Registry::new();
        let pusher = Pusher::new(registry.clone(), config.packer.clone(), config.send_buf_ms_ws, config.send_buf_ms_ajax);
        let (recv_tx, recv_rx) = mpsc::channel(config.recv_buf_or_n);
        let state = Arc::new(Self { config, registry, pusher, recv_tx });
        (state, recv_rx, presence_rx)
    }

    pub fn push(&self, uid: Uid, event: Event, opts: PushOpts) {
        self.pusher.push(uid, event, opts);
    }

    pub fn connected_users(&self) -> Presence {
        self.registry.connected_users()
    }

    pub fn subscribe_presence(&self) -> watch::Receiver<Presence> {
        self.registry.subscribe()
    }

    pub(crate) fn emit(&self, msg: EventMsg) {
        if self.recv_tx.try_send(msg).is_err() {
            warn!("receive queue full, dropping event");
        }
    }

    pub(crate) fn emit_internal(&self, event: Event, uid: Uid, client_id: String) {
        self.emit(EventMsg { event, uid, client_id, reply: None });
    }

    pub(crate) fn emit_presence_edge(&self, edge: PresenceEdge, uid: Uid, client_id: String) {
        let id = match edge {
            PresenceEdge::Opened => ids::UIDPORT_OPEN,
            PresenceEdge::Closed => ids::UIDPORT_CLOSE,
        };
        self.emit_internal(Event::new(id), uid, client_id);
    }
}
