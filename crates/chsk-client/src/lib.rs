// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client side of chsk (§1, §4.4–§4.6): the WS, Ajax, and Auto transports,
//! reconnect backoff, keep-alive, and reply correlation.
//!
//! A factory call ([`ChskClient::new`]) hands back a bundle of independent
//! handles — the client itself, the receive channel, the published socket
//! state — matching `chsk-server`'s "avoid global state" factory shape (§9).

pub mod ajax;
pub mod auto;
pub mod config;
pub mod framing;
pub mod shared;
pub mod state;
pub mod util;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use chsk_core::{ids, CbReply, Event};

use ajax::AjaxClient;
use auto::AutoClient;
use config::{ClientConfig, TransportKind};
use shared::ClientShared;
use state::SocketState;
use ws::WsClient;

enum Transport {
    Ws(Arc<WsClient>),
    Ajax(Arc<AjaxClient>),
    Auto(Arc<AutoClient>),
}

/// The client-side bundle the application holds: a handle to send events
/// and control the connection, a channel of events received from the
/// server, and a watchable socket state (§3, §9).
pub struct ChskClient {
    shared: Arc<ClientShared>,
    transport: Transport,
}

impl ChskClient {
    /// Builds the configured transport and connects it immediately,
    /// matching the teacher's "construct, wire callbacks, return handles"
    /// factory shape.
    pub fn new(config: ClientConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>, watch::Receiver<SocketState>) {
        let (state_tx, state_rx) = watch::channel(SocketState::default());
        let (raw_recv_tx, raw_recv_rx) = mpsc::unbounded_channel();
        let wrap = config.wrap_recv_evs;
        let shared = ClientShared::new(config.clone(), state_tx, raw_recv_tx);

        let transport = match config.transport {
            TransportKind::Ws => Transport::Ws(WsClient::new(shared.clone())),
            TransportKind::Ajax => Transport::Ajax(AjaxClient::new(shared.clone())),
            TransportKind::Auto => Transport::Auto(AutoClient::new(shared.clone())),
        };

        let client = Arc::new(Self { shared, transport });
        client.connect();

        let recv_rx = if wrap { wrap_recv_channel(raw_recv_rx) } else { raw_recv_rx };
        (client, recv_rx, state_rx)
    }

    pub fn connect(self: &Arc<Self>) {
        match &self.transport {
            Transport::Ws(ws) => ws.connect(),
            Transport::Ajax(ajax) => ajax.connect(),
            Transport::Auto(auto) => auto.connect(),
        }
    }

    pub fn disconnect(self: &Arc<Self>, reconnect: bool) {
        match &self.transport {
            Transport::Ws(ws) => ws.disconnect(reconnect),
            Transport::Ajax(ajax) => ajax.disconnect(reconnect),
            Transport::Auto(auto) => auto.disconnect(reconnect),
        }
    }

    pub fn reconnect(self: &Arc<Self>) {
        self.disconnect(false);
        self.connect();
    }

    /// Sends an event, optionally awaiting a reply within `cb_timeout`
    /// (§4.4, §4.5, §8 "reply exactly once"). `None` is returned only when
    /// no callback was requested.
    pub async fn send(&self, event: Event, cb_timeout: Option<Duration>) -> Option<CbReply> {
        match &self.transport {
            Transport::Ws(ws) => ws.send(event, cb_timeout).await,
            Transport::Ajax(ajax) => ajax.send(event, cb_timeout).await,
            Transport::Auto(auto) => auto.send(event, cb_timeout).await,
        }
    }

    pub fn state(&self) -> state::SocketState {
        self.shared.state_tx.borrow().clone()
    }
}

/// When `wrap_recv_evs` is set (§6), re-emit every delivered event wrapped
/// as `[chsk/recv, event]` instead of bare, on a fresh channel.
fn wrap_recv_channel(mut raw: mpsc::UnboundedReceiver<Event>) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = raw.recv().await {
            let wrapped = Event::with_payload(ids::RECV, event.to_value());
            if tx.send(wrapped).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrap_recv_channel_wraps_each_event() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Event::new("app/a")).unwrap();
        drop(tx);
        let mut wrapped = wrap_recv_channel(rx);
        let got = wrapped.recv().await.unwrap();
        assert_eq!(got.id, ids::RECV);
        assert_eq!(got.payload, Some(serde_json::json!(["app/a"])));
        assert!(wrapped.recv().await.is_none());
    }
}
