// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Auto transport (§4.6): tries WebSocket first, permanently downgrades
//! to Ajax on the first WS error. Both inner transports share one
//! [`ClientShared`], so watchers of the published [`crate::state::SocketState`]
//! see one continuous stream across the swap — no gap in `ever_opened`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use chsk_core::{CbReply, Event};

use crate::ajax::AjaxClient;
use crate::shared::ClientShared;
use crate::ws::WsClient;

#[derive(Clone)]
enum Inner {
    Ws(Arc<WsClient>),
    Ajax(Arc<AjaxClient>),
}

pub struct AutoClient {
    shared: Arc<ClientShared>,
    inner: RwLock<Inner>,
    downgraded: AtomicBool,
}

impl AutoClient {
    pub fn new(shared: Arc<ClientShared>) -> Arc<Self> {
        let ws = WsClient::new(shared.clone());
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            ws.set_first_error_hook(Arc::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.downgrade_to_ajax();
                }
            }));
            Self { shared, inner: RwLock::new(Inner::Ws(ws)), downgraded: AtomicBool::new(false) }
        })
    }

    pub fn connect(self: &Arc<Self>) {
        match &*self.inner.read() {
            Inner::Ws(ws) => ws.connect(),
            Inner::Ajax(ajax) => ajax.connect(),
        }
    }

    pub fn disconnect(self: &Arc<Self>, reconnect: bool) {
        match &*self.inner.read() {
            Inner::Ws(ws) => ws.disconnect(reconnect),
            Inner::Ajax(ajax) => ajax.disconnect(reconnect),
        }
    }

    pub async fn send(&self, event: Event, cb_timeout: Option<Duration>) -> Option<CbReply> {
        // Clone the `Arc` out from under the read guard so the await below
        // doesn't hold the lock across a network write (§5).
        let inner = self.inner.read().clone();
        match inner {
            Inner::Ws(ws) => ws.send(event, cb_timeout).await,
            Inner::Ajax(ajax) => ajax.send(event, cb_timeout).await,
        }
    }

    /// Disconnects the WS transport, swaps in a fresh Ajax transport
    /// sharing the same state, and connects it. Idempotent: only the first
    /// caller (the WS client's first-error hook fires at most once) has any
    /// effect; [`AtomicBool::swap`] makes a second call a no-op even if
    /// something else raced it.
    fn downgrade_to_ajax(self: &Arc<Self>) {
        if self.downgraded.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Inner::Ws(ws) = &*self.inner.read() {
            ws.disconnect(false);
        }
        let ajax = AjaxClient::new(self.shared.clone());
        *self.inner.write() = Inner::Ajax(ajax.clone());
        ajax.connect();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use tokio::sync::{mpsc, watch};

    fn shared() -> Arc<ClientShared> {
        let (state_tx, _rx) = watch::channel(crate::state::SocketState::default());
        let (recv_tx, _rx) = mpsc::unbounded_channel();
        ClientShared::new(ClientConfig { host: "ws://127.0.0.1:1/chsk".to_owned(), ..ClientConfig::default() }, state_tx, recv_tx)
    }

    #[test]
    fn starts_on_ws() {
        let auto = AutoClient::new(shared());
        assert!(matches!(&*auto.inner.read(), Inner::Ws(_)));
    }

    #[tokio::test]
    async fn downgrade_swaps_inner_and_is_idempotent() {
        let auto = AutoClient::new(shared());
        auto.downgrade_to_ajax();
        assert!(matches!(&*auto.inner.read(), Inner::Ajax(_)));
        // a second call must not panic or re-swap
        auto.downgrade_to_ajax();
        assert!(matches!(&*auto.inner.read(), Inner::Ajax(_)));
    }
}
