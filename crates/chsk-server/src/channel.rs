// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The async-response adapter boundary realized concretely for `axum` (§9).
//!
//! The spec treats "a constructor that turns an incoming request into a
//! `send`/`close` response object" as an external collaborator each web
//! server integration supplies on its own. `chsk-server` ships exactly one
//! such integration, so the contract and its `axum` implementation live
//! together here rather than behind a second pluggable layer.

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use chsk_core::Pstr;

/// Anything the registry/push layer can hand a packed frame to.
pub trait ServerChannel: Send + Sync {
    fn send(&self, pstr: Pstr, close_after: bool);
    fn close(&self);
}

pub enum WsOutMsg {
    Frame(Pstr),
    Close,
}

/// A live WebSocket connection. `send`/`close` hand frames to the
/// connection's own task over an unbounded channel so registry mutations
/// never block on a network write (§5).
pub struct WsChannel {
    tx: mpsc::UnboundedSender<WsOutMsg>,
}

impl WsChannel {
    pub fn new(tx: mpsc::UnboundedSender<WsOutMsg>) -> Self {
        Self { tx }
    }
}

impl ServerChannel for WsChannel {
    fn send(&self, pstr: Pstr, close_after: bool) {
        let _ = self.tx.send(WsOutMsg::Frame(pstr));
        if close_after {
            let _ = self.tx.send(WsOutMsg::Close);
        }
    }

    fn close(&self) {
        let _ = self.tx.send(WsOutMsg::Close);
    }
}

/// A held Ajax long-poll GET. A long-poll response delivers exactly one
/// batch and terminates, so `send` always closes regardless of the
/// `close_after` flag; the one-shot sender is taken from behind a mutex so
/// a stale channel can be closed twice without panicking.
pub struct AjaxChannel {
    tx: Mutex<Option<oneshot::Sender<Pstr>>>,
}

impl AjaxChannel {
    pub fn new(tx: oneshot::Sender<Pstr>) -> Self {
        Self { tx: Mutex::new(Some(tx)) }
    }
}

impl ServerChannel for AjaxChannel {
    fn send(&self, pstr: Pstr, _close_after: bool) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(pstr);
        }
    }

    fn close(&self) {
        self.tx.lock().take();
    }
}
