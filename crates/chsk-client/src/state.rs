// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client socket state (§3) and the reply-waiter map (§3, §8).

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use chsk_core::{CbReply, Uid};

/// Published via `watch` so application code can observe connection
/// lifecycle without polling (§3). Also serialized as the payload of the
/// `chsk/state` event emitted onto the receive channel on every change, so
/// applications draining a single channel see it too (§3, §6, §7).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SocketState {
    pub open: bool,
    pub ever_opened: bool,
    pub uid: Option<Uid>,
    pub csrf_token: Option<String>,
    pub handshake_data: Option<Value>,
    pub first_open: bool,
}

/// Outstanding client→server requests awaiting a reply, keyed by cb id.
///
/// Resolution removes the entry, so whichever of {application reply,
/// timeout, transport error} fires first wins and nothing fires twice
/// (§3, §8 "reply exactly once").
#[derive(Default)]
pub struct Waiters {
    inner: Mutex<HashMap<String, oneshot::Sender<CbReply>>>,
}

impl Waiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: String) -> oneshot::Receiver<CbReply> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, tx);
        rx
    }

    pub fn resolve(&self, id: &str, reply: CbReply) {
        if let Some(tx) = self.inner.lock().remove(id) {
            let _ = tx.send(reply);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_resolve_is_a_no_op() {
        let waiters = Waiters::new();
        let rx = waiters.register("abc".to_owned());
        waiters.resolve("abc", CbReply::Reply(Value::Bool(true)));
        waiters.resolve("abc", CbReply::Timeout);
        assert_eq!(rx.await.unwrap(), CbReply::Reply(Value::Bool(true)));
    }

    #[test]
    fn resolving_unknown_id_is_harmless() {
        let waiters = Waiters::new();
        waiters.resolve("missing", CbReply::Closed);
    }
}
