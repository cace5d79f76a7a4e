// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The normalized item placed on the server's single receive queue (§4.2).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use chsk_core::{pstr, CbId, Codec, Event, Uid};

use crate::channel::ServerChannel;

/// One inbound event, from whichever transport it arrived on, plus enough
/// to reply if the sender asked for one.
pub struct EventMsg {
    pub event: Event,
    pub uid: Uid,
    pub client_id: String,
    pub reply: Option<ReplySink>,
}

/// How to deliver the application's reply, if any was requested (§4.1, §4.2).
pub enum ReplySink {
    /// Reply is packed with the original `cb-uuid` and written back to the
    /// same open WebSocket (does not close it).
    Ws { channel: Arc<dyn ServerChannel>, cb: CbId, codec: Arc<dyn Codec> },
    /// Reply becomes the body of the held Ajax POST response.
    AjaxPost { tx: oneshot::Sender<Value> },
}

impl ReplySink {
    pub fn reply(self, value: Value) {
        match self {
            ReplySink::Ws { channel, cb, codec } => match pstr::pack(codec.as_ref(), &value, Some(&cb)) {
                Ok(packed) => channel.send(packed, false),
                Err(e) => warn!(error = %e, "failed to pack ws reply"),
            },
            ReplySink::AjaxPost { tx } => {
                let _ = tx.send(value);
            }
        }
    }
}
