// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bits both transports (and their Auto wrapper) need in common: the
//! published socket state, the receive channel, the reply-waiter map, and
//! the resolved client-id. Holding all of it behind one `Arc` is what lets
//! Auto swap its inner transport without the application-visible state
//! stream skipping a beat (§4.6).

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use chsk_core::Event;

use crate::config::ClientConfig;
use crate::state::{SocketState, Waiters};
use crate::util::short_cb_id;

pub struct ClientShared {
    pub config: ClientConfig,
    pub client_id: String,
    pub state_tx: watch::Sender<SocketState>,
    pub recv_tx: mpsc::UnboundedSender<Event>,
    pub waiters: Arc<Waiters>,
}

impl ClientShared {
    pub fn new(config: ClientConfig, state_tx: watch::Sender<SocketState>, recv_tx: mpsc::UnboundedSender<Event>) -> Arc<Self> {
        let client_id = config.client_id.clone().unwrap_or_else(short_cb_id);
        Arc::new(Self { config, client_id, state_tx, recv_tx, waiters: Arc::new(Waiters::new()) })
    }
}
