// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server factory configuration (§6), following the teacher's plain
//! `MuxConfig`-style struct with a `Default` impl carrying the spec's
//! documented defaults.

use std::sync::Arc;

use serde_json::Value;

use chsk_core::{Codec, JsonCodec};

use crate::endpoint::ReqCtx;

pub type UserIdFn = Arc<dyn Fn(&ReqCtx) -> Option<String> + Send + Sync>;
pub type CsrfTokenFn = Arc<dyn Fn(&ReqCtx) -> Option<String> + Send + Sync>;
pub type HandshakeDataFn = Arc<dyn Fn(&ReqCtx) -> Option<Value> + Send + Sync>;

#[derive(Clone)]
pub struct ServerConfig {
    /// Receive-queue capacity (§6 `recv-buf-or-n`). The spec types this as
    /// a *sliding* buffer that drops the oldest entry on overflow; the
    /// bounded `mpsc` channel backing it here drops the *newest* arrival
    /// instead once full (`ServerState::emit`'s `try_send`), so it doesn't
    /// apply backpressure to HTTP handlers but diverges from drop-oldest
    /// under sustained overflow. Acceptable because the channel would only
    /// fill if the application's router loop falls behind, at which point
    /// either policy is discarding events the handler was never going to
    /// keep up with.
    pub recv_buf_or_n: usize,
    pub send_buf_ms_ajax: u64,
    pub send_buf_ms_ws: u64,
    /// Must exceed the client's `ws-kalive-ms` or live sockets will be
    /// closed by the watchdog between keep-alive pings (§4.2, §6).
    pub ws_conn_gc_ms: u64,
    pub packer: Arc<dyn Codec>,
    pub user_id_fn: UserIdFn,
    pub csrf_token_fn: CsrfTokenFn,
    pub handshake_data_fn: HandshakeDataFn,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            recv_buf_or_n: 1000,
            send_buf_ms_ajax: 100,
            send_buf_ms_ws: 30,
            ws_conn_gc_ms: 40_000,
            packer: Arc::new(JsonCodec),
            user_id_fn: Arc::new(|_ctx| None),
            csrf_token_fn: Arc::new(|_ctx| None),
            handshake_data_fn: Arc::new(|_ctx| None),
        }
    }
}
