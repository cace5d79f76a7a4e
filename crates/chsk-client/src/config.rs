// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client factory configuration (§6), mirroring `chsk-server`'s
//! `ServerConfig` (plain struct, `Default`, teacher's `MuxConfig` shape).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chsk_core::{Codec, JsonCodec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Auto,
    Ws,
    Ajax,
}

pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

#[derive(Clone)]
pub struct ClientConfig {
    pub transport: TransportKind,
    /// Base URL of the single chsk endpoint, e.g. `ws://host/chsk` for the
    /// WS transport or `http://host/chsk` for Ajax. The Auto transport
    /// rewrites the scheme itself when it constructs each inner transport.
    pub host: String,
    pub params: HashMap<String, String>,
    pub ws_kalive_ms: u64,
    pub lp_timeout_ms: u64,
    pub backoff_ms_fn: BackoffFn,
    pub packer: Arc<dyn Codec>,
    pub client_id: Option<String>,
    /// When true, delivered application events arrive on the receive
    /// channel wrapped as `[chsk/recv, event]` instead of bare (§6).
    pub wrap_recv_evs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Auto,
            host: "ws://127.0.0.1:3000/chsk".to_owned(),
            params: HashMap::new(),
            ws_kalive_ms: 30_000,
            lp_timeout_ms: 20_000,
            backoff_ms_fn: Arc::new(default_backoff),
            packer: Arc::new(JsonCodec),
            client_id: None,
            wrap_recv_evs: false,
        }
    }
}

/// Exponential backoff with jitter, capped at 30s (§4.4 `backoff-ms-fn`).
fn default_backoff(attempt: u32) -> Duration {
    let base = 500u64.saturating_mul(1u64 << attempt.min(6));
    let jitter = rand::random::<u64>() % 500;
    Duration::from_millis(base.min(30_000) + jitter)
}
