// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server push: per-uid send-buffer coalescing, WS fan-out, and long-poll
//! fan-out with retry (§4.3).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use chsk_core::{ids, pstr, Codec, Event, Pstr, Uid};

use crate::channel::ServerChannel;
use crate::registry::Registry;

const NMAX_ATTEMPTS: u32 = 7;
const RETRY_MS_BASE: u64 = 90;
const RETRY_MS_RAND: u64 = 90;

/// Options for an individual [`Pusher::push`] call (§4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct PushOpts {
    /// Bypass the coalescing window and flush immediately.
    pub flush: bool,
}

#[derive(Default)]
struct SendBuffer {
    events: Vec<Event>,
    ids: HashSet<u64>,
}

/// Coalesces pushes for a window, then fans them out as one batch per
/// transport. One instance is shared by the WS and Ajax endpoint handlers
/// and by the application's `push` calls.
pub struct Pusher {
    registry: Arc<Registry>,
    codec: Arc<dyn Codec>,
    send_buf_ms_ws: u64,
    send_buf_ms_ajax: u64,
    ws_buffers: parking_lot::Mutex<HashMap<Uid, SendBuffer>>,
    ajax_buffers: parking_lot::Mutex<HashMap<Uid, SendBuffer>>,
    next_id: AtomicU64,
}

impl Pusher {
    pub fn new(registry: Arc<Registry>, codec: Arc<dyn Codec>, send_buf_ms_ws: u64, send_buf_ms_ajax: u64) -> Arc<Self> {
        Arc::new(Self {
            registry,
            codec,
            send_buf_ms_ws,
            send_buf_ms_ajax,
            ws_buffers: parking_lot::Mutex::new(HashMap::new()),
            ajax_buffers: parking_lot::Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Non-blocking. `[chsk/close]` bypasses buffering entirely (§4.3).
    pub fn push(self: &Arc<Self>, uid: Uid, event: Event, opts: PushOpts) {
        if event.id == ids::CLOSE {
            self.push_close(&uid);
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut bufs = self.ws_buffers.lock();
            let buf = bufs.entry(uid.clone()).or_default();
            buf.events.push(event.clone());
            buf.ids.insert(id);
        }
        {
            let mut bufs = self.ajax_buffers.lock();
            let buf = bufs.entry(uid.clone()).or_default();
            buf.events.push(event);
            buf.ids.insert(id);
        }

        if opts.flush {
            self.flush_ws(&uid, id);
            self.flush_ajax(&uid, id);
            return;
        }

        let this = Arc::clone(self);
        let ws_uid = uid.clone();
        let ws_delay = this.send_buf_ms_ws;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ws_delay)).await;
            this.flush_ws(&ws_uid, id);
        });

        let this = Arc::clone(self);
        let ajax_delay = this.send_buf_ms_ajax;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ajax_delay)).await;
            this.flush_ajax(&uid, id);
        });
    }

    /// Reads and clears the WS buffer iff `scheduling_id` is still present
    /// (§4.3 flush protocol) — a later flush for the same uid has usually
    /// already drained it, making this a no-op.
    fn flush_ws(&self, uid: &Uid, scheduling_id: u64) {
        let events = {
            let mut bufs = self.ws_buffers.lock();
            match bufs.get(uid) {
                Some(buf) if buf.ids.contains(&scheduling_id) => bufs.remove(uid).map(|b| b.events).unwrap_or_default(),
                _ => return,
            }
        };
        if events.is_empty() {
            return;
        }
        let Some(pstr) = self.pack_batch(&events) else { return };
        for channel in self.registry.ws_channels(uid) {
            channel.send(pstr.clone(), false);
        }
    }

    fn flush_ajax(self: &Arc<Self>, uid: &Uid, scheduling_id: u64) {
        let events = {
            let mut bufs = self.ajax_buffers.lock();
            match bufs.get(uid) {
                Some(buf) if buf.ids.contains(&scheduling_id) => bufs.remove(uid).map(|b| b.events).unwrap_or_default(),
                _ => return,
            }
        };
        if events.is_empty() {
            return;
        }
        let Some(pstr) = self.pack_batch(&events) else { return };
        let this = Arc::clone(self);
        let uid = uid.clone();
        tokio::spawn(async move {
            this.fan_out_ajax(uid, pstr).await;
        });
    }

    /// Long-poll fan-out with retry (§4.3): claim every currently-held
    /// response, send to each, and close it. Clients that were between
    /// polls retry up to [`NMAX_ATTEMPTS`] times with jittered backoff,
    /// re-claiming newly-available connections each round.
    async fn fan_out_ajax(&self, uid: Uid, pstr: Pstr) {
        for attempt in 0..=NMAX_ATTEMPTS {
            let channels = self.registry.claim_ajax_channels(&uid);
            if !channels.is_empty() {
                for ch in channels {
                    ch.send(pstr.clone(), true);
                }
                return;
            }
            if attempt == NMAX_ATTEMPTS {
                debug!(%uid, "long-poll fan-out exhausted retries, dropping batch");
                return;
            }
            let jitter = rand::rng().random_range(0..RETRY_MS_RAND);
            tokio::time::sleep(Duration::from_millis(RETRY_MS_BASE + jitter)).await;
        }
    }

    fn push_close(&self, uid: &Uid) {
        for ch in self.registry.ws_channels(uid) {
            ch.close();
        }
        for ch in self.registry.claim_ajax_channels(uid) {
            ch.close();
        }
    }

    fn pack_batch(&self, events: &[Event]) -> Option<Pstr> {
        let value = Value::Array(events.iter().map(Event::to_value).collect());
        match pstr::pack(self.codec.as_ref(), &value, None) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "failed to pack push batch");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chsk_core::JsonCodec;

    fn pusher() -> Arc<Pusher> {
        let (registry, _rx) = Registry::new();
        Pusher::new(registry, Arc::new(JsonCodec), 5, 5)
    }

    #[test]
    fn close_event_bypasses_buffering() {
        let p = pusher();
        // no connections registered; this should not panic and should not
        // populate the send buffers.
        p.push(Uid::known("alice"), Event::new(ids::CLOSE), PushOpts::default());
        assert!(p.ws_buffers.lock().is_empty());
    }

    #[tokio::test]
    async fn flush_drains_buffer_once() {
        let p = pusher();
        let uid = Uid::known("alice");
        p.push(uid.clone(), Event::new("app/one"), PushOpts { flush: true });
        assert!(p.ws_buffers.lock().get(&uid).is_none());
    }
}
