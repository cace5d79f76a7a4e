// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WebSocket transport state machine (§4.4).
//!
//! Grounded on the teacher's `mux_client.rs` retry-with-backoff
//! registration loop and `upstream/bridge.rs`'s WS client: a connect
//! attempt that on failure reschedules itself after a backoff, keyed by a
//! generation counter (`retry-id` in the spec) so a later explicit
//! reconnect supersedes any in-flight timer (§5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

use chsk_core::{cb::CbId, ids, pstr, CbReply, ChskError, Event};

use crate::framing::{apply_server_frame, publish_state_change};
use crate::shared::ClientShared;
use crate::util::short_cb_id;

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Invoked at most once, the first time a connect attempt or an open
/// connection fails. The Auto transport (§4.6) uses this to downgrade to
/// Ajax permanently instead of letting this client keep retrying WS.
type ErrorHook = Arc<dyn Fn() + Send + Sync>;

pub struct WsClient {
    shared: Arc<ClientShared>,
    epoch: AtomicU64,
    write: AsyncMutex<Option<SplitSink<Stream, Message>>>,
    first_error_hook: Mutex<Option<ErrorHook>>,
}

impl WsClient {
    pub fn new(shared: Arc<ClientShared>) -> Arc<Self> {
        Arc::new(Self { shared, epoch: AtomicU64::new(0), write: AsyncMutex::new(None), first_error_hook: Mutex::new(None) })
    }

    /// Registers the Auto-downgrade hook (§4.6). Fires once, on the first
    /// connect failure or unclean close.
    pub fn set_first_error_hook(&self, hook: ErrorHook) {
        *self.first_error_hook.lock() = Some(hook);
    }

    fn fire_first_error_hook(&self) {
        if let Some(hook) = self.first_error_hook.lock().take() {
            hook();
        }
    }

    pub fn connect(self: &Arc<Self>) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move { this.attempt_connect(epoch, 0).await });
    }

    /// Invalidates the current epoch so in-flight reconnect timers become
    /// no-ops on wake, then optionally starts a fresh connect (§5).
    pub fn disconnect(self: &Arc<Self>, reconnect: bool) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        publish_state_change(&self.shared.state_tx, &self.shared.recv_tx, |s| s.open = false);
        if reconnect {
            self.connect();
        }
    }

    pub async fn send(&self, event: Event, cb_timeout: Option<Duration>) -> Option<CbReply> {
        if !self.shared.state_tx.borrow().open {
            return cb_timeout.map(|_| CbReply::Closed);
        }

        let cb_id = cb_timeout.is_some().then(short_cb_id);
        let rx = cb_id.as_ref().map(|id| self.shared.waiters.register(id.clone()));

        if let Err(e) = self.write_frame(&event, cb_id.clone().map(CbId::Id).as_ref()).await {
            warn!(error = %e, "ws send failed");
            if let Some(id) = &cb_id {
                self.shared.waiters.resolve(id, CbReply::Error);
            }
            return cb_id.is_some().then_some(CbReply::Error);
        }

        let (Some(mut rx), Some(id), Some(timeout)) = (rx, cb_id, cb_timeout) else {
            return None;
        };
        let reply = tokio::select! {
            result = &mut rx => result.unwrap_or(CbReply::Closed),
            () = tokio::time::sleep(timeout) => {
                self.shared.waiters.resolve(&id, CbReply::Timeout);
                CbReply::Timeout
            }
        };
        Some(reply)
    }

    async fn attempt_connect(self: Arc<Self>, epoch: u64, attempt: u32) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let url = self.build_url();
        match connect_async(url).await {
            Ok((stream, _resp)) => self.run_connection(stream, epoch).await,
            Err(e) => {
                warn!(error = %e, attempt, "ws connect failed");
                self.fire_first_error_hook();
                self.schedule_reconnect(epoch, attempt);
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, epoch: u64, attempt: u32) {
        let delay = (self.shared.config.backoff_ms_fn)(attempt);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.attempt_connect(epoch, attempt + 1).await;
        });
    }

    async fn run_connection(self: Arc<Self>, stream: Stream, epoch: u64) {
        let (sink, mut read) = stream.split();
        *self.write.lock().await = Some(sink);

        let last_activity = Arc::new(parking_lot::Mutex::new(Instant::now()));
        let kalive_ms = self.shared.config.ws_kalive_ms;
        let keepalive = {
            let this = self.clone();
            let last_activity = last_activity.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(kalive_ms)).await;
                    if this.epoch.load(Ordering::SeqCst) != epoch {
                        return;
                    }
                    if last_activity.lock().elapsed() >= Duration::from_millis(kalive_ms) {
                        let _ = this.write_frame(&Event::new(ids::WS_PING), None).await;
                    }
                }
            })
        };

        let mut clean = false;
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    *last_activity.lock() = Instant::now();
                    self.handle_frame(text.as_str());
                }
                Some(Ok(Message::Close(_))) => {
                    clean = true;
                    break;
                }
                Some(Ok(_)) => {
                    *last_activity.lock() = Instant::now();
                }
                Some(Err(e)) => {
                    warn!(error = %e, "ws read error");
                    break;
                }
                None => break,
            }
        }

        keepalive.abort();
        *self.write.lock().await = None;
        publish_state_change(&self.shared.state_tx, &self.shared.recv_tx, |s| s.open = false);

        if clean || self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        self.fire_first_error_hook();
        self.schedule_reconnect(epoch, 0);
    }

    fn handle_frame(&self, text: &str) {
        let codec = self.shared.config.packer.clone();
        match pstr::unpack(codec.as_ref(), text) {
            Ok((value, Some(CbId::Id(id)))) => self.shared.waiters.resolve(&id, CbReply::Reply(value)),
            Ok((_, Some(CbId::Ajax))) => warn!("unexpected ajax-style callback sentinel on a ws frame"),
            Ok((value, None)) => apply_server_frame(value, &self.shared.state_tx, &self.shared.recv_tx),
            Err(e) => warn!(error = %e, "malformed frame from server"),
        }
    }

    async fn write_frame(&self, event: &Event, cb: Option<&CbId>) -> Result<(), ChskError> {
        let codec = self.shared.config.packer.clone();
        let packed = pstr::pack(codec.as_ref(), &event.to_value(), cb)?;
        let mut guard = self.write.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(ChskError::Transport("socket not connected".to_owned()));
        };
        sink.send(Message::Text(packed.into_string().into()))
            .await
            .map_err(|e| ChskError::Transport(e.to_string()))
    }

    fn build_url(&self) -> String {
        let mut url = format!("{}?client-id={}", self.shared.config.host, self.shared.client_id);
        for (k, v) in &self.shared.config.params {
            url.push('&');
            url.push_str(&urlencoding_pair(k, v));
        }
        url
    }
}

fn urlencoding_pair(k: &str, v: &str) -> String {
    format!("{}={}", k, v)
}
