// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Ajax long-poll transport (§4.5).
//!
//! Grounded on the teacher's `reqwest::Client` usage in
//! `broker/registry.rs`'s health-check loop: a bounded-timeout client
//! plus a generation counter (mirroring `ws.rs`'s `epoch`) so a
//! `disconnect` started mid-poll cancels the loop cleanly rather than
//! racing it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use chsk_core::{cb, cb::CbId, CbReply, Event};

use crate::framing::{apply_server_frame, publish_state_change};
use crate::shared::ClientShared;
use crate::util::cache_buster;

pub struct AjaxClient {
    shared: Arc<ClientShared>,
    epoch: AtomicU64,
    http: reqwest::Client,
}

impl AjaxClient {
    pub fn new(shared: Arc<ClientShared>) -> Arc<Self> {
        let lp_timeout = Duration::from_millis(shared.config.lp_timeout_ms);
        let http = reqwest::Client::builder()
            // generous margin over the long-poll hold so a slow server
            // doesn't get treated as a transport error before it even
            // has a chance to time the poll out itself
            .timeout(lp_timeout + Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Arc::new(Self { shared, epoch: AtomicU64::new(0), http })
    }

    pub fn connect(self: &Arc<Self>) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move { this.poll_loop(epoch, 0).await });
    }

    pub fn disconnect(self: &Arc<Self>, reconnect: bool) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        publish_state_change(&self.shared.state_tx, &self.shared.recv_tx, |s| s.open = false);
        if reconnect {
            self.connect();
        }
    }

    /// Mirrors [`crate::ws::WsClient::send`] but over a POST carrying a
    /// CSRF header (§4.5). Ajax has no multiplexed reply channel so the
    /// response body *is* the reply — no waiter map needed.
    pub async fn send(&self, event: Event, cb_timeout: Option<Duration>) -> Option<CbReply> {
        let cb_id = cb_timeout.is_some().then_some(CbId::Ajax);
        let codec = self.shared.config.packer.clone();
        let ppstr = match chsk_core::pstr::pack(codec.as_ref(), &event.to_value(), cb_id.as_ref()) {
            Ok(p) => p.into_string(),
            Err(e) => {
                warn!(error = %e, "failed to pack ajax send");
                return cb_timeout.map(|_| CbReply::Error);
            }
        };

        let csrf = self.shared.state_tx.borrow().csrf_token.clone().unwrap_or_default();
        let url = send_url(&self.shared.config.host);
        let form = [
            ("client-id", self.shared.client_id.as_str()),
            ("ppstr", ppstr.as_str()),
            ("csrf-token", csrf.as_str()),
        ];

        let Some(timeout) = cb_timeout else {
            // Fire-and-forget: the application didn't ask for a reply, so
            // the response (always the dummy-cb sentinel in this case) is
            // discarded unread (§4.5).
            let send = self.http.post(url.as_str()).header("X-CSRF-Token", &csrf).form(&form).send();
            tokio::spawn(async move {
                let _ = send.await;
            });
            return None;
        };

        let send = self.http.post(url.as_str()).header("X-CSRF-Token", &csrf).form(&form).send();
        let reply = tokio::select! {
            result = self.decode_post_reply(send) => result,
            () = tokio::time::sleep(timeout) => CbReply::Timeout,
        };
        Some(reply)
    }

    async fn decode_post_reply(&self, send: impl std::future::Future<Output = reqwest::Result<reqwest::Response>>) -> CbReply {
        let resp = match send.await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "ajax send rejected");
                return CbReply::Error;
            }
            Err(e) => {
                warn!(error = %e, "ajax send failed");
                return CbReply::Error;
            }
        };
        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to read ajax send reply body");
                return CbReply::Error;
            }
        };
        let codec = self.shared.config.packer.clone();
        match chsk_core::pstr::unpack(codec.as_ref(), &text) {
            Ok((value, _)) if value == cb::dummy_cb_200() => {
                // The server had no application reply to give (the POST
                // never carried a callback the handler resolved); discard
                // the sentinel and let the caller's timeout fire instead
                // of resolving with a bogus reply (§4.5).
                std::future::pending::<CbReply>().await
            }
            Ok((value, _)) => CbReply::Reply(value),
            Err(e) => {
                warn!(error = %e, "malformed ajax send reply");
                CbReply::Error
            }
        }
    }

    async fn poll_loop(self: Arc<Self>, epoch: u64, mut attempt: u32) {
        loop {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            let want_handshake = !self.shared.state_tx.borrow().open;
            let url = poll_url(&self.shared.config.host, &self.shared.client_id, want_handshake);

            match self.http.get(url.as_str()).send().await {
                Ok(resp) if resp.status() == StatusCode::NO_CONTENT => {
                    attempt = 0;
                }
                Ok(resp) if resp.status().is_success() => {
                    self.handle_poll_body(resp).await;
                    attempt = 0;
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "ajax poll rejected");
                    publish_state_change(&self.shared.state_tx, &self.shared.recv_tx, |s| s.open = false);
                    self.backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) if e.is_timeout() => {
                    // the long-poll hold simply elapsed; not a failure (§4.5)
                    attempt = 0;
                }
                Err(e) => {
                    warn!(error = %e, "ajax poll failed");
                    publish_state_change(&self.shared.state_tx, &self.shared.recv_tx, |s| s.open = false);
                    self.backoff(attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn handle_poll_body(&self, resp: reqwest::Response) {
        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to read ajax poll body");
                return;
            }
        };
        let codec = self.shared.config.packer.clone();
        match chsk_core::pstr::unpack(codec.as_ref(), &text) {
            Ok((value, _)) => apply_server_frame(value, &self.shared.state_tx, &self.shared.recv_tx),
            Err(e) => warn!(error = %e, "malformed ajax poll frame"),
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = (self.shared.config.backoff_ms_fn)(attempt);
        tokio::time::sleep(delay).await;
    }
}

fn send_url(host: &str) -> String {
    format!("{host}?cache-buster={}", cache_buster())
}

fn poll_url(host: &str, client_id: &str, want_handshake: bool) -> String {
    format!(
        "{host}?client-id={client_id}&cache-buster={}{}",
        cache_buster(),
        if want_handshake { "&handshake?=true" } else { "" }
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, watch};

    use crate::config::ClientConfig;
    use crate::state::SocketState;

    fn shared() -> Arc<ClientShared> {
        let (state_tx, _rx) = watch::channel(SocketState::default());
        let (recv_tx, _rx) = mpsc::unbounded_channel();
        ClientShared::new(ClientConfig { host: "http://127.0.0.1:1/chsk".to_owned(), ..ClientConfig::default() }, state_tx, recv_tx)
    }

    #[test]
    fn poll_url_carries_handshake_flag_only_when_requested() {
        let with = poll_url("http://h/chsk", "c1", true);
        assert!(with.contains("client-id=c1"));
        assert!(with.contains("handshake?=true"));

        let without = poll_url("http://h/chsk", "c1", false);
        assert!(!without.contains("handshake?"));
    }

    #[test]
    fn send_url_has_no_client_id_or_handshake_params() {
        let url = send_url("http://h/chsk");
        assert!(url.starts_with("http://h/chsk?cache-buster="));
        assert!(!url.contains("client-id"));
    }

    #[test]
    fn disconnect_closes_published_state() {
        let shared = shared();
        let client = AjaxClient::new(shared.clone());
        shared.state_tx.send_modify(|s| s.open = true);
        client.disconnect(false);
        assert!(!shared.state_tx.borrow().open);
    }

    #[tokio::test]
    async fn disconnect_bumps_epoch_so_a_stale_poll_loop_exits() {
        let client = AjaxClient::new(shared());
        let epoch_before = client.epoch.load(Ordering::SeqCst);
        client.disconnect(false);
        assert_ne!(epoch_before, client.epoch.load(Ordering::SeqCst));
    }
}
