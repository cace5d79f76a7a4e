// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Example application: wires `chsk-server` into an `axum::Router`, reads a
//! `uid` query/form parameter as the application's user identity, echoes
//! `demo/ping` with `demo/pong`, and pushes a `demo/presence` event to every
//! connected uid whenever presence changes.

pub mod config;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use chsk_core::Event;
use chsk_server::{routes, EventMsg, PushOpts, ReqCtx, ServerConfig, ServerState};

use crate::config::DemoConfig;

/// Run the demo server until the process is killed.
pub async fn run(config: DemoConfig) -> anyhow::Result<()> {
    let addr = config.addr();

    let server_config = ServerConfig {
        user_id_fn: Arc::new(|ctx: &ReqCtx| ctx.query.get("uid").cloned()),
        ..ServerConfig::default()
    };
    let (state, recv, mut presence) = ServerState::new(server_config);

    spawn_presence_broadcaster(state.clone(), presence_rx_clone(&mut presence));

    let _stop = chsk_server::start_router(
        recv,
        |msg: EventMsg| async move { handle_event(msg).await },
        Some(Arc::new(|e| warn!(error = %e, "demo handler failed"))),
    );

    let router = axum::Router::new().nest(&config.path, routes(state)).layer(TraceLayer::new_for_http());

    info!(%addr, path = %config.path, "chsk-demo listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn presence_rx_clone(rx: &mut tokio::sync::watch::Receiver<chsk_server::Presence>) -> tokio::sync::watch::Receiver<chsk_server::Presence> {
    rx.clone()
}

/// Demonstrates the push API (§4.3): broadcast a `demo/presence` snapshot
/// to every currently-connected uid whenever the connected-users view
/// changes.
fn spawn_presence_broadcaster(state: Arc<ServerState>, mut presence: tokio::sync::watch::Receiver<chsk_server::Presence>) {
    tokio::spawn(async move {
        loop {
            if presence.changed().await.is_err() {
                return;
            }
            let snapshot = presence.borrow().clone();
            let any: Vec<String> = snapshot.any().iter().map(ToString::to_string).collect();
            let payload = serde_json::json!({ "connected": any });
            for uid in snapshot.any() {
                state.push(uid, Event::with_payload("demo/presence", payload.clone()), PushOpts::default());
            }
        }
    });
}

async fn handle_event(msg: EventMsg) -> Result<(), chsk_server::HandlerError> {
    match msg.event.id.as_str() {
        "demo/ping" => {
            info!(uid = %msg.uid, client_id = %msg.client_id, "demo/ping");
            if let Some(reply) = msg.reply {
                reply.reply(serde_json::json!("demo/pong"));
            }
        }
        "chsk/uidport-open" => info!(uid = %msg.uid, "uid connected"),
        "chsk/uidport-close" => info!(uid = %msg.uid, "uid disconnected"),
        "chsk/bad-event" | "chsk/bad-package" => warn!(uid = %msg.uid, id = %msg.event.id, "protocol violation from client"),
        other => info!(uid = %msg.uid, id = %other, "unhandled event"),
    }
    Ok(())
}
