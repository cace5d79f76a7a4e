// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two HTTP callables the application wires into its router (§4.2, §6).
//!
//! Grounded on the teacher's `transport/ws.rs` (`ws_handler`/`handle_connection`
//! using `tokio::select!`-free per-connection tasks split into a reader loop
//! and a writer task) and `transport/http.rs`'s form-decoding POST handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{info, warn};

use chsk_core::{cb, event, ids, pstr, ChskError, Codec, Event, Pstr, Uid};

use crate::channel::{AjaxChannel, ServerChannel, WsChannel, WsOutMsg};
use crate::event_msg::{EventMsg, ReplySink};
use crate::state::ServerState;

const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// What an application's `user-id-fn`/`csrf-token-fn`/`handshake-data-fn`
/// sees: the bits of the request those callbacks are allowed to depend on
/// (§9 — the surrounding HTTP framework is an external collaborator, this
/// is the minimal surface `chsk-server` needs to expose of it).
pub struct ReqCtx {
    pub client_id: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "client-id")]
    client_id: String,
    #[serde(rename = "handshake?", default)]
    handshake: bool,
}

#[derive(Debug, Deserialize)]
pub struct AjaxPostForm {
    #[serde(rename = "client-id")]
    client_id: String,
    ppstr: String,
}

pub struct EndpointError(ChskError);

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
    }
}

/// `GET <path>` — WebSocket upgrade or Ajax long-poll, depending on whether
/// the request carried upgrade headers (§4.2).
pub async fn handshake_or_poll(
    State(state): State<Arc<ServerState>>,
    ws: Option<WebSocketUpgrade>,
    Query(query): Query<HandshakeQuery>,
    Query(raw_query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, EndpointError> {
    if query.client_id.trim().is_empty() {
        return Err(EndpointError(ChskError::MissingClientId));
    }
    let ctx = ReqCtx { client_id: query.client_id.clone(), headers, query: raw_query };
    let uid = Uid::from((state.config.user_id_fn)(&ctx));
    let csrf = (state.config.csrf_token_fn)(&ctx);
    if csrf.is_none() {
        warn!(client_id = %ctx.client_id, "handshake without csrf token");
    }
    let handshake_data = (state.config.handshake_data_fn)(&ctx);

    match ws {
        Some(upgrade) => {
            let client_id = ctx.client_id;
            Ok(upgrade.on_upgrade(move |socket| handle_ws(state, socket, uid, client_id, csrf, handshake_data)))
        }
        None => Ok(handle_ajax_get(state, uid, ctx.client_id, query.handshake, csrf, handshake_data).await),
    }
}

/// Mounts both handlers on a single path, matching the spec's "two URLs
/// on the same path" shape (§6). The application is free to call
/// [`handshake_or_poll`]/[`ajax_post`] directly instead if it needs to mix
/// them into a larger router with its own middleware.
pub fn routes(state: Arc<ServerState>) -> axum::Router {
    axum::Router::new()
        .route("/", axum::routing::get(handshake_or_poll).post(ajax_post))
        .with_state(state)
}

/// `POST <path>` — a one-shot Ajax event. Never touches the registry (§4.2).
pub async fn ajax_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(raw_query): Query<HashMap<String, String>>,
    Form(form): Form<AjaxPostForm>,
) -> Result<Response, EndpointError> {
    if form.client_id.trim().is_empty() {
        return Err(EndpointError(ChskError::MissingClientId));
    }
    let ctx = ReqCtx { client_id: form.client_id.clone(), headers, query: raw_query };
    let uid = Uid::from((state.config.user_id_fn)(&ctx));
    let codec = state.config.packer.clone();

    let (value, cb_id) = match pstr::unpack(codec.as_ref(), &form.ppstr) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(client_id = %ctx.client_id, error = %e, "bad package from ajax post");
            state.emit_internal(Event::bad_package(), uid, ctx.client_id);
            return Ok((StatusCode::OK, dummy_cb_body(&codec)).into_response());
        }
    };
    let decoded_event = event::validate_or_wrap(value);

    match cb_id {
        Some(_) => {
            let (tx, rx) = oneshot::channel::<Value>();
            state.emit(EventMsg { event: decoded_event, uid, client_id: ctx.client_id, reply: Some(ReplySink::AjaxPost { tx }) });
            let reply_value = rx.await.unwrap_or_else(|_| cb::dummy_cb_200());
            match pstr::pack(codec.as_ref(), &reply_value, None) {
                Ok(packed) => Ok((StatusCode::OK, packed.into_string()).into_response()),
                Err(e) => {
                    warn!(error = %e, "failed to pack ajax reply");
                    Ok((StatusCode::INTERNAL_SERVER_ERROR, "reply pack failure").into_response())
                }
            }
        }
        None => {
            state.emit(EventMsg { event: decoded_event, uid, client_id: ctx.client_id, reply: None });
            Ok((StatusCode::OK, dummy_cb_body(&codec)).into_response())
        }
    }
}

fn dummy_cb_body(codec: &Arc<dyn Codec>) -> String {
    pstr::pack(codec.as_ref(), &cb::dummy_cb_200(), None)
        .map(Pstr::into_string)
        .unwrap_or_else(|_| "-\"chsk/dummy-cb-200\"".to_owned())
}

fn handshake_event(uid: &Uid, csrf: Option<String>, handshake_data: Option<Value>) -> Event {
    Event::with_payload(
        ids::HANDSHAKE,
        Value::Array(vec![
            Value::String(uid.to_string()),
            csrf.map(Value::String).unwrap_or(Value::Null),
            handshake_data.unwrap_or(Value::Null),
            Value::Bool(true),
        ]),
    )
}

async fn handle_ws(
    state: Arc<ServerState>,
    socket: WebSocket,
    uid: Uid,
    client_id: String,
    csrf: Option<String>,
    handshake_data: Option<Value>,
) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<WsOutMsg>();
    let channel = Arc::new(WsChannel::new(out_tx));

    if let Some(edge) = state.registry.ws_open(uid.clone(), client_id.clone(), channel.clone()) {
        state.emit_presence_edge(edge, uid.clone(), client_id.clone());
    }
    info!(%uid, %client_id, "ws open");

    let codec = state.config.packer.clone();
    if let Ok(packed) = pstr::pack(codec.as_ref(), &handshake_event(&uid, csrf, handshake_data).to_value(), None) {
        channel.send(packed, false);
    }

    let last_activity = Arc::new(parking_lot::Mutex::new(Instant::now()));

    let watchdog = {
        let channel = channel.clone();
        let last_activity = last_activity.clone();
        let gc_ms = state.config.ws_conn_gc_ms;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(gc_ms)).await;
                if last_activity.lock().elapsed() >= Duration::from_millis(gc_ms) {
                    channel.close();
                    break;
                }
            }
        })
    };

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match msg {
                WsOutMsg::Frame(pstr) => {
                    if sink.send(Message::Text(pstr.into_string().into())).await.is_err() {
                        break;
                    }
                }
                WsOutMsg::Close => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                *last_activity.lock() = Instant::now();
                handle_ws_frame(&state, &channel, &codec, &uid, &client_id, text.as_str());
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {
                *last_activity.lock() = Instant::now();
            }
        }
    }

    watchdog.abort();
    writer.abort();
    state.registry.ws_close(&uid, &client_id);
    info!(%uid, %client_id, "ws close");

    let state = state.clone();
    let uid = uid.clone();
    tokio::spawn(async move {
        tokio::time::sleep(DISCONNECT_GRACE).await;
        if let Some(edge) = state.registry.recompute_after_grace(&uid) {
            state.emit_presence_edge(edge, uid.clone(), client_id);
        }
    });
}

fn handle_ws_frame(
    state: &Arc<ServerState>,
    channel: &Arc<WsChannel>,
    codec: &Arc<dyn Codec>,
    uid: &Uid,
    client_id: &str,
    text: &str,
) {
    match pstr::unpack(codec.as_ref(), text) {
        Ok((value, cb_id)) => {
            let decoded_event = event::validate_or_wrap(value);
            if decoded_event.id == ids::WS_PING {
                return;
            }
            let reply = cb_id.map(|cb| ReplySink::Ws {
                channel: channel.clone() as Arc<dyn ServerChannel>,
                cb,
                codec: codec.clone(),
            });
            state.emit(EventMsg { event: decoded_event, uid: uid.clone(), client_id: client_id.to_owned(), reply });
        }
        Err(e) => {
            warn!(%uid, %client_id, error = %e, "bad package from ws client");
            state.emit_internal(Event::bad_package(), uid.clone(), client_id.to_owned());
        }
    }
}

async fn handle_ajax_get(
    state: Arc<ServerState>,
    uid: Uid,
    client_id: String,
    want_handshake: bool,
    csrf: Option<String>,
    handshake_data: Option<Value>,
) -> Response {
    let (tx, rx) = oneshot::channel::<Pstr>();
    let channel = Arc::new(AjaxChannel::new(tx));
    let (is_initial, edge) = state.registry.ajax_open(uid.clone(), client_id.clone(), channel.clone());
    if let Some(edge) = edge {
        state.emit_presence_edge(edge, uid.clone(), client_id.clone());
    }
    info!(%uid, %client_id, is_initial, "ajax poll opened");

    let codec = state.config.packer.clone();
    if is_initial || want_handshake {
        if let Ok(packed) = pstr::pack(codec.as_ref(), &handshake_event(&uid, csrf, handshake_data).to_value(), None) {
            channel.send(packed, true);
        }
    }

    let body = rx.await.ok();

    let disconnected_at = state.registry.ajax_mark_disconnected(&uid, &client_id);
    let grace_state = state.clone();
    let grace_uid = uid.clone();
    let grace_client_id = client_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(DISCONNECT_GRACE).await;
        let Some(at) = disconnected_at else { return };
        if let Some(edge) = grace_state.registry.recompute_ajax_after_grace(&grace_uid, &grace_client_id, at) {
            grace_state.emit_presence_edge(edge, grace_uid, grace_client_id);
        }
    });

    match body {
        Some(pstr) => (StatusCode::OK, pstr.into_string()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
