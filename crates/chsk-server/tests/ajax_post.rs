// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end coverage of the Ajax POST path against a real `axum` router,
//! following the teacher's `axum-test`-based integration style.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum_test::TestServer;
use chsk_core::{cb::CbId, pstr, JsonCodec};
use chsk_server::{routes, ServerConfig, ServerState};

fn server() -> (TestServer, tokio::sync::mpsc::Receiver<chsk_server::EventMsg>) {
    let (state, recv, _presence) = ServerState::new(ServerConfig::default());
    let app = routes(state);
    (TestServer::new(app).expect("test server"), recv)
}

#[tokio::test]
async fn post_without_callback_gets_dummy_cb_200() {
    let (server, mut recv) = server();
    let ppstr = pstr::pack(&JsonCodec, &serde_json::json!(["app/ping"]), None)
        .expect("pack")
        .into_string();

    let resp = server
        .post("/")
        .form(&[("client-id", "c1"), ("ppstr", ppstr.as_str())])
        .await;

    resp.assert_status_ok();
    let (value, cb) = pstr::unpack(&JsonCodec, resp.text().as_str()).expect("unpack");
    assert_eq!(value, serde_json::json!("chsk/dummy-cb-200"));
    assert_eq!(cb, None);

    let msg = recv.try_recv().expect("event delivered");
    assert_eq!(msg.event.id, "app/ping");
}

#[tokio::test]
async fn missing_client_id_is_rejected() {
    let (server, _recv) = server();
    let ppstr = pstr::pack(&JsonCodec, &serde_json::json!(["app/ping"]), None)
        .expect("pack")
        .into_string();

    let resp = server.post("/").form(&[("client-id", ""), ("ppstr", ppstr.as_str())]).await;

    resp.assert_status_bad_request();
}

#[tokio::test]
async fn post_with_ajax_callback_waits_for_application_reply() {
    let (server, mut recv) = server();
    let ppstr = pstr::pack(&JsonCodec, &serde_json::json!(["app/ping"]), Some(&CbId::Ajax))
        .expect("pack")
        .into_string();

    let handle = tokio::spawn(async move {
        let msg = recv.recv().await.expect("event delivered");
        msg.reply.expect("reply sink present").reply(serde_json::json!("pong"));
    });

    let resp = server.post("/").form(&[("client-id", "c1"), ("ppstr", ppstr.as_str())]).await;
    handle.await.expect("reply task");

    resp.assert_status_ok();
    let (value, _cb) = pstr::unpack(&JsonCodec, resp.text().as_str()).expect("unpack");
    assert_eq!(value, serde_json::json!("pong"));
}
