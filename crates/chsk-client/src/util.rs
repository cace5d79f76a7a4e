// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small id/token helpers shared by both transports.

use uuid::Uuid;

/// A short correlation id for a WS callback (§4.4). Doesn't need to be a
/// full UUID — just unique among this socket's in-flight waiters.
pub fn short_cb_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_owned()
}

/// An opaque token appended to long-poll GETs so intermediate caches and
/// proxies don't collapse distinct polls into one (§4.5).
pub fn cache_buster() -> String {
    format!("{:x}", rand::random::<u64>())
}
