// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crate-boundary error type.
//!
//! Mirrors the teacher's `thiserror`-derived error enums at crate
//! boundaries (e.g. `coopmux`'s `error.rs`): one flat enum per failure
//! category, no nested `Box<dyn Error>` chains.

use thiserror::Error;

/// Errors surfaced by `chsk-core` operations (packing/unpacking, event
/// validation). Protocol violations such as a malformed event or a codec
/// failure are *not* represented here on the server side — per the spec
/// they are translated into `chsk/bad-event` / `chsk/bad-package` events
/// and kept out of the `Result` channel so one bad frame from one client
/// cannot propagate as a hard error. `ChskError` is for cases that are
/// genuinely exceptional: a caller-side contract violation.
#[derive(Debug, Error)]
pub enum ChskError {
    #[error("event id must be namespaced (e.g. `app/login`), got {0:?}")]
    UnnamespacedEventId(String),

    #[error("event id must not be empty")]
    EmptyEventId,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("missing required `client-id` query parameter")]
    MissingClientId,

    #[error("transport error: {0}")]
    Transport(String),
}
