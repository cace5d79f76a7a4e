// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level types shared by `chsk-server` and `chsk-client`: events,
//! the packed-string wire format, the pluggable codec contract, and the
//! small sentinel types used for reply correlation (§3, §4.1, §6).
//!
//! No I/O lives here — this crate is pure data + validation so both sides
//! of the channel agree on what a valid frame looks like without either
//! depending on the other's transport stack.

pub mod cb;
pub mod codec;
pub mod error;
pub mod event;
pub mod pstr;
pub mod uid;

pub use cb::{CbId, CbReply};
pub use codec::{Codec, JsonCodec};
pub use error::ChskError;
pub use event::{Event, InvalidEventReason};
pub use pstr::Pstr;
pub use uid::Uid;

/// System events live in this namespace; see [`event::RESERVED_NS`].
pub const CHSK_NS: &str = event::RESERVED_NS;

/// Well-known system event ids (§6).
pub mod ids {
    pub const HANDSHAKE: &str = "chsk/handshake";
    pub const STATE: &str = "chsk/state";
    pub const RECV: &str = "chsk/recv";
    pub const WS_ERROR: &str = "chsk/ws-error";
    pub const CLOSE: &str = "chsk/close";
    pub const WS_PING: &str = "chsk/ws-ping";
    pub const UIDPORT_OPEN: &str = "chsk/uidport-open";
    pub const UIDPORT_CLOSE: &str = "chsk/uidport-close";
    pub const BAD_PACKAGE: &str = "chsk/bad-package";
    pub const BAD_EVENT: &str = "chsk/bad-event";
}
