// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server side of chsk (§1, §4.2–§4.3, §4.7): the connection registry, the
//! `axum` handshake/Ajax endpoint, push & batching, and the router loop.
//!
//! A factory call ([`ServerState::new`]) hands back a bundle of independent
//! handles — registry, pusher, receive queue, presence view — rather than
//! stashing anything in process-global state (§9), so a process can host
//! more than one channel-socket instance.

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod event_msg;
pub mod presence;
pub mod push;
pub mod registry;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use endpoint::{ajax_post, handshake_or_poll, routes, ReqCtx};
pub use event_msg::{EventMsg, ReplySink};
pub use presence::{Presence, PresenceEdge};
pub use push::PushOpts;
pub use registry::Registry;
pub use router::{start_router, HandlerError};
pub use state::ServerState;
