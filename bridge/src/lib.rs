//! Bridges an object-oriented API across a byte-oriented async messaging
//! channel. A locally owned object is shared once; from then on the peer
//! holds a live [`object::Proxy`] whose properties stay in sync and whose
//! methods forward as async calls, batched and throttled the way a
//! dynamically-typed implementation would coalesce a tick's worth of
//! mutations into one message.
//!
//! Built on [`bridge_value`] for the wire codec; `#[bridge_macros::bridge_object]`
//! generates the [`object::BridgeObject`] impl a bridgeable type needs
//! from an ordinary `impl` block.

mod bridge;
mod error;
mod magic;
mod management;
mod message;
mod object;
mod options;
mod runtime;
mod shared;
mod state;

pub use async_trait::async_trait;

pub use bridge::{make_local_bridge, Bridge};
pub use error::{Error, Result};
pub use magic::{BridgeToken, Callback, Magic};
pub use management::{add_listener, add_watcher, close, emit, share, update, Bridgeable, ON_METHOD, WATCH_METHOD};
pub use message::{CallId, CallRecord, ChangeRecord, CreateRecord, EventRecord, LocalId, Message, ReturnRecord};
pub use object::{diff_object, pack_object, BridgeObject, EventCallback, Proxy, ProxyBackend, ValueCache};
pub use options::{BridgeOptions, LocalBridgeOptions};
pub use shared::share_data;
pub use state::BridgeState;

pub use bridge_macros::bridge_object;
