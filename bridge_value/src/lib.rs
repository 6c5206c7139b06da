//! Packed-value codec for the object bridge.
//!
//! This crate owns the wire format — `DataMap`/`PackedData` envelopes, the
//! `Pack`/`Unpack` traits that translate Rust values to and from them, and
//! the process-wide shared-constant table — without knowing anything about
//! connections, registries, or the async runtime that moves bytes between
//! peers. The `bridge` crate builds its connection and proxy machinery on
//! top of this one.

mod error;
mod js_error;
mod map;
mod object_ref;
mod pack;
mod packed;
mod raw;
mod shared;
mod unpack;

pub use error::{Error, ErrorKind, Result};
pub use js_error::{JsError, JsErrorClass};
pub use map::{DataMap, ScalarTag};
pub use object_ref::{BridgeObject, BridgeRef, ObjectHandle, PeerHandle};
pub use pack::{Bytes, Buffer, Pack, Shared};
pub use packed::PackedData;
pub use raw::RawValue;
pub use shared::{ShareTable, SHARE_TABLE};
pub use unpack::Unpack;

static_assertions::assert_impl_all!(PackedData: Send, Sync);
static_assertions::assert_impl_all!(ObjectHandle: Send, Sync);
static_assertions::assert_impl_all!(JsError: Send, Sync);
