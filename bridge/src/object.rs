//! The object side of the codec: turning a locally-owned bridgeable value
//! into wire props (`pack_object`/`diff_object`), and the client-side
//! stand-in for a remote object (`Proxy`).
//!
//! A dynamically-typed implementation inspects an object's own+inherited
//! property names at bridgify time. Rust has no such reflection, so
//! [`BridgeObject`] is the compile-time substitute: `#[bridge_object]`
//! (in the `bridge_macros` crate) generates an impl of it from an ordinary
//! `impl SomeType { ... }` block, fixing the method/property name lists at
//! compile time instead of computing them once at runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_value::{BridgeRef, PackedData, PeerHandle, Unpack};

use crate::error::{Error, Result};
use crate::message::LocalId;

/// What `#[bridge_object]` generates an impl of. Re-exported from
/// `bridge_value` rather than defined here: [`bridge_value::ObjectHandle`]
/// needs the full capability, not just [`BridgeRef`]'s identity check, to
/// admit a previously-unseen owned object lazily (see
/// `bridge_value::PeerHandle::admit`).
pub use bridge_value::BridgeObject;

/// Per-proxy cache of each property's last-packed envelope, used to
/// compute `ChangeRecord`s. Comparison is by `PackedData`'s derived
/// `PartialEq` (structural equality on `map`/`raw`/`throw`) rather than
/// pointer identity — the Rust stand-in for the reference-identity check
/// a dynamically-typed cache performs cheaply on object/array values.
#[derive(Debug, Default, Clone)]
pub struct ValueCache(BTreeMap<String, PackedData>);

impl ValueCache {
    pub fn new() -> Self {
        ValueCache(BTreeMap::new())
    }
}

/// Snapshots every property `obj` exposes, for a `CreateRecord`.
pub fn pack_object(obj: &dyn BridgeObject, ctx: &dyn PeerHandle) -> BTreeMap<String, PackedData> {
    obj.bridge_properties()
        .iter()
        .map(|&name| (name.to_string(), obj.get_property(name, ctx)))
        .collect()
}

/// Re-packs every property and returns only the ones that changed since
/// the last call, updating `cache` in place. An object with no changed
/// properties yields an empty map, which `BridgeState` should treat as
/// "no `ChangeRecord` needed" (the caller decides, per its own
/// dirty-tracking, whether to even call this).
pub fn diff_object(
    obj: &dyn BridgeObject,
    ctx: &dyn PeerHandle,
    cache: &mut ValueCache,
) -> BTreeMap<String, PackedData> {
    let mut changed = BTreeMap::new();
    for &name in obj.bridge_properties() {
        let next = obj.get_property(name, ctx);
        let is_new = match cache.0.get(name) {
            Some(prev) => prev != &next,
            None => true,
        };
        if is_new {
            cache.0.insert(name.to_string(), next.clone());
            changed.insert(name.to_string(), next);
        }
    }
    changed
}

/// A callback registered against a proxy's event stream or a watched
/// property. Receives the still-packed envelope plus the peer handle
/// needed to unpack it, so callers choose their own concrete type via
/// `bridge_value::Unpack` rather than the proxy guessing one for them.
pub type EventCallback = Arc<dyn Fn(&PackedData, &dyn PeerHandle) + Send + Sync>;

/// The capability a `Proxy` needs from whatever owns the wire connection,
/// kept as a trait so `object.rs` doesn't need to know `BridgeState`'s
/// internals.
#[async_trait]
pub trait ProxyBackend: Send + Sync + fmt::Debug {
    async fn call_method(&self, remote_id: LocalId, name: &str, args: PackedData) -> Result<PackedData>;

    fn cached_property(&self, remote_id: LocalId, name: &str) -> Option<PackedData>;

    fn add_event_listener(&self, remote_id: LocalId, name: &str, callback: EventCallback) -> Box<dyn FnOnce() + Send>;

    fn add_property_watcher(&self, remote_id: LocalId, name: &str, callback: EventCallback) -> Box<dyn FnOnce() + Send>;

    fn is_closed(&self, remote_id: LocalId) -> bool;

    fn close(&self, remote_id: LocalId);

    fn peer(&self) -> &dyn PeerHandle;

    /// Every property name this peer currently has a cached value for on
    /// `remote_id`, regardless of hiding — the unfiltered set
    /// `Proxy::properties` filters against `is_hidden_property`.
    fn cached_property_names(&self, remote_id: LocalId) -> Vec<String>;

    /// Whether `name` is configured to be suppressed from property
    /// enumeration (`BridgeOptions::hide_properties`) — the value itself
    /// stays retrievable through `cached_property`/`Proxy::get`.
    fn is_hidden_property(&self, name: &str) -> bool;
}

struct ProxyInner {
    remote_id: LocalId,
    backend: Arc<dyn ProxyBackend>,
}

impl fmt::Debug for ProxyInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy").field("remote_id", &self.remote_id).finish()
    }
}

/// A live, untyped handle to an object owned by the peer — the dynamic
/// counterpart to a `#[bridge_object]`-generated method table, addressed
/// by name (`call`/`get`) rather than a separate generated wrapper type
/// per interface.
#[derive(Debug, Clone)]
pub struct Proxy(Arc<ProxyInner>);

impl Proxy {
    pub fn new(remote_id: LocalId, backend: Arc<dyn ProxyBackend>) -> Self {
        Proxy(Arc::new(ProxyInner { remote_id, backend }))
    }

    pub fn remote_id(&self) -> LocalId {
        self.0.remote_id
    }

    pub fn is_closed(&self) -> bool {
        self.0.backend.is_closed(self.0.remote_id)
    }

    /// Invokes a named method on the remote object with pre-packed,
    /// already-joined arguments, awaiting its `ReturnRecord`. A payload
    /// carrying the throw flag surfaces here as `Err(Error::Thrown(...))`,
    /// not as a transport failure.
    pub async fn call(&self, name: &str, args: PackedData) -> Result<PackedData> {
        let payload = self.0.backend.call_method(self.0.remote_id, name, args).await?;
        if payload.throw {
            let err = Unpack::unpack(&payload, self.0.backend.peer(), name)
                .unwrap_or_else(|_: bridge_value::Error| bridge_value::JsError::generic("unknown error"));
            Err(Error::Thrown(err))
        } else {
            Ok(payload)
        }
    }

    /// The most recently received value for a bridged property, or `None`
    /// before the first `created`/`changed` record naming it has arrived.
    pub fn get(&self, name: &str) -> Option<PackedData> {
        self.0.backend.cached_property(self.0.remote_id, name)
    }

    /// Subscribes to a named event; returns an unsubscribe closure.
    pub fn on(&self, name: &str, callback: EventCallback) -> Box<dyn FnOnce() + Send> {
        self.0.backend.add_event_listener(self.0.remote_id, name, callback)
    }

    /// Subscribes to changes of a named property; fires once immediately
    /// with the current cached value if present, then again on every
    /// subsequent `ChangeRecord`.
    pub fn watch(&self, name: &str, callback: EventCallback) -> Box<dyn FnOnce() + Send> {
        if let Some(current) = self.get(name) {
            callback(&current, self.0.backend.peer());
        }
        self.0.backend.add_property_watcher(self.0.remote_id, name, callback)
    }

    pub fn close(&self) {
        self.0.backend.close(self.0.remote_id);
    }

    /// Names of every property currently synced for this proxy, minus any
    /// the owning side configured as hidden — still individually readable
    /// via `get`, just absent from this listing.
    pub fn properties(&self) -> Vec<String> {
        self.0
            .backend
            .cached_property_names(self.0.remote_id)
            .into_iter()
            .filter(|name| !self.0.backend.is_hidden_property(name))
            .collect()
    }
}

impl BridgeRef for Proxy {
    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A proxy is itself admittable as a `BridgeObject` so `PeerHandle::resolve`
/// can hand one back uniformly alongside owned objects — the "echoed back
/// one of the receiver's own ids" case in `pack_id`/`unpack_id`. It has no
/// static method/property list of its own (fully dynamic, by name only),
/// so `bridge_methods`/`bridge_properties` are honestly empty rather than
/// a placeholder.
#[async_trait]
impl BridgeObject for Proxy {
    fn bridge_methods(&self) -> &'static [&'static str] {
        &[]
    }

    fn bridge_properties(&self) -> &'static [&'static str] {
        &[]
    }

    fn get_property(&self, name: &str, _ctx: &dyn PeerHandle) -> PackedData {
        self.get(name).unwrap_or_else(crate::state::undefined_value)
    }

    async fn call_method(&self, name: &str, args: &[PackedData], _ctx: &dyn PeerHandle, path: &str) -> bridge_value::Result<PackedData> {
        let joined = PackedData::join_array(args.to_vec());
        self.call(name, joined).await.map_err(|_| bridge_value::Error::UnsupportedType {
            path: path.to_string(),
            type_name: "proxy forwarding",
        })
    }
}
