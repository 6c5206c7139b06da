use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::packed::PackedData;

/// A handle to either a locally-owned bridgeable object or a proxy this
/// peer holds, as seen from the packer's side.
///
/// `bridge_value` never constructs this itself — the `bridge` crate's
/// `BridgeState` does, for whatever concrete owned-object/proxy types it
/// manages — this trait is the seam that keeps the codec crate from
/// depending on the runtime crate.
pub trait BridgeRef: Send + Sync + std::fmt::Debug {
    /// A process-wide-unique identity check so two `ObjectHandle`s can be
    /// compared for "is this the same underlying object" without downcasting.
    fn identity(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// What a bridgeable type's generated impl satisfies — the full method/
/// property/dispatch surface a peer needs to admit an object it has never
/// seen before (building its `CreateRecord` on the spot) rather than just
/// identify it. Extends [`BridgeRef`] so every `BridgeObject` is usable
/// anywhere a plain reference is.
///
/// Lives here rather than in `bridge` because [`ObjectHandle`] needs to
/// hold the full capability directly: admitting a previously-unseen owned
/// object (see [`PeerHandle::admit`]) requires packing its properties on
/// the spot, which needs more than identity alone.
#[async_trait]
pub trait BridgeObject: BridgeRef {
    fn bridge_methods(&self) -> &'static [&'static str];
    fn bridge_properties(&self) -> &'static [&'static str];

    /// Packs one property's current value.
    fn get_property(&self, name: &str, ctx: &dyn PeerHandle) -> PackedData;

    /// Dispatches a named method call against pre-split argument
    /// envelopes. `path` is the dotted diagnostic path of this call,
    /// threaded through so argument-unpacking failures point at
    /// `methodName[i]` rather than just `methodName`.
    async fn call_method(&self, name: &str, args: &[PackedData], ctx: &dyn PeerHandle, path: &str) -> crate::Result<PackedData>;
}

/// The packing-context capability a peer (`BridgeState` in the `bridge`
/// crate) provides to `pack`/`unpack` calls, so the codec can admit new
/// bridgeable references and resolve incoming ones without knowing
/// anything about registries, connections, or locking.
pub trait PeerHandle: Send + Sync {
    /// Admit `obj` for packing and return its signed packed id, or `None`
    /// if this peer has been closed. A previously-unseen owned object is
    /// admitted lazily — registered, diffed into a `CreateRecord`, and
    /// queued for the next flush — the Rust stand-in for a dynamically
    /// typed `getPackedId` bridgifying on first sight.
    fn admit(&self, obj: &Arc<dyn BridgeObject>) -> Option<i64>;

    /// Resolve a signed packed id received on the wire back to a live
    /// object, or `None` if it does not resolve to anything this peer
    /// currently knows about.
    fn resolve(&self, packed_id: i64) -> Option<Arc<dyn BridgeObject>>;

    /// Look up a globally shared constant by its `"<namespace>.<key>"` name.
    fn lookup_shared(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>>;

    /// The name a previously-registered shared value was registered under,
    /// if `value` is one (used when packing, the inverse of
    /// `lookup_shared`).
    fn shared_name_of(&self, value: &dyn Any) -> Option<String>;
}

/// A reference to a bridgeable object embedded inside a packed value — the
/// Rust stand-in for a dynamically-typed "this looks like a bridgeable
/// object" check. Wrap a child object in this type wherever it needs to
/// cross the bridge by reference rather than by value, marking it as
/// meaningfully distinct from a plain value at that position.
#[derive(Debug, Clone)]
pub struct ObjectHandle(pub Arc<dyn BridgeObject>);

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.identity() == other.0.identity()
    }
}

impl ObjectHandle {
    pub fn new(obj: Arc<dyn BridgeObject>) -> Self {
        ObjectHandle(obj)
    }
}
