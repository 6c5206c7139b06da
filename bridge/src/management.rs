//! High-level verbs gluing a bridgeable object's in-process metadata
//! ([`Magic`]) to every wire-level [`BridgeState`] currently sharing it —
//! the direct counterparts of `bridgifyObject`/`shareData`/`emit`/
//! `addListener`/`addWatcher`/`update`/`close`. Each verb here fans out
//! over `magic.bridges()` rather than taking a single `BridgeState`
//! directly, since a bridgeable object can be shared across more than one
//! live connection at once.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bridge_value::Pack;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::magic::{Callback, Magic};
use crate::message::LocalId;
use crate::object::BridgeObject;
use crate::state::BridgeState;

/// The in-process metadata every bridgeable type embeds as a field and
/// delegates `emit`/`addListener`/`close` to — the Rust stand-in for
/// mixing a hidden magic slot into every bridgeable instance.
#[derive(Debug, Default, Clone)]
pub struct Bridgeable(Arc<Magic>);

impl Bridgeable {
    pub fn new() -> Self {
        Lazy::force(&SUBSCRIPTION_HOOKS);
        Bridgeable(Arc::new(Magic::default()))
    }

    pub fn magic(&self) -> &Arc<Magic> {
        &self.0
    }
}

/// Registers `obj` with `state` and queues its initial `CreateRecord`,
/// then joins `magic` to that bridge so `update`/`emit`/`close` fan out
/// to it going forward — the entry point for sharing a newly constructed
/// child object with a peer. Idempotent: sharing the same object with the
/// same state twice returns the id already assigned and does not re-queue
/// a create or re-join the bridge.
pub fn share(state: &Arc<BridgeState>, magic: &Arc<Magic>, obj: Arc<dyn BridgeObject>) -> LocalId {
    let local_id = state.share_object(obj);
    magic.join_bridge(state.token());
    local_id
}

/// Fires every in-process listener registered for `name` with the typed,
/// still-unpacked payload, then, for each bridge `magic` currently belongs
/// to, packs it through that bridge's own peer context and queues it as a
/// wire `EventRecord`.
///
/// Enqueues on the wire before invoking local listeners, so a listener
/// that calls back into the bridge (or simply runs long) never delays
/// delivery to the peer. A listener that panics is caught and re-routed
/// to this object's `'error'` listeners instead of unwinding past `emit`;
/// a panic while already handling `'error'` is not re-routed again, to
/// avoid looping.
pub fn emit<T: Pack + Any + Send + Sync + 'static>(magic: &Arc<Magic>, name: &str, payload: T) {
    for token in magic.bridges() {
        let Some(state) = BridgeState::lookup_by_token(token) else { continue };
        let packed = payload.pack(state.as_ref());
        state.emit_event(magic.local_id(), name, packed);
    }

    for cb in magic.listeners_for(name) {
        let result = catch_unwind(AssertUnwindSafe(|| cb(&payload)));
        if let Err(panic) = result {
            if name == "error" {
                warn!(listener = name, "listener for 'error' itself panicked, not re-emitting");
                continue;
            }
            let message = panic_message(&*panic);
            warn!(listener = name, %message, "bridge listener panicked");
            emit(magic, "error", message);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

/// Subscribes to an in-process event. `T` must match what `emit::<T>` is
/// called with for this `name` — a mismatch downcasts to `None` silently,
/// mirroring a dynamically-typed listener simply not matching the payload
/// shape at runtime.
pub fn add_listener<T: Any + Send + Sync>(
    magic: &Arc<Magic>,
    name: impl Into<String>,
    mut callback: impl FnMut(&T) + Send + 'static,
) -> Box<dyn FnOnce() + Send> {
    let cb: Callback = Arc::new(move |payload| {
        if let Some(typed) = payload.downcast_ref::<T>() {
            callback(typed);
        }
    });
    magic.add_listener(name, cb)
}

/// Subscribes to a single property's changes, compared by pointer
/// identity against the last value `update` was called with for that
/// name — the in-process counterpart to `Proxy::watch` for an owning-side
/// bridgeable object. `T` must match what `update::<T>` supplies for this
/// `name`; a mismatch downcasts to `None` silently.
pub fn add_watcher<T: Any + Send + Sync>(
    magic: &Arc<Magic>,
    name: impl Into<String>,
    mut callback: impl FnMut(&T) + Send + 'static,
) -> Box<dyn FnOnce() + Send> {
    let cb: Callback = Arc::new(move |payload| {
        if let Some(typed) = payload.downcast_ref::<T>() {
            callback(typed);
        }
    });
    magic.add_watcher(name, cb)
}

/// Marks `magic`'s object dirty for a full property re-diff on every
/// bridge it currently belongs to — the entry point for "something about
/// this object's properties changed, recompute and notify". When
/// `watched` names a single property alongside its current value, also
/// invalidates and refreshes that property's watcher cache, synchronously
/// firing every watcher whose last-seen value differs.
///
/// `T` has no dynamically-typed equivalent of reading `obj[name]` back
/// out of the object by string, so the caller supplies the current value
/// directly rather than `update` deriving it from `magic` alone.
pub fn update<T: Any + Send + Sync>(magic: &Arc<Magic>, watched: Option<(&str, Arc<T>)>) {
    for token in magic.bridges() {
        if let Some(state) = BridgeState::lookup_by_token(token) {
            state.mark_dirty(magic.local_id());
        }
    }
    if let Some((name, current)) = watched {
        magic.invalidate_watcher(name);
        magic.refresh_watcher(name, current);
    }
}

/// Closes the object: fires its `'close'` listeners, marks it closed
/// (idempotent — a second call is a no-op), then tells every bridge it
/// belonged to that the object is gone and forgets that membership.
pub fn close(magic: &Arc<Magic>) {
    if magic.is_closed() {
        return;
    }
    for cb in magic.listeners_for("close") {
        let _ = catch_unwind(AssertUnwindSafe(|| cb(&())));
    }
    magic.mark_closed();
    for token in magic.leave_all_bridges() {
        if let Some(state) = BridgeState::lookup_by_token(token) {
            state.close_object(magic.local_id());
        }
    }
}

/// The shared-constant name a peer calls to subscribe to a bridgeable
/// object's events without a dedicated per-event method — registered into
/// `bridge_value::SHARE_TABLE` the first time this module is touched.
pub const ON_METHOD: &str = "bridge.onMethod";

/// The shared-constant name a peer calls to watch a single property's
/// changes without a dedicated per-property method.
pub const WATCH_METHOD: &str = "bridge.watchMethod";

/// Marker values registered under [`ON_METHOD`]/[`WATCH_METHOD`] so they
/// round-trip through `bridge_value::Shared` the same as any other
/// process-wide constant.
pub static SUBSCRIPTION_HOOKS: Lazy<()> = Lazy::new(|| {
    let on_marker: Arc<dyn Any + Send + Sync> = Arc::new(ON_METHOD);
    let watch_marker: Arc<dyn Any + Send + Sync> = Arc::new(WATCH_METHOD);
    let _ = bridge_value::SHARE_TABLE.register(ON_METHOD.to_string(), on_marker);
    let _ = bridge_value::SHARE_TABLE.register(WATCH_METHOD.to_string(), watch_marker);
});
