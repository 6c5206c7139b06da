use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::message::LocalId;

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

fn next_local_id() -> LocalId {
    NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed)
}

/// A named event/property-change callback. Payloads are type-erased
/// because one object's listeners may subscribe to differently-typed
/// events by name; callers downcast with [`Any`] the way a dynamically
/// typed implementation would duck-type the payload.
pub type Callback = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

/// Opaque token identifying which `BridgeState` currently holds this
/// object, used as the key of the `bridges` set — the Rust stand-in for
/// comparing bridge peer identity.
pub type BridgeToken = usize;

/// The hidden per-object metadata a dynamically typed implementation would
/// attach as a non-enumerable property; here it lives in a side table
/// keyed by the object's `Arc` pointer identity, per the design note that
/// the magic-slot abstraction is "intentionally side-table-friendly."
#[derive(Default)]
pub struct Magic {
    local_id: once_cell_local_id::OnceId,
    closed: std::sync::atomic::AtomicBool,
    bridges: Mutex<HashSet<BridgeToken>>,
    listeners: Mutex<HashMap<String, Vec<Callback>>>,
    watchers: Mutex<HashMap<String, Watcher>>,
    /// Set only for proxy-side magic records: the id this object is known
    /// by on the peer that owns it.
    remote_id: Mutex<Option<LocalId>>,
    /// Set only for shared-constant magic records.
    share_id: Mutex<Option<String>>,
}

struct Watcher {
    last_seen: Option<Arc<dyn Any + Send + Sync>>,
    callbacks: Vec<Callback>,
}

mod once_cell_local_id {
    use super::{next_local_id, LocalId};
    use std::sync::OnceLock;

    #[derive(Default)]
    pub struct OnceId(OnceLock<LocalId>);

    impl OnceId {
        pub fn get_or_assign(&self) -> LocalId {
            *self.0.get_or_init(next_local_id)
        }
    }
}

impl Magic {
    pub fn local_id(&self) -> LocalId {
        self.local_id.get_or_assign()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// One-shot: returns `true` the first time it's called, `false` on
    /// every subsequent call, so callers can fire `close` listeners
    /// exactly once.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn join_bridge(&self, token: BridgeToken) {
        self.bridges.lock().expect("magic lock poisoned").insert(token);
    }

    pub fn leave_all_bridges(&self) -> Vec<BridgeToken> {
        std::mem::take(&mut *self.bridges.lock().expect("magic lock poisoned")).into_iter().collect()
    }

    pub fn bridges(&self) -> Vec<BridgeToken> {
        self.bridges.lock().expect("magic lock poisoned").iter().copied().collect()
    }

    pub fn remote_id(&self) -> Option<LocalId> {
        *self.remote_id.lock().expect("magic lock poisoned")
    }

    pub fn set_remote_id(&self, id: LocalId) {
        *self.remote_id.lock().expect("magic lock poisoned") = Some(id);
    }

    pub fn share_id(&self) -> Option<String> {
        self.share_id.lock().expect("magic lock poisoned").clone()
    }

    pub fn set_share_id(&self, id: String) {
        *self.share_id.lock().expect("magic lock poisoned") = Some(id);
    }

    /// Installs `callback` under `name`, returning an unsubscribe closure.
    /// Per §4.5, installing on a closed object still records the
    /// subscription (the unsubscribe remains meaningful), but `emit`
    /// skips closed objects' local listeners entirely upstream.
    pub fn add_listener(self: &Arc<Self>, name: impl Into<String>, callback: Callback) -> Box<dyn FnOnce() + Send> {
        let name = name.into();
        self.listeners.lock().expect("magic lock poisoned").entry(name.clone()).or_default().push(callback.clone());
        let weak = Arc::downgrade(self);
        Box::new(move || {
            if let Some(magic) = weak.upgrade() {
                if let Some(list) = magic.listeners.lock().expect("magic lock poisoned").get_mut(&name) {
                    list.retain(|cb| !Arc::ptr_eq(cb, &callback));
                }
            }
        })
    }

    pub fn listeners_for(&self, name: &str) -> Vec<Callback> {
        self.listeners.lock().expect("magic lock poisoned").get(name).cloned().unwrap_or_default()
    }

    pub fn add_watcher(
        self: &Arc<Self>,
        name: impl Into<String>,
        callback: Callback,
    ) -> Box<dyn FnOnce() + Send> {
        let name = name.into();
        let mut watchers = self.watchers.lock().expect("magic lock poisoned");
        let entry = watchers.entry(name.clone()).or_insert_with(|| Watcher { last_seen: None, callbacks: Vec::new() });
        entry.callbacks.push(callback.clone());
        drop(watchers);
        let weak = Arc::downgrade(self);
        Box::new(move || {
            if let Some(magic) = weak.upgrade() {
                if let Some(w) = magic.watchers.lock().expect("magic lock poisoned").get_mut(&name) {
                    w.callbacks.retain(|cb| !Arc::ptr_eq(cb, &callback));
                }
            }
        })
    }

    /// Invalidates the cached "last seen" value for `name` so the next
    /// `refresh_watcher` call is guaranteed to re-fire, even if the new
    /// value happens to be pointer-equal to the old one.
    pub fn invalidate_watcher(&self, name: &str) {
        if let Some(w) = self.watchers.lock().expect("magic lock poisoned").get_mut(name) {
            w.last_seen = None;
        }
    }

    /// Compares `current` against the cached last-seen value for `name`
    /// by pointer identity (the Rust stand-in for the original's
    /// reference-identity diff) and fires every registered watcher if it
    /// differs, updating the cache regardless of whether any watcher is
    /// registered.
    pub fn refresh_watcher(&self, name: &str, current: Arc<dyn Any + Send + Sync>) {
        let mut watchers = self.watchers.lock().expect("magic lock poisoned");
        let Some(entry) = watchers.get_mut(name) else { return };
        let changed = match &entry.last_seen {
            Some(prev) => !Arc::ptr_eq(prev, &current),
            None => true,
        };
        if !changed {
            return;
        }
        entry.last_seen = Some(current.clone());
        let callbacks = entry.callbacks.clone();
        drop(watchers);
        for cb in callbacks {
            cb(current.as_ref());
        }
    }
}
