//! Per-connection runtime state: the live object/proxy registries, the
//! outgoing batch, and the three-phase handler for incoming messages.
//! No actual transport lives here — bytes in and out are the caller's
//! problem (`BridgeOptions::with_send_message` / `BridgeState::handle_message`).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bridge_value::{Pack, PackedData, PeerHandle, RawValue};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::magic::BridgeToken;
use crate::message::{CallId, CallRecord, ChangeRecord, CreateRecord, EventRecord, LocalId, Message, ReturnRecord};
use crate::object::{diff_object, pack_object, BridgeObject, EventCallback, Proxy, ProxyBackend, ValueCache};
use crate::options::BridgeOptions;
use crate::runtime;

/// Process-wide map from a `BridgeState`'s token (its own `Arc` pointer
/// value) to a weak handle on it, so `management::update`/`emit`/`close`
/// can fan out over a `Magic`'s `bridges()` set without `Magic` itself
/// holding a strong reference to every bridge it has ever joined.
static BRIDGE_REGISTRY: OnceLock<Mutex<HashMap<BridgeToken, Weak<BridgeState>>>> = OnceLock::new();

fn bridge_registry() -> &'static Mutex<HashMap<BridgeToken, Weak<BridgeState>>> {
    BRIDGE_REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Packs a signed wire id from a 0-based local id and an ownership flag.
/// `owned = true` means the sender owns the referenced object (the normal
/// case); `owned = false` echoes back one of the *receiver's* own ids, the
/// way a server hands a client's own object path back to it. Offset by one
/// so `0` is never ambiguous between "object 0, positive" and the unused
/// zero-sign case.
fn pack_id(local_id: LocalId, owned: bool) -> i64 {
    let magnitude = local_id as i64 + 1;
    if owned {
        magnitude
    } else {
        -magnitude
    }
}

fn unpack_id(packed: i64) -> Option<(LocalId, bool)> {
    if packed == 0 {
        return None;
    }
    let owned = packed > 0;
    let local_id = (packed.unsigned_abs() - 1) as LocalId;
    Some((local_id, owned))
}

struct Inner {
    /// Objects this peer owns, keyed by the id it assigned them.
    objects: HashMap<LocalId, Arc<dyn BridgeObject>>,
    /// `objects` values' identity, for `admit`'s idempotency check.
    reverse: HashMap<usize, LocalId>,
    caches: HashMap<LocalId, ValueCache>,
    dirty: HashSet<LocalId>,
    next_local_id: LocalId,
    /// Ids that have already had a `CreateRecord` queued, so sharing the
    /// same object twice (`bridgify(bridgify(x)) == bridgify(x)`) is a
    /// no-op rather than a duplicate announcement.
    shared: HashSet<LocalId>,

    /// Proxies this peer holds for objects the other side owns, keyed by
    /// the id the other side assigned them.
    proxies: HashMap<LocalId, Proxy>,
    proxy_caches: HashMap<LocalId, BTreeMap<String, PackedData>>,
    proxy_closed: HashSet<LocalId>,
    proxy_listeners: HashMap<(LocalId, String), Vec<EventCallback>>,
    proxy_watchers: HashMap<(LocalId, String), Vec<EventCallback>>,

    pending_calls: HashMap<CallId, oneshot::Sender<Result<PackedData>>>,
    next_call_id: CallId,

    outbox: Message,
    flush_scheduled: bool,
    closed: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            objects: HashMap::new(),
            reverse: HashMap::new(),
            caches: HashMap::new(),
            dirty: HashSet::new(),
            next_local_id: 0,
            shared: HashSet::new(),
            proxies: HashMap::new(),
            proxy_caches: HashMap::new(),
            proxy_closed: HashSet::new(),
            proxy_listeners: HashMap::new(),
            proxy_watchers: HashMap::new(),
            pending_calls: HashMap::new(),
            next_call_id: 0,
            outbox: Message::default(),
            flush_scheduled: false,
            closed: false,
        }
    }
}

/// The runtime half of one end of a bridged connection: owns the live
/// object/proxy registries and the deferred, throttle-coalesced flush.
pub struct BridgeState {
    inner: Mutex<Inner>,
    options: BridgeOptions,
    /// Set once, right after construction, so callbacks handed out by
    /// `&self` methods (`ProxyBackend::add_event_listener` and friends)
    /// can hold a weak self-reference for their unsubscribe closure
    /// without needing `self: Arc<Self>` on every method.
    self_weak: Mutex<Weak<BridgeState>>,
}

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState").finish_non_exhaustive()
    }
}

impl BridgeState {
    pub fn new(options: BridgeOptions) -> Arc<Self> {
        let state = Arc::new(BridgeState {
            inner: Mutex::new(Inner::default()),
            options,
            self_weak: Mutex::new(Weak::new()),
        });
        *state.self_weak.lock().expect("bridge state lock poisoned") = Arc::downgrade(&state);
        bridge_registry()
            .lock()
            .expect("bridge registry lock poisoned")
            .insert(state.token(), Arc::downgrade(&state));
        state
    }

    /// Identifies this state among every other live bridge in the process —
    /// what a `Magic`'s `bridges()` set stores, and what
    /// `management::update`/`emit`/`close` resolve back through
    /// [`BridgeState::lookup_by_token`].
    pub fn token(self: &Arc<Self>) -> BridgeToken {
        Arc::as_ptr(self) as usize
    }

    /// Resolves a token previously returned by [`BridgeState::token`] back
    /// to the live bridge it names, or `None` if that bridge has since been
    /// dropped.
    pub fn lookup_by_token(token: BridgeToken) -> Option<Arc<BridgeState>> {
        bridge_registry().lock().expect("bridge registry lock poisoned").get(&token)?.upgrade()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("bridge state lock poisoned")
    }

    /// Registers a locally owned object, assigning it a `LocalId` on first
    /// registration and returning the same one on every later call for the
    /// identical object — the Rust stand-in for `bridgifyObject`.
    pub fn register_object(&self, obj: Arc<dyn BridgeObject>) -> LocalId {
        let identity = obj.identity();
        let mut inner = self.lock();
        if let Some(&id) = inner.reverse.get(&identity) {
            return id;
        }
        let id = inner.next_local_id;
        inner.next_local_id += 1;
        inner.reverse.insert(identity, id);
        inner.objects.insert(id, obj);
        inner.caches.insert(id, ValueCache::new());
        id
    }

    /// Snapshots `obj` into a `CreateRecord` and queues it for the next
    /// flush, the entry point for sharing a newly created child object
    /// with the peer. Idempotent: sharing the same object twice only
    /// queues the announcement once.
    pub fn share_object(self: &Arc<Self>, obj: Arc<dyn BridgeObject>) -> LocalId {
        let local_id = self.register_object(obj.clone());
        {
            let mut inner = self.lock();
            if !inner.shared.insert(local_id) {
                return local_id;
            }
        }
        let methods = obj.bridge_methods().iter().map(|s| s.to_string()).collect();
        let props = pack_object(obj.as_ref(), self.as_ref());
        let mut inner = self.lock();
        inner.outbox.created.push(CreateRecord {
            local_id,
            methods,
            on: Vec::new(),
            base: None,
            props,
        });
        drop(inner);
        self.wakeup();
        local_id
    }

    /// Marks a registered object's properties as needing a fresh diff on
    /// the next flush — the entry point for `update`/implicit
    /// property-change notification.
    pub fn mark_dirty(self: &Arc<Self>, local_id: LocalId) {
        {
            let mut inner = self.lock();
            if !inner.objects.contains_key(&local_id) {
                return;
            }
            inner.dirty.insert(local_id);
        }
        self.wakeup();
    }

    pub fn emit_event(self: &Arc<Self>, local_id: LocalId, name: impl Into<String>, payload: PackedData) {
        {
            let mut inner = self.lock();
            if !inner.objects.contains_key(&local_id) {
                return;
            }
            inner.outbox.events.push(EventRecord {
                local_id,
                name: name.into(),
                payload,
            });
        }
        self.wakeup();
    }

    pub fn close_object(self: &Arc<Self>, local_id: LocalId) {
        {
            let mut inner = self.lock();
            if inner.objects.remove(&local_id).is_none() {
                return;
            }
            inner.reverse.retain(|_, v| *v != local_id);
            inner.caches.remove(&local_id);
            inner.dirty.remove(&local_id);
            inner.shared.remove(&local_id);
            inner.outbox.closed.push(local_id);
        }
        self.wakeup();
    }

    /// Coalesces `dirty` objects' prop diffs into the outbox, then flushes
    /// immediately if non-empty.
    ///
    /// Diffing happens with nothing locked: `diff_object` packs each
    /// property through `self` as the `PeerHandle`, and a property that
    /// holds a previously-unseen child object recurses into `admit`, which
    /// itself locks `self.inner` to lazily register it. Holding the lock
    /// across that call would deadlock on the same thread re-entering a
    /// non-reentrant `Mutex`.
    fn flush(&self) {
        let dirty: Vec<LocalId> = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.dirty.drain().collect()
        };
        for local_id in dirty {
            let Some(obj) = self.lock().objects.get(&local_id).cloned() else { continue };
            let mut cache = self.lock().caches.remove(&local_id).unwrap_or_default();
            let changed = diff_object(obj.as_ref(), self, &mut cache);
            let mut inner = self.lock();
            inner.caches.insert(local_id, cache);
            if !changed.is_empty() {
                inner.outbox.changed.push(ChangeRecord { local_id, props: changed });
            }
        }
        let mut inner = self.lock();
        inner.flush_scheduled = false;
        if inner.outbox.is_empty() {
            return;
        }
        let message = std::mem::take(&mut inner.outbox);
        let send = self.options.send_message.clone();
        drop(inner);
        if let Some(send) = send {
            trace!(?message, "flushing bridge message");
            send(message);
        }
    }

    /// Schedules a flush `throttle` after the first pending change, or
    /// immediately if the throttle is zero. A second call while one is
    /// already pending is a no-op — everything added meanwhile rides the
    /// same flush.
    fn wakeup(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.closed || inner.flush_scheduled {
            return;
        }
        inner.flush_scheduled = true;
        let throttle = self.options.throttle;
        drop(inner);
        if throttle == Duration::ZERO {
            self.flush();
        } else {
            let state = self.clone();
            runtime::spawn_delayed(throttle, move || state.flush());
        }
    }

    /// Applies a batch received from the peer in strict phase order:
    /// created, then changed, then events, then calls, then returns, then
    /// closed. Each phase completes before the next starts so a `changed`
    /// record always lands before any `event` emitted alongside the same
    /// change, a call dispatched against an object sees that object's
    /// latest state, and a proxy isn't torn down until every event/call
    /// this same batch addressed to it has been delivered.
    pub async fn handle_message(self: &Arc<Self>, message: Message) {
        self.apply_creates(message.created);
        self.apply_changes(message.changed);

        for event in message.events {
            self.dispatch_event(event);
        }
        for call in message.calls {
            self.dispatch_call(call).await;
        }
        for ret in message.returns {
            self.resolve_return(ret);
        }

        self.apply_closes(message.closed);
    }

    fn apply_creates(self: &Arc<Self>, records: Vec<CreateRecord>) {
        for record in records {
            let mut inner = self.lock();
            if inner.proxies.contains_key(&record.local_id) {
                continue;
            }
            let proxy = Proxy::new(record.local_id, self.clone());
            inner.proxies.insert(record.local_id, proxy);
            inner.proxy_caches.insert(record.local_id, record.props.clone());
            drop(inner);
            for (name, value) in record.props {
                self.fire_watchers(record.local_id, &name, &value);
            }
        }
    }

    fn apply_changes(self: &Arc<Self>, records: Vec<ChangeRecord>) {
        for record in records {
            {
                let mut inner = self.lock();
                let Some(cache) = inner.proxy_caches.get_mut(&record.local_id) else {
                    warn!(local_id = record.local_id, "changed record for unknown proxy");
                    continue;
                };
                cache.extend(record.props.clone());
            }
            for (name, value) in record.props {
                self.fire_watchers(record.local_id, &name, &value);
            }
        }
    }

    /// Marks each proxy closed and fires its `close` event exactly once,
    /// the way a held reference keeps its last-known properties but starts
    /// rejecting calls and notifying any `on('close', ...)` listener.
    fn apply_closes(&self, closed: Vec<LocalId>) {
        for local_id in closed {
            {
                let mut inner = self.lock();
                if !inner.proxy_closed.insert(local_id) {
                    continue;
                }
                inner.proxies.remove(&local_id);
            }
            self.dispatch_event(EventRecord {
                local_id,
                name: "close".to_string(),
                payload: undefined_value(),
            });
            let mut inner = self.lock();
            inner.proxy_listeners.retain(|(id, _), _| *id != local_id);
            inner.proxy_watchers.retain(|(id, _), _| *id != local_id);
        }
    }

    async fn dispatch_call(self: &Arc<Self>, call: CallRecord) {
        let obj = {
            let inner = self.lock();
            inner.objects.get(&call.remote_id).cloned()
        };
        let path = call.name.clone();
        let result = match obj {
            None => Err(Error::ClosedProxy { name: call.name.clone() }),
            Some(obj) => {
                let args = match call.payload.split_array() {
                    Some(args) => args,
                    None => vec![call.payload],
                };
                obj.call_method(&call.name, &args, self.as_ref(), &path).await.map_err(Error::from)
            }
        };
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                debug!(call_id = call.call_id, %err, "bridge call failed");
                let js_error = bridge_value::JsError::generic(err.to_string());
                js_error.pack(self.as_ref()).into_throw()
            }
        };
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.outbox.returns.push(ReturnRecord {
            call_id: call.call_id,
            payload,
        });
        drop(inner);
        self.wakeup();
    }

    fn dispatch_event(&self, event: EventRecord) {
        let callbacks = {
            let inner = self.lock();
            inner
                .proxy_listeners
                .get(&(event.local_id, event.name.clone()))
                .cloned()
                .unwrap_or_default()
        };
        for cb in callbacks {
            cb(&event.payload, self);
        }
    }

    fn fire_watchers(&self, local_id: LocalId, name: &str, value: &PackedData) {
        let callbacks = {
            let inner = self.lock();
            inner.proxy_watchers.get(&(local_id, name.to_string())).cloned().unwrap_or_default()
        };
        for cb in callbacks {
            cb(value, self);
        }
    }

    fn resolve_return(&self, ret: ReturnRecord) {
        let sender = {
            let mut inner = self.lock();
            inner.pending_calls.remove(&ret.call_id)
        };
        let Some(sender) = sender else {
            warn!(call_id = ret.call_id, "return for unknown call id");
            return;
        };
        // The throw flag is left on the payload for `Proxy::call` to
        // interpret — reaching this point at all means the call completed,
        // successfully or not.
        let _ = sender.send(Ok(ret.payload));
    }

    /// Rejects every pending call and drops every registry, the
    /// counterpart to the peer disappearing.
    pub fn close(&self) {
        let token = self as *const Self as usize;
        bridge_registry().lock().expect("bridge registry lock poisoned").remove(&token);
        let mut inner = self.lock();
        inner.closed = true;
        inner.objects.clear();
        inner.reverse.clear();
        inner.caches.clear();
        inner.proxies.clear();
        inner.proxy_caches.clear();
        let pending = std::mem::take(&mut inner.pending_calls);
        drop(inner);
        for (_, sender) in pending {
            let _ = sender.send(Err(Error::Closed("bridge closed".to_string())));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Looks up a proxy this peer currently holds by the id the owning
    /// side assigned it. `local_id` `0` is always the root object on a
    /// freshly opened bridge's remote side, once its `created` record has
    /// arrived.
    pub fn get_proxy(&self, local_id: LocalId) -> Option<Proxy> {
        self.lock().proxies.get(&local_id).cloned()
    }
}

impl PeerHandle for BridgeState {
    /// Packs `obj`'s id, lazily registering and announcing it first if
    /// this is the first time this peer has ever packed it — the Rust
    /// counterpart to `getPackedId` admitting a previously-unseen owned
    /// object on demand rather than requiring an explicit prior
    /// `shareObject`/`bridgify` call. A proxy handed back to its own
    /// owner (the "echoed back one of the receiver's own ids" case)
    /// still only matches the `proxies` scan; it is never lazily
    /// registered as an owned object.
    fn admit(&self, obj: &Arc<dyn BridgeObject>) -> Option<i64> {
        let identity = obj.identity();
        {
            let inner = self.lock();
            if inner.closed {
                return None;
            }
            if let Some(&local_id) = inner.reverse.get(&identity) {
                return Some(pack_id(local_id, true));
            }
            for (&remote_id, proxy) in inner.proxies.iter() {
                if proxy.identity() == identity {
                    return Some(pack_id(remote_id, false));
                }
            }
        }

        let local_id = self.register_object(obj.clone());
        let already_shared = {
            let mut inner = self.lock();
            !inner.shared.insert(local_id)
        };
        if already_shared {
            return Some(pack_id(local_id, true));
        }
        let methods = obj.bridge_methods().iter().map(|s| s.to_string()).collect();
        let props = pack_object(obj.as_ref(), self);
        let mut inner = self.lock();
        inner.outbox.created.push(CreateRecord {
            local_id,
            methods,
            on: Vec::new(),
            base: None,
            props,
        });
        Some(pack_id(local_id, true))
    }

    fn resolve(&self, packed_id: i64) -> Option<Arc<dyn BridgeObject>> {
        let (local_id, owned_by_sender) = unpack_id(packed_id)?;
        let inner = self.lock();
        if owned_by_sender {
            inner.proxies.get(&local_id).map(|p| Arc::new(p.clone()) as Arc<dyn BridgeObject>)
        } else {
            inner.objects.get(&local_id).cloned()
        }
    }

    fn lookup_shared(&self, name: &str) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        bridge_value::SHARE_TABLE.lookup(name)
    }

    fn shared_name_of(&self, value: &dyn std::any::Any) -> Option<String> {
        bridge_value::SHARE_TABLE.name_of(value)
    }
}

#[async_trait]
impl ProxyBackend for BridgeState {
    async fn call_method(&self, remote_id: LocalId, name: &str, args: PackedData) -> Result<PackedData> {
        let (call_id, rx) = {
            let mut inner = self.lock();
            if inner.closed || inner.proxy_closed.contains(&remote_id) {
                return Err(Error::ClosedProxy { name: name.to_string() });
            }
            let call_id = inner.next_call_id;
            inner.next_call_id += 1;
            let (tx, rx) = oneshot::channel();
            inner.pending_calls.insert(call_id, tx);
            inner.outbox.calls.push(CallRecord {
                call_id,
                remote_id,
                name: name.to_string(),
                payload: args,
            });
            (call_id, rx)
        };
        // Safety valve: a throttle-less flush has already fired by the
        // time `wakeup` returns below, so the call is in flight by the
        // time we await the reply.
        self.flush();
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Closed(format!("call {call_id} abandoned"))),
        }
    }

    fn cached_property(&self, remote_id: LocalId, name: &str) -> Option<PackedData> {
        self.lock().proxy_caches.get(&remote_id)?.get(name).cloned()
    }

    fn add_event_listener(&self, remote_id: LocalId, name: &str, callback: EventCallback) -> Box<dyn FnOnce() + Send> {
        let key = (remote_id, name.to_string());
        self.lock().proxy_listeners.entry(key.clone()).or_default().push(callback.clone());
        self.unsubscribe_event(key, callback)
    }

    fn add_property_watcher(&self, remote_id: LocalId, name: &str, callback: EventCallback) -> Box<dyn FnOnce() + Send> {
        let key = (remote_id, name.to_string());
        self.lock().proxy_watchers.entry(key.clone()).or_default().push(callback.clone());
        self.unsubscribe_watcher(key, callback)
    }

    fn is_closed(&self, remote_id: LocalId) -> bool {
        let inner = self.lock();
        inner.closed || inner.proxy_closed.contains(&remote_id)
    }

    fn close(&self, remote_id: LocalId) {
        let mut inner = self.lock();
        inner.proxy_closed.insert(remote_id);
        inner.proxy_listeners.retain(|(id, _), _| *id != remote_id);
        inner.proxy_watchers.retain(|(id, _), _| *id != remote_id);
    }

    fn peer(&self) -> &dyn PeerHandle {
        self
    }

    fn cached_property_names(&self, remote_id: LocalId) -> Vec<String> {
        self.lock().proxy_caches.get(&remote_id).map(|c| c.keys().cloned().collect()).unwrap_or_default()
    }

    fn is_hidden_property(&self, name: &str) -> bool {
        self.options.hide_properties.contains(name)
    }
}

impl BridgeState {
    fn unsubscribe_event(&self, key: (LocalId, String), callback: EventCallback) -> Box<dyn FnOnce() + Send> {
        let weak = self.self_weak.lock().expect("bridge state lock poisoned").clone();
        Box::new(move || {
            if let Some(state) = weak.upgrade() {
                if let Some(list) = state.lock().proxy_listeners.get_mut(&key) {
                    list.retain(|cb| !Arc::ptr_eq(cb, &callback));
                }
            }
        })
    }

    fn unsubscribe_watcher(&self, key: (LocalId, String), callback: EventCallback) -> Box<dyn FnOnce() + Send> {
        let weak = self.self_weak.lock().expect("bridge state lock poisoned").clone();
        Box::new(move || {
            if let Some(state) = weak.upgrade() {
                if let Some(list) = state.lock().proxy_watchers.get_mut(&key) {
                    list.retain(|cb| !Arc::ptr_eq(cb, &callback));
                }
            }
        })
    }
}

static_assertions::assert_impl_all!(BridgeState: Send, Sync);

/// The tag used for an uninitialized or closed cell, matching the `'u'`
/// scalar a freshly constructed proxy's not-yet-synced properties read as.
pub fn undefined_value() -> PackedData {
    PackedData::tagged(bridge_value::DataMap::scalar(bridge_value::ScalarTag::Undefined), RawValue::Null)
}
