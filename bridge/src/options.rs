//! Builder-style configuration: a struct with `with_*` setters consumed
//! by `Bridge::owning`/`Bridge::remote`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::magic::Magic;
use crate::message::Message;
use crate::object::BridgeObject;

/// How outgoing messages actually leave the process. Given to
/// `BridgeOptions::with_send_message`; called from inside `BridgeState`'s
/// flush with nothing held locked.
pub type SendMessage = Arc<dyn Fn(Message) + Send + Sync>;

/// Shared configuration for either end of a connection.
#[derive(Clone)]
pub struct BridgeOptions {
    pub(crate) throttle: Duration,
    pub(crate) send_message: Option<SendMessage>,
    pub(crate) hide_properties: HashSet<String>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        BridgeOptions {
            throttle: Duration::from_millis(0),
            send_message: None,
            hide_properties: HashSet::new(),
        }
    }
}

impl BridgeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to hold a flush open after the first change, coalescing
    /// anything else that happens inside the window into the same
    /// message. Zero (the default) flushes on the next runtime tick.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_send_message(mut self, send: impl Fn(Message) + Send + Sync + 'static) -> Self {
        self.send_message = Some(Arc::new(send));
        self
    }

    /// Property names this peer should suppress from `Proxy::properties`
    /// enumeration — the value is still retrievable via `Proxy::get`,
    /// just absent from any listing.
    pub fn with_hide_properties(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.hide_properties.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Configuration specific to the side that owns the root bridgeable
/// object, handed to whoever constructs a bridge around a freshly
/// accepted connection.
pub struct LocalBridgeOptions {
    pub base: BridgeOptions,
    pub(crate) root: Arc<dyn BridgeObject>,
    pub(crate) root_magic: Arc<Magic>,
    pub(crate) clone_message: Arc<dyn Fn(Message) -> Message + Send + Sync>,
}

impl LocalBridgeOptions {
    /// `root_magic` is the same root object's own `Bridgeable::magic()` —
    /// kept alongside `root` rather than discovered through it so
    /// `Bridge::owning` can register the root's bridge membership for
    /// `update`/`emit`/`close`'s multi-bridge fan-out without `BridgeObject`
    /// itself needing to expose a `Magic` accessor.
    pub fn new(root: Arc<dyn BridgeObject>, root_magic: Arc<Magic>) -> Self {
        LocalBridgeOptions {
            base: BridgeOptions::default(),
            root,
            root_magic,
            clone_message: Arc::new(identity_clone),
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.base = self.base.with_throttle(throttle);
        self
    }

    pub fn with_send_message(mut self, send: impl Fn(Message) + Send + Sync + 'static) -> Self {
        self.base = self.base.with_send_message(send);
        self
    }

    pub fn with_hide_properties(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.base = self.base.with_hide_properties(names);
        self
    }

    /// Hook `make_local_bridge` runs every server-to-client message
    /// through before delivering it, standing in for a test round-tripping
    /// messages through JSON or `structuredClone` instead of handing the
    /// same `Message` value straight across. Defaults to the identity.
    pub fn with_clone_message(mut self, clone: impl Fn(Message) -> Message + Send + Sync + 'static) -> Self {
        self.clone_message = Arc::new(clone);
        self
    }
}

fn identity_clone(message: Message) -> Message {
    message
}
