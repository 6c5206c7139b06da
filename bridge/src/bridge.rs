//! The top-level handle applications construct: one per connection, in
//! either of two shapes depending on which side of the handshake this
//! process is on.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::magic::Magic;
use crate::management::Bridgeable;
use crate::message::{LocalId, Message};
use crate::object::{BridgeObject, Proxy};
use crate::options::{BridgeOptions, LocalBridgeOptions};
use crate::runtime;
use crate::state::BridgeState;

const ROOT_LOCAL_ID: LocalId = 0;

/// One end of a bridged connection. Construct with [`Bridge::owning`] on
/// the side that has a root object to share, or [`Bridge::remote`] on the
/// side that will receive one; feed bytes in with
/// [`Bridge::handle_message`] and drain them with
/// `BridgeOptions::with_send_message`.
pub struct Bridge {
    state: Arc<BridgeState>,
    root_ready: Arc<Notify>,
}

impl Bridge {
    /// The side that owns the root bridgeable object. Registers and
    /// shares it immediately, so it is always known under `localId` `0`,
    /// and joins it to this bridge so `update`/`emit`/`close` fan out to
    /// it going forward.
    pub fn owning(options: LocalBridgeOptions) -> Self {
        let state = BridgeState::new(options.base);
        state.share_object(options.root);
        options.root_magic.join_bridge(state.token());
        Bridge {
            state,
            root_ready: Arc::new(Notify::new()),
        }
    }

    /// The side that will receive a root object over the wire — nothing
    /// to share yet, `get_root`/`wait_for_root` resolve once the peer's
    /// first `created` record for `localId` `0` arrives.
    pub fn remote(options: BridgeOptions) -> Self {
        Bridge {
            state: BridgeState::new(options),
            root_ready: Arc::new(Notify::new()),
        }
    }

    /// Registers a freshly constructed child object and queues it for
    /// sharing with the peer, returning the id it was assigned, and joins
    /// it to this bridge for `update`/`emit`/`close` fan-out.
    pub fn share(&self, magic: &Arc<Magic>, obj: Arc<dyn BridgeObject>) -> LocalId {
        let local_id = self.state.share_object(obj);
        magic.join_bridge(self.state.token());
        local_id
    }

    /// Applies a batch of wire records received from the peer.
    pub async fn handle_message(&self, message: Message) {
        self.state.handle_message(message).await;
        if self.state.get_proxy(ROOT_LOCAL_ID).is_some() {
            self.root_ready.notify_waiters();
        }
    }

    /// The root proxy, if its `created` record has arrived yet.
    pub fn get_root(&self) -> Option<Proxy> {
        self.state.get_proxy(ROOT_LOCAL_ID)
    }

    /// Awaits the root proxy's arrival, for the remote side of a fresh
    /// connection immediately after construction.
    pub async fn wait_for_root(&self) -> Proxy {
        loop {
            // Enroll for the next notification before checking, so a
            // `notify_waiters` racing with this check is never missed —
            // `Notify::notified()` wakes a future enrolled this way even
            // if `notify_waiters` runs before the first `.await`.
            let notified = self.root_ready.notified();
            if let Some(proxy) = self.get_root() {
                return proxy;
            }
            notified.await;
        }
    }

    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Tears down the connection: rejects every pending call, drops every
    /// proxy and owned-object registration.
    pub fn close(&self) {
        self.state.close();
    }
}

/// Wires a root bridgeable object to a freshly created in-process peer and
/// pumps both sides until the peer has the root's proxy, returning it —
/// the convenience most applications reach for rather than hand-rolling a
/// transport and calling `Bridge::owning`/`Bridge::remote` directly.
///
/// Unlike `Bridge::owning` (which only wires the owning half), this spins
/// up a genuine second peer in the same process, relays every message the
/// owning side produces to it (through `options.clone_message`, letting a
/// caller round-trip through JSON or `structuredClone` the way a real
/// transport would reshape the value), and keeps both pumps alive for the
/// lifetime of the returned proxy.
pub async fn make_local_bridge(options: LocalBridgeOptions) -> Proxy {
    let (to_client_tx, mut to_client_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let (to_server_tx, mut to_server_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let local_options = LocalBridgeOptions {
        base: options.base.with_send_message(move |message| {
            let _ = to_client_tx.send(message);
        }),
        root: options.root,
        root_magic: options.root_magic,
        clone_message: options.clone_message,
    };
    let clone_message = local_options.clone_message.clone();
    let server = Bridge::owning(local_options);

    let client_options = BridgeOptions::new().with_send_message(move |message| {
        let _ = to_server_tx.send(message);
    });
    let client = Arc::new(Bridge::remote(client_options));

    let server_state = server.state().clone();
    runtime::spawn(async move {
        while let Some(message) = to_server_rx.recv().await {
            server_state.handle_message(message).await;
        }
    });

    let client_for_pump = client.clone();
    runtime::spawn(async move {
        while let Some(message) = to_client_rx.recv().await {
            client_for_pump.handle_message(clone_message(message)).await;
        }
    });

    client.wait_for_root().await
}

static_assertions::assert_impl_all!(Bridgeable: Send, Sync);
