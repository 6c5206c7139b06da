//! End-to-end tests wiring up a pair of `BridgeState`s directly (no real
//! transport) and feeding one side's outbox into the other's
//! `handle_message` by hand, driving two in-process peers without a
//! socket.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use bridge::{
    bridge_object, make_local_bridge, share, share_data, update, BridgeObject, BridgeOptions, BridgeState, Bridgeable,
    Error, LocalBridgeOptions, Message,
};
use bridge_value::{JsError, JsErrorClass, ObjectHandle, Pack, PackedData, Unpack};

/// Collects every message a `BridgeState` hands to `with_send_message`, for
/// the test to drain into the peer at its own pace.
#[derive(Default)]
struct Outbox(Mutex<Vec<Message>>);

impl Outbox {
    fn sender(self: &Arc<Self>) -> impl Fn(Message) + Send + Sync + 'static {
        let outbox = self.clone();
        move |msg| outbox.0.lock().unwrap().push(msg)
    }

    fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut self.0.lock().unwrap())
    }
}

/// Delivers every message currently queued in `from` to `to`.
async fn pump(from: &Outbox, to: &Arc<BridgeState>) {
    for msg in from.drain() {
        to.handle_message(msg).await;
    }
}

#[derive(Debug, Default)]
struct Counter {
    bridgeable: Bridgeable,
    count: AtomicI64,
}

#[bridge_object]
impl Counter {
    fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    async fn increment(&self, n: i64) -> i64 {
        let next = self.count.fetch_add(n, Ordering::SeqCst) + n;
        update(self.bridgeable.magic(), Some(("count", Arc::new(next))));
        next
    }

    #[bridge(method)]
    async fn explode(&self) -> Result<i64, JsError> {
        Err(JsError::new(JsErrorClass::TypeError, "nope"))
    }
}

#[derive(Debug, Default)]
struct Child {
    bridgeable: Bridgeable,
    tag: String,
}

#[bridge_object]
impl Child {
    fn tag(&self) -> String {
        self.tag.clone()
    }
}

#[derive(Debug, Default)]
struct Parent {
    bridgeable: Bridgeable,
    children: Mutex<Vec<Arc<Child>>>,
}

#[bridge_object]
impl Parent {
    fn children(&self) -> Vec<ObjectHandle> {
        self.children
            .lock()
            .unwrap()
            .iter()
            .map(|c| ObjectHandle::new(c.clone() as Arc<dyn bridge_value::BridgeObject>))
            .collect()
    }
}

fn pair() -> (Arc<BridgeState>, Arc<Outbox>, Arc<BridgeState>, Arc<Outbox>) {
    let server_out = Arc::new(Outbox::default());
    let client_out = Arc::new(Outbox::default());
    let server = BridgeState::new(BridgeOptions::new().with_send_message(server_out.sender()));
    let client = BridgeState::new(BridgeOptions::new().with_send_message(client_out.sender()));
    (server, server_out, client, client_out)
}

#[tokio::test]
async fn simple_property_update() {
    let (server, server_out, client, _client_out) = pair();

    let counter = Arc::new(Counter::default());
    let local_id = share(&server, counter.bridgeable.magic(), counter.clone() as Arc<dyn BridgeObject>);

    pump(&server_out, &client).await;
    let proxy = client.get_proxy(local_id).expect("root proxy created");

    let watched = Arc::new(Mutex::new(Vec::new()));
    let watched_cb = watched.clone();
    let _unsub = proxy.watch(
        "count",
        Arc::new(move |payload: &PackedData, ctx| {
            let value: i64 = Unpack::unpack(payload, ctx, "count").unwrap();
            watched_cb.lock().unwrap().push(value);
        }),
    );
    // `watch` fires immediately with the current cached value.
    assert_eq!(*watched.lock().unwrap(), vec![0]);

    let args = PackedData::join_array(vec![1i64.pack(client.as_ref())]);
    let result = proxy.call("increment", args).await.expect("call succeeds");
    pump(&server_out, &client).await;

    let returned: i64 = Unpack::unpack(&result, client.as_ref(), "root").unwrap();
    assert_eq!(returned, 1);

    let cached: i64 = Unpack::unpack(&proxy.get("count").unwrap(), client.as_ref(), "count").unwrap();
    assert_eq!(cached, 1);
    assert_eq!(*watched.lock().unwrap(), vec![0, 1]);
}

#[tokio::test]
async fn in_process_watcher_fires_on_update() {
    let counter = Arc::new(Counter::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let _unsub = bridge::add_watcher(counter.bridgeable.magic(), "count", move |value: &i64| {
        seen_cb.lock().unwrap().push(*value);
    });

    counter.increment(3).await;
    counter.increment(4).await;

    assert_eq!(*seen.lock().unwrap(), vec![3, 7]);
}

#[tokio::test]
async fn referentially_shared_child() {
    let (server, server_out, client, _client_out) = pair();

    let child = Arc::new(Child {
        tag: "c".to_string(),
        ..Default::default()
    });
    let parent = Arc::new(Parent {
        children: Mutex::new(vec![child.clone(), child.clone()]),
        ..Default::default()
    });

    server.share_object(child.clone() as Arc<dyn BridgeObject>);
    server.share_object(parent.clone() as Arc<dyn BridgeObject>);

    let messages = server_out.drain();
    let created_ids: Vec<u64> = messages.iter().flat_map(|m| m.created.iter().map(|c| c.local_id)).collect();
    assert_eq!(created_ids.len(), 2, "exactly one created record per object, ever");

    for msg in messages {
        client.handle_message(msg).await;
    }

    let parent_create = client
        .get_proxy(*created_ids.last().unwrap())
        .expect("parent proxy created");
    let children_value = parent_create.get("children").expect("children synced");
    let handles: Vec<ObjectHandle> = Unpack::unpack(&children_value, client.as_ref(), "children").unwrap();
    assert_eq!(handles.len(), 2);
    assert_eq!(handles[0], handles[1], "same child packs to the same identity twice");
}

/// A child object referenced only through a property, never explicitly
/// shared, still admits lazily the first time it's packed and unpacks to a
/// live proxy rather than `ClosedBridgeObject`.
#[tokio::test]
async fn lazily_admitted_child_unpacks_live() {
    let (server, server_out, client, _client_out) = pair();

    let child = Arc::new(Child {
        tag: "lazy".to_string(),
        ..Default::default()
    });
    let parent = Arc::new(Parent {
        children: Mutex::new(vec![child.clone()]),
        ..Default::default()
    });

    // Only the parent is explicitly shared; `child` is reachable solely
    // through `Parent::children`.
    let parent_id = server.share_object(parent.clone() as Arc<dyn BridgeObject>);

    // The lazily admitted child's own `created` record rides along in the
    // same flush as the parent's, queued by `admit` while the parent's
    // properties were being packed.
    let messages = server_out.drain();
    let created_ids: Vec<u64> = messages.iter().flat_map(|m| m.created.iter().map(|c| c.local_id)).collect();
    assert_eq!(created_ids.len(), 2, "parent and its never-explicitly-shared child both announced");
    let child_id = *created_ids.iter().find(|&&id| id != parent_id).expect("child got its own id");

    for msg in messages {
        client.handle_message(msg).await;
    }

    let parent_proxy = client.get_proxy(parent_id).expect("parent proxy created");
    let children_value = parent_proxy.get("children").expect("children synced");
    let handles: Vec<ObjectHandle> = Unpack::unpack(&children_value, client.as_ref(), "children").unwrap();
    assert_eq!(handles.len(), 1);

    assert!(client.get_proxy(child_id).is_some(), "lazily admitted child has a live proxy, not a closed one");
}

#[tokio::test]
async fn error_round_trip() {
    let (server, server_out, client, _client_out) = pair();

    let counter = Arc::new(Counter::default());
    let local_id = share(&server, counter.bridgeable.magic(), counter.clone() as Arc<dyn BridgeObject>);
    pump(&server_out, &client).await;

    let proxy = client.get_proxy(local_id).unwrap();
    let err = proxy
        .call("explode", PackedData::join_array(vec![]))
        .await
        .expect_err("method rejects");

    match err {
        Error::Thrown(js_error) => {
            assert_eq!(js_error.class, Some(JsErrorClass::TypeError));
            assert_eq!(js_error.message, "nope");
        }
        other => panic!("expected Error::Thrown, got {other:?}"),
    }
}

#[tokio::test]
async fn closed_proxy_semantics() {
    let (server, server_out, client, client_out) = pair();

    let counter = Arc::new(Counter::default());
    let local_id = share(&server, counter.bridgeable.magic(), counter.clone() as Arc<dyn BridgeObject>);
    pump(&server_out, &client).await;

    let proxy = client.get_proxy(local_id).unwrap();
    let closed_fired = Arc::new(Mutex::new(0));
    let closed_fired_cb = closed_fired.clone();
    let _unsub = proxy.on(
        "close",
        Arc::new(move |_payload, _ctx| {
            *closed_fired_cb.lock().unwrap() += 1;
        }),
    );

    // Last-known property value is still readable after close.
    let cached_before = proxy.get("count");
    assert!(cached_before.is_some());

    server.close_object(local_id);
    pump(&server_out, &client).await;

    assert!(proxy.is_closed());
    assert_eq!(*closed_fired.lock().unwrap(), 1);
    assert_eq!(proxy.get("count"), cached_before, "last-known value still reads synchronously");

    let call_err = proxy
        .call("increment", PackedData::join_array(vec![1i64.pack(client.as_ref())]))
        .await
        .expect_err("closed proxy rejects calls");
    match call_err {
        Error::ClosedProxy { name } => assert_eq!(name, "increment"),
        other => panic!("expected Error::ClosedProxy, got {other:?}"),
    }

    // The server never receives the rejected call.
    assert!(server_out.drain().is_empty());
    let _ = client_out.drain();
}

/// A call addressed to an object the peer has no record of (e.g. one it
/// already closed out from under an in-flight call) comes back as a
/// closed-proxy rejection rather than a bare "invalid id" error.
#[tokio::test]
async fn call_to_missing_object_rejects_as_closed_proxy() {
    let (server, server_out, _client, _client_out) = pair();

    let call = bridge::CallRecord {
        call_id: 7,
        remote_id: 999,
        name: "anything".to_string(),
        payload: PackedData::join_array(vec![]),
    };
    server
        .handle_message(Message {
            calls: vec![call],
            ..Default::default()
        })
        .await;

    let returns: Vec<_> = server_out.drain().into_iter().flat_map(|m| m.returns).collect();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].call_id, 7);
    assert!(returns[0].payload.throw, "missing target surfaces as a thrown error, not a dropped reply");
}

#[tokio::test]
async fn bridge_close_with_pending_calls() {
    use std::future::Future;
    use std::task::{Context, Poll};

    let (server, server_out, client, _client_out) = pair();

    let counter = Arc::new(Counter::default());
    let local_id = share(&server, counter.bridgeable.magic(), counter.clone() as Arc<dyn BridgeObject>);
    pump(&server_out, &client).await;
    let proxy = client.get_proxy(local_id).unwrap();

    // Polling each call future once drives it up through registering the
    // pending call and flushing the outgoing `CallRecord` — everything
    // before its first await on the reply — without needing real
    // concurrency to land both calls in `pendingCalls` deterministically.
    let args_a = PackedData::join_array(vec![1i64.pack(client.as_ref())]);
    let args_b = PackedData::join_array(vec![2i64.pack(client.as_ref())]);
    let mut call_a = Box::pin(proxy.call("increment", args_a));
    let mut call_b = Box::pin(proxy.call("increment", args_b));
    let waker = futures_util::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    assert!(matches!(call_a.as_mut().poll(&mut cx), Poll::Pending));
    assert!(matches!(call_b.as_mut().poll(&mut cx), Poll::Pending));

    // The server never gets a chance to answer — the client bridge closes
    // first, which must reject both pending calls rather than hang.
    let _ = server_out.drain();
    client.close();

    match call_a.await {
        Err(Error::Closed(_)) => {}
        other => panic!("expected Error::Closed, got {other:?}"),
    }
    match call_b.await {
        Err(Error::Closed(_)) => {}
        other => panic!("expected Error::Closed, got {other:?}"),
    }

    // A subsequent incoming message produces no outbound traffic.
    client.handle_message(Message::default()).await;
    assert!(client.is_closed());
}

#[tokio::test]
async fn hidden_properties_suppressed_from_enumeration_not_access() {
    let (server_out, client_out) = (Arc::new(Outbox::default()), Arc::new(Outbox::default()));
    let server = BridgeState::new(
        BridgeOptions::new()
            .with_send_message(server_out.sender())
            .with_hide_properties(["count"]),
    );
    let client = BridgeState::new(BridgeOptions::new().with_send_message(client_out.sender()));

    let counter = Arc::new(Counter::default());
    let local_id = share(&server, counter.bridgeable.magic(), counter.clone() as Arc<dyn BridgeObject>);
    pump(&server_out, &client).await;

    let proxy = client.get_proxy(local_id).unwrap();
    assert!(!proxy.properties().contains(&"count".to_string()), "hidden from enumeration");
    assert!(proxy.get("count").is_some(), "still individually readable");
}

#[tokio::test]
async fn share_data_registers_under_namespace() {
    let marker = Arc::new(42i64);
    share_data(vec![("answer", marker.clone())], Some("demo")).expect("first registration succeeds");
    // Re-registering the exact same Arc under the same name is a no-op.
    share_data(vec![("answer", marker)], Some("demo")).expect("idempotent re-registration succeeds");

    let looked_up = bridge_value::SHARE_TABLE.lookup("demo.answer").expect("registered");
    assert_eq!(*looked_up.downcast::<i64>().unwrap(), 42);
}

#[tokio::test]
async fn make_local_bridge_round_trips_through_clone_hook() {
    let counter = Arc::new(Counter::default());
    let cloned_count = Arc::new(AtomicI64::new(0));
    let cloned_count_for_hook = cloned_count.clone();

    let options = LocalBridgeOptions::new(counter.clone() as Arc<dyn BridgeObject>, counter.bridgeable.magic().clone())
        .with_clone_message(move |message| {
            cloned_count_for_hook.fetch_add(1, Ordering::SeqCst);
            message
        });
    let proxy = make_local_bridge(options).await;

    let scratch = BridgeState::new(BridgeOptions::new());
    let cached: i64 = Unpack::unpack(&proxy.get("count").unwrap(), scratch.as_ref(), "count").unwrap_or(0);
    assert_eq!(cached, 0);
    assert!(cloned_count.load(Ordering::SeqCst) >= 1, "server's initial create passed through the clone hook");
}
