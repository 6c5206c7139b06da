use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bridge_value::{
    BridgeRef, Buffer, Bytes, Error, JsError, JsErrorClass, ObjectHandle, Pack, PackedData, PeerHandle, Shared,
    Unpack,
};
use chrono::{TimeZone, Utc};

#[derive(Debug)]
struct TestObj(usize);

impl BridgeRef for TestObj {
    fn identity(&self) -> usize {
        self.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct TestPeer {
    admitted: Mutex<Vec<Arc<dyn BridgeRef>>>,
    shares: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl PeerHandle for TestPeer {
    fn admit(&self, obj: &dyn BridgeRef) -> Option<i64> {
        let mut admitted = self.admitted.lock().unwrap();
        let id = obj.identity();
        admitted.push(Arc::new(TestObj(id)));
        Some(id as i64)
    }

    fn resolve(&self, packed_id: i64) -> Option<Arc<dyn BridgeRef>> {
        let admitted = self.admitted.lock().unwrap();
        admitted.iter().find(|o| o.identity() as i64 == packed_id).cloned()
    }

    fn lookup_shared(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.shares.lock().unwrap().get(name).cloned()
    }

    fn shared_name_of(&self, _value: &dyn Any) -> Option<String> {
        None
    }
}

fn roundtrip<T: Pack + Unpack + PartialEq + std::fmt::Debug>(value: T, ctx: &dyn PeerHandle) {
    let packed = value.pack(ctx);
    let restored = T::unpack(&packed, ctx, "root").expect("unpack should succeed");
    assert_eq!(value, restored);
}

#[test]
fn primitives_roundtrip() {
    let ctx = TestPeer::default();
    roundtrip(42i32, &ctx);
    roundtrip(true, &ctx);
    roundtrip(false, &ctx);
    roundtrip("hello".to_string(), &ctx);
    roundtrip(3.5f64, &ctx);
}

#[test]
fn nan_survives_bit_exact() {
    let ctx = TestPeer::default();
    let packed = f64::NAN.pack(&ctx);
    let restored = f64::unpack(&packed, &ctx, "root").unwrap();
    assert!(restored.is_nan());

    let inf_packed = f64::INFINITY.pack(&ctx);
    let inf_restored = f64::unpack(&inf_packed, &ctx, "root").unwrap();
    assert_eq!(inf_restored, f64::INFINITY);
}

#[test]
fn option_none_is_undefined() {
    let ctx = TestPeer::default();
    roundtrip::<Option<i32>>(None, &ctx);
    roundtrip::<Option<i32>>(Some(7), &ctx);
}

#[test]
fn vec_of_identity_elements_is_identity() {
    let ctx = TestPeer::default();
    let v = vec![1i32, 2, 3];
    let packed = v.pack(&ctx);
    assert!(packed.map().is_none());
    roundtrip(v, &ctx);
}

#[test]
fn vec_with_mixed_elements_carries_per_slot_map() {
    let ctx = TestPeer::default();
    let v: Vec<Option<i32>> = vec![Some(1), None, Some(3)];
    let packed = v.clone().pack(&ctx);
    assert!(packed.map().is_some());
    roundtrip(v, &ctx);
}

#[test]
fn bytes_and_buffer_roundtrip() {
    let ctx = TestPeer::default();
    roundtrip(Bytes(vec![1, 2, 3, 255]), &ctx);
    roundtrip(Buffer(vec![0, 0, 0]), &ctx);
}

#[test]
fn date_roundtrips_to_millisecond_precision() {
    let ctx = TestPeer::default();
    let dt = Utc.with_ymd_and_hms(2024, 3, 14, 15, 9, 26).unwrap();
    roundtrip(dt, &ctx);
}

#[test]
fn object_handle_roundtrips_through_peer() {
    let ctx = TestPeer::default();
    let obj: Arc<dyn BridgeRef> = Arc::new(TestObj(5));
    let handle = ObjectHandle::new(obj);
    let packed = handle.pack(&ctx);
    let restored = ObjectHandle::unpack(&packed, &ctx, "root").unwrap();
    assert_eq!(handle, restored);
}

#[test]
fn closed_object_handle_fails_to_unpack() {
    let ctx = TestPeer::default();
    let packed = PackedData::tagged(
        bridge_value::DataMap::scalar(bridge_value::ScalarTag::Object),
        bridge_value::RawValue::Null,
    );
    let err = ObjectHandle::unpack(&packed, &ctx, "root").unwrap_err();
    assert!(matches!(err, Error::ClosedBridgeObject { .. }));
}

#[test]
fn shared_constant_roundtrips_when_registered() {
    let ctx = TestPeer::default();
    ctx.shares
        .lock()
        .unwrap()
        .insert("demo.thing".to_string(), Arc::new(1u32) as Arc<dyn Any + Send + Sync>);
    roundtrip(Shared("demo.thing".to_string()), &ctx);
}

#[test]
fn unknown_shared_constant_fails_to_unpack() {
    let ctx = TestPeer::default();
    let packed = Shared("nope".to_string()).pack(&ctx);
    let err = Shared::unpack(&packed, &ctx, "root").unwrap_err();
    assert!(matches!(err, Error::InvalidShareId { .. }));
}

#[test]
fn js_error_roundtrips_with_extra_fields() {
    let ctx = TestPeer::default();
    let err = JsError::new(JsErrorClass::RangeError, "out of range")
        .with_extra("code".to_string(), 7i32.pack(&ctx))
        .with_extra("detail".to_string(), "overflow".to_string().pack(&ctx));
    let packed = err.pack(&ctx);
    let restored = JsError::unpack(&packed, &ctx, "root").unwrap();
    assert_eq!(restored.class, Some(JsErrorClass::RangeError));
    assert_eq!(restored.message, "out of range");
    assert_eq!(restored.extra.len(), 2);
}

#[test]
fn generic_js_error_has_no_class() {
    let ctx = TestPeer::default();
    let err = JsError::generic("plain failure");
    let packed = err.pack(&ctx);
    let restored = JsError::unpack(&packed, &ctx, "root").unwrap();
    assert_eq!(restored.class, None);
}

#[test]
fn hash_map_roundtrips() {
    let ctx = TestPeer::default();
    let mut m = HashMap::new();
    m.insert("a".to_string(), 1i32);
    m.insert("b".to_string(), 2i32);
    roundtrip(m, &ctx);
}

#[test]
fn btree_map_roundtrips() {
    let ctx = TestPeer::default();
    let mut m = BTreeMap::new();
    m.insert(1i32, "x".to_string());
    m.insert(2i32, "y".to_string());
    roundtrip(m, &ctx);
}

#[test]
fn hash_set_roundtrips() {
    let ctx = TestPeer::default();
    let mut s = HashSet::new();
    s.insert(1i32);
    s.insert(2i32);
    s.insert(3i32);
    roundtrip(s, &ctx);
}

#[test]
fn btree_set_roundtrips() {
    let ctx = TestPeer::default();
    let mut s = BTreeSet::new();
    s.insert("a".to_string());
    s.insert("b".to_string());
    roundtrip(s, &ctx);
}

#[test]
fn unsupported_type_tag_reports_path_on_failure() {
    let ctx = TestPeer::default();
    let packed = PackedData::identity(bridge_value::RawValue::String("not a number".to_string()));
    let err = i32::unpack(&packed, &ctx, "root.value").unwrap_err();
    match err {
        Error::UnsupportedType { path, .. } => assert_eq!(path, "root.value"),
        other => panic!("unexpected error: {other:?}"),
    }
}
