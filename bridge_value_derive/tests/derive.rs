use bridge_value::{Pack, PeerHandle, Unpack};
use bridge_value_derive::{Pack as PackDerive, Unpack as UnpackDerive};
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, PackDerive, UnpackDerive)]
struct IncrementArgs {
    amount: i32,
    label: Option<String>,
}

#[derive(Default)]
struct NoopPeer;

impl PeerHandle for NoopPeer {
    fn admit(&self, _obj: &dyn bridge_value::BridgeRef) -> Option<i64> {
        None
    }

    fn resolve(&self, _packed_id: i64) -> Option<Arc<dyn bridge_value::BridgeRef>> {
        None
    }

    fn lookup_shared(&self, _name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }

    fn shared_name_of(&self, _value: &dyn Any) -> Option<String> {
        None
    }
}

#[test]
fn struct_with_all_identity_fields_packs_as_identity() {
    let ctx = NoopPeer;
    let args = IncrementArgs { amount: 1, label: None };
    let packed = args.clone().pack(&ctx);
    // `label: None` packs to the `'u'` tag, so the envelope is not identity.
    assert!(packed.map().is_some());
    let restored = IncrementArgs::unpack(&packed, &ctx, "root").unwrap();
    assert_eq!(args, restored);
}

#[test]
fn struct_with_only_identity_fields_is_identity() {
    let ctx = NoopPeer;
    let args = IncrementArgs { amount: 1, label: Some("x".to_string()) };
    let packed = args.clone().pack(&ctx);
    assert!(packed.map().is_none());
    let restored = IncrementArgs::unpack(&packed, &ctx, "root").unwrap();
    assert_eq!(args, restored);
}

#[test]
fn missing_field_fails_to_unpack() {
    let ctx = NoopPeer;
    let mut fields = std::collections::BTreeMap::new();
    fields.insert("amount".to_string(), bridge_value::RawValue::Number(1.0));
    let packed = bridge_value::PackedData::identity(bridge_value::RawValue::Object(fields));
    let err = IncrementArgs::unpack(&packed, &ctx, "root").unwrap_err();
    assert!(matches!(err, bridge_value::Error::UnsupportedType { .. }));
}
