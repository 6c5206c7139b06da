use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::js_error::JsError;
use crate::map::{DataMap, ScalarTag};
use crate::object_ref::{ObjectHandle, PeerHandle};
use crate::packed::PackedData;
use crate::raw::RawValue;

/// Classifies and transforms a Rust value into a `PackedData` envelope.
/// Rust's static types carry the classification a dynamically-typed
/// packer would otherwise have to compute at runtime, so packing and
/// tagging happen in one pass here.
///
/// Always succeeds: an unsupported value still produces an envelope (tag
/// `'?'`, `raw` = its type name) — only *unpacking* such a value fails.
pub trait Pack {
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData;
}

/// A typed byte array (`'u8'` tag — a JS typed array view).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

/// A raw buffer (`'ab'` tag — a JS `ArrayBuffer`). Distinct from [`Bytes`]
/// only in the tag it round-trips under, matching the distinction a typed
/// array view draws against the raw buffer backing it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Buffer(pub Vec<u8>);

/// A constant shared by name across the process, e.g. the
/// `onMethod`/`watchMethod` subscription hooks. Carries the registered
/// name; looked up through [`PeerHandle`] on unpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shared(pub String);

macro_rules! impl_pack_identity_num {
    ($($t:ty),*) => {
        $(
            impl Pack for $t {
                fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
                    PackedData::identity(RawValue::Number(*self as f64))
                }
            }
        )*
    };
}

impl_pack_identity_num!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl Pack for bool {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        PackedData::identity(RawValue::Bool(*self))
    }
}

impl Pack for String {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        PackedData::identity(RawValue::String(self.clone()))
    }
}

impl Pack for str {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        PackedData::identity(RawValue::String(self.to_owned()))
    }
}

impl<T: Pack + ?Sized> Pack for &T {
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        (**self).pack(ctx)
    }
}

impl<T: Pack> Pack for Box<T> {
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        (**self).pack(ctx)
    }
}

/// `None` packs as `'u'` (`undefined`); `Some(v)` packs `v` directly. This
/// is the Rust stand-in for JS's `undefined`-vs-absent distinction.
impl<T: Pack> Pack for Option<T> {
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        match self {
            Some(v) => v.pack(ctx),
            None => PackedData::tagged(DataMap::scalar(ScalarTag::Undefined), RawValue::Null),
        }
    }
}

impl<T: Pack> Pack for Vec<T> {
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        pack_slice(self, ctx)
    }
}

impl<T: Pack> Pack for [T] {
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        pack_slice(self, ctx)
    }
}

/// Packs a plain (non-keyed) sequence, per-index: identity for the whole
/// array if every element is identity, else a `DataMap::Array` of per-slot
/// tags alongside the raw array.
fn pack_slice<T: Pack>(items: &[T], ctx: &dyn PeerHandle) -> PackedData {
    let packed: Vec<PackedData> = items.iter().map(|item| item.pack(ctx)).collect();
    if packed.iter().all(|p| p.map().is_none()) {
        PackedData::identity(RawValue::Array(packed.into_iter().map(|p| p.raw).collect()))
    } else {
        let maps = packed
            .iter()
            .map(|p| p.map().cloned().unwrap_or(DataMap::IDENTITY))
            .collect();
        let raws = packed.into_iter().map(|p| p.raw).collect();
        PackedData::tagged(DataMap::Array(maps), RawValue::Array(raws))
    }
}

impl Pack for Bytes {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        PackedData::tagged(
            DataMap::scalar(ScalarTag::Bytes),
            RawValue::String(BASE64.encode(&self.0)),
        )
    }
}

impl Pack for Buffer {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        PackedData::tagged(
            DataMap::scalar(ScalarTag::Buffer),
            RawValue::String(BASE64.encode(&self.0)),
        )
    }
}

impl Pack for DateTime<Utc> {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        PackedData::tagged(
            DataMap::scalar(ScalarTag::Date),
            RawValue::String(self.to_rfc3339_opts(SecondsFormat::Millis, true)),
        )
    }
}

impl Pack for ObjectHandle {
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        let raw = match ctx.admit(&self.0) {
            Some(packed_id) => RawValue::Number(packed_id as f64),
            None => RawValue::Null,
        };
        PackedData::tagged(DataMap::scalar(ScalarTag::Object), raw)
    }
}

impl Pack for Shared {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        PackedData::tagged(DataMap::scalar(ScalarTag::Shared), RawValue::String(self.0.clone()))
    }
}

/// `'e'` envelopes embed each recursively-packed extra property inline as
/// its own `{map, raw, throw}` object rather than factoring a parallel map
/// tree out — `Map`/`Set` do the same for their entries, see
/// [`pack_entries`] and [`pack_set`].
impl Pack for JsError {
    fn pack(&self, _ctx: &dyn PeerHandle) -> PackedData {
        let mut fields = BTreeMap::new();
        fields.insert(
            "base".to_string(),
            match self.class {
                Some(class) => RawValue::String(class.as_str().to_string()),
                None => RawValue::Null,
            },
        );
        fields.insert("message".to_string(), RawValue::String(self.message.clone()));
        fields.insert("stack".to_string(), RawValue::String(self.stack.clone()));
        for (name, value) in &self.extra {
            fields.insert(name.clone(), value.to_embedded_raw());
        }
        PackedData::tagged(DataMap::scalar(ScalarTag::Error), RawValue::Object(fields))
    }
}

impl<K, V> Pack for HashMap<K, V>
where
    K: Pack + std::hash::Hash + Eq,
    V: Pack,
{
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        pack_entries(self.iter(), ctx)
    }
}

impl<K, V> Pack for BTreeMap<K, V>
where
    K: Pack + Ord,
    V: Pack,
{
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        pack_entries(self.iter(), ctx)
    }
}

fn pack_entries<'a, K: Pack + 'a, V: Pack + 'a>(
    entries: impl Iterator<Item = (&'a K, &'a V)>,
    ctx: &dyn PeerHandle,
) -> PackedData {
    let pairs: Vec<RawValue> = entries
        .map(|(k, v)| {
            RawValue::Array(vec![k.pack(ctx).to_embedded_raw(), v.pack(ctx).to_embedded_raw()])
        })
        .collect();
    PackedData::tagged(DataMap::scalar(ScalarTag::Map), RawValue::Array(pairs))
}

impl<T> Pack for HashSet<T>
where
    T: Pack + std::hash::Hash + Eq,
{
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        pack_set(self.iter(), ctx)
    }
}

impl<T> Pack for BTreeSet<T>
where
    T: Pack + Ord,
{
    fn pack(&self, ctx: &dyn PeerHandle) -> PackedData {
        pack_set(self.iter(), ctx)
    }
}

fn pack_set<'a, T: Pack + 'a>(items: impl Iterator<Item = &'a T>, ctx: &dyn PeerHandle) -> PackedData {
    let members: Vec<RawValue> = items.map(|item| item.pack(ctx).to_embedded_raw()).collect();
    PackedData::tagged(DataMap::scalar(ScalarTag::Set), RawValue::Array(members))
}
