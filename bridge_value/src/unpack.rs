use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::js_error::{JsError, JsErrorClass};
use crate::map::{DataMap, ScalarTag};
use crate::object_ref::{ObjectHandle, PeerHandle};
use crate::packed::PackedData;
use crate::raw::RawValue;

/// The inverse of [`crate::Pack`]: reconstructs a Rust value from a
/// `PackedData` envelope.
///
/// `path` identifies where in the value tree `data` was found, purely for
/// error reporting — `"root"` at the top, `.`/`[]`-extended as callers
/// recurse into fields and elements.
pub trait Unpack: Sized {
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self>;
}

fn type_error<T>(path: &str, type_name: &'static str) -> Result<T> {
    Err(Error::UnsupportedType {
        path: path.to_string(),
        type_name,
    })
}

macro_rules! impl_unpack_identity_num {
    ($($t:ty),*) => {
        $(
            impl Unpack for $t {
                fn unpack(data: &PackedData, _ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
                    data.raw
                        .as_f64()
                        .map(|n| n as $t)
                        .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: stringify!($t) })
                }
            }
        )*
    };
}

impl_unpack_identity_num!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl Unpack for bool {
    fn unpack(data: &PackedData, _ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        data.raw.as_bool().ok_or_else(|| Error::UnsupportedType {
            path: path.to_string(),
            type_name: "bool",
        })
    }
}

impl Unpack for String {
    fn unpack(data: &PackedData, _ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        data.raw
            .as_str()
            .map(|s| s.to_owned())
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "String" })
    }
}

/// The `'u'` tag (`undefined`) unpacks to `None`; any other envelope
/// unpacks `T` and wraps it in `Some`.
impl<T: Unpack> Unpack for Option<T> {
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        if matches!(data.map(), Some(DataMap::Scalar(ScalarTag::Undefined))) {
            return Ok(None);
        }
        if data.map().is_none() && data.raw.is_null() {
            return Ok(None);
        }
        T::unpack(data, ctx, path).map(Some)
    }
}

impl<T: Unpack> Unpack for Vec<T> {
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        let raws = data
            .raw
            .as_array()
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "Vec<T>" })?;
        match data.map() {
            None => raws
                .iter()
                .enumerate()
                .map(|(i, raw)| T::unpack(&PackedData::identity(raw.clone()), ctx, &format!("{path}[{i}]")))
                .collect(),
            Some(DataMap::Array(maps)) => raws
                .iter()
                .zip(maps.iter())
                .enumerate()
                .map(|(i, (raw, map))| {
                    let elem = if map.is_identity() {
                        PackedData::identity(raw.clone())
                    } else {
                        PackedData::tagged(map.clone(), raw.clone())
                    };
                    T::unpack(&elem, ctx, &format!("{path}[{i}]"))
                })
                .collect(),
            Some(_) => type_error(path, "Vec<T>"),
        }
    }
}

impl Unpack for crate::pack::Bytes {
    fn unpack(data: &PackedData, _ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        let s = data
            .raw
            .as_str()
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "Bytes" })?;
        BASE64
            .decode(s)
            .map(crate::pack::Bytes)
            .map_err(|_| Error::UnsupportedType { path: path.to_string(), type_name: "Bytes" })
    }
}

impl Unpack for crate::pack::Buffer {
    fn unpack(data: &PackedData, _ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        let s = data
            .raw
            .as_str()
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "Buffer" })?;
        BASE64
            .decode(s)
            .map(crate::pack::Buffer)
            .map_err(|_| Error::UnsupportedType { path: path.to_string(), type_name: "Buffer" })
    }
}

impl Unpack for DateTime<Utc> {
    fn unpack(data: &PackedData, _ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        let s = data
            .raw
            .as_str()
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "DateTime<Utc>" })?;
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| Error::UnsupportedType { path: path.to_string(), type_name: "DateTime<Utc>" })
    }
}

/// `'o'` envelopes with `raw == null` mean the object was already closed
/// when it was packed; a non-null raw is the signed packed id to resolve
/// through the peer.
impl Unpack for ObjectHandle {
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        if data.raw.is_null() {
            return Err(Error::ClosedBridgeObject { path: path.to_string() });
        }
        let packed_id = data
            .raw
            .as_i64()
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "ObjectHandle" })?;
        ctx.resolve(packed_id)
            .map(ObjectHandle::new)
            .ok_or(Error::InvalidPackedId { path: path.to_string(), packed_id })
    }
}

impl Unpack for crate::pack::Shared {
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        let name = data
            .raw
            .as_str()
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "Shared" })?;
        if ctx.lookup_shared(name).is_none() {
            return Err(Error::InvalidShareId { path: path.to_string(), share_id: name.to_string() });
        }
        Ok(crate::pack::Shared(name.to_string()))
    }
}

impl Unpack for JsError {
    fn unpack(data: &PackedData, _ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        let fields = data
            .raw
            .as_object()
            .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "JsError" })?;

        let class = match fields.get("base") {
            Some(RawValue::String(s)) => Some(
                JsErrorClass::from_str(s)
                    .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "JsErrorClass" })?,
            ),
            _ => None,
        };
        let message = fields
            .get("message")
            .and_then(RawValue::as_str)
            .unwrap_or_default()
            .to_string();
        let stack = fields.get("stack").and_then(RawValue::as_str).unwrap_or_default().to_string();

        let mut extra = BTreeMap::new();
        for (name, raw) in fields {
            if matches!(name.as_str(), "base" | "message" | "stack") {
                continue;
            }
            let embedded = PackedData::from_embedded_raw(raw)
                .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "JsError" })?;
            extra.insert(name.clone(), embedded);
        }

        Ok(JsError { class, message, stack, extra })
    }
}

impl<K, V> Unpack for HashMap<K, V>
where
    K: Unpack + std::hash::Hash + Eq,
    V: Unpack,
{
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        unpack_entries(data, ctx, path)?.into_iter().collect::<Result<_>>()
    }
}

impl<K, V> Unpack for BTreeMap<K, V>
where
    K: Unpack + Ord,
    V: Unpack,
{
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        unpack_entries(data, ctx, path)?.into_iter().collect::<Result<_>>()
    }
}

type UnpackedPair<K, V> = Result<(K, V)>;

fn unpack_entries<K: Unpack, V: Unpack>(
    data: &PackedData,
    ctx: &dyn PeerHandle,
    path: &str,
) -> Result<Vec<UnpackedPair<K, V>>> {
    let pairs = data
        .raw
        .as_array()
        .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "Map" })?;
    Ok(pairs
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let entry_path = format!("{path}[{i}]");
            let kv = pair
                .as_array()
                .filter(|kv| kv.len() == 2)
                .ok_or_else(|| Error::UnsupportedType { path: entry_path.clone(), type_name: "Map" })?;
            let key_data = PackedData::from_embedded_raw(&kv[0])
                .ok_or_else(|| Error::UnsupportedType { path: entry_path.clone(), type_name: "Map" })?;
            let value_data = PackedData::from_embedded_raw(&kv[1])
                .ok_or_else(|| Error::UnsupportedType { path: entry_path.clone(), type_name: "Map" })?;
            let key = K::unpack(&key_data, ctx, &format!("{entry_path}.key"))?;
            let value = V::unpack(&value_data, ctx, &format!("{entry_path}.value"))?;
            Ok((key, value))
        })
        .collect())
}

impl<T> Unpack for HashSet<T>
where
    T: Unpack + std::hash::Hash + Eq,
{
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        unpack_set(data, ctx, path)?.into_iter().collect::<Result<_>>()
    }
}

impl<T> Unpack for BTreeSet<T>
where
    T: Unpack + Ord,
{
    fn unpack(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Self> {
        unpack_set(data, ctx, path)?.into_iter().collect::<Result<_>>()
    }
}

fn unpack_set<T: Unpack>(data: &PackedData, ctx: &dyn PeerHandle, path: &str) -> Result<Vec<Result<T>>> {
    let members = data
        .raw
        .as_array()
        .ok_or_else(|| Error::UnsupportedType { path: path.to_string(), type_name: "Set" })?;
    Ok(members
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let member_path = format!("{path}[{i}]");
            let member_data = PackedData::from_embedded_raw(raw)
                .ok_or_else(|| Error::UnsupportedType { path: member_path.clone(), type_name: "Set" })?;
            T::unpack(&member_data, ctx, &member_path)
        })
        .collect())
}
