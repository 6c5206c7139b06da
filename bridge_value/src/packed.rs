use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::map::DataMap;
use crate::raw::RawValue;

/// The wire envelope:
///
/// ```text
/// { map?: DataMap, raw: JsonValue, throw?: true }
/// ```
///
/// The invariant: an envelope with `map` absent (or `Identity`) is the
/// identity transformation on `raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedData {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    map: Option<DataMap>,
    pub raw: RawValue,
    #[serde(skip_serializing_if = "is_false", default)]
    pub throw: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl PackedData {
    /// Build an identity envelope (`map` absent), used for plain JSON-safe
    /// primitives.
    pub fn identity(raw: RawValue) -> Self {
        PackedData {
            map: None,
            raw,
            throw: false,
        }
    }

    /// Build an envelope carrying a non-identity transformation tag.
    pub fn tagged(map: DataMap, raw: RawValue) -> Self {
        let map = if map.is_identity() { None } else { Some(map) };
        PackedData { map, raw, throw: false }
    }

    /// Mark this envelope as a rejection payload — the value a failed
    /// method call or rejected promise packs into.
    pub fn into_throw(mut self) -> Self {
        self.throw = true;
        self
    }

    /// The envelope's map, normalized so identity is always `None`.
    pub fn map(&self) -> Option<&DataMap> {
        self.map.as_ref()
    }

    /// Embeds this envelope inline as a plain `RawValue`, for containers
    /// whose members are independently-typed values that each need their
    /// own `map`/`throw` rather than sharing one structural tag tree with
    /// their siblings (`Map` entries, `Set` members, an `Error`'s extra
    /// properties).
    pub fn to_embedded_raw(&self) -> RawValue {
        let mut fields = BTreeMap::new();
        if let Some(map) = &self.map {
            fields.insert("map".to_string(), map.to_raw());
        }
        fields.insert("raw".to_string(), self.raw.clone());
        if self.throw {
            fields.insert("throw".to_string(), RawValue::Bool(true));
        }
        RawValue::Object(fields)
    }

    /// Splits a heterogeneous packed array (a method's argument list, a
    /// call's payload) into one envelope per element, the way
    /// `bridge_value::Pack for Vec<T>`/`[T]` does for homogeneous slices
    /// but without unpacking each element into a concrete type yet.
    pub fn split_array(&self) -> Option<Vec<PackedData>> {
        let raws = self.raw.as_array()?;
        match &self.map {
            None => Some(raws.iter().map(|r| PackedData::identity(r.clone())).collect()),
            Some(DataMap::Array(maps)) if maps.len() == raws.len() => Some(
                raws.iter()
                    .zip(maps.iter())
                    .map(|(raw, map)| {
                        if map.is_identity() {
                            PackedData::identity(raw.clone())
                        } else {
                            PackedData::tagged(map.clone(), raw.clone())
                        }
                    })
                    .collect(),
            ),
            Some(_) => None,
        }
    }

    /// The inverse of [`PackedData::split_array`]: joins per-element
    /// envelopes (possibly of different concrete types) back into one
    /// array envelope.
    pub fn join_array(items: Vec<PackedData>) -> PackedData {
        if items.iter().all(|p| p.map.is_none()) {
            PackedData::identity(RawValue::Array(items.into_iter().map(|p| p.raw).collect()))
        } else {
            let maps = items.iter().map(|p| p.map.clone().unwrap_or(DataMap::IDENTITY)).collect();
            let raws = items.into_iter().map(|p| p.raw).collect();
            PackedData::tagged(DataMap::Array(maps), RawValue::Array(raws))
        }
    }

    /// The inverse of [`PackedData::to_embedded_raw`].
    pub fn from_embedded_raw(raw: &RawValue) -> Option<PackedData> {
        let fields = raw.as_object()?;
        let map = match fields.get("map") {
            Some(m) => Some(DataMap::from_raw(m)?),
            None => None,
        };
        let raw = fields.get("raw")?.clone();
        let throw = fields.get("throw").and_then(RawValue::as_bool).unwrap_or(false);
        Some(PackedData { map, raw, throw })
    }
}
