use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::raw::RawValue;

/// One of the scalar transformation tags a packed value's `map` field can
/// carry, one per wire representation the codec recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarTag {
    /// `''` — identity, no transformation.
    Identity,
    /// `'?'` — unsupported type.
    Unsupported,
    /// `'u'` — `undefined`.
    Undefined,
    /// `'d'` — `Date`.
    Date,
    /// `'e'` — `Error`.
    Error,
    /// `'o'` — bridgeable reference.
    Object,
    /// `'s'` — shared constant.
    Shared,
    /// `'u8'` — byte array (typed array).
    Bytes,
    /// `'ab'` — raw buffer.
    Buffer,
    /// `'M'` — `Map`.
    Map,
    /// `'S'` — `Set`.
    Set,
}

impl ScalarTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarTag::Identity => "",
            ScalarTag::Unsupported => "?",
            ScalarTag::Undefined => "u",
            ScalarTag::Date => "d",
            ScalarTag::Error => "e",
            ScalarTag::Object => "o",
            ScalarTag::Shared => "s",
            ScalarTag::Bytes => "u8",
            ScalarTag::Buffer => "ab",
            ScalarTag::Map => "M",
            ScalarTag::Set => "S",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "" => ScalarTag::Identity,
            "?" => ScalarTag::Unsupported,
            "u" => ScalarTag::Undefined,
            "d" => ScalarTag::Date,
            "e" => ScalarTag::Error,
            "o" => ScalarTag::Object,
            "s" => ScalarTag::Shared,
            "u8" => ScalarTag::Bytes,
            "ab" => ScalarTag::Buffer,
            "M" => ScalarTag::Map,
            "S" => ScalarTag::Set,
            _ => return None,
        })
    }
}

/// The structural tag tree the codec uses to describe per-field/per-index
/// transformations.
///
/// `DataMap::Scalar(ScalarTag::Identity)` and the absence of a `map` field
/// altogether (`PackedData::map == None`) mean the same thing; `PackedData`
/// normalizes the latter on construction so callers only ever match one
/// shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMap {
    Scalar(ScalarTag),
    /// Per-index container: one tag per array slot, `Identity` for
    /// untransformed slots.
    Array(Vec<DataMap>),
    /// Per-field container: only keys that require a transformation are
    /// present.
    Fields(BTreeMap<String, DataMap>),
}

impl DataMap {
    pub const IDENTITY: DataMap = DataMap::Scalar(ScalarTag::Identity);

    pub fn is_identity(&self) -> bool {
        matches!(self, DataMap::Scalar(ScalarTag::Identity))
    }

    pub fn scalar(tag: ScalarTag) -> Self {
        DataMap::Scalar(tag)
    }

    /// Renders this tag tree as a `RawValue`, the same shape it would take
    /// if it had come in over the wire as the `map` field's JSON value.
    /// Used to embed a full `PackedData` inline as a plain value (see
    /// `PackedData::to_embedded_raw`), which containers whose members are
    /// independently typed (`Map`, `Set`, `Error`'s extra properties) need
    /// to do.
    pub fn to_raw(&self) -> RawValue {
        match self {
            DataMap::Scalar(tag) => RawValue::String(tag.as_str().to_string()),
            DataMap::Array(items) => RawValue::Array(items.iter().map(DataMap::to_raw).collect()),
            DataMap::Fields(fields) => {
                RawValue::Object(fields.iter().map(|(k, v)| (k.clone(), v.to_raw())).collect())
            }
        }
    }

    /// The inverse of [`DataMap::to_raw`].
    pub fn from_raw(raw: &RawValue) -> Option<DataMap> {
        match raw {
            RawValue::String(s) => ScalarTag::from_str(s).map(DataMap::Scalar),
            RawValue::Array(items) => {
                let items = items.iter().map(DataMap::from_raw).collect::<Option<Vec<_>>>()?;
                Some(DataMap::Array(items))
            }
            RawValue::Object(fields) => {
                let fields = fields
                    .iter()
                    .map(|(k, v)| DataMap::from_raw(v).map(|d| (k.clone(), d)))
                    .collect::<Option<BTreeMap<_, _>>>()?;
                Some(DataMap::Fields(fields))
            }
            _ => None,
        }
    }
}

impl Serialize for DataMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DataMap::Scalar(tag) => serializer.serialize_str(tag.as_str()),
            DataMap::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DataMap::Fields(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for DataMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DataMapVisitor)
    }
}

struct DataMapVisitor;

impl<'de> Visitor<'de> for DataMapVisitor {
    type Value = DataMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a DataMap tag string, array, or field map")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        ScalarTag::from_str(v)
            .map(DataMap::Scalar)
            .ok_or_else(|| de::Error::custom(format!("unknown DataMap tag '{v}'")))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.visit_str(&v)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DataMap::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields = BTreeMap::new();
        while let Some((k, v)) = map.next_entry()? {
            fields.insert(k, v);
        }
        Ok(DataMap::Fields(fields))
    }
}
