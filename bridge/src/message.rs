use std::collections::BTreeMap;

use bridge_value::PackedData;
use serde::{Deserialize, Serialize};

/// Per-peer object identifier, assigned monotonically. Always positive;
/// direction is encoded separately by the sign of a *packed* id on the
/// wire (`bridge_value::PeerHandle::resolve` takes the signed form).
pub type LocalId = u64;

/// Identifies one in-flight method call, unique per bridge peer and never
/// reused.
pub type CallId = u64;

/// One coalesced batch of everything that happened on a peer since the
/// previous flush. Sections are optional and empty ones are omitted from
/// the wire form; an entirely empty message is never sent at all (see
/// `BridgeState::send_now`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub created: Vec<CreateRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub changed: Vec<ChangeRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub closed: Vec<LocalId>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub calls: Vec<CallRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<EventRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub returns: Vec<ReturnRecord>,
}

impl Message {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.changed.is_empty()
            && self.closed.is_empty()
            && self.calls.is_empty()
            && self.events.is_empty()
            && self.returns.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecord {
    pub local_id: LocalId,
    pub methods: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub base: Option<String>,
    pub props: BTreeMap<String, PackedData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub local_id: LocalId,
    pub props: BTreeMap<String, PackedData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub call_id: CallId,
    pub remote_id: LocalId,
    pub name: String,
    #[serde(flatten)]
    pub payload: PackedData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub local_id: LocalId,
    pub name: String,
    #[serde(flatten)]
    pub payload: PackedData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRecord {
    pub call_id: CallId,
    #[serde(flatten)]
    pub payload: PackedData,
}
