//! Alephium full-node response types and the watcher's event model

use serde::{de, Deserialize, Deserializer, Serialize};

/// Typed value of an event field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: serde_json::Value,
}

/// A contract event as returned by the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub block_hash: String,
    pub contract_address: String,
    #[serde(default)]
    pub tx_id: String,
    /// Index of the event within its block
    #[serde(default)]
    pub event_index: i32,
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// Wrapped event range response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Events {
    #[serde(default)]
    pub chain_from: u32,
    #[serde(default)]
    pub chain_to: u32,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Nodes answer an event range either with a bare array or with the wrapped
/// form; both are accepted
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum EventsResponse {
    Wrapped(Events),
    List(Vec<Event>),
}

impl EventsResponse {
    pub(crate) fn into_events(self) -> Vec<Event> {
        match self {
            EventsResponse::Wrapped(events) => events.events,
            EventsResponse::List(events) => events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: String,
    #[serde(default, deserialize_with = "deserialize_string_or_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub chain_from: u32,
    #[serde(default)]
    pub chain_to: u32,
    #[serde(default, deserialize_with = "deserialize_string_or_u64")]
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChainInfo {
    #[serde(deserialize_with = "deserialize_string_or_u64")]
    pub current_height: u64,
}

/// An event together with its position in the contract's event stream and the
/// state of its block at classification time
#[derive(Debug, Clone, PartialEq)]
pub struct UnconfirmedEvent {
    /// Global index in the contract event stream
    pub index: u64,
    pub event: Event,
    pub header: BlockHeader,
    pub canonical: bool,
}

/// A confirmed event handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedEvent {
    pub index: u64,
    pub event: Event,
}

/// Ordered batch of confirmed events for one contract plus the next event
/// index to fetch
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedEvents {
    pub contract_address: String,
    pub events: Vec<ConfirmedEvent>,
    pub next_index: u64,
}

/// Heights and counts may arrive as JSON numbers or decimal strings
fn deserialize_string_or_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrU64 {
        String(String),
        U64(u64),
    }

    match StringOrU64::deserialize(deserializer)? {
        StringOrU64::String(s) => s.parse().map_err(de::Error::custom),
        StringOrU64::U64(n) => Ok(n),
    }
}
