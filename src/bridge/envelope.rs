//! Wire envelopes
//!
//! Every message in either direction is `{event, id?, data?}`; batches are
//! JSON arrays of envelopes.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl Envelope {
    pub fn new(event: impl Into<String>) -> Self {
        Self { event: event.into(), id: None, data: None }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse one envelope out of a batch element.
    pub fn from_json(value: JsonValue) -> BridgeResult<Self> {
        if !value.is_object() {
            return Err(BridgeError::Protocol(format!("envelope must be an object: {}", value)));
        }
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| BridgeError::Protocol(format!("malformed envelope: {}", e)))?;
        if envelope.event.is_empty() {
            return Err(BridgeError::Protocol("envelope has an empty event name".into()));
        }
        Ok(envelope)
    }

    /// `data` as an object, if it is one.
    pub fn data_object(&self) -> Option<&Map<String, JsonValue>> {
        self.data.as_ref().and_then(JsonValue::as_object)
    }

    /// String field of an object `data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data_object()?.get(key)?.as_str()
    }
}

/// Split a raw batch into its elements. A batch is a JSON array (a lone
/// envelope object counts as a batch of one). Elements are validated one
/// by one by the caller so a bad envelope only costs itself.
pub fn parse_batch(text: &str) -> BridgeResult<Vec<JsonValue>> {
    match serde_json::from_str::<JsonValue>(text)? {
        JsonValue::Array(items) => Ok(items),
        JsonValue::Object(o) => Ok(vec![JsonValue::Object(o)]),
        other => Err(BridgeError::Protocol(format!("batch must be a JSON array, got {}", other))),
    }
}

pub fn encode_batch(envelopes: &[Envelope]) -> BridgeResult<String> {
    Ok(serde_json::to_string(envelopes)?)
}

/// Payload of an inbound `Create`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSpec {
    pub id: Option<String>,
    pub prefab: Option<String>,
    pub component: Option<String>,
    pub pre_events: Option<Vec<JsonValue>>,
    pub parent: Option<String>,
    pub world_position_stays: Option<bool>,
    pub update: Option<Map<String, JsonValue>>,
    pub interests: Option<Map<String, JsonValue>>,
    pub post_events: Option<Vec<JsonValue>>,
}

impl CreateSpec {
    pub fn from_data(data: Option<&JsonValue>) -> BridgeResult<Self> {
        match data {
            None | Some(JsonValue::Null) => Ok(Self::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| BridgeError::Protocol(format!("malformed Create data: {}", e))),
        }
    }

    pub fn world_position_stays(&self) -> bool {
        self.world_position_stays.unwrap_or(true)
    }
}
