//! Interest tables
//!
//! Per object, per event name: whether the event is worth sending and what
//! firing it does locally (apply an update, replay events, attach query
//! results).

use crate::error::{BridgeError, BridgeResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interest {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    /// `path -> wire value` assignments applied to the object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Map<String, JsonValue>>,
    /// Envelopes replayed through the object's own handler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<JsonValue>>,
    /// `output key -> path` read into the outgoing data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<IndexMap<String, String>>,
    #[serde(rename = "doNotSend", skip_serializing_if = "std::ops::Not::not")]
    pub do_not_send: bool,
}

impl Interest {
    pub fn from_json(value: &JsonValue) -> BridgeResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| BridgeError::Protocol(format!("malformed interest: {}", e)))
    }

    /// Overwrite the fields present in `patch`, keep the rest.
    pub fn merge(&self, patch: &Map<String, JsonValue>) -> BridgeResult<Self> {
        let mut merged = match serde_json::to_value(self)? {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        Self::from_json(&JsonValue::Object(merged))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestTable {
    entries: IndexMap<String, Interest>,
}

impl InterestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from a `Create`'s `interests` object. Malformed records are
    /// skipped with a warning.
    pub fn from_json(interests: &Map<String, JsonValue>) -> Self {
        let mut table = Self::new();
        for (event, record) in interests {
            match Interest::from_json(record) {
                Ok(interest) => {
                    table.entries.insert(event.clone(), interest);
                }
                Err(e) => warn!(event = %event, error = %e, "ignoring interest"),
            }
        }
        table
    }

    pub fn get(&self, event: &str) -> Option<&Interest> {
        self.entries.get(event)
    }

    /// Enabled record for `event`.
    pub fn active(&self, event: &str) -> Option<&Interest> {
        self.entries.get(event).filter(|i| !i.disabled)
    }

    pub fn insert(&mut self, event: impl Into<String>, interest: Interest) {
        self.entries.insert(event.into(), interest);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Apply an `UpdateInterests` payload, event by event:
    /// `null` removes the record, a boolean enables/disables an existing
    /// record, an object creates the record or shallow-merges into it.
    pub fn apply_directives(&mut self, directives: &Map<String, JsonValue>) {
        for (event, directive) in directives {
            match directive {
                JsonValue::Null => {
                    self.entries.shift_remove(event);
                }
                JsonValue::Bool(enabled) => {
                    if let Some(interest) = self.entries.get_mut(event) {
                        interest.disabled = !enabled;
                    }
                }
                JsonValue::Object(patch) => {
                    let result = match self.entries.get(event) {
                        Some(existing) => existing.merge(patch),
                        None => Interest::from_json(directive),
                    };
                    match result {
                        Ok(interest) => {
                            self.entries.insert(event.clone(), interest);
                        }
                        Err(e) => warn!(event = %event, error = %e, "ignoring interest update"),
                    }
                }
                other => warn!(event = %event, directive = %other, "ignoring interest directive"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directives(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn object_directive_creates_record() {
        let mut table = InterestTable::new();
        table.apply_directives(&directives(json!({"Moved": {}})));
        assert_eq!(table.get("Moved"), Some(&Interest::default()));
        assert!(table.active("Moved").is_some());
    }

    #[test]
    fn object_directive_merges_shallowly() {
        let mut table = InterestTable::from_json(&directives(json!({
            "Clicked": {"query": {"name": "name"}, "doNotSend": true}
        })));
        table.apply_directives(&directives(json!({"Clicked": {"doNotSend": false}})));
        let interest = table.get("Clicked").unwrap();
        assert!(!interest.do_not_send);
        assert_eq!(interest.query.as_ref().unwrap().get("name").map(String::as_str), Some("name"));
    }

    #[test]
    fn bool_toggles_only_existing_records() {
        let mut table = InterestTable::from_json(&directives(json!({"Hit": {"doNotSend": true}})));
        table.apply_directives(&directives(json!({"Hit": false, "Other": true})));
        assert!(table.get("Hit").unwrap().disabled);
        assert!(table.get("Hit").unwrap().do_not_send);
        assert!(table.active("Hit").is_none());
        assert!(table.get("Other").is_none());

        table.apply_directives(&directives(json!({"Hit": true})));
        assert!(table.active("Hit").is_some());
    }

    #[test]
    fn null_removes_record() {
        let mut table = InterestTable::from_json(&directives(json!({"Hit": {}, "Miss": {}})));
        table.apply_directives(&directives(json!({"Hit": null})));
        assert_eq!(table.events().collect::<Vec<_>>(), vec!["Miss"]);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let mut table = InterestTable::from_json(&directives(json!({"Bad": {"query": 3}, "Good": {}})));
        assert_eq!(table.len(), 1);
        table.apply_directives(&directives(json!({"Good": {"events": "nope"}})));
        assert_eq!(table.get("Good"), Some(&Interest::default()));
    }
}
