//! Wire <-> native conversions
//!
//! `coerce` turns a wire (JSON) value into the native value a setter or
//! parameter expects. `encode` goes the other way for outbound data and
//! query results. Host-specific types plug in through `register_native`
//! and `register_wire`.

use crate::core::reflect::ValueType;
use crate::core::value::{HostObject, Value};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::ObjectRegistry;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashMap;

/// Native containers nested deeper than this do not encode.
pub const MAX_ENCODE_DEPTH: usize = 128;

type NativeConverter = Box<dyn Fn(&JsonValue) -> BridgeResult<Value>>;
type WireEncoder = Box<dyn Fn(&dyn HostObject) -> BridgeResult<JsonValue>>;

#[derive(Default)]
pub struct Coercion {
    to_native: HashMap<String, NativeConverter>,
    to_wire: HashMap<String, WireEncoder>,
}

impl Coercion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converter for `ValueType::Named(name)`.
    pub fn register_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&JsonValue) -> BridgeResult<Value> + 'static,
    {
        self.to_native.insert(name.to_string(), Box::new(f));
    }

    /// Encoder for host objects whose type name is `type_name`.
    pub fn register_wire<F>(&mut self, type_name: &str, f: F)
    where
        F: Fn(&dyn HostObject) -> BridgeResult<JsonValue> + 'static,
    {
        self.to_wire.insert(type_name.to_string(), Box::new(f));
    }

    pub fn coerce(&self, wire: &JsonValue, ty: &ValueType, objects: &ObjectRegistry) -> BridgeResult<Value> {
        let mismatch = || BridgeError::Conversion(format!("cannot convert {} to {}", wire, ty));
        match ty {
            ValueType::Any => Ok(to_any(wire)),
            ValueType::Wire => Ok(Value::wire(wire.clone())),
            ValueType::Bool => wire.as_bool().map(Value::Bool).ok_or_else(mismatch),
            ValueType::Int => to_int(wire).map(Value::Int).ok_or_else(mismatch),
            ValueType::Float => to_float(wire).map(Value::Float).ok_or_else(mismatch),
            ValueType::String => match wire {
                JsonValue::Null => Ok(Value::Null),
                JsonValue::String(s) => Ok(Value::String(s.clone())),
                JsonValue::Bool(b) => Ok(Value::String(b.to_string())),
                JsonValue::Number(n) => Ok(Value::String(n.to_string())),
                _ => Err(mismatch()),
            },
            ValueType::Array(inner) | ValueType::List(inner) => match wire {
                JsonValue::Null => Ok(Value::Null),
                JsonValue::Array(items) => {
                    let items = items
                        .iter()
                        .map(|item| self.coerce(item, inner, objects))
                        .collect::<BridgeResult<Vec<_>>>()?;
                    Ok(match ty {
                        ValueType::Array(_) => Value::array(items),
                        _ => Value::list(items),
                    })
                }
                _ => Err(mismatch()),
            },
            ValueType::Map(inner) => match wire {
                JsonValue::Null => Ok(Value::Null),
                JsonValue::Object(entries) => {
                    let entries = entries
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), self.coerce(v, inner, objects)?)))
                        .collect::<BridgeResult<Vec<_>>>()?;
                    Ok(Value::map(entries))
                }
                _ => Err(mismatch()),
            },
            ValueType::Object => match wire {
                JsonValue::Null => Ok(Value::Null),
                JsonValue::String(id) => objects
                    .resolve(id)
                    .map(Value::Object)
                    .ok_or_else(|| BridgeError::Conversion(format!("no object with id '{}'", id))),
                _ => Err(mismatch()),
            },
            ValueType::Named(name) => match self.to_native.get(name) {
                Some(convert) => convert(wire),
                None => Err(BridgeError::Conversion(format!("no converter for type {}", name))),
            },
        }
    }

    pub fn encode(&self, value: &Value, objects: &ObjectRegistry) -> BridgeResult<JsonValue> {
        self.encode_at(value, objects, 0)
    }

    fn encode_at(&self, value: &Value, objects: &ObjectRegistry, depth: usize) -> BridgeResult<JsonValue> {
        if depth > MAX_ENCODE_DEPTH {
            return Err(BridgeError::Conversion(format!(
                "value nests deeper than {} levels (self-referencing container?)",
                MAX_ENCODE_DEPTH
            )));
        }
        match value {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Int(i) => Ok(JsonValue::from(*i)),
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| BridgeError::Conversion(format!("cannot encode non-finite float {}", f))),
            Value::String(s) => Ok(JsonValue::String(s.clone())),
            Value::Wire(w) => Ok(w.snapshot()),
            Value::Array(a) => self.encode_all(a.to_vec(), objects, depth),
            Value::List(l) => self.encode_all(l.to_vec(), objects, depth),
            Value::Map(m) => {
                let mut out = Map::new();
                for (k, v) in m.entries() {
                    out.insert(k, self.encode_at(&v, objects, depth + 1)?);
                }
                Ok(JsonValue::Object(out))
            }
            Value::Object(obj) => {
                if let Some(encode) = self.to_wire.get(obj.type_name()) {
                    return encode(&**obj);
                }
                objects
                    .id_of(obj)
                    .map(|id| JsonValue::String(id.to_string()))
                    .ok_or_else(|| {
                        BridgeError::Conversion(format!(
                            "no encoder for unregistered {} object",
                            obj.type_name()
                        ))
                    })
            }
        }
    }

    /// Encode a set of named values into a wire object, in order.
    pub fn encode_map(&self, values: &IndexMap<String, Value>, objects: &ObjectRegistry) -> BridgeResult<JsonValue> {
        let mut out = Map::new();
        for (k, v) in values {
            out.insert(k.clone(), self.encode(v, objects)?);
        }
        Ok(JsonValue::Object(out))
    }

    fn encode_all(&self, items: Vec<Value>, objects: &ObjectRegistry, depth: usize) -> BridgeResult<JsonValue> {
        items
            .iter()
            .map(|v| self.encode_at(v, objects, depth + 1))
            .collect::<BridgeResult<Vec<_>>>()
            .map(JsonValue::Array)
    }
}

/// Natural native form of a wire value: scalars unwrap, containers stay wire.
pub fn to_any(wire: &JsonValue) -> Value {
    match wire {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => Value::wire(wire.clone()),
    }
}

fn to_int(wire: &JsonValue) -> Option<i64> {
    match wire {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(wire: &JsonValue) -> Option<f64> {
    match wire {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
