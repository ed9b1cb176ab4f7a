//! Resolution context
//!
//! Everything a path needs besides its root: host capabilities, reflection
//! tables, coercions and the object registry. Passed explicitly to every
//! resolver and accessor call.

use crate::core::coerce::Coercion;
use crate::core::reflect::{TypeRegistry, ValueType};
use crate::core::value::Value;
use crate::error::BridgeResult;
use crate::host::Host;
use crate::registry::ObjectRegistry;
use serde_json::Value as JsonValue;

#[derive(Clone, Copy)]
pub struct BridgeContext<'a> {
    pub host: &'a dyn Host,
    pub types: &'a TypeRegistry,
    pub coercion: &'a Coercion,
    pub objects: &'a ObjectRegistry,
}

impl<'a> BridgeContext<'a> {
    pub fn new(
        host: &'a dyn Host,
        types: &'a TypeRegistry,
        coercion: &'a Coercion,
        objects: &'a ObjectRegistry,
    ) -> Self {
        Self { host, types, coercion, objects }
    }

    pub fn coerce(&self, wire: &JsonValue, ty: &ValueType) -> BridgeResult<Value> {
        self.coercion.coerce(wire, ty, self.objects)
    }

    pub fn encode(&self, value: &Value) -> BridgeResult<JsonValue> {
        self.coercion.encode(value, self.objects)
    }
}
