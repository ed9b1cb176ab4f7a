//! Accessors
//!
//! A resolved handle on one value: a container plus index/key, an object
//! plus member, or a lookup that runs fresh on every call. Built by the
//! resolver already bound to its owner.

use crate::accessor::context::BridgeContext;
use crate::core::coerce::to_any;
use crate::core::reflect::{MemberDesc, MethodDesc, ValueType};
use crate::core::value::{ArrayRef, ListRef, MapRef, ObjectRef, Value, WireRef};
use crate::error::{BridgeError, BridgeResult};
use crate::host::ChildSelector;
use serde_json::Value as JsonValue;
use std::fmt;
use std::rc::Rc;

/// Indexed container kinds.
#[derive(Clone)]
pub enum Sequence {
    Wire(WireRef),
    Array(ArrayRef),
    List(ListRef),
}

impl Sequence {
    pub fn len(&self) -> usize {
        match self {
            Sequence::Wire(w) => w.len().unwrap_or(0),
            Sequence::Array(a) => a.len(),
            Sequence::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keyed container kinds.
#[derive(Clone)]
pub enum Keyed {
    Wire(WireRef),
    Map(MapRef),
}

#[derive(Clone)]
pub enum AccessorKind {
    Constant(Value),
    IndexedSequence { seq: Sequence, index: i64 },
    KeyedMap { map: Keyed, key: String },
    ReflectedField { owner: ObjectRef, member: Rc<MemberDesc> },
    ReflectedProperty { owner: ObjectRef, member: Rc<MemberDesc> },
    ChildByNameOrIndex { owner: Value, selector: ChildSelector },
    CapabilityLookup { owner: Value, name: String },
    NamedResource { path: String },
    RegistryObject { id: String },
    MethodCall { owner: ObjectRef, name: String },
}

#[derive(Clone)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub conditional: bool,
    pub indirect: bool,
    short_circuit: bool,
}

impl Accessor {
    pub fn new(kind: AccessorKind, conditional: bool, indirect: bool) -> Self {
        Self { kind, conditional, indirect, short_circuit: false }
    }

    pub fn constant(value: Value) -> Self {
        Self::new(AccessorKind::Constant(value), false, false)
    }

    /// Null result of a conditional chain that ran out of values.
    pub(crate) fn short_circuited() -> Self {
        Self { kind: AccessorKind::Constant(Value::Null), conditional: true, indirect: false, short_circuit: true }
    }

    /// Whether resolution stopped early on a conditional step.
    pub fn is_short_circuit(&self) -> bool {
        self.short_circuit
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            AccessorKind::Constant(_) => "Constant",
            AccessorKind::IndexedSequence { .. } => "IndexedSequence",
            AccessorKind::KeyedMap { .. } => "KeyedMap",
            AccessorKind::ReflectedField { .. } => "ReflectedField",
            AccessorKind::ReflectedProperty { .. } => "ReflectedProperty",
            AccessorKind::ChildByNameOrIndex { .. } => "ChildByNameOrIndex",
            AccessorKind::CapabilityLookup { .. } => "CapabilityLookup",
            AccessorKind::NamedResource { .. } => "NamedResource",
            AccessorKind::RegistryObject { .. } => "RegistryObject",
            AccessorKind::MethodCall { .. } => "MethodCall",
        }
    }

    pub fn get(&self, ctx: &BridgeContext<'_>) -> BridgeResult<Value> {
        match &self.kind {
            AccessorKind::Constant(value) => Ok(value.clone()),

            AccessorKind::IndexedSequence { seq, index } => {
                let i = checked_index(*index, seq.len())?;
                let item = match seq {
                    Sequence::Wire(w) => w.element(i).map(wire_value),
                    Sequence::Array(a) => a.get(i),
                    Sequence::List(l) => l.get(i),
                };
                item.ok_or_else(|| out_of_range(*index, seq.len()))
            }

            AccessorKind::KeyedMap { map, key } => {
                let item = match map {
                    Keyed::Wire(w) => w.entry(key).map(wire_value),
                    Keyed::Map(m) => m.get(key),
                };
                item.ok_or_else(|| BridgeError::Missing(format!("key '{}'", key)))
            }

            AccessorKind::ReflectedField { owner, member }
            | AccessorKind::ReflectedProperty { owner, member } => member.get(&**owner),

            AccessorKind::ChildByNameOrIndex { owner, selector } => ctx
                .host
                .lookup_child(owner, selector)
                .ok_or_else(|| BridgeError::Missing(format!("child {:?}", selector))),

            AccessorKind::CapabilityLookup { owner, name } => ctx
                .host
                .lookup_capability(owner, name)
                .ok_or_else(|| BridgeError::Missing(format!("component '{}'", name))),

            AccessorKind::NamedResource { path } => ctx
                .host
                .load_named_resource(path)
                .ok_or_else(|| BridgeError::Missing(format!("resource '{}'", path))),

            AccessorKind::RegistryObject { id } => ctx
                .objects
                .resolve(id)
                .map(Value::Object)
                .ok_or_else(|| BridgeError::Missing(format!("object '{}'", id))),

            AccessorKind::MethodCall { owner, name } => {
                let type_name = owner.type_name();
                if let Some(method) = ctx.types.find_method(type_name, name, |m| m.explicit_params().is_empty()) {
                    let args = if method.params.len() > method.explicit_params().len() {
                        vec![Value::Object(owner.clone())]
                    } else {
                        Vec::new()
                    };
                    return method.invoke(owner, args);
                }
                match ctx.types.find_extension(type_name, name) {
                    Some(ext) if ext.params.len() == 1 => ext.invoke(owner, vec![Value::Object(owner.clone())]),
                    _ => Err(BridgeError::Missing(format!(
                        "no zero-argument method '{}' on {}",
                        name, type_name
                    ))),
                }
            }
        }
    }

    pub fn set(&self, ctx: &BridgeContext<'_>, value: Value) -> BridgeResult<()> {
        match &self.kind {
            AccessorKind::Constant(_) => Err(BridgeError::ReadOnly("constants cannot be assigned".into())),

            AccessorKind::IndexedSequence { seq, index } => {
                let i = checked_index(*index, seq.len())?;
                let stored = match seq {
                    Sequence::Wire(w) => w.set_element(i, ctx.encode(&value)?),
                    Sequence::Array(a) => {
                        refuse_cycle(&value, &Value::Array(a.clone()))?;
                        a.set(i, value)
                    }
                    Sequence::List(l) => {
                        refuse_cycle(&value, &Value::List(l.clone()))?;
                        l.set(i, value)
                    }
                };
                if stored {
                    Ok(())
                } else {
                    Err(out_of_range(*index, seq.len()))
                }
            }

            AccessorKind::KeyedMap { map, key } => match map {
                Keyed::Wire(w) => {
                    if w.insert(key, ctx.encode(&value)?) {
                        Ok(())
                    } else {
                        Err(BridgeError::TypeMismatch(format!(
                            "wire node at '{}' is no longer an object",
                            w.pointer()
                        )))
                    }
                }
                Keyed::Map(m) => {
                    refuse_cycle(&value, &Value::Map(m.clone()))?;
                    m.insert(key.clone(), value);
                    Ok(())
                }
            },

            AccessorKind::ReflectedField { owner, member }
            | AccessorKind::ReflectedProperty { owner, member } => member.set(&**owner, value),

            AccessorKind::ChildByNameOrIndex { .. }
            | AccessorKind::CapabilityLookup { .. }
            | AccessorKind::NamedResource { .. }
            | AccessorKind::RegistryObject { .. } => {
                Err(BridgeError::ReadOnly(format!("{} accessors are read-only", self.kind_name())))
            }

            AccessorKind::MethodCall { owner, name } => {
                let method = settable_method(ctx, owner, name)?;
                let args = match &value {
                    Value::Wire(w) => match w.snapshot() {
                        JsonValue::Array(items) => items,
                        other => {
                            return Err(BridgeError::TypeMismatch(format!(
                                "arguments to '{}' must be an array, got {}",
                                name, other
                            )))
                        }
                    },
                    other => {
                        return Err(BridgeError::TypeMismatch(format!(
                            "arguments to '{}' must be a wire array, got {}",
                            name,
                            other.kind()
                        )))
                    }
                };
                let expected = method.explicit_params();
                if args.len() != expected.len() {
                    return Err(BridgeError::Invocation(format!(
                        "'{}' takes {} arguments, got {}",
                        name,
                        expected.len(),
                        args.len()
                    )));
                }
                let mut call_args = Vec::with_capacity(method.params.len());
                if method.is_static {
                    call_args.push(Value::Object(owner.clone()));
                }
                for (arg, ty) in args.iter().zip(expected) {
                    call_args.push(ctx.coerce(arg, ty)?);
                }
                method.invoke(owner, call_args).map(|_| ())
            }
        }
    }

    pub fn can_get(&self, ctx: &BridgeContext<'_>) -> bool {
        match &self.kind {
            AccessorKind::Constant(_) => true,
            AccessorKind::IndexedSequence { seq, index } => checked_index(*index, seq.len()).is_ok(),
            AccessorKind::KeyedMap { map, key } => match map {
                Keyed::Wire(w) => w.entry(key).is_some(),
                Keyed::Map(m) => m.contains_key(key),
            },
            AccessorKind::ReflectedField { .. } | AccessorKind::ReflectedProperty { .. } => true,
            AccessorKind::ChildByNameOrIndex { owner, selector } => ctx.host.lookup_child(owner, selector).is_some(),
            AccessorKind::CapabilityLookup { owner, name } => ctx.host.lookup_capability(owner, name).is_some(),
            AccessorKind::NamedResource { path } => ctx.host.load_named_resource(path).is_some(),
            AccessorKind::RegistryObject { id } => ctx.objects.contains(id),
            AccessorKind::MethodCall { owner, name } => {
                let type_name = owner.type_name();
                ctx.types.find_method(type_name, name, |m| m.explicit_params().is_empty()).is_some()
                    || ctx.types.find_extension(type_name, name).is_some_and(|e| e.params.len() == 1)
            }
        }
    }

    pub fn can_set(&self) -> bool {
        match &self.kind {
            AccessorKind::Constant(_) => false,
            AccessorKind::IndexedSequence { seq, index } => checked_index(*index, seq.len()).is_ok(),
            AccessorKind::KeyedMap { .. } => true,
            AccessorKind::ReflectedField { .. } | AccessorKind::ReflectedProperty { .. } => true,
            AccessorKind::ChildByNameOrIndex { .. }
            | AccessorKind::CapabilityLookup { .. }
            | AccessorKind::NamedResource { .. }
            | AccessorKind::RegistryObject { .. } => false,
            AccessorKind::MethodCall { .. } => true,
        }
    }

    /// Native type `set` expects, `None` for read-only accessors.
    pub fn target_type(&self) -> Option<ValueType> {
        match &self.kind {
            AccessorKind::IndexedSequence { seq: Sequence::Wire(_), .. }
            | AccessorKind::KeyedMap { map: Keyed::Wire(_), .. }
            | AccessorKind::MethodCall { .. } => Some(ValueType::Wire),
            AccessorKind::IndexedSequence { .. } | AccessorKind::KeyedMap { .. } => Some(ValueType::Any),
            AccessorKind::ReflectedField { member, .. } | AccessorKind::ReflectedProperty { member, .. } => {
                Some(member.ty.clone())
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.kind_name());
        match &self.kind {
            AccessorKind::Constant(v) => s.field("value", v),
            AccessorKind::IndexedSequence { index, .. } => s.field("index", index),
            AccessorKind::KeyedMap { key, .. } => s.field("key", key),
            AccessorKind::ReflectedField { member, .. } | AccessorKind::ReflectedProperty { member, .. } => {
                s.field("member", &member.name)
            }
            AccessorKind::ChildByNameOrIndex { selector, .. } => s.field("selector", selector),
            AccessorKind::CapabilityLookup { name, .. } | AccessorKind::MethodCall { name, .. } => s.field("name", name),
            AccessorKind::NamedResource { path } => s.field("path", path),
            AccessorKind::RegistryObject { id } => s.field("id", id),
        };
        s.field("conditional", &self.conditional).field("indirect", &self.indirect).finish()
    }
}

/// Wire child as a value: containers stay live wire nodes, scalars unwrap.
fn wire_value(node: WireRef) -> Value {
    if node.is_array() || node.is_object() {
        Value::Wire(node)
    } else {
        to_any(&node.snapshot())
    }
}

/// Index 0 is valid for every sequence kind.
fn checked_index(index: i64, len: usize) -> BridgeResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| out_of_range(index, len))
}

fn out_of_range(index: i64, len: usize) -> BridgeError {
    BridgeError::Missing(format!("index {} out of range (length {})", index, len))
}

/// A native container must never end up inside itself.
fn refuse_cycle(value: &Value, container: &Value) -> BridgeResult<()> {
    if value.reaches(container) {
        return Err(BridgeError::TypeMismatch(format!(
            "cannot store a {} inside itself",
            container.kind()
        )));
    }
    Ok(())
}

/// Method `set` calls: any overload on the hierarchy, else an extension.
fn settable_method(ctx: &BridgeContext<'_>, owner: &ObjectRef, name: &str) -> BridgeResult<Rc<MethodDesc>> {
    let type_name = owner.type_name();
    ctx.types
        .find_method(type_name, name, |_| true)
        .or_else(|| ctx.types.find_extension(type_name, name))
        .ok_or_else(|| BridgeError::Missing(format!("method '{}' on {}", name, type_name)))
}
