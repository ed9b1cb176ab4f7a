//! Path resolution
//!
//! A path is walked left to right starting from `Constant(root)`. Each step
//! reads the current accessor and binds the next one to the value read.
//! Only the last accessor survives.
//!
//! A conditional step (`?`) makes the rest of the chain optional: a missing
//! or null value ends resolution with a null constant instead of an error.
//! Syntax errors and type mismatches are never swallowed.

use crate::accessor::accessor::{Accessor, AccessorKind, Keyed, Sequence};
use crate::accessor::context::BridgeContext;
use crate::accessor::step::{split_path, PathStep};
use crate::core::coerce::to_any;
use crate::core::paths::prefix;
use crate::core::reflect::{MemberKind, MemberSearch};
use crate::core::value::Value;
use crate::error::{BridgeError, BridgeResult};
use crate::host::ChildSelector;
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error};

pub fn resolve(ctx: &BridgeContext<'_>, root: &Value, path: &str) -> BridgeResult<Accessor> {
    let mut current = Accessor::constant(root.clone());

    for raw in split_path(path) {
        let step = PathStep::parse(raw).map_err(|e| e.at_path(path))?;

        let next = match current.get(ctx) {
            Ok(value) => value,
            Err(e) if current.conditional && e.is_missing() => {
                debug!(path = %path, step = %raw, error = %e, "conditional path short-circuited");
                return Ok(Accessor::short_circuited());
            }
            Err(e) => return Err(e.at_path(path)),
        };

        if next.is_null() {
            if current.conditional {
                debug!(path = %path, step = %raw, "conditional path reached null");
                return Ok(Accessor::short_circuited());
            }
            return Err(BridgeError::Missing(format!("null value before step '{}'", raw)).at_path(path));
        }

        let conditional = step.conditional || current.conditional;
        current = match bind_step(ctx, &step, next, conditional) {
            Ok(accessor) => accessor,
            Err(e) if conditional && e.is_missing() => {
                debug!(path = %path, step = %raw, error = %e, "conditional step missed");
                return Ok(Accessor::short_circuited());
            }
            Err(e) => return Err(e.at_path(path)),
        };
    }

    Ok(current)
}

/// Build the accessor for `step` bound to `owner`.
fn bind_step(ctx: &BridgeContext<'_>, step: &PathStep, owner: Value, conditional: bool) -> BridgeResult<Accessor> {
    let body = step.body.as_str();
    let p = step.prefix.as_str();
    let make = |kind: AccessorKind| -> BridgeResult<Accessor> { Ok(Accessor::new(kind, conditional, step.indirect)) };

    if prefix::CONSTANTS.contains(&p) {
        return make(AccessorKind::Constant(parse_constant(p, body)?));
    }

    if prefix::INDEXED.contains(&p) {
        let index: i64 = body
            .trim()
            .parse()
            .map_err(|_| BridgeError::PathSyntax(format!("{} step expects an integer index, got '{}'", p, body)))?;
        let seq = match (p, &owner) {
            ("index" | "jarray", Value::Wire(w)) if w.is_array() => Sequence::Wire(w.clone()),
            ("index" | "array", Value::Array(a)) => Sequence::Array(a.clone()),
            ("index" | "list", Value::List(l)) => Sequence::List(l.clone()),
            _ => return Err(kind_mismatch(p, &owner)),
        };
        return make(AccessorKind::IndexedSequence { seq, index });
    }

    if prefix::KEYED.contains(&p) {
        let map = match (p, &owner) {
            ("map" | "jobject", Value::Wire(w)) if w.is_object() => Keyed::Wire(w.clone()),
            ("map" | "dict" | "dictionary", Value::Map(m)) => Keyed::Map(m.clone()),
            _ => return Err(kind_mismatch(p, &owner)),
        };
        return make(AccessorKind::KeyedMap { map, key: body.to_string() });
    }

    if prefix::MEMBERS.contains(&p) {
        let search = match p {
            "field" => MemberSearch::Only(MemberKind::Field),
            "property" => MemberSearch::Only(MemberKind::Property),
            _ => MemberSearch::Any,
        };
        return match &owner {
            Value::Object(obj) => match ctx.types.find_member(obj.type_name(), body, search) {
                Some(member) if member.kind == MemberKind::Field => {
                    make(AccessorKind::ReflectedField { owner: obj.clone(), member })
                }
                Some(member) => make(AccessorKind::ReflectedProperty { owner: obj.clone(), member }),
                None => Err(BridgeError::Missing(format!("member '{}' on {}", body, obj.type_name()))),
            },
            // Plain member names also reach into wire objects and maps
            Value::Wire(w) if search == MemberSearch::Any && w.is_object() => {
                make(AccessorKind::KeyedMap { map: Keyed::Wire(w.clone()), key: body.to_string() })
            }
            Value::Map(m) if search == MemberSearch::Any => {
                make(AccessorKind::KeyedMap { map: Keyed::Map(m.clone()), key: body.to_string() })
            }
            _ => Err(kind_mismatch(p, &owner)),
        };
    }

    match p {
        prefix::TRANSFORM => make(AccessorKind::ChildByNameOrIndex { owner, selector: ChildSelector::parse(body) }),
        prefix::COMPONENT => make(AccessorKind::CapabilityLookup { owner, name: body.to_string() }),
        prefix::RESOURCE => make(AccessorKind::NamedResource { path: body.to_string() }),
        prefix::OBJECT => make(AccessorKind::RegistryObject { id: body.to_string() }),
        prefix::METHOD => match owner {
            Value::Object(obj) => make(AccessorKind::MethodCall { owner: obj, name: body.to_string() }),
            other => Err(kind_mismatch(p, &other)),
        },
        _ => Err(BridgeError::PathSyntax(format!("unknown prefix '{}'", p))),
    }
}

fn parse_constant(p: &str, body: &str) -> BridgeResult<Value> {
    let bad = |what: &str| BridgeError::PathSyntax(format!("{} constant expects {}, got '{}'", p, what, body));
    match p {
        "string" => Ok(Value::String(body.to_string())),
        "float" => body.trim().parse::<f64>().map(Value::Float).map_err(|_| bad("a number")),
        "int" | "integer" => body.trim().parse::<i64>().map(Value::Int).map_err(|_| bad("an integer")),
        "bool" | "boolean" => Ok(Value::Bool(body.eq_ignore_ascii_case("true"))),
        "null" => Ok(Value::Null),
        _ => serde_json::from_str::<JsonValue>(body).map(|json| to_any(&json)).map_err(|_| bad("JSON")),
    }
}

fn kind_mismatch(p: &str, owner: &Value) -> BridgeError {
    BridgeError::TypeMismatch(format!("'{}' step cannot apply to a {} value", p, owner.kind()))
}

// =============================================================================
// Path-level helpers
// =============================================================================

/// Resolve and read. `None` when a conditional path found nothing.
pub fn read_path(ctx: &BridgeContext<'_>, root: &Value, path: &str) -> BridgeResult<Option<Value>> {
    let accessor = resolve(ctx, root, path)?;
    if accessor.is_short_circuit() {
        return Ok(None);
    }
    match accessor.get(ctx) {
        Ok(value) => Ok(Some(value)),
        Err(e) if accessor.conditional && e.is_missing() => {
            debug!(path = %path, error = %e, "conditional read missed");
            Ok(None)
        }
        Err(e) => Err(e.at_path(path)),
    }
}

pub fn get_path(ctx: &BridgeContext<'_>, root: &Value, path: &str) -> BridgeResult<Value> {
    Ok(read_path(ctx, root, path)?.unwrap_or(Value::Null))
}

/// Resolve and assign an already-native value.
pub fn set_path(ctx: &BridgeContext<'_>, root: &Value, path: &str, value: Value) -> BridgeResult<()> {
    let accessor = resolve(ctx, root, path)?;
    accessor.set(ctx, value).map_err(|e| e.at_path(path))
}

/// Resolve and assign a wire value.
///
/// An indirect target (`!`) treats `wire` as a path, read against the same
/// root; otherwise `wire` is coerced to the target's type. On a conditional
/// target a failed conversion or assignment is skipped and reported as
/// `Ok(false)`.
pub fn set_property(ctx: &BridgeContext<'_>, root: &Value, path: &str, wire: &JsonValue) -> BridgeResult<bool> {
    let accessor = resolve(ctx, root, path)?;
    if accessor.is_short_circuit() {
        return Ok(false);
    }

    let Some(ty) = accessor.target_type() else {
        if accessor.conditional {
            return Ok(false);
        }
        return Err(BridgeError::ReadOnly(format!("{} cannot be assigned", accessor.kind_name())).at_path(path));
    };

    let value = if accessor.indirect {
        match wire {
            JsonValue::Null => Value::Null,
            JsonValue::String(source) if source.is_empty() => Value::Null,
            JsonValue::String(source) => get_path(ctx, root, source)?,
            other => {
                return Err(BridgeError::TypeMismatch(format!(
                    "indirect value must be a path string, got {}",
                    other
                ))
                .at_path(path))
            }
        }
    } else {
        match ctx.coerce(wire, &ty) {
            Ok(value) => value,
            Err(e) if accessor.conditional => {
                debug!(path = %path, error = %e, "conditional conversion skipped");
                return Ok(false);
            }
            Err(e) => return Err(e.at_path(path)),
        }
    };

    match accessor.set(ctx, value) {
        Ok(()) => Ok(true),
        Err(e) if accessor.conditional => {
            debug!(path = %path, error = %e, "conditional assignment skipped");
            Ok(false)
        }
        Err(e) => Err(e.at_path(path)),
    }
}

/// Read every `key -> path` of `query` against `root` and encode the results.
/// Keys whose path fails, or finds nothing on a conditional path, are left
/// out; failures are logged.
pub fn query(ctx: &BridgeContext<'_>, root: &Value, query: &IndexMap<String, String>) -> Map<String, JsonValue> {
    let mut out = Map::new();
    add_query_data(ctx, root, query, &mut out);
    out
}

pub fn add_query_data(
    ctx: &BridgeContext<'_>,
    root: &Value,
    query: &IndexMap<String, String>,
    data: &mut Map<String, JsonValue>,
) {
    for (key, path) in query {
        let encoded = read_path(ctx, root, path).and_then(|value| value.map(|v| ctx.encode(&v)).transpose());
        match encoded {
            Ok(Some(json)) => {
                data.insert(key.clone(), json);
            }
            Ok(None) => debug!(key = %key, path = %path, "query key omitted"),
            Err(e) => error!(key = %key, path = %path, error = %e, "query failed"),
        }
    }
}
