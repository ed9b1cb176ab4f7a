//! Host values
//!
//! `Value` is what accessors read and write. Containers are shared handles
//! (`Rc<RefCell<..>>`): an accessor bound to a container mutates it in place,
//! the same way every other holder of the handle sees it. The core runs on a
//! single dispatch thread, so nothing here is `Send`.
//!
//! Wire-format containers (`WireRef`) are a JSON document plus a pointer into
//! it, so indexing into nested wire arrays/objects still writes through to
//! the enclosing document.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// A native object exposed to paths through the reflection table.
///
/// Implementors use interior mutability for anything a setter writes.
pub trait HostObject: Any {
    /// Registered type name, the entry point for member lookup.
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// This object viewed as `type_name`, itself or one of its base types.
    /// Types that embed a base override this to hand out the embedded part.
    fn view(&self, type_name: &str) -> Option<&dyn Any> {
        (type_name == self.type_name()).then(|| self.as_any())
    }
}

pub type ObjectRef = Rc<dyn HostObject>;

/// Identity of a host object (address of its allocation).
pub fn object_key(obj: &ObjectRef) -> usize {
    Rc::as_ptr(obj) as *const () as usize
}

// =============================================================================
// Wire containers
// =============================================================================

/// Shared handle on a node inside a JSON document.
#[derive(Clone)]
pub struct WireRef {
    root: Rc<RefCell<JsonValue>>,
    pointer: String,
}

impl WireRef {
    pub fn new(value: JsonValue) -> Self {
        Self { root: Rc::new(RefCell::new(value)), pointer: String::new() }
    }

    /// JSON pointer of this node inside its document ("" for the root).
    pub fn pointer(&self) -> &str { &self.pointer }

    /// Copy of the node, `null` if the node no longer exists.
    pub fn snapshot(&self) -> JsonValue {
        self.read(|v| v.cloned().unwrap_or(JsonValue::Null))
    }

    pub fn is_null(&self) -> bool { self.read(|v| v.map_or(true, JsonValue::is_null)) }
    pub fn is_array(&self) -> bool { self.read(|v| matches!(v, Some(JsonValue::Array(_)))) }
    pub fn is_object(&self) -> bool { self.read(|v| matches!(v, Some(JsonValue::Object(_)))) }

    /// Element count of an array or entry count of an object.
    pub fn len(&self) -> Option<usize> {
        self.read(|v| match v {
            Some(JsonValue::Array(a)) => Some(a.len()),
            Some(JsonValue::Object(o)) => Some(o.len()),
            _ => None,
        })
    }

    pub fn element(&self, index: usize) -> Option<WireRef> {
        let present = self.read(|v| matches!(v, Some(JsonValue::Array(a)) if index < a.len()));
        present.then(|| self.child(&index.to_string()))
    }

    /// Overwrite an existing element. Out of range is refused, never grown.
    pub fn set_element(&self, index: usize, value: JsonValue) -> bool {
        self.write(|v| match v {
            Some(JsonValue::Array(a)) if index < a.len() => {
                a[index] = value;
                true
            }
            _ => false,
        })
    }

    pub fn entry(&self, key: &str) -> Option<WireRef> {
        let present = self.read(|v| matches!(v, Some(JsonValue::Object(o)) if o.contains_key(key)));
        present.then(|| self.child(key))
    }

    /// Insert or overwrite a key.
    pub fn insert(&self, key: &str, value: JsonValue) -> bool {
        self.write(|v| match v {
            Some(JsonValue::Object(o)) => {
                o.insert(key.to_string(), value);
                true
            }
            _ => false,
        })
    }

    pub fn same_node(&self, other: &WireRef) -> bool {
        Rc::ptr_eq(&self.root, &other.root) && self.pointer == other.pointer
    }

    fn child(&self, segment: &str) -> WireRef {
        let escaped = segment.replace('~', "~0").replace('/', "~1");
        WireRef { root: self.root.clone(), pointer: format!("{}/{}", self.pointer, escaped) }
    }

    fn read<R>(&self, f: impl FnOnce(Option<&JsonValue>) -> R) -> R {
        let root = self.root.borrow();
        f(root.pointer(&self.pointer))
    }

    fn write<R>(&self, f: impl FnOnce(Option<&mut JsonValue>) -> R) -> R {
        let mut root = self.root.borrow_mut();
        f(root.pointer_mut(&self.pointer))
    }
}

// =============================================================================
// Native containers
// =============================================================================

/// Fixed-length array. Elements can be replaced, the length never changes.
#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<Box<[Value]>>>);

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self { Self(Rc::new(RefCell::new(items.into_boxed_slice()))) }
    pub fn len(&self) -> usize { self.0.borrow().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn get(&self, index: usize) -> Option<Value> { self.0.borrow().get(index).cloned() }
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.borrow_mut().get_mut(index) {
            Some(slot) => { *slot = value; true }
            None => false,
        }
    }
    pub fn to_vec(&self) -> Vec<Value> { self.0.borrow().to_vec() }
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}

/// Resizable list.
#[derive(Clone, Default)]
pub struct ListRef(Rc<RefCell<Vec<Value>>>);

impl ListRef {
    pub fn new(items: Vec<Value>) -> Self { Self(Rc::new(RefCell::new(items))) }
    pub fn len(&self) -> usize { self.0.borrow().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn get(&self, index: usize) -> Option<Value> { self.0.borrow().get(index).cloned() }
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.borrow_mut().get_mut(index) {
            Some(slot) => { *slot = value; true }
            None => false,
        }
    }
    pub fn push(&self, value: Value) { self.0.borrow_mut().push(value) }
    pub fn clear(&self) { self.0.borrow_mut().clear() }
    pub fn to_vec(&self) -> Vec<Value> { self.0.borrow().clone() }
    pub fn ptr_eq(&self, other: &ListRef) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}

/// String-keyed map, insertion ordered.
#[derive(Clone, Default)]
pub struct MapRef(Rc<RefCell<IndexMap<String, Value>>>);

impl MapRef {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.0.borrow().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn contains_key(&self, key: &str) -> bool { self.0.borrow().contains_key(key) }
    pub fn get(&self, key: &str) -> Option<Value> { self.0.borrow().get(key).cloned() }
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.borrow_mut().insert(key.into(), value)
    }
    pub fn remove(&self, key: &str) -> Option<Value> { self.0.borrow_mut().shift_remove(key) }
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
    pub fn ptr_eq(&self, other: &MapRef) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}

impl FromIterator<(String, Value)> for MapRef {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(Rc::new(RefCell::new(iter.into_iter().collect())))
    }
}

// =============================================================================
// Value
// =============================================================================

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Wire-format (JSON) node
    Wire(WireRef),
    /// Raw fixed-length array
    Array(ArrayRef),
    /// Resizable list
    List(ListRef),
    /// String-keyed map
    Map(MapRef),
    /// Reflected host object
    Object(ObjectRef),
}

impl Value {
    pub fn wire(value: JsonValue) -> Self { Value::Wire(WireRef::new(value)) }
    pub fn array(items: Vec<Value>) -> Self { Value::Array(ArrayRef::new(items)) }
    pub fn list(items: Vec<Value>) -> Self { Value::List(ListRef::new(items)) }
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
    pub fn object(obj: ObjectRef) -> Self { Value::Object(obj) }

    /// Null, or a wire node that is null or gone.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Wire(w) => w.is_null(),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Wire(_) => "wire",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Wire(w) => w.snapshot().as_bool(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Wire(w) => w.snapshot().as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Wire(w) => w.snapshot().as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Identity of a native container, `None` for everything else.
    fn container_id(&self) -> Option<*const ()> {
        match self {
            Value::Array(a) => Some(Rc::as_ptr(&a.0) as *const ()),
            Value::List(l) => Some(Rc::as_ptr(&l.0) as *const ()),
            Value::Map(m) => Some(Rc::as_ptr(&m.0) as *const ()),
            _ => None,
        }
    }

    /// Whether `container` is this value or nested anywhere inside it.
    /// Storing such a value into `container` would make it hold itself.
    pub fn reaches(&self, container: &Value) -> bool {
        let Some(target) = container.container_id() else { return false };
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(value) = stack.pop() {
            let Some(id) = value.container_id() else { continue };
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            match &value {
                Value::Array(a) => stack.extend(a.to_vec()),
                Value::List(l) => stack.extend(l.to_vec()),
                Value::Map(m) => stack.extend(m.entries().into_iter().map(|(_, v)| v)),
                _ => {}
            }
        }
        false
    }
}

thread_local! {
    static DEBUG_DEPTH: Cell<usize> = const { Cell::new(0) };
}

const MAX_DEBUG_DEPTH: usize = 32;

/// Formats nested containers, eliding anything below `MAX_DEBUG_DEPTH`.
fn debug_nested(f: &mut fmt::Formatter<'_>, body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result) -> fmt::Result {
    let depth = DEBUG_DEPTH.with(Cell::get);
    if depth >= MAX_DEBUG_DEPTH {
        return write!(f, "..");
    }
    DEBUG_DEPTH.with(|d| d.set(depth + 1));
    let result = body(f);
    DEBUG_DEPTH.with(|d| d.set(depth));
    result
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Wire(w) => write!(f, "Wire({})", w.snapshot()),
            Value::Array(a) => debug_nested(f, |f| f.debug_tuple("Array").field(&a.to_vec()).finish()),
            Value::List(l) => debug_nested(f, |f| f.debug_tuple("List").field(&l.to_vec()).finish()),
            Value::Map(m) => debug_nested(f, |f| f.debug_map().entries(m.entries()).finish()),
            Value::Object(o) => write!(f, "Object({}@{:x})", o.type_name(), object_key(o)),
        }
    }
}

/// Scalars and wire nodes compare by content, native containers and
/// objects by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Wire(a), Value::Wire(b)) => a.same_node(b) || a.snapshot() == b.snapshot(),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => object_key(a) == object_key(b),
            _ => false,
        }
    }
}

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_string()) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<ObjectRef> for Value { fn from(v: ObjectRef) -> Self { Value::Object(v) } }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reaches_finds_nested_containers() {
        let inner = MapRef::new();
        let outer = Value::list(vec![Value::Int(1), Value::Map(inner.clone())]);
        let inner = Value::Map(inner);
        assert!(outer.reaches(&inner));
        assert!(inner.reaches(&inner));
        assert!(!inner.reaches(&outer));
        assert!(!Value::Int(1).reaches(&inner));
    }

    #[test]
    fn debug_of_a_cycle_terminates() {
        let list = ListRef::new(vec![]);
        list.push(Value::List(list.clone()));
        let text = format!("{:?}", Value::List(list.clone()));
        assert!(text.contains(".."));
        list.clear();
    }

    #[test]
    fn wire_children_write_through() {
        let doc = WireRef::new(json!({"foo": [10, 20, {"bar": 1}]}));
        let foo = doc.entry("foo").unwrap();
        let inner = foo.element(2).unwrap();
        assert!(inner.insert("baz", json!(true)));
        assert!(foo.set_element(0, json!(11)));
        assert_eq!(doc.snapshot(), json!({"foo": [11, 20, {"bar": 1, "baz": true}]}));
    }

    #[test]
    fn wire_keys_are_pointer_escaped() {
        let doc = WireRef::new(json!({"a/b": 1, "c~d": 2}));
        assert_eq!(doc.entry("a/b").unwrap().snapshot(), json!(1));
        assert_eq!(doc.entry("c~d").unwrap().snapshot(), json!(2));
    }

    #[test]
    fn wire_out_of_range_is_refused() {
        let doc = WireRef::new(json!([1, 2]));
        assert!(doc.element(2).is_none());
        assert!(!doc.set_element(2, json!(3)));
        assert_eq!(doc.len(), Some(2));
    }

    #[test]
    fn array_length_is_fixed() {
        let array = ArrayRef::new(vec![Value::Int(1)]);
        assert!(array.set(0, Value::Int(2)));
        assert!(!array.set(1, Value::Int(3)));
        assert_eq!(array.to_vec(), vec![Value::Int(2)]);
    }

    #[test]
    fn containers_compare_by_identity() {
        let list = ListRef::new(vec![]);
        assert_eq!(Value::List(list.clone()), Value::List(list));
        assert_ne!(Value::list(vec![]), Value::list(vec![]));
    }

    #[test]
    fn wire_null_is_null() {
        assert!(Value::wire(json!(null)).is_null());
        assert!(!Value::wire(json!(0)).is_null());
    }
}
