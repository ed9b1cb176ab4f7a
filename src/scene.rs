//! Reference scene host
//!
//! A small in-memory node tree behind the `Host` trait. Used by the CLI
//! `replay` command and the integration tests, and a template for real
//! engine bindings.
//!
//! Types registered by `install`:
//!
//! | Type | Base | Members |
//! |------|------|---------|
//! | `Object` | | `type` |
//! | `Node` | `Object` | fields `name`, `visible`, `tags`, `props`, `data`; properties `childCount`, `active`, `position`; methods `setActive(bool)`, `childNames()`; extension `describe` |
//! | `Light` | `Node` | field `intensity` |

use crate::bridge::envelope::Envelope;
use crate::bridge::Bridge;
use crate::core::coerce::Coercion;
use crate::core::reflect::{TypeRegistry, ValueType};
use crate::core::value::{object_key, HostObject, ListRef, MapRef, ObjectRef, Value, WireRef};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{ChildSelector, CreateRequest, Host};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::debug;

pub const OBJECT: &str = "Object";
pub const NODE: &str = "Node";
pub const LIGHT: &str = "Light";
pub const VECTOR3: &str = "Vector3";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum NodeKind {
    #[default]
    Node,
    Light,
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Node => NODE,
            NodeKind::Light => LIGHT,
        }
    }
}

// =============================================================================
// Nodes
// =============================================================================

pub struct SceneNode {
    kind: NodeKind,
    name: RefCell<String>,
    visible: Cell<bool>,
    active: Cell<bool>,
    tags: RefCell<ListRef>,
    props: RefCell<MapRef>,
    data: RefCell<WireRef>,
    /// Local position, relative to the parent
    position: Cell<[f64; 3]>,
    parent: RefCell<Option<Weak<dyn HostObject>>>,
    children: RefCell<Vec<ObjectRef>>,
    components: RefCell<IndexMap<String, ObjectRef>>,
    destroyed: Cell<bool>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Node, name)
    }

    fn with_kind(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: RefCell::new(name.into()),
            visible: Cell::new(true),
            active: Cell::new(true),
            tags: RefCell::new(ListRef::default()),
            props: RefCell::new(MapRef::new()),
            data: RefCell::new(WireRef::new(JsonValue::Object(Default::default()))),
            position: Cell::new([0.0; 3]),
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            components: RefCell::new(IndexMap::new()),
            destroyed: Cell::new(false),
        }
    }

    /// Shared handle on a new plain node.
    pub fn create(name: impl Into<String>) -> ObjectRef {
        Rc::new(Self::new(name))
    }

    pub fn name(&self) -> String { self.name.borrow().clone() }
    pub fn visible(&self) -> bool { self.visible.get() }
    pub fn active(&self) -> bool { self.active.get() }
    pub fn position(&self) -> [f64; 3] { self.position.get() }
    pub fn set_position(&self, position: [f64; 3]) { self.position.set(position) }
    pub fn tags(&self) -> ListRef { self.tags.borrow().clone() }
    pub fn props(&self) -> MapRef { self.props.borrow().clone() }
    pub fn data(&self) -> WireRef { self.data.borrow().clone() }
    pub fn is_destroyed(&self) -> bool { self.destroyed.get() }

    pub fn children(&self) -> Vec<ObjectRef> {
        self.children.borrow().clone()
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn add_component(&self, name: impl Into<String>, component: ObjectRef) {
        self.components.borrow_mut().insert(name.into(), component);
    }

    /// Position in scene space.
    pub fn world_position(&self) -> [f64; 3] {
        let local = self.position.get();
        match self.parent().as_deref().and_then(as_node) {
            Some(parent) => add(parent.world_position(), local),
            None => local,
        }
    }

    fn child_names(&self) -> Vec<Value> {
        self.children
            .borrow()
            .iter()
            .filter_map(|c| as_node(&**c).map(|n| Value::String(n.name())))
            .collect()
    }

    fn detach_child(&self, child: &ObjectRef) {
        let key = object_key(child);
        self.children.borrow_mut().retain(|c| object_key(c) != key);
    }
}

impl HostObject for SceneNode {
    fn type_name(&self) -> &str { NODE }
    fn as_any(&self) -> &dyn Any { self }
    fn view(&self, type_name: &str) -> Option<&dyn Any> {
        matches!(type_name, NODE | OBJECT).then_some(self as &dyn Any)
    }
}

pub struct Light {
    node: SceneNode,
    intensity: Cell<f64>,
}

impl Light {
    pub fn new(name: impl Into<String>) -> Self {
        Self { node: SceneNode::with_kind(NodeKind::Light, name), intensity: Cell::new(1.0) }
    }

    pub fn node(&self) -> &SceneNode { &self.node }
    pub fn intensity(&self) -> f64 { self.intensity.get() }
}

impl HostObject for Light {
    fn type_name(&self) -> &str { LIGHT }
    fn as_any(&self) -> &dyn Any { self }
    fn view(&self, type_name: &str) -> Option<&dyn Any> {
        match type_name {
            LIGHT => Some(self as &dyn Any),
            NODE | OBJECT => Some(&self.node),
            _ => None,
        }
    }
}

/// The node part of any scene object.
pub fn as_node(obj: &dyn HostObject) -> Option<&SceneNode> {
    obj.view(NODE)?.downcast_ref::<SceneNode>()
}

fn value_node(value: &Value) -> Option<&SceneNode> {
    value.as_object().and_then(|o| as_node(&**o))
}

fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

// =============================================================================
// Vector3
// =============================================================================

pub fn vec3_value(v: [f64; 3]) -> Value {
    Value::array(v.iter().map(|c| Value::Float(*c)).collect())
}

fn vec3_from_value(value: &Value) -> BridgeResult<[f64; 3]> {
    let items = match value {
        Value::Array(a) => a.to_vec(),
        Value::List(l) => l.to_vec(),
        other => return Err(BridgeError::Conversion(format!("Vector3 expects 3 numbers, got {}", other.kind()))),
    };
    match items.as_slice() {
        [x, y, z] => match (x.as_f64(), y.as_f64(), z.as_f64()) {
            (Some(x), Some(y), Some(z)) => Ok([x, y, z]),
            _ => Err(BridgeError::Conversion("Vector3 components must be numbers".into())),
        },
        _ => Err(BridgeError::Conversion(format!("Vector3 expects 3 numbers, got {}", items.len()))),
    }
}

/// `[x, y, z]` or `{"x":..,"y":..,"z":..}` (missing keys are 0).
pub fn vec3_from_wire(wire: &JsonValue) -> BridgeResult<Value> {
    let bad = || BridgeError::Conversion(format!("cannot convert {} to Vector3", wire));
    let v = match wire {
        JsonValue::Array(items) if items.len() == 3 => {
            let mut out = [0.0; 3];
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = item.as_f64().ok_or_else(bad)?;
            }
            out
        }
        JsonValue::Object(map) => {
            let axis = |k: &str| match map.get(k) {
                None => Ok(0.0),
                Some(v) => v.as_f64().ok_or_else(bad),
            };
            [axis("x")?, axis("y")?, axis("z")?]
        }
        _ => return Err(bad()),
    };
    Ok(vec3_value(v))
}

// =============================================================================
// Registration
// =============================================================================

fn expect_string(value: Value) -> BridgeResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(BridgeError::Conversion(format!("expected a string, got {}", other.kind()))),
    }
}

fn expect_bool(value: &Value) -> BridgeResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| BridgeError::Conversion(format!("expected a bool, got {}", value.kind())))
}

pub fn register_types(types: &mut TypeRegistry) {
    types
        .define::<SceneNode>(OBJECT)
        .property("type", ValueType::String, |n| Value::from(n.kind.type_name()))
        .finish();

    types
        .define::<SceneNode>(NODE)
        .base(OBJECT)
        .field("name", ValueType::String, |n| Value::String(n.name()), |n, v| {
            *n.name.borrow_mut() = expect_string(v)?;
            Ok(())
        })
        .field("visible", ValueType::Bool, |n| Value::Bool(n.visible()), |n, v| {
            n.visible.set(expect_bool(&v)?);
            Ok(())
        })
        .field(
            "tags",
            ValueType::List(Box::new(ValueType::String)),
            |n| Value::List(n.tags()),
            |n, v| match v {
                Value::List(list) => {
                    *n.tags.borrow_mut() = list;
                    Ok(())
                }
                Value::Null => {
                    *n.tags.borrow_mut() = ListRef::default();
                    Ok(())
                }
                other => Err(BridgeError::Conversion(format!("tags must be a list, got {}", other.kind()))),
            },
        )
        .field(
            "props",
            ValueType::Map(Box::new(ValueType::Any)),
            |n| Value::Map(n.props()),
            |n, v| match v {
                Value::Map(map) => {
                    *n.props.borrow_mut() = map;
                    Ok(())
                }
                other => Err(BridgeError::Conversion(format!("props must be a map, got {}", other.kind()))),
            },
        )
        .field("data", ValueType::Wire, |n| Value::Wire(n.data()), |n, v| {
            *n.data.borrow_mut() = match v {
                Value::Wire(w) => w,
                Value::Null => WireRef::new(JsonValue::Null),
                other => return Err(BridgeError::Conversion(format!("data must be wire, got {}", other.kind()))),
            };
            Ok(())
        })
        .property("childCount", ValueType::Int, |n| Value::Int(n.children.borrow().len() as i64))
        .property("active", ValueType::Bool, |n| Value::Bool(n.active()))
        .property_rw("position", ValueType::named(VECTOR3), |n| vec3_value(n.position()), |n, v| {
            n.position.set(vec3_from_value(&v)?);
            Ok(())
        })
        .method("setActive", vec![ValueType::Bool], |n, args| {
            let active = args.first().map(expect_bool).transpose()?.unwrap_or(true);
            n.active.set(active);
            Ok(Value::Null)
        })
        .method("childNames", vec![], |n, _| Ok(Value::list(n.child_names())))
        .finish();

    types
        .define::<Light>(LIGHT)
        .base(NODE)
        .field("intensity", ValueType::Float, |l| Value::Float(l.intensity()), |l, v| {
            let intensity = v
                .as_f64()
                .ok_or_else(|| BridgeError::Conversion(format!("intensity must be a number, got {}", v.kind())))?;
            l.intensity.set(intensity);
            Ok(())
        })
        .finish();

    types.extension(NODE, "describe", vec![ValueType::Object], |args| {
        let node = args
            .first()
            .and_then(value_node)
            .ok_or_else(|| BridgeError::Invocation("describe expects a node".into()))?;
        Ok(Value::String(format!(
            "{} '{}' with {} children",
            node.kind.type_name(),
            node.name(),
            node.children.borrow().len()
        )))
    });
}

pub fn register_coercions(coercion: &mut Coercion) {
    coercion.register_native(VECTOR3, vec3_from_wire);
}

/// Register the scene types and conversions on a bridge.
pub fn install(bridge: &mut Bridge) {
    register_types(bridge.types_mut());
    register_coercions(bridge.coercion_mut());
}

// =============================================================================
// Host
// =============================================================================

/// What `Create` with `prefab` builds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Template {
    pub kind: NodeKind,
    /// Names of child nodes created along with the object
    pub children: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Default)]
pub struct SceneHost {
    templates: HashMap<String, Template>,
    resources: HashMap<String, Value>,
    scheduled: RefCell<Vec<(String, Duration)>>,
    animations: RefCell<Vec<(String, JsonValue)>>,
    destroyed: RefCell<Vec<String>>,
}

impl SceneHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, template: Template) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    pub fn with_resource(mut self, path: impl Into<String>, value: Value) -> Self {
        self.resources.insert(path.into(), value);
        self
    }

    /// Pending `DestroyAfter` requests: `(id, delay)`.
    pub fn take_scheduled(&self) -> Vec<(String, Duration)> {
        self.scheduled.borrow_mut().drain(..).collect()
    }

    /// Animation commands received: `(node name, commands)`.
    pub fn animations(&self) -> Vec<(String, JsonValue)> {
        self.animations.borrow().clone()
    }

    /// Names of nodes torn down, in order.
    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.borrow().clone()
    }

    fn build(kind: NodeKind, name: &str) -> ObjectRef {
        match kind {
            NodeKind::Node => Rc::new(SceneNode::new(name)),
            NodeKind::Light => Rc::new(Light::new(name)),
        }
    }

    fn attach(child: &ObjectRef, parent: &ObjectRef) -> BridgeResult<()> {
        let node = as_node(&**child).ok_or_else(|| BridgeError::TypeMismatch("only nodes can be parented".into()))?;
        let parent_node = as_node(&**parent).ok_or_else(|| BridgeError::TypeMismatch("parent must be a node".into()))?;
        let mut ancestor = Some(parent.clone());
        while let Some(current) = ancestor {
            if object_key(&current) == object_key(child) {
                return Err(BridgeError::Protocol(format!("'{}' cannot be its own ancestor", node.name())));
            }
            ancestor = as_node(&*current).and_then(SceneNode::parent);
        }
        Self::detach(child);
        parent_node.children.borrow_mut().push(child.clone());
        *node.parent.borrow_mut() = Some(Rc::downgrade(parent));
        Ok(())
    }

    fn detach(child: &ObjectRef) {
        let Some(node) = as_node(&**child) else { return };
        if let Some(old) = node.parent() {
            if let Some(old_node) = as_node(&*old) {
                old_node.detach_child(child);
            }
        }
        *node.parent.borrow_mut() = None;
    }
}

impl Host for SceneHost {
    fn lookup_child(&self, owner: &Value, selector: &ChildSelector) -> Option<Value> {
        let obj = owner.as_object()?;
        let node = as_node(&**obj)?;
        match selector {
            ChildSelector::This => Some(owner.clone()),
            ChildSelector::Parent => node.parent().map(Value::Object),
            ChildSelector::Index(i) => {
                let index = usize::try_from(*i).ok()?;
                node.children.borrow().get(index).cloned().map(Value::Object)
            }
            ChildSelector::Name(name) => node
                .children
                .borrow()
                .iter()
                .find(|c| as_node(&***c).is_some_and(|n| n.name.borrow().as_str() == name))
                .cloned()
                .map(Value::Object),
        }
    }

    fn lookup_capability(&self, owner: &Value, name: &str) -> Option<Value> {
        let node = value_node(owner)?;
        let component = node.components.borrow().get(name).cloned();
        component.map(Value::Object)
    }

    fn load_named_resource(&self, path: &str) -> Option<Value> {
        self.resources.get(path).cloned()
    }

    fn instantiate(&self, request: &CreateRequest<'_>) -> BridgeResult<ObjectRef> {
        let template = match request.prefab {
            Some(prefab) => self
                .templates
                .get(prefab)
                .cloned()
                .ok_or_else(|| BridgeError::Missing(format!("prefab '{}'", prefab)))?,
            None => Template::default(),
        };
        let kind = match request.component {
            None => template.kind,
            Some("Node") => NodeKind::Node,
            Some("Light") => NodeKind::Light,
            Some(other) => return Err(BridgeError::Protocol(format!("unknown component '{}'", other))),
        };

        let obj = Self::build(kind, request.id);
        if let Some(node) = as_node(&*obj) {
            for tag in &template.tags {
                node.tags.borrow().push(Value::String(tag.clone()));
            }
        }
        for child in &template.children {
            Self::attach(&Self::build(NodeKind::Node, child), &obj)?;
        }
        debug!(id = %request.id, kind = kind.type_name(), "instantiated node");
        Ok(obj)
    }

    fn set_parent(&self, child: &ObjectRef, parent: Option<&Value>, world_position_stays: bool) -> BridgeResult<()> {
        let node = as_node(&**child).ok_or_else(|| BridgeError::TypeMismatch("only nodes can be parented".into()))?;
        let world = node.world_position();
        match parent {
            None | Some(Value::Null) => Self::detach(child),
            Some(Value::Object(parent)) => Self::attach(child, parent)?,
            Some(other) => {
                return Err(BridgeError::TypeMismatch(format!("parent must be a node, got {}", other.kind())))
            }
        }
        if world_position_stays {
            let parent_world = node.parent().as_deref().and_then(as_node).map(SceneNode::world_position);
            node.position.set(sub(world, parent_world.unwrap_or([0.0; 3])));
        }
        Ok(())
    }

    fn destroy(&self, obj: &ObjectRef) {
        Self::detach(obj);
        if let Some(node) = as_node(&**obj) {
            node.destroyed.set(true);
            self.destroyed.borrow_mut().push(node.name());
        }
    }

    fn animate(&self, obj: &ObjectRef, commands: &JsonValue) -> BridgeResult<()> {
        if !commands.is_array() {
            return Err(BridgeError::Protocol("Animate expects an array of commands".into()));
        }
        let name = as_node(&**obj).map(SceneNode::name).unwrap_or_default();
        self.animations.borrow_mut().push((name, commands.clone()));
        Ok(())
    }

    fn destroy_after(&self, id: &str, delay: Duration) -> BridgeResult<()> {
        self.scheduled.borrow_mut().push((id.to_string(), delay));
        Ok(())
    }

    fn handle_event(&self, _obj: &ObjectRef, _event: &Envelope) -> BridgeResult<bool> {
        Ok(false)
    }
}
