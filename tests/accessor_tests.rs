//! Accessor Tests: path resolution over wire documents and scene objects
//!
//! These tests verify:
//! 1. Wire navigation, constants and percent-decoding
//! 2. Conditional (`?`) and indirect (`!`) steps
//! 3. Reflected fields, properties, methods and extensions
//! 4. Host lookups: children, components, resources, registry objects
//! 5. Query encoding and failure policy

use hostbridge::scene::{self, as_node, Light, SceneHost, SceneNode};
use hostbridge::{
    get_path, query, read_path, set_path, set_property, Bridge, BridgeConfig, BridgeError, InterestTable,
    ObjectRef, QueueTransport, Value,
};
use indexmap::IndexMap;
use serde_json::json;
use std::rc::Rc;

fn scene_bridge(host: SceneHost) -> Bridge {
    let mut bridge = Bridge::new(BridgeConfig::default(), host, QueueTransport::default());
    scene::install(&mut bridge);
    bridge
}

fn with_node(name: &str) -> (Bridge, ObjectRef) {
    let mut bridge = scene_bridge(SceneHost::new());
    let node = SceneNode::create(name);
    bridge.register_object("cube", node.clone(), InterestTable::new()).expect("register");
    (bridge, node)
}

fn doc() -> Value {
    Value::wire(json!({"items": [{"name": "a"}, {"name": "b"}], "count": 2}))
}

// =============================================================================
// Wire documents
// =============================================================================

#[test]
fn wire_paths_read_nested_values() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = doc();

    assert_eq!(get_path(&ctx, &root, "items/index:0/name").unwrap(), Value::from("a"));
    assert_eq!(get_path(&ctx, &root, "items/jarray:1/jobject:name").unwrap(), Value::from("b"));
    assert_eq!(get_path(&ctx, &root, "count").unwrap(), Value::Int(2));

    let items = get_path(&ctx, &root, "items").unwrap();
    assert_eq!(ctx.encode(&items).unwrap(), json!([{"name": "a"}, {"name": "b"}]));
}

#[test]
fn missing_values_fail_unless_conditional() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = doc();

    let err = get_path(&ctx, &root, "items/index:5/name").unwrap_err();
    assert!(err.is_missing());
    assert!(err.to_string().contains("items/index:5/name"));

    assert_eq!(get_path(&ctx, &root, "items/index:5?/name").unwrap(), Value::Null);
    assert_eq!(read_path(&ctx, &root, "nothing?/deeper/still").unwrap(), None);
    assert!(get_path(&ctx, &root, "nothing/deeper").unwrap_err().is_missing());
}

#[test]
fn member_then_index_reads_through_wire_arrays() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();

    let long = Value::wire(json!({"foo": [10, 20, 30]}));
    assert_eq!(get_path(&ctx, &long, "member:foo/index:2").unwrap(), Value::Int(30));
    assert_eq!(get_path(&ctx, &long, "member:foo?/index:2").unwrap(), Value::Int(30));
    assert_eq!(get_path(&ctx, &long, "member:foo/index:1?").unwrap(), Value::Int(20));

    let short = Value::wire(json!({"foo": [10, 20]}));
    assert!(get_path(&ctx, &short, "member:foo/index:2").unwrap_err().is_missing());
    assert_eq!(get_path(&ctx, &short, "member:foo?/index:2").unwrap(), Value::Null);
    assert_eq!(read_path(&ctx, &short, "member:foo?/index:2").unwrap(), None);
}

#[test]
fn conditional_carries_to_later_steps() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = Value::wire(json!({"foo": {"bar": {}}}));

    // Only the first step is marked, the misses happen further along
    assert_eq!(read_path(&ctx, &root, "foo?/baz/qux").unwrap(), None);
    assert_eq!(read_path(&ctx, &root, "foo?/bar/qux").unwrap(), None);
    assert!(get_path(&ctx, &root, "foo/bar/qux").unwrap_err().is_missing());
    assert!(!set_property(&ctx, &root, "foo?/baz/qux", &json!(1)).unwrap());
}

#[test]
fn member_steps_on_scalars_are_type_errors() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = doc();

    let err = get_path(&ctx, &root, "count/size").unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));
    let err = get_path(&ctx, &root, "count?/size").unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));
    let err = get_path(&ctx, &root, "items?/name").unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));
}

#[test]
fn conditional_never_hides_syntax_or_type_errors() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = doc();

    let err = get_path(&ctx, &root, "items?/index:abc").unwrap_err();
    assert!(matches!(err, BridgeError::PathSyntax(_)));

    let err = get_path(&ctx, &root, "items?/dict:name").unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));

    let err = get_path(&ctx, &root, "bogus:x").unwrap_err();
    assert!(matches!(err, BridgeError::PathSyntax(_)));
}

#[test]
fn constants_and_percent_decoding() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = doc();

    assert_eq!(get_path(&ctx, &root, "int:42").unwrap(), Value::Int(42));
    assert_eq!(get_path(&ctx, &root, "float:1.5").unwrap(), Value::Float(1.5));
    assert_eq!(get_path(&ctx, &root, "bool:TRUE").unwrap(), Value::Bool(true));
    assert_eq!(get_path(&ctx, &root, "bool:yes").unwrap(), Value::Bool(false));
    assert_eq!(get_path(&ctx, &root, "string:a%2Fb").unwrap(), Value::from("a/b"));
    assert_eq!(ctx.encode(&get_path(&ctx, &root, "json:[1,2]").unwrap()).unwrap(), json!([1, 2]));
    assert!(matches!(get_path(&ctx, &root, "int:x").unwrap_err(), BridgeError::PathSyntax(_)));
}

#[test]
fn wire_assignments_write_through() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = doc();

    assert!(set_property(&ctx, &root, "items/index:0/name", &json!("z")).unwrap());
    assert!(set_property(&ctx, &root, "added", &json!({"k": [1]})).unwrap());
    set_path(&ctx, &root, "count", Value::Int(7)).unwrap();

    let Value::Wire(w) = &root else { panic!("root is wire") };
    assert_eq!(
        w.snapshot(),
        json!({"items": [{"name": "z"}, {"name": "b"}], "count": 7, "added": {"k": [1]}})
    );

    // Sequences never grow
    assert!(set_property(&ctx, &root, "items/index:2", &json!(1)).unwrap_err().is_missing());
    assert!(!set_property(&ctx, &root, "items/index:2?", &json!(1)).unwrap());
}

#[test]
fn indirect_values_are_paths() {
    let bridge = scene_bridge(SceneHost::new());
    let ctx = bridge.context();
    let root = doc();

    assert!(set_property(&ctx, &root, "copy!", &json!("items/index:1/name")).unwrap());
    assert_eq!(get_path(&ctx, &root, "copy").unwrap(), Value::from("b"));

    assert!(set_property(&ctx, &root, "copy!", &json!("")).unwrap());
    assert_eq!(get_path(&ctx, &root, "copy").unwrap(), Value::Null);

    let err = set_property(&ctx, &root, "copy!", &json!(3)).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));
}

// =============================================================================
// Reflected objects
// =============================================================================

#[test]
fn fields_and_properties_follow_the_hierarchy() {
    let (bridge, node) = with_node("Cube");
    let ctx = bridge.context();
    let root = Value::Object(node);

    assert_eq!(get_path(&ctx, &root, "name").unwrap(), Value::from("Cube"));
    assert_eq!(get_path(&ctx, &root, "type").unwrap(), Value::from("Node"));
    assert_eq!(get_path(&ctx, &root, "property:childCount").unwrap(), Value::Int(0));
    assert!(get_path(&ctx, &root, "field:childCount").unwrap_err().is_missing());
    assert!(get_path(&ctx, &root, "nope").unwrap_err().is_missing());

    assert!(set_property(&ctx, &root, "name", &json!("Box")).unwrap());
    assert_eq!(get_path(&ctx, &root, "name").unwrap(), Value::from("Box"));

    assert!(set_property(&ctx, &root, "childCount", &json!(3)).is_err());
    assert!(!set_property(&ctx, &root, "childCount?", &json!(3)).unwrap());
}

#[test]
fn coercion_follows_member_types() {
    let (bridge, node) = with_node("Cube");
    let ctx = bridge.context();
    let root = Value::Object(node.clone());

    assert!(set_property(&ctx, &root, "position", &json!({"x": 1, "y": 2, "z": 3})).unwrap());
    assert_eq!(as_node(&*node).unwrap().position(), [1.0, 2.0, 3.0]);
    let encoded = ctx.encode(&get_path(&ctx, &root, "position").unwrap()).unwrap();
    assert_eq!(encoded, json!([1.0, 2.0, 3.0]));

    assert!(set_property(&ctx, &root, "tags", &json!(["a", 1])).unwrap());
    assert_eq!(get_path(&ctx, &root, "tags/index:1").unwrap(), Value::from("1"));
    assert_eq!(get_path(&ctx, &root, "tags/list:0").unwrap(), Value::from("a"));

    assert!(set_property(&ctx, &root, "props", &json!({"hp": 10})).unwrap());
    assert_eq!(get_path(&ctx, &root, "props/hp").unwrap(), Value::Int(10));
    assert_eq!(get_path(&ctx, &root, "props/dict:hp").unwrap(), Value::Int(10));
    assert!(set_property(&ctx, &root, "props/mp", &json!(5)).unwrap());
    assert_eq!(as_node(&*node).unwrap().props().get("mp"), Some(Value::Int(5)));

    let err = set_property(&ctx, &root, "visible", &json!("yes")).unwrap_err();
    assert!(matches!(err, BridgeError::Conversion(_)));
    assert!(!set_property(&ctx, &root, "visible?", &json!("yes")).unwrap());
}

#[test]
fn methods_and_extensions() {
    let (bridge, node) = with_node("Cube");
    let ctx = bridge.context();
    let root = Value::Object(node.clone());

    assert!(set_property(&ctx, &root, "method:setActive", &json!([false])).unwrap());
    assert_eq!(get_path(&ctx, &root, "active").unwrap(), Value::Bool(false));

    let err = set_property(&ctx, &root, "method:setActive", &json!([true, 1])).unwrap_err();
    assert!(matches!(err, BridgeError::Invocation(_)));

    let names = get_path(&ctx, &root, "method:childNames").unwrap();
    assert_eq!(ctx.encode(&names).unwrap(), json!([]));

    assert_eq!(
        get_path(&ctx, &root, "method:describe").unwrap(),
        Value::from("Node 'Cube' with 0 children")
    );
    assert!(get_path(&ctx, &root, "method:setActive").unwrap_err().is_missing());
}

// =============================================================================
// Host lookups
// =============================================================================

#[test]
fn transform_component_resource_and_object_steps() {
    let host = SceneHost::new().with_resource("palette", Value::wire(json!({"red": "#f00"})));
    let mut bridge = scene_bridge(host);
    let parent = SceneNode::create("Parent");
    let child = SceneNode::create("Child");
    bridge.register_object("parent", parent.clone(), InterestTable::new()).unwrap();
    bridge
        .host()
        .set_parent(&child, Some(&Value::Object(parent.clone())), false)
        .unwrap();
    as_node(&*parent).unwrap().add_component("Light", Rc::new(Light::new("lamp")));

    let ctx = bridge.context();
    let root = Value::Object(parent.clone());
    let child_root = Value::Object(child.clone());

    assert_eq!(get_path(&ctx, &root, "transform:Child/name").unwrap(), Value::from("Child"));
    assert_eq!(get_path(&ctx, &root, "transform:0/name").unwrap(), Value::from("Child"));
    assert_eq!(get_path(&ctx, &child_root, "transform:../name").unwrap(), Value::from("Parent"));
    assert_eq!(get_path(&ctx, &root, "transform:./childCount").unwrap(), Value::Int(1));
    assert_eq!(get_path(&ctx, &root, "transform:Ghost?/name").unwrap(), Value::Null);

    assert_eq!(get_path(&ctx, &root, "component:Light/intensity").unwrap(), Value::Float(1.0));
    assert_eq!(get_path(&ctx, &root, "component:Light/type").unwrap(), Value::from("Light"));
    assert_eq!(get_path(&ctx, &root, "component:Camera?/name").unwrap(), Value::Null);

    assert_eq!(get_path(&ctx, &root, "resource:palette/red").unwrap(), Value::from("#f00"));
    assert_eq!(get_path(&ctx, &root, "object:bridge/title").unwrap(), Value::from("hostbridge"));
    assert_eq!(get_path(&ctx, &child_root, "object:parent/name").unwrap(), Value::from("Parent"));

    let err = set_property(&ctx, &root, "object:parent", &json!("x")).unwrap_err();
    assert!(matches!(err, BridgeError::ReadOnly(_)));
}

#[test]
fn containers_cannot_be_stored_inside_themselves() {
    let (bridge, node) = with_node("Cube");
    let ctx = bridge.context();
    let root = Value::Object(node.clone());

    let err = set_property(&ctx, &root, "props/map:self!", &json!("props")).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch(_)));
    assert!(as_node(&*node).unwrap().props().is_empty());
    assert_eq!(ctx.encode(&get_path(&ctx, &root, "props").unwrap()).unwrap(), json!({}));

    // Copying a sibling value is still fine
    assert!(set_property(&ctx, &root, "props/label!", &json!("name")).unwrap());
    assert_eq!(get_path(&ctx, &root, "props/label").unwrap(), Value::from("Cube"));
}

#[test]
fn query_omits_failures_and_misses() {
    let (bridge, node) = with_node("Cube");
    let ctx = bridge.context();
    let root = Value::Object(node);

    let mut paths = IndexMap::new();
    paths.insert("name".to_string(), "name".to_string());
    paths.insert("gone".to_string(), "missing?/x".to_string());
    paths.insert("bad".to_string(), "nope".to_string());
    paths.insert("self".to_string(), "transform:.".to_string());

    let results = query(&ctx, &root, &paths);
    assert_eq!(serde_json::Value::Object(results), json!({"name": "Cube", "self": "cube"}));
}
