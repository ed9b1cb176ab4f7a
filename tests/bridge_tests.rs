//! Bridge Tests: the event router end to end over a queue transport
//!
//! These tests verify:
//! 1. Create / Update / Destroy lifecycle and the envelopes it produces
//! 2. Interest tables: queries, doNotSend, UpdateInterests directives
//! 3. Query callbacks, DestroyAfter, SetParent
//! 4. Peer gating, batch limits and malformed input
//! 5. Boot-triggered restart

use hostbridge::scene::{self, as_node, NodeKind, SceneHost, SceneNode, Template};
use hostbridge::{
    get_path, Bridge, BridgeConfig, BridgeError, BridgeResult, CreateRequest, Host, HostObject, InterestTable,
    ObjectRef, QueueTransport, Value, ValueType,
};
use serde_json::{json, Value as JsonValue};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn bridge_with(config: BridgeConfig, host: impl Host + 'static) -> (Bridge, QueueTransport) {
    let transport = QueueTransport::default();
    let mut bridge = Bridge::new(config, host, transport.clone());
    scene::install(&mut bridge);
    bridge.start();
    (bridge, transport)
}

fn started_bridge() -> (Bridge, QueueTransport) {
    let (mut bridge, transport) = bridge_with(BridgeConfig::default(), SceneHost::new());
    transport.push_inbound(r#"[{"event":"StartedPeer"}]"#).unwrap();
    bridge.tick();
    transport.drain_outbound().unwrap();
    (bridge, transport)
}

/// Every envelope sent so far, flattened across batches.
fn sent(transport: &QueueTransport) -> Vec<JsonValue> {
    transport
        .drain_outbound()
        .unwrap()
        .iter()
        .flat_map(|batch| serde_json::from_str::<Vec<JsonValue>>(batch).unwrap())
        .collect()
}

fn events(envelopes: &[JsonValue]) -> Vec<&str> {
    envelopes.iter().filter_map(|e| e["event"].as_str()).collect()
}

fn read(bridge: &Bridge, id: &str, path: &str) -> Value {
    let obj = bridge.object(id).expect("object");
    get_path(&bridge.context(), &Value::Object(obj), path).expect("path")
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn create_update_destroy_roundtrip() {
    let (mut bridge, transport) = bridge_with(BridgeConfig::default(), SceneHost::new());

    transport
        .push_inbound(
            json!([
                {"event": "StartedPeer"},
                {"event": "Create", "data": {"id": "cube", "update": {"name": "Box", "position": [1, 2, 3]}}}
            ])
            .to_string(),
        )
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.batches, 1);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.failed, 0);

    let out = sent(&transport);
    assert_eq!(out, vec![json!({"event": "StartedHost"}), json!({"event": "Created", "id": "cube"})]);
    assert_eq!(read(&bridge, "cube", "name"), Value::from("Box"));
    assert_eq!(read(&bridge, "bridge", "objectCount"), Value::Int(2));

    transport
        .push_inbound(r#"[{"event":"Update","id":"cube","data":{"visible":false,"nope?":1}}]"#)
        .unwrap();
    bridge.tick();
    assert_eq!(read(&bridge, "cube", "visible"), Value::Bool(false));

    let node = bridge.object("cube").unwrap();
    transport
        .push_inbound(r#"[{"event":"Destroy","id":"cube"},{"event":"Destroy","id":"cube"}]"#)
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.failed, 1);

    let out = sent(&transport);
    assert_eq!(events(&out), vec!["Destroyed"]);
    assert!(bridge.object("cube").is_none());
    assert!(bridge.state("cube").is_none());
    assert!(as_node(&*node).unwrap().is_destroyed());

    // Direct destroy of a gone object is a no-op too
    assert!(!bridge.destroy("cube"));
}

#[test]
fn destroying_twice_sends_one_destroyed() {
    let (mut bridge, transport) = started_bridge();
    bridge.create(Some(&json!({"id": "cube"}))).unwrap();
    bridge.flush();
    sent(&transport);

    assert!(bridge.destroy("cube"));
    assert!(!bridge.destroy("cube"));
    bridge.flush();

    let out = sent(&transport);
    assert_eq!(out, vec![json!({"event": "Destroyed", "id": "cube"})]);
    assert!(bridge.objects().resolve("cube").is_none());
    assert_eq!(read(&bridge, "bridge", "objectCount"), Value::Int(1));
}

/// Host object whose `visible` setter counts its calls.
#[derive(Default)]
struct Lamp {
    visible: Cell<bool>,
    writes: Cell<usize>,
}

impl HostObject for Lamp {
    fn type_name(&self) -> &str { "Lamp" }
    fn as_any(&self) -> &dyn Any { self }
}

#[test]
fn update_sets_each_member_exactly_once() {
    let (mut bridge, transport) = started_bridge();
    bridge
        .types_mut()
        .define::<Lamp>("Lamp")
        .property_rw(
            "visible",
            ValueType::Bool,
            |lamp| Value::Bool(lamp.visible.get()),
            |lamp, value| {
                lamp.writes.set(lamp.writes.get() + 1);
                lamp.visible.set(value.as_bool().unwrap_or_default());
                Ok(())
            },
        )
        .finish();
    let lamp = Rc::new(Lamp::default());
    bridge.register_object("X", lamp.clone(), InterestTable::new()).unwrap();

    transport
        .push_inbound(r#"[{"event":"Update","id":"X","data":{"member:visible":true}}]"#)
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(lamp.writes.get(), 1);
    assert!(lamp.visible.get());
}

#[test]
fn self_referencing_update_is_refused() {
    let (mut bridge, transport) = started_bridge();
    transport
        .push_inbound(
            json!([
                {"event": "Create", "data": {"id": "cube"}},
                {"event": "Update", "id": "cube", "data": {"props/map:self!": "props", "props/hp": 3}}
            ])
            .to_string(),
        )
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.dispatched, 2);
    sent(&transport);

    transport
        .push_inbound(r#"[{"event":"Query","id":"cube","data":{"query":{"p":"props"},"callbackID":"cb"}}]"#)
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.failed, 0);

    let out = sent(&transport);
    assert_eq!(out, vec![json!({"event": "Callback", "id": "cb", "data": {"p": {"hp": 3}}})]);
}

#[test]
fn create_runs_pre_events_parent_update_then_post_events() {
    let (mut bridge, transport) = started_bridge();
    bridge.create(Some(&json!({"id": "parent"}))).unwrap();

    let id = bridge
        .create(Some(&json!({
            "id": "child",
            "preEvents": [{"event": "Update", "data": {"name": "Pre"}}],
            "parent": "object:parent",
            "update": {"tags": ["fresh"]},
            "postEvents": [{"event": "Destroy"}]
        })))
        .unwrap();
    assert_eq!(id, "child");

    bridge.flush();
    let out = sent(&transport);
    assert_eq!(
        out,
        vec![
            json!({"event": "Created", "id": "parent"}),
            json!({"event": "Created", "id": "child"}),
            json!({"event": "Destroyed", "id": "child"}),
        ]
    );
    assert!(bridge.object("child").is_none());
}

#[test]
fn create_builds_parent_links_and_auto_ids() {
    let host = SceneHost::new().with_template(
        "props/Lamp",
        Template { kind: NodeKind::Light, children: vec!["Bulb".into()], tags: vec![] },
    );
    let (mut bridge, _transport) = bridge_with(BridgeConfig::default(), host);

    let lamp = bridge.create(Some(&json!({"prefab": "props/Lamp"}))).unwrap();
    assert_eq!(lamp, "Lamp-1");
    assert_eq!(read(&bridge, &lamp, "type"), Value::from("Light"));
    assert_eq!(read(&bridge, &lamp, "transform:Bulb/name"), Value::from("Bulb"));

    let plain = bridge.create(None).unwrap();
    assert_eq!(plain, "object-2");

    bridge
        .create(Some(&json!({"id": "shade", "parent": "object:Lamp-1", "worldPositionStays": false})))
        .unwrap();
    assert_eq!(read(&bridge, &lamp, "childCount"), Value::Int(2));
    assert_eq!(read(&bridge, "shade", "transform:../type"), Value::from("Light"));

    let err = bridge.create(Some(&json!({"id": "shade"}))).unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
    let err = bridge.create(Some(&json!({"id": "bridge"}))).unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
    assert!(bridge.create(Some(&json!({"prefab": "Missing"}))).unwrap_err().is_missing());
}

#[test]
fn set_parent_moves_and_detaches() {
    let (mut bridge, transport) = started_bridge();
    bridge.create(Some(&json!({"id": "a"}))).unwrap();
    bridge.create(Some(&json!({"id": "b"}))).unwrap();

    transport
        .push_inbound(r#"[{"event":"SetParent","id":"b","data":{"path":"object:a"}}]"#)
        .unwrap();
    bridge.tick();
    assert_eq!(read(&bridge, "a", "childCount"), Value::Int(1));

    transport.push_inbound(r#"[{"event":"SetParent","id":"b","data":{}}]"#).unwrap();
    bridge.tick();
    assert_eq!(read(&bridge, "a", "childCount"), Value::Int(0));
}

// =============================================================================
// Interests
// =============================================================================

#[test]
fn interests_drive_outbound_events() {
    let (mut bridge, transport) = started_bridge();
    bridge
        .create(Some(&json!({
            "id": "cube",
            "interests": {
                "Moved": {"query": {"pos": "position", "gone": "nope?"}},
                "Hidden": {"doNotSend": true, "update": {"visible": false}},
                "Created": {"doNotSend": true}
            }
        })))
        .unwrap();

    assert!(bridge.send_event("cube", "Moved", None).unwrap());
    assert!(!bridge.send_event("cube", "Hidden", None).unwrap());
    assert!(!bridge.send_event("cube", "Unknown", None).unwrap());
    assert_eq!(read(&bridge, "cube", "visible"), Value::Bool(false));

    bridge.flush();
    let out = sent(&transport);
    // doNotSend silences even Created
    assert_eq!(out, vec![json!({"event": "Moved", "id": "cube", "data": {"pos": [0.0, 0.0, 0.0]}})]);
}

#[test]
fn update_interests_directives() {
    let (mut bridge, transport) = started_bridge();
    bridge
        .create(Some(&json!({"id": "cube", "interests": {"Moved": {}}})))
        .unwrap();
    bridge.flush();
    sent(&transport);

    let update = |bridge: &mut Bridge, directives: JsonValue| {
        transport
            .push_inbound(json!([{"event": "UpdateInterests", "id": "cube", "data": directives}]).to_string())
            .unwrap();
        bridge.tick();
    };

    update(&mut bridge, json!({"Moved": false}));
    assert!(!bridge.send_event("cube", "Moved", None).unwrap());

    update(&mut bridge, json!({"Moved": true}));
    assert!(bridge.send_event("cube", "Moved", None).unwrap());

    update(&mut bridge, json!({"Moved": null, "Spun": {"query": {"n": "name"}}}));
    assert!(!bridge.send_event("cube", "Moved", None).unwrap());
    assert!(bridge.send_event("cube", "Spun", None).unwrap());

    // A bool for an unknown event creates nothing
    update(&mut bridge, json!({"Jumped": true}));
    assert!(!bridge.send_event("cube", "Jumped", None).unwrap());

    bridge.flush();
    let out = sent(&transport);
    assert_eq!(events(&out), vec!["Moved", "Spun"]);
    assert_eq!(out[1]["data"], json!({"n": "cube"}));
}

#[test]
fn query_replies_with_callback() {
    let (mut bridge, transport) = started_bridge();
    bridge.create(Some(&json!({"id": "cube", "update": {"name": "Cube"}}))).unwrap();
    bridge.flush();
    sent(&transport);

    transport
        .push_inbound(
            json!([
                {"event": "Query", "id": "cube", "data": {"callbackID": "cb-1", "query": {"n": "name", "m": "nope?", "t": "object:bridge/title"}}},
                {"event": "Query", "id": "cube", "data": {"query": {"n": "name"}}}
            ])
            .to_string(),
        )
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.dispatched, 2);

    let out = sent(&transport);
    assert_eq!(
        out,
        vec![json!({"event": "Callback", "id": "cb-1", "data": {"n": "Cube", "t": "hostbridge"}})]
    );
}

// =============================================================================
// Host delegation
// =============================================================================

#[derive(Clone, Default)]
struct TimerHost {
    scheduled: Rc<RefCell<Vec<(String, Duration)>>>,
    animated: Rc<RefCell<Vec<JsonValue>>>,
}

impl Host for TimerHost {
    fn instantiate(&self, request: &CreateRequest<'_>) -> BridgeResult<ObjectRef> {
        Ok(SceneNode::create(request.id))
    }

    fn animate(&self, _obj: &ObjectRef, commands: &JsonValue) -> BridgeResult<()> {
        self.animated.borrow_mut().push(commands.clone());
        Ok(())
    }

    fn destroy_after(&self, id: &str, delay: Duration) -> BridgeResult<()> {
        self.scheduled.borrow_mut().push((id.to_string(), delay));
        Ok(())
    }
}

#[test]
fn timers_and_animation_are_delegated_to_the_host() {
    let host = TimerHost::default();
    let (mut bridge, transport) = bridge_with(BridgeConfig::default(), host.clone());
    bridge.create(Some(&json!({"id": "cube"}))).unwrap();

    transport
        .push_inbound(
            json!([
                {"event": "DestroyAfter", "id": "cube", "data": {"delay": 1.5}},
                {"event": "DestroyAfter", "id": "cube", "data": {"delay": -1}},
                {"event": "Animate", "id": "cube", "data": [{"to": 1}]},
                {"event": "Wobble", "id": "cube"}
            ])
            .to_string(),
        )
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.failed, 1);

    assert_eq!(*host.scheduled.borrow(), vec![("cube".to_string(), Duration::from_millis(1500))]);
    assert_eq!(*host.animated.borrow(), vec![json!([{"to": 1}])]);

    // The host's timer fires later
    let obj = bridge.object("cube").unwrap();
    assert!(bridge.destroy_object(&obj));
    assert!(!bridge.destroy_object(&obj));
}

// =============================================================================
// Transport behaviour
// =============================================================================

#[test]
fn outbound_waits_for_peer() {
    let (mut bridge, transport) = bridge_with(BridgeConfig::default(), SceneHost::new());

    transport.push_inbound(r#"[{"event":"Create","data":{"id":"cube"}}]"#).unwrap();
    let report = bridge.tick();
    assert_eq!(report.sent, 1);
    assert_eq!(events(&sent(&transport)), vec!["StartedHost"]);
    assert_eq!(bridge.pending(), 1);

    transport.push_inbound(r#"{"event":"StartedPeer"}"#).unwrap();
    bridge.tick();
    assert!(bridge.peer_started());
    assert_eq!(events(&sent(&transport)), vec!["Created"]);
    assert_eq!(bridge.pending(), 0);
}

#[test]
fn outbound_batches_are_capped() {
    let config = BridgeConfig::default().with_wait_for_peer(false).with_outbound_batch_max(2);
    let (mut bridge, transport) = bridge_with(config, SceneHost::new());
    for id in ["a", "b", "c"] {
        bridge.create(Some(&json!({ "id": id }))).unwrap();
    }

    assert_eq!(bridge.flush(), 3);
    assert_eq!(bridge.pending(), 1);
    assert_eq!(bridge.flush(), 1);
    assert_eq!(bridge.flush(), 0);
    assert_eq!(events(&sent(&transport)), vec!["StartedHost", "Created", "Created", "Created"]);
}

#[test]
fn malformed_input_costs_only_itself() {
    let (mut bridge, transport) = started_bridge();

    transport.push_inbound("not json").unwrap();
    transport
        .push_inbound(
            json!([
                {"id": "x"},
                "loose string",
                {"event": "Update", "id": "ghost", "data": {}},
                {"event": "Update", "data": {}},
                {"event": "Log", "data": {"line": "hello from the peer"}},
                {"event": "Create", "data": {"id": "ok"}}
            ])
            .to_string(),
        )
        .unwrap();
    let report = bridge.tick();
    assert_eq!(report.batches, 2);
    assert_eq!(report.failed, 5);
    assert_eq!(report.dispatched, 2);
    assert!(bridge.object("ok").is_some());
}

// =============================================================================
// Root object
// =============================================================================

#[test]
fn root_cannot_be_destroyed_and_boot_restarts() {
    let (mut bridge, transport) = started_bridge();
    bridge.create(Some(&json!({"id": "a"}))).unwrap();
    bridge.create(Some(&json!({"id": "b"}))).unwrap();
    bridge.flush();
    sent(&transport);

    transport.push_inbound(r#"[{"event":"Destroy","id":"bridge"}]"#).unwrap();
    bridge.tick();
    assert!(bridge.object("bridge").is_some());

    transport
        .push_inbound(r#"[{"event":"Update","id":"bridge","data":{"title":"renamed"}},{"event":"Boot","id":"bridge"}]"#)
        .unwrap();
    bridge.tick();

    assert!(bridge.object("a").is_none());
    assert!(bridge.object("b").is_none());
    assert_eq!(bridge.objects().len(), 1);
    assert!(!bridge.peer_started());
    assert!(!bridge.is_restarting());
    assert_eq!(bridge.root().title(), "renamed");
    assert_eq!(read(&bridge, "bridge", "objectCount"), Value::Int(1));

    // Restart announces the host again, without Destroyed events
    assert_eq!(events(&sent(&transport)), vec!["StartedHost"]);
}
