//! Bridge - object registry, event routing and interest filtering
//!
//! # Flow
//!
//! ```text
//! transport.receive()  ->  [ {event,id,data}, ... ]
//!     │
//!     ├── "Create"      -> host.instantiate, register, preEvents, parent,
//!     │                    update, Created, postEvents
//!     ├── "StartedPeer" -> release held outbound events
//!     ├── "Log"         -> log line under target `peer`
//!     └── other         -> registry[id] -> per-object vocabulary
//!                          (Destroy, Update, UpdateInterests, Animate,
//!                           Query, DestroyAfter, AssignTo, SetParent)
//!
//! send_event(id, name) -> interests[name] -> update / events / query
//!     │
//!     ▼
//! outbound queue  ->  transport.send("[...]")   (once per tick)
//! ```
//!
//! Everything runs on the thread that calls `tick`. A failing event is
//! logged and abandoned; the rest of the batch still runs.

pub mod config;
pub mod envelope;
pub mod interests;
pub mod object;
pub mod root;

pub use config::BridgeConfig;
pub use envelope::{CreateSpec, Envelope};
pub use interests::{Interest, InterestTable};
pub use object::{BridgeObject, ObjectState};
pub use root::RootObject;

use crate::accessor::{self, BridgeContext};
use crate::core::coerce::Coercion;
use crate::core::paths::{inbound, object as events, outbound, ROOT_ID};
use crate::core::reflect::TypeRegistry;
use crate::core::value::{ObjectRef, Value};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{CreateRequest, Host};
use crate::registry::ObjectRegistry;
use crate::transport::Transport;
use envelope::{encode_batch, parse_batch};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, debug_span, error, info, warn};

/// Counters for one `tick`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Raw inbound batches drained
    pub batches: usize,
    /// Envelopes handled successfully
    pub dispatched: usize,
    /// Envelopes (or whole batches) that failed
    pub failed: usize,
    /// Envelopes handed to the transport
    pub sent: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.batches == 0 && self.sent == 0
    }
}

pub struct Bridge {
    config: BridgeConfig,
    host: Box<dyn Host>,
    transport: Box<dyn Transport>,
    types: TypeRegistry,
    coercion: Coercion,
    objects: ObjectRegistry,
    states: HashMap<String, BridgeObject>,
    root: Rc<RootObject>,
    /// Held until the peer has started
    outbound: VecDeque<Envelope>,
    /// Sent regardless of peer state
    control: VecDeque<Envelope>,
    peer_started: bool,
    restarting: bool,
    next_auto_id: u64,
}

impl Bridge {
    pub fn new(config: BridgeConfig, host: impl Host + 'static, transport: impl Transport + 'static) -> Self {
        let root = Rc::new(RootObject::new(config.title.clone()));
        let root_ref: ObjectRef = root.clone();
        let mut types = TypeRegistry::new();
        RootObject::register_type(&mut types);

        let mut bridge = Self {
            config,
            host: Box::new(host),
            transport: Box::new(transport),
            types,
            coercion: Coercion::new(),
            objects: ObjectRegistry::new(root_ref),
            states: HashMap::new(),
            root,
            outbound: VecDeque::new(),
            control: VecDeque::new(),
            peer_started: false,
            restarting: false,
            next_auto_id: 0,
        };
        bridge.insert_root_state();
        bridge
    }

    pub fn config(&self) -> &BridgeConfig { &self.config }
    pub fn types(&self) -> &TypeRegistry { &self.types }
    pub fn types_mut(&mut self) -> &mut TypeRegistry { &mut self.types }
    pub fn coercion(&self) -> &Coercion { &self.coercion }
    pub fn coercion_mut(&mut self) -> &mut Coercion { &mut self.coercion }
    pub fn objects(&self) -> &ObjectRegistry { &self.objects }
    pub fn root(&self) -> &RootObject { &self.root }
    pub fn host(&self) -> &dyn Host { self.host.as_ref() }
    pub fn peer_started(&self) -> bool { self.peer_started }
    pub fn is_restarting(&self) -> bool { self.restarting }

    /// Resolution context over this bridge's host, tables and registry.
    pub fn context(&self) -> BridgeContext<'_> {
        BridgeContext::new(self.host.as_ref(), &self.types, &self.coercion, &self.objects)
    }

    pub fn object(&self, id: &str) -> Option<ObjectRef> {
        self.objects.resolve(id)
    }

    pub fn state(&self, id: &str) -> Option<&BridgeObject> {
        self.states.get(id)
    }

    /// Envelopes queued but not yet sent.
    pub fn pending(&self) -> usize {
        self.outbound.len() + self.control.len()
    }

    /// Announce the host to the peer.
    pub fn start(&mut self) {
        self.root.started.set(true);
        info!(title = %self.root.title(), "bridge started");
        self.control.push_back(Envelope::new(outbound::STARTED_HOST));
    }

    /// Make a host-constructed object addressable under `id`.
    pub fn register_object(&mut self, id: &str, obj: ObjectRef, interests: InterestTable) -> BridgeResult<()> {
        if self.states.contains_key(id) {
            return Err(BridgeError::Protocol(format!("id '{}' is already registered", id)));
        }
        self.objects.register(id, obj.clone())?;
        let mut state = BridgeObject::new(id, obj, interests);
        state.activate();
        self.states.insert(id.to_string(), state);
        self.sync_object_count();
        Ok(())
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Drain inbound batches, dispatch every envelope, flush outbound.
    pub fn tick(&mut self) -> TickReport {
        self.root.ticks.set(self.root.ticks.get() + 1);
        let mut report = TickReport::default();

        let batches = match self.transport.receive() {
            Ok(batches) => batches,
            Err(e) => {
                error!(error = %e, "transport receive failed");
                Vec::new()
            }
        };
        report.batches = batches.len();

        for batch in batches {
            let items = match parse_batch(&batch) {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "dropping malformed batch");
                    report.failed += 1;
                    continue;
                }
            };
            for item in items {
                let envelope = match Envelope::from_json(item) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "rejected envelope");
                        report.failed += 1;
                        continue;
                    }
                };
                let (event, id) = (envelope.event.clone(), envelope.id.clone());
                let _span = debug_span!("envelope", event = %event, id = id.as_deref().unwrap_or("")).entered();
                match self.handle_inbound(envelope) {
                    Ok(()) => report.dispatched += 1,
                    Err(e) => {
                        log_event_failure(&event, id.as_deref(), &e);
                        report.failed += 1;
                    }
                }
            }
        }

        report.sent = self.flush();
        report
    }

    /// Send queued envelopes: control envelopes always, the rest once the
    /// peer has started, at most `outbound_batch_max` of them.
    pub fn flush(&mut self) -> usize {
        let control = self.control.len();
        let mut batch: Vec<Envelope> = self.control.drain(..).collect();
        if self.peer_started || !self.config.wait_for_peer {
            let n = self.outbound.len().min(self.config.outbound_batch_max);
            batch.extend(self.outbound.drain(..n));
        }
        if batch.is_empty() {
            return 0;
        }

        let sent = batch.len();
        match encode_batch(&batch).and_then(|text| self.transport.send(text)) {
            Ok(()) => {
                debug!(count = sent, "flushed outbound batch");
                sent
            }
            Err(e) => {
                error!(error = %e, count = sent, "transport send failed, requeueing");
                let rest = batch.split_off(control);
                for envelope in rest.into_iter().rev() {
                    self.outbound.push_front(envelope);
                }
                for envelope in batch.into_iter().rev() {
                    self.control.push_front(envelope);
                }
                0
            }
        }
    }

    // =========================================================================
    // Inbound dispatch
    // =========================================================================

    pub fn handle_inbound(&mut self, envelope: Envelope) -> BridgeResult<()> {
        match envelope.event.as_str() {
            inbound::STARTED_PEER => {
                info!("peer started");
                self.peer_started = true;
                Ok(())
            }
            inbound::LOG => {
                let line = envelope.data_str("line").unwrap_or_default();
                info!(target: "peer", "{}", line);
                Ok(())
            }
            inbound::CREATE => self.create(envelope.data.as_ref()).map(|_| ()),
            _ => {
                let id = envelope
                    .id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| BridgeError::Protocol(format!("'{}' has no id", envelope.event)))?;
                if !self.states.contains_key(&id) {
                    return Err(BridgeError::Missing(format!("object '{}'", id)));
                }
                self.handle_object_event(&id, &envelope)
            }
        }
    }

    /// Create an object from a `Create` payload and return its id.
    pub fn create(&mut self, data: Option<&JsonValue>) -> BridgeResult<String> {
        let spec = CreateSpec::from_data(data)?;
        let id = match spec.id.clone().filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => self.auto_id(spec.prefab.as_deref()),
        };
        if id == ROOT_ID || self.objects.contains(&id) {
            return Err(BridgeError::Protocol(format!("id '{}' is already registered", id)));
        }

        let obj = self.host.instantiate(&CreateRequest {
            id: &id,
            prefab: spec.prefab.as_deref(),
            component: spec.component.as_deref(),
        })?;
        let interests = spec.interests.as_ref().map(InterestTable::from_json).unwrap_or_default();
        self.register_object(&id, obj.clone(), interests)?;
        debug!(id = %id, prefab = ?spec.prefab, "created object");

        if let Some(pre_events) = &spec.pre_events {
            self.handle_events(&id, pre_events);
        }

        if let Some(parent) = spec.parent.as_deref().filter(|p| !p.is_empty()) {
            if let Err(e) = self.reparent(&obj, parent, spec.world_position_stays()) {
                error!(id = %id, path = %parent, error = %e, "Create: cannot set parent");
            }
        }

        if let Some(update) = &spec.update {
            self.load_update(&id, update);
        }

        self.send_event(&id, outbound::CREATED, None)?;

        if let Some(post_events) = &spec.post_events {
            self.handle_events(&id, post_events);
        }

        Ok(id)
    }

    /// Per-object event vocabulary. Anything else is offered to the host.
    pub fn handle_object_event(&mut self, id: &str, envelope: &Envelope) -> BridgeResult<()> {
        let obj = self
            .objects
            .resolve(id)
            .ok_or_else(|| BridgeError::Missing(format!("object '{}'", id)))?;
        let data = envelope.data.as_ref();

        match envelope.event.as_str() {
            events::DESTROY => {
                if id == ROOT_ID {
                    warn!("refusing to destroy the bridge root");
                } else {
                    self.destroy(id);
                }
                Ok(())
            }
            events::BOOT if id == ROOT_ID => {
                self.restart();
                Ok(())
            }
            events::UPDATE => {
                let update = expect_object(envelope, data)?;
                self.load_update(id, update);
                Ok(())
            }
            events::UPDATE_INTERESTS => {
                let directives = expect_object(envelope, data)?;
                if let Some(state) = self.states.get_mut(id) {
                    state.interests.apply_directives(directives);
                }
                Ok(())
            }
            events::ANIMATE => self.host.animate(&obj, data.unwrap_or(&JsonValue::Null)),
            events::QUERY => {
                let payload = expect_object(envelope, data)?;
                let query: IndexMap<String, String> = match payload.get("query") {
                    Some(q) => serde_json::from_value(q.clone())
                        .map_err(|e| BridgeError::Protocol(format!("Query: malformed query: {}", e)))?,
                    None => IndexMap::new(),
                };
                let results = accessor::query(&self.context(), &Value::Object(obj), &query);
                if let Some(callback) = payload.get("callbackID").and_then(JsonValue::as_str).filter(|c| !c.is_empty()) {
                    self.send_callback(callback, results);
                }
                Ok(())
            }
            events::DESTROY_AFTER => {
                let delay = data
                    .and_then(|d| d.get("delay"))
                    .and_then(JsonValue::as_f64)
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .ok_or_else(|| BridgeError::Protocol("DestroyAfter needs a non-negative delay".into()))?;
                self.host.destroy_after(id, Duration::from_secs_f64(delay))
            }
            events::ASSIGN_TO => {
                let path = data
                    .and_then(|d| d.get("path"))
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| BridgeError::Protocol("AssignTo needs a path".into()))?;
                let ctx = self.context();
                let root = Value::Object(obj.clone());
                let accessor = accessor::resolve(&ctx, &root, path)?;
                if accessor.is_short_circuit() {
                    return Ok(());
                }
                match accessor.set(&ctx, Value::Object(obj)) {
                    Ok(()) => Ok(()),
                    Err(e) if accessor.conditional => {
                        debug!(id = %id, path = %path, error = %e, "AssignTo skipped");
                        Ok(())
                    }
                    Err(e) => Err(e.at_path(path)),
                }
            }
            events::SET_PARENT => {
                let path = data.and_then(|d| d.get("path")).and_then(JsonValue::as_str).unwrap_or_default();
                let world_position_stays = data
                    .and_then(|d| d.get("worldPositionStays"))
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(true);
                if path.is_empty() {
                    self.host.set_parent(&obj, None, world_position_stays)
                } else {
                    self.reparent(&obj, path, world_position_stays)
                }
            }
            _ => {
                if !self.host.handle_event(&obj, envelope)? {
                    debug!(id = %id, event = %envelope.event, "unhandled event");
                }
                Ok(())
            }
        }
    }

    /// Replay a list of envelopes through `id`'s handler. Stops early if the
    /// object goes away.
    pub fn handle_events(&mut self, id: &str, list: &[JsonValue]) {
        for item in list {
            if !self.states.contains_key(id) {
                break;
            }
            let envelope = match Envelope::from_json(item.clone()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(id = %id, error = %e, "rejected event");
                    continue;
                }
            };
            if let Err(e) = self.handle_object_event(id, &envelope) {
                log_event_failure(&envelope.event, Some(id), &e);
            }
        }
    }

    /// Apply `path -> wire value` assignments to object `id`. Each key
    /// succeeds or fails on its own; returns how many were applied.
    pub fn load_update(&mut self, id: &str, update: &Map<String, JsonValue>) -> usize {
        let Some(obj) = self.objects.resolve(id) else {
            warn!(id = %id, "update for unknown object");
            return 0;
        };
        let ctx = self.context();
        let root = Value::Object(obj);
        let mut applied = 0;
        for (path, value) in update {
            match accessor::set_property(&ctx, &root, path, value) {
                Ok(true) => applied += 1,
                Ok(false) => debug!(id = %id, path = %path, "conditional update skipped"),
                Err(e) => error!(id = %id, path = %path, error = %e, "update failed"),
            }
        }
        applied
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Fire `event` on object `id` through its interest table. Returns
    /// whether an envelope was queued.
    pub fn send_event(&mut self, id: &str, event: &str, data: Option<Map<String, JsonValue>>) -> BridgeResult<bool> {
        let state = self
            .states
            .get(id)
            .ok_or_else(|| BridgeError::Missing(format!("object '{}'", id)))?;
        let obj = state.object.clone();
        let interest = state.interests.active(event).cloned();
        let mut data = data;
        let mut send = outbound::ALWAYS_SENT.contains(&event);

        if let Some(interest) = interest {
            send = true;
            if let Some(update) = &interest.update {
                self.load_update(id, update);
            }
            if let Some(list) = &interest.events {
                self.handle_events(id, list);
            }
            if interest.do_not_send {
                send = false;
            } else if let Some(query) = &interest.query {
                let ctx = self.context();
                accessor::add_query_data(&ctx, &Value::Object(obj), query, data.get_or_insert_with(Map::new));
            }
        }

        if !send {
            debug!(id = %id, event = %event, "event not sent");
            return Ok(false);
        }
        let mut envelope = Envelope::new(event).with_id(id);
        envelope.data = data.map(JsonValue::Object);
        self.outbound.push_back(envelope);
        Ok(true)
    }

    /// Results of a `Query` addressed to the peer's callback.
    pub fn send_callback(&mut self, callback_id: &str, data: Map<String, JsonValue>) {
        self.outbound
            .push_back(Envelope::new(outbound::CALLBACK).with_id(callback_id).with_data(JsonValue::Object(data)));
    }

    /// Queue an arbitrary envelope (gated like any event).
    pub fn enqueue(&mut self, envelope: Envelope) {
        self.outbound.push_back(envelope);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Destroy object `id`. Destroying an unknown or already destroyed
    /// object is a no-op; returns whether anything happened.
    pub fn destroy(&mut self, id: &str) -> bool {
        if id == ROOT_ID {
            return false;
        }
        match self.states.get_mut(id) {
            Some(state) => {
                if !state.mark_destroyed() {
                    return false;
                }
            }
            None => return false,
        }

        if !self.restarting {
            if let Err(e) = self.send_event(id, outbound::DESTROYED, None) {
                error!(id = %id, error = %e, "cannot send Destroyed");
            }
        }

        if let Some(state) = self.states.remove(id) {
            self.host.destroy(&state.object);
            self.objects.unregister(&state.object);
        }
        debug!(id = %id, "destroyed object");
        self.sync_object_count();
        true
    }

    /// Host-initiated destruction; same path as a peer `Destroy`.
    pub fn destroy_object(&mut self, obj: &ObjectRef) -> bool {
        match self.objects.id_of(obj).map(str::to_string) {
            Some(id) => self.destroy(&id),
            None => false,
        }
    }

    /// Tear everything down and announce the host again. No `Destroyed`
    /// events are sent for the objects removed.
    pub fn restart(&mut self) {
        info!("bridge restarting");
        self.restarting = true;
        self.root.restarting.set(true);

        let mut ids: Vec<String> = self.states.keys().filter(|id| id.as_str() != ROOT_ID).cloned().collect();
        ids.sort();
        for id in ids {
            self.destroy(&id);
        }
        for (id, obj) in self.objects.reset() {
            debug!(id = %id, "releasing unmanaged object");
            self.host.destroy(&obj);
        }

        self.states.clear();
        self.insert_root_state();
        self.outbound.clear();
        self.control.clear();
        self.peer_started = false;
        self.restarting = false;
        self.root.restarting.set(false);
        self.sync_object_count();

        self.start();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn insert_root_state(&mut self) {
        let root: ObjectRef = self.root.clone();
        let mut state = BridgeObject::new(ROOT_ID, root, InterestTable::new());
        state.activate();
        self.states.insert(ROOT_ID.to_string(), state);
    }

    fn sync_object_count(&self) {
        self.root.object_count.set(self.objects.len());
    }

    fn auto_id(&mut self, prefab: Option<&str>) -> String {
        let stem = prefab
            .and_then(|p| p.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("object")
            .to_string();
        loop {
            self.next_auto_id += 1;
            let id = format!("{}-{}", stem, self.next_auto_id);
            if !self.objects.contains(&id) {
                return id;
            }
        }
    }

    /// Resolve `path` from `obj` and make the result its parent.
    fn reparent(&self, obj: &ObjectRef, path: &str, world_position_stays: bool) -> BridgeResult<()> {
        let ctx = self.context();
        match accessor::read_path(&ctx, &Value::Object(obj.clone()), path)? {
            Some(parent) if !parent.is_null() => self.host.set_parent(obj, Some(&parent), world_position_stays),
            _ => {
                debug!(path = %path, "conditional parent not found");
                Ok(())
            }
        }
    }
}

fn expect_object<'a>(envelope: &Envelope, data: Option<&'a JsonValue>) -> BridgeResult<&'a Map<String, JsonValue>> {
    data.and_then(JsonValue::as_object)
        .ok_or_else(|| BridgeError::Protocol(format!("{} needs object data", envelope.event)))
}

fn log_event_failure(event: &str, id: Option<&str>, e: &BridgeError) {
    match e {
        BridgeError::Missing(_) => warn!(event = %event, id = ?id, error = %e, "event target not found"),
        BridgeError::Protocol(_) => warn!(event = %event, id = ?id, error = %e, "rejected event"),
        _ => error!(event = %event, id = ?id, error = %e, "event failed"),
    }
}
