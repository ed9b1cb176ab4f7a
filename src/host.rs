//! Host capabilities
//!
//! Everything engine-specific sits behind `Host`: child navigation,
//! capability lookup, resources, object construction, reparenting, teardown
//! and animation. Defaults describe a host that supports none of it, so a
//! host implements only what it has.

use crate::bridge::envelope::Envelope;
use crate::core::value::{ObjectRef, Value};
use crate::error::{BridgeError, BridgeResult};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Body of a `transform:` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildSelector {
    /// `.`
    This,
    /// `..`
    Parent,
    /// Ordinal child
    Index(i64),
    /// Child by name
    Name(String),
}

impl ChildSelector {
    pub fn parse(body: &str) -> Self {
        match body {
            "." => ChildSelector::This,
            ".." => ChildSelector::Parent,
            _ => match body.parse::<i64>() {
                Ok(index) => ChildSelector::Index(index),
                Err(_) => ChildSelector::Name(body.to_string()),
            },
        }
    }
}

/// What a `Create` asks the host to build.
#[derive(Debug, Clone, Copy)]
pub struct CreateRequest<'a> {
    pub id: &'a str,
    /// Named template to instantiate
    pub prefab: Option<&'a str>,
    /// Concrete object type to create
    pub component: Option<&'a str>,
}

pub trait Host {
    fn lookup_child(&self, _owner: &Value, _selector: &ChildSelector) -> Option<Value> {
        None
    }

    fn lookup_capability(&self, _owner: &Value, _name: &str) -> Option<Value> {
        None
    }

    fn load_named_resource(&self, _path: &str) -> Option<Value> {
        None
    }

    fn instantiate(&self, request: &CreateRequest<'_>) -> BridgeResult<ObjectRef> {
        Err(BridgeError::Protocol(format!("host cannot create '{}'", request.id)))
    }

    /// Attach `child` under `parent`, or detach it when `parent` is `None`.
    fn set_parent(&self, _child: &ObjectRef, _parent: Option<&Value>, _world_position_stays: bool) -> BridgeResult<()> {
        Err(BridgeError::Protocol("host has no object hierarchy".into()))
    }

    /// Release the native side of a destroyed object.
    fn destroy(&self, _obj: &ObjectRef) {}

    fn animate(&self, _obj: &ObjectRef, _commands: &JsonValue) -> BridgeResult<()> {
        Err(BridgeError::Protocol("host does not animate".into()))
    }

    /// Schedule destruction of `id`. The host owns the timer and later calls
    /// `Bridge::destroy` (or `destroy_object`) itself.
    fn destroy_after(&self, _id: &str, _delay: Duration) -> BridgeResult<()> {
        Err(BridgeError::Protocol("host has no timers".into()))
    }

    /// Offered every per-object event outside the built-in vocabulary.
    /// Returns whether the host handled it.
    fn handle_event(&self, _obj: &ObjectRef, _event: &Envelope) -> BridgeResult<bool> {
        Ok(false)
    }
}

/// Host with no capabilities. Paths over plain wire/native values need
/// nothing more.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}
