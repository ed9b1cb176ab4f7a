//! The bridge root object, registered as `"bridge"`.

use crate::core::reflect::{TypeRegistry, ValueType};
use crate::core::value::{HostObject, Value};
use crate::error::BridgeError;
use std::any::Any;
use std::cell::{Cell, RefCell};

pub const TYPE_NAME: &str = "Bridge";

/// Bridge state visible to paths (`object:bridge/member:ticks`).
#[derive(Debug, Default)]
pub struct RootObject {
    pub(crate) started: Cell<bool>,
    pub(crate) restarting: Cell<bool>,
    pub(crate) ticks: Cell<u64>,
    pub(crate) object_count: Cell<usize>,
    title: RefCell<String>,
}

impl RootObject {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: RefCell::new(title.into()), ..Self::default() }
    }

    pub fn title(&self) -> String {
        self.title.borrow().clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }

    pub fn register_type(types: &mut TypeRegistry) {
        types
            .define::<RootObject>(TYPE_NAME)
            .property("started", ValueType::Bool, |r| Value::Bool(r.started.get()))
            .property("restarting", ValueType::Bool, |r| Value::Bool(r.restarting.get()))
            .property("ticks", ValueType::Int, |r| Value::Int(r.ticks.get() as i64))
            .property("objectCount", ValueType::Int, |r| Value::Int(r.object_count.get() as i64))
            .property_rw(
                "title",
                ValueType::String,
                |r| Value::String(r.title()),
                |r, value| match value {
                    Value::String(s) => {
                        *r.title.borrow_mut() = s;
                        Ok(())
                    }
                    other => Err(BridgeError::Conversion(format!("title must be a string, got {}", other.kind()))),
                },
            )
            .finish();
    }
}

impl HostObject for RootObject {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
