//! Object registry
//!
//! Bijective id <-> object map. Both directions are updated together by
//! every mutation, so `resolve(id_of(o)) == o` holds for every live entry.
//! The reserved id `"bridge"` is bound to the root object for the lifetime
//! of the registry.

use crate::core::paths::ROOT_ID;
use crate::core::value::{object_key, ObjectRef};
use crate::error::{BridgeError, BridgeResult};
use std::collections::HashMap;
use tracing::debug;

pub struct ObjectRegistry {
    by_id: HashMap<String, ObjectRef>,
    by_key: HashMap<usize, String>,
    root: ObjectRef,
}

impl ObjectRegistry {
    pub fn new(root: ObjectRef) -> Self {
        let mut registry = Self { by_id: HashMap::new(), by_key: HashMap::new(), root };
        registry.bind_root();
        registry
    }

    /// Bind `id` to `obj`. An existing binding of either the id or the
    /// object is replaced.
    pub fn register(&mut self, id: impl Into<String>, obj: ObjectRef) -> BridgeResult<()> {
        let id = id.into();
        let key = object_key(&obj);
        if id == ROOT_ID || key == object_key(&self.root) {
            return Err(BridgeError::Protocol(format!(
                "'{}' is reserved for the bridge root object",
                ROOT_ID
            )));
        }
        if let Some(previous) = self.by_id.remove(&id) {
            self.by_key.remove(&object_key(&previous));
        }
        if let Some(previous_id) = self.by_key.remove(&key) {
            self.by_id.remove(&previous_id);
        }
        debug!(id = %id, "registered object");
        self.by_key.insert(key, id.clone());
        self.by_id.insert(id, obj);
        Ok(())
    }

    /// Remove `obj`, returning the id it had. The root is never removed.
    pub fn unregister(&mut self, obj: &ObjectRef) -> Option<String> {
        let key = object_key(obj);
        if key == object_key(&self.root) {
            return None;
        }
        let id = self.by_key.remove(&key)?;
        self.by_id.remove(&id);
        Some(id)
    }

    pub fn unregister_id(&mut self, id: &str) -> Option<ObjectRef> {
        if id == ROOT_ID {
            return None;
        }
        let obj = self.by_id.remove(id)?;
        self.by_key.remove(&object_key(&obj));
        Some(obj)
    }

    pub fn resolve(&self, id: &str) -> Option<ObjectRef> {
        self.by_id.get(id).cloned()
    }

    pub fn id_of(&self, obj: &ObjectRef) -> Option<&str> {
        self.by_key.get(&object_key(obj)).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn root(&self) -> &ObjectRef {
        &self.root
    }

    /// Live entries, root included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_id.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop every entry except the root and hand back what was removed,
    /// ordered by id, so the caller can tear the objects down.
    pub fn reset(&mut self) -> Vec<(String, ObjectRef)> {
        let mut drained: Vec<(String, ObjectRef)> =
            self.by_id.drain().filter(|(id, _)| id != ROOT_ID).collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        self.by_key.clear();
        self.bind_root();
        drained
    }

    fn bind_root(&mut self) {
        self.by_key.insert(object_key(&self.root), ROOT_ID.to_string());
        self.by_id.insert(ROOT_ID.to_string(), self.root.clone());
    }
}
