//! Bridge-side state of an addressable object.

use crate::bridge::interests::InterestTable;
use crate::core::value::ObjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Constructed, not yet addressable
    Unregistered,
    Active,
    /// Terminal
    Destroyed,
}

pub struct BridgeObject {
    pub id: String,
    pub object: ObjectRef,
    pub interests: InterestTable,
    state: ObjectState,
}

impl BridgeObject {
    pub fn new(id: impl Into<String>, object: ObjectRef, interests: InterestTable) -> Self {
        Self { id: id.into(), object, interests, state: ObjectState::Unregistered }
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ObjectState::Destroyed
    }

    pub(crate) fn activate(&mut self) {
        if self.state == ObjectState::Unregistered {
            self.state = ObjectState::Active;
        }
    }

    /// Mark destroyed. Returns false if it already was.
    pub(crate) fn mark_destroyed(&mut self) -> bool {
        if self.state == ObjectState::Destroyed {
            return false;
        }
        self.state = ObjectState::Destroyed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::root::RootObject;
    use std::rc::Rc;

    #[test]
    fn lifecycle_is_one_way() {
        let mut obj = BridgeObject::new("a", Rc::new(RootObject::default()), InterestTable::new());
        assert_eq!(obj.state(), ObjectState::Unregistered);
        obj.activate();
        assert_eq!(obj.state(), ObjectState::Active);
        assert!(obj.mark_destroyed());
        assert!(!obj.mark_destroyed());
        obj.activate();
        assert!(obj.is_destroyed());
    }
}
