//! Core types shared by the accessor engine and the bridge.
//!
//! - `value`: host values, wire nodes and shared containers
//! - `reflect`: per-type member and method tables
//! - `coerce`: wire <-> native conversions
//! - `paths`: protocol constants

pub mod coerce;
pub mod paths;
pub mod reflect;
pub mod value;

pub use coerce::Coercion;
pub use reflect::{MemberDesc, MemberKind, MethodDesc, TypeBuilder, TypeRegistry, ValueType};
pub use value::{object_key, ArrayRef, HostObject, ListRef, MapRef, ObjectRef, Value, WireRef};
