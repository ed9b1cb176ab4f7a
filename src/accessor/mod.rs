//! Path-expression accessors
//!
//! ```text
//! "member:foo/index:2"      ->  root.foo[2]
//! "transform:Arm/member:visible?"
//! "object:cube/method:childNames"
//! ```
//!
//! `resolve` turns a path into one `Accessor`; the helpers in `resolve`
//! cover the common read/assign/query patterns.

#[allow(clippy::module_inception)]
pub mod accessor;
pub mod context;
pub mod resolve;
pub mod step;

pub use accessor::{Accessor, AccessorKind, Keyed, Sequence};
pub use context::BridgeContext;
pub use resolve::{add_query_data, get_path, query, read_path, resolve, set_path, set_property};
pub use step::PathStep;
