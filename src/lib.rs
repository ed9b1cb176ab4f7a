//! Hostbridge: path-expression accessors and an event bridge between a
//! scripted peer and a native object host.
//!
//! # Architecture
//!
//! ```text
//! Transport (JSON batches)
//!   │
//!   └── Bridge (single dispatch thread)
//!         ├── ObjectRegistry  id ⇄ object, root bound as "bridge"
//!         ├── BridgeObject    per-object interests + lifecycle
//!         ├── Accessor engine "prefix:body?!" steps over Values
//!         │     ├── TypeRegistry  fields / properties / methods / extensions
//!         │     └── Coercion      wire ⇄ native conversion
//!         └── Host            children, capabilities, resources, creation
//! ```
//!
//! # Path steps
//!
//! | Prefix | Binds |
//! |--------|-------|
//! | `member` (default), `field`, `property` | reflected member, or key of a wire/native map |
//! | `index`, `array`, `list`, `jarray` | sequence element |
//! | `map`, `dict`, `dictionary`, `jobject` | map entry |
//! | `string`, `float`, `int`, `bool`, `null`, `json`, ... | constant |
//! | `transform` | child by name, index, `.` or `..` |
//! | `component` | capability of an object |
//! | `resource` | named resource |
//! | `object` | registered object by id |
//! | `method` | method call (get: no args, set: wire array of args) |
//!
//! `?` makes a step conditional (a missing value stops the path quietly),
//! `!` makes a set indirect (the value is itself a path).
//!
//! # Features
//!
//! - `native` (default) - tokio tick pump, signal handling, log subscriber, CLI
//!
//! # Usage
//!
//! ```ignore
//! use hostbridge::{Bridge, BridgeConfig, QueueTransport, scene::SceneHost};
//!
//! let transport = QueueTransport::new(100);
//! let mut bridge = Bridge::new(BridgeConfig::default(), SceneHost::new(), transport.clone());
//! hostbridge::scene::install(&mut bridge);
//! bridge.start();
//!
//! transport.push_inbound(r#"[{"event":"StartedPeer"},{"event":"Create","data":{"id":"cube"}}]"#)?;
//! bridge.tick();
//! let sent = transport.drain_outbound()?;
//! ```

// =============================================================================
// Shared modules (compile everywhere)
// =============================================================================
pub mod accessor;
pub mod bridge;
pub mod core;
pub mod error;
pub mod host;
pub mod registry;
pub mod scene;
pub mod transport;

// =============================================================================
// Native-only modules (tokio, subscriber)
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;
#[cfg(feature = "native")]
pub mod pump;
#[cfg(feature = "native")]
pub mod runtime;

// =============================================================================
// Re-exports: Shared
// =============================================================================
pub use accessor::{
    add_query_data, get_path, query, read_path, resolve, set_path, set_property, Accessor, AccessorKind,
    BridgeContext, PathStep,
};
pub use bridge::{Bridge, BridgeConfig, BridgeObject, CreateSpec, Envelope, Interest, InterestTable, ObjectState, TickReport};
pub use core::{Coercion, HostObject, ObjectRef, TypeRegistry, Value, ValueType, WireRef};
pub use error::{BridgeError, BridgeResult};
pub use host::{ChildSelector, CreateRequest, Host, NullHost};
pub use registry::ObjectRegistry;
pub use transport::{QueueTransport, Transport};

// =============================================================================
// Re-exports: Native
// =============================================================================
#[cfg(feature = "native")]
pub use logging::init_logging;
#[cfg(feature = "native")]
pub use pump::{Pump, PumpStats};
#[cfg(feature = "native")]
pub use runtime::{install_signal_handlers, Shutdown};
