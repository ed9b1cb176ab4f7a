//! Protocol constants: event names, reserved ids and path prefixes
//!
//! Centralized so the router, the resolver and hosts agree on spelling.

/// Reserved id of the bridge root object.
pub const ROOT_ID: &str = "bridge";

/// Inbound events handled by the bridge itself
pub mod inbound {
    pub const CREATE: &str = "Create";
    pub const STARTED_PEER: &str = "StartedPeer";
    pub const LOG: &str = "Log";
}

/// Per-object event vocabulary
pub mod object {
    pub const DESTROY: &str = "Destroy";
    pub const UPDATE: &str = "Update";
    pub const UPDATE_INTERESTS: &str = "UpdateInterests";
    pub const ANIMATE: &str = "Animate";
    pub const QUERY: &str = "Query";
    pub const DESTROY_AFTER: &str = "DestroyAfter";
    pub const ASSIGN_TO: &str = "AssignTo";
    pub const SET_PARENT: &str = "SetParent";

    /// Root only
    pub const BOOT: &str = "Boot";
}

/// Outbound events
pub mod outbound {
    pub const CREATED: &str = "Created";
    pub const DESTROYED: &str = "Destroyed";
    pub const CALLBACK: &str = "Callback";
    pub const STARTED_HOST: &str = "StartedHost";

    /// Lifecycle events sent even without a registered interest.
    pub const ALWAYS_SENT: &[&str] = &[CREATED, DESTROYED];
}

/// Path step prefixes
pub mod prefix {
    pub const DEFAULT: &str = "member";

    pub const CONSTANTS: &[&str] = &[
        "string", "float", "int", "integer", "bool", "boolean", "null", "json",
    ];
    pub const INDEXED: &[&str] = &["index", "array", "list", "jarray"];
    pub const KEYED: &[&str] = &["map", "dict", "dictionary", "jobject"];
    pub const MEMBERS: &[&str] = &["member", "field", "property"];

    pub const TRANSFORM: &str = "transform";
    pub const COMPONENT: &str = "component";
    pub const RESOURCE: &str = "resource";
    pub const OBJECT: &str = "object";
    pub const METHOD: &str = "method";
}

/// Step suffixes
pub mod suffix {
    pub const CONDITIONAL: char = '?';
    pub const INDIRECT: char = '!';
}
