//! Bridge errors
//!
//! Every core operation returns `BridgeResult`. Nothing in the accessor,
//! registry or router panics across the crate boundary.

use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Malformed path: empty step, unknown prefix, unparsable literal or index.
    #[error("Path syntax: {0}")]
    PathSyntax(String),

    /// Missing key, index, member, method, child or object, or a null value.
    #[error("Not found: {0}")]
    Missing(String),

    /// The value exists but is not the kind a step or accessor requires.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Read-only: {0}")]
    ReadOnly(String),

    #[error("Protocol: {0}")]
    Protocol(String),

    #[error("Transport: {0}")]
    Transport(String),

    #[error("Config: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// The only class of failure a conditional (`?`) step converts into null.
    pub fn is_missing(&self) -> bool {
        matches!(self, BridgeError::Missing(_))
    }

    /// Attach the attempted path to the message, keeping the variant.
    pub fn at_path(self, path: &str) -> Self {
        let tag = |msg: String| format!("{} (path: {})", msg, path);
        match self {
            BridgeError::PathSyntax(m) => BridgeError::PathSyntax(tag(m)),
            BridgeError::Missing(m) => BridgeError::Missing(tag(m)),
            BridgeError::TypeMismatch(m) => BridgeError::TypeMismatch(tag(m)),
            BridgeError::Conversion(m) => BridgeError::Conversion(tag(m)),
            BridgeError::Invocation(m) => BridgeError::Invocation(tag(m)),
            BridgeError::ReadOnly(m) => BridgeError::ReadOnly(tag(m)),
            other => other,
        }
    }
}
