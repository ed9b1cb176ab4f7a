//! Bridge configuration
//!
//! Built in code with `with_*`, loaded from a JSON file, then optionally
//! overridden from `HOSTBRIDGE_*` environment variables.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_TICK_MS: &str = "HOSTBRIDGE_TICK_MS";
pub const ENV_INBOUND_MAX: &str = "HOSTBRIDGE_INBOUND_MAX";
pub const ENV_OUTBOUND_MAX: &str = "HOSTBRIDGE_OUTBOUND_MAX";
pub const ENV_WAIT_FOR_PEER: &str = "HOSTBRIDGE_WAIT_FOR_PEER";
pub const ENV_TITLE: &str = "HOSTBRIDGE_TITLE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Fixed tick period of the pump
    pub tick_interval_ms: u64,
    /// Raw inbound batches drained per tick
    pub inbound_batch_max: usize,
    /// Envelopes flushed per tick
    pub outbound_batch_max: usize,
    /// Hold outbound envelopes until the peer sends `StartedPeer`
    pub wait_for_peer: bool,
    /// Exposed as `title` on the root object
    pub title: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20, // 50 Hz
            inbound_batch_max: 100,
            outbound_batch_max: 100,
            wait_for_peer: true,
            title: "hostbridge".into(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self { self.tick_interval_ms = ms; self }
    pub fn with_inbound_batch_max(mut self, n: usize) -> Self { self.inbound_batch_max = n; self }
    pub fn with_outbound_batch_max(mut self, n: usize) -> Self { self.outbound_batch_max = n; self }
    pub fn with_wait_for_peer(mut self, wait: bool) -> Self { self.wait_for_peer = wait; self }
    pub fn with_title(mut self, title: impl Into<String>) -> Self { self.title = title.into(); self }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: BridgeConfig = serde_json::from_str(&text)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from the environment.
    pub fn apply_env(mut self) -> BridgeResult<Self> {
        if let Some(ms) = env_parse::<u64>(ENV_TICK_MS)? {
            self.tick_interval_ms = ms;
        }
        if let Some(n) = env_parse::<usize>(ENV_INBOUND_MAX)? {
            self.inbound_batch_max = n;
        }
        if let Some(n) = env_parse::<usize>(ENV_OUTBOUND_MAX)? {
            self.outbound_batch_max = n;
        }
        if let Some(raw) = env_value(ENV_WAIT_FOR_PEER) {
            self.wait_for_peer = parse_flag(&raw)
                .ok_or_else(|| BridgeError::Config(format!("{}: expected a boolean, got '{}'", ENV_WAIT_FOR_PEER, raw)))?;
        }
        if let Some(title) = env_value(ENV_TITLE) {
            self.title = title;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(BridgeError::Config("tick_interval_ms must be positive".into()));
        }
        if self.inbound_batch_max == 0 || self.outbound_batch_max == 0 {
            return Err(BridgeError::Config("batch limits must be positive".into()));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> BridgeResult<Option<T>> {
    match env_value(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| BridgeError::Config(format!("{}: invalid value '{}'", key, raw))),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        assert_eq!(config.inbound_batch_max, 100);
        assert_eq!(config.outbound_batch_max, 100);
        assert!(config.wait_for_peer);
    }

    #[test]
    fn builder() {
        let config = BridgeConfig::new()
            .with_tick_interval_ms(5)
            .with_wait_for_peer(false)
            .with_title("scene");
        assert_eq!(config.tick_interval_ms, 5);
        assert!(!config.wait_for_peer);
        assert_eq!(config.title, "scene");
        assert!(config.validate().is_ok());
        assert!(BridgeConfig::new().with_tick_interval_ms(0).validate().is_err());
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag("On"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
