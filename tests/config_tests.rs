//! Config Tests: file loading and environment overrides
//!
//! Environment variables are process-wide, so every test that touches them
//! holds ENV_LOCK.

use hostbridge::bridge::config::{ENV_OUTBOUND_MAX, ENV_TICK_MS, ENV_TITLE, ENV_WAIT_FOR_PEER};
use hostbridge::{BridgeConfig, BridgeError};
use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}

fn clear_env() {
    for key in [ENV_TICK_MS, ENV_OUTBOUND_MAX, ENV_TITLE, ENV_WAIT_FOR_PEER] {
        std::env::remove_var(key);
    }
}

#[test]
fn load_keeps_defaults_for_missing_keys() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bridge.json");
    std::fs::write(&path, r#"{"tick_interval_ms": 50, "title": "demo"}"#).unwrap();

    let config = BridgeConfig::load(&path).expect("load");
    assert_eq!(config.tick_interval(), Duration::from_millis(50));
    assert_eq!(config.title, "demo");
    assert_eq!(config.inbound_batch_max, 100);
    assert!(config.wait_for_peer);
}

#[test]
fn load_rejects_bad_files() {
    let dir = TempDir::new().expect("tempdir");

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "tick = 5").unwrap();
    assert!(matches!(BridgeConfig::load(&garbage), Err(BridgeError::Config(_))));

    let zero = dir.path().join("zero.json");
    std::fs::write(&zero, r#"{"outbound_batch_max": 0}"#).unwrap();
    assert!(matches!(BridgeConfig::load(&zero), Err(BridgeError::Config(_))));

    let missing = dir.path().join("missing.json");
    assert!(matches!(BridgeConfig::load(&missing), Err(BridgeError::Io(_))));
}

#[test]
fn env_overrides_file_values() {
    let _guard = lock_env();
    clear_env();
    std::env::set_var(ENV_TICK_MS, "5");
    std::env::set_var(ENV_WAIT_FOR_PEER, "off");
    std::env::set_var(ENV_TITLE, "from-env");

    let config = BridgeConfig::default().with_tick_interval_ms(40).apply_env();
    clear_env();

    let config = config.expect("apply_env");
    assert_eq!(config.tick_interval_ms, 5);
    assert!(!config.wait_for_peer);
    assert_eq!(config.title, "from-env");
    assert_eq!(config.outbound_batch_max, 100);
}

#[test]
fn env_rejects_invalid_values() {
    let _guard = lock_env();
    clear_env();

    std::env::set_var(ENV_TICK_MS, "soon");
    let result = BridgeConfig::default().apply_env();
    clear_env();
    assert!(matches!(result, Err(BridgeError::Config(_))));

    std::env::set_var(ENV_WAIT_FOR_PEER, "maybe");
    let result = BridgeConfig::default().apply_env();
    clear_env();
    assert!(matches!(result, Err(BridgeError::Config(_))));

    std::env::set_var(ENV_OUTBOUND_MAX, "0");
    let result = BridgeConfig::default().apply_env();
    clear_env();
    assert!(matches!(result, Err(BridgeError::Config(_))));
}

#[test]
fn blank_env_values_are_ignored() {
    let _guard = lock_env();
    clear_env();
    std::env::set_var(ENV_TITLE, "   ");
    let config = BridgeConfig::default().apply_env();
    clear_env();
    assert_eq!(config.expect("apply_env").title, "hostbridge");
}
