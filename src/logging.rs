//! Log subscriber
//!
//! `RUST_LOG` filters (default `info`). `HOSTBRIDGE_LOG` picks the line
//! format: `compact` (default), `pretty` or `json`.
//!
//! The router handles each inbound envelope inside an `envelope` span with
//! `event` and `id` fields, so anything logged while dispatching names the
//! object it was working on; JSON output carries the span as `span`. Lines
//! forwarded by the peer (`Log` events) use the `peer` target, e.g.
//! `RUST_LOG=info,peer=warn`. Output goes to stderr, stdout belongs to the
//! CLI and to `serve`'s outbound batches.

use crate::error::BridgeError;
use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "HOSTBRIDGE_LOG";
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(BridgeError::Config(format!(
                "{} must be compact, pretty or json, got '{}'",
                ENV_LOG_FORMAT, other
            ))),
        }
    }
}

pub fn init_logging() {
    let requested = std::env::var(ENV_LOG_FORMAT).unwrap_or_default();
    let (format, rejected) = match requested.parse::<LogFormat>() {
        Ok(format) => (format, None),
        Err(e) => (LogFormat::default(), Some(e)),
    };
    init_with(format);

    if let Some(e) = rejected {
        tracing::warn!(error = %e, "falling back to compact logs");
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_with(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().with_current_span(true).with_span_list(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().with_target(true).try_init(),
    };
}
