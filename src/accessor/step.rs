//! Path step parser
//!
//! `step := prefix? (':' body)? suffix*`, `suffix := '?' | '!'`.
//! Suffixes are stripped first (any order, any count), then a step with a
//! `%` is percent-decoded as a whole, then split on the first `:`.

use crate::core::paths::{prefix, suffix};
use crate::error::{BridgeError, BridgeResult};
use percent_encoding::percent_decode_str;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub prefix: String,
    pub body: String,
    /// `?`: a missing or null value ends the path with null
    pub conditional: bool,
    /// `!`: the assigned value is a path to read, not the value itself
    pub indirect: bool,
}

impl PathStep {
    pub fn parse(raw: &str) -> BridgeResult<Self> {
        let mut conditional = false;
        let mut indirect = false;
        let mut rest = raw;
        loop {
            if let Some(stripped) = rest.strip_suffix(suffix::CONDITIONAL) {
                conditional = true;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_suffix(suffix::INDIRECT) {
                indirect = true;
                rest = stripped;
            } else {
                break;
            }
        }

        let decoded = if rest.contains('%') {
            percent_decode_str(rest)
                .decode_utf8()
                .map_err(|e| BridgeError::PathSyntax(format!("bad percent-encoding in '{}': {}", raw, e)))?
                .into_owned()
        } else {
            rest.to_string()
        };

        if decoded.is_empty() {
            return Err(BridgeError::PathSyntax(format!("empty step '{}'", raw)));
        }

        let (prefix, body) = match decoded.split_once(':') {
            Some((p, b)) => (p.to_string(), b.to_string()),
            None => (prefix::DEFAULT.to_string(), decoded),
        };

        Ok(PathStep { prefix, body, conditional, indirect })
    }
}

impl FromStr for PathStep {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathStep::parse(s)
    }
}

/// Raw steps of a path.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
}
