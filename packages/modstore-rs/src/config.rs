use std::env;

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;

use crate::diagnostics::DEFAULT_DIAGNOSTICS_CAPACITY;

pub const STRICT_VAR: &str = "MODSTORE_STRICT";
pub const DEVTOOLS_VAR: &str = "MODSTORE_DEVTOOLS";
pub const DIAGNOSTICS_CAPACITY_VAR: &str = "MODSTORE_DIAGNOSTICS_CAPACITY";

/// Store settings that may come from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Report state changes made outside a commit.
    pub strict: bool,
    /// Wire the devtools hook, when one is supplied.
    pub devtools: bool,
    /// How many diagnostics to retain.
    pub diagnostics_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strict: false,
            devtools: false,
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            strict: match lookup(STRICT_VAR) {
                Some(raw) => parse_flag(STRICT_VAR, &raw)?,
                None => defaults.strict,
            },
            devtools: match lookup(DEVTOOLS_VAR) {
                Some(raw) => parse_flag(DEVTOOLS_VAR, &raw)?,
                None => defaults.devtools,
            },
            diagnostics_capacity: match lookup(DIAGNOSTICS_CAPACITY_VAR) {
                Some(raw) => raw.trim().parse().with_context(|| {
                    format!("{DIAGNOSTICS_CAPACITY_VAR} must be a valid number")
                })?,
                None => defaults.diagnostics_capacity,
            },
        })
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key} must be a boolean, got {other:?}"),
    }
}
