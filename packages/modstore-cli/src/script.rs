//! Script steps run against a store.
//!
//! A script is a JSON array of steps, each tagged by `"step"`:
//!
//! ```json
//! [
//!   { "step": "commit", "type": "cart/add", "payload": "apple" },
//!   { "step": "dispatch", "type": "cart/checkout" },
//!   { "step": "register", "path": ["wishlist"], "module": { "state": {} } },
//!   { "step": "unregister", "path": ["wishlist"] },
//!   { "step": "hot_update", "layout": { "modules": { } } },
//!   { "step": "print", "getter": "cart/count" }
//! ]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use modstore::{ModulePath, ModuleSpec, RegisterOptions, Store};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Commit {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        payload: Value,
    },
    Dispatch {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        payload: Value,
    },
    Register {
        path: Vec<String>,
        module: Value,
        #[serde(default)]
        preserve_state: bool,
    },
    Unregister {
        path: Vec<String>,
    },
    HotUpdate {
        layout: Value,
    },
    /// Print a getter, or the whole state when no getter is named.
    Print {
        #[serde(default)]
        getter: Option<String>,
    },
}

impl Step {
    pub fn describe(&self) -> String {
        match self {
            Step::Commit { type_name, .. } => format!("commit {type_name}"),
            Step::Dispatch { type_name, .. } => format!("dispatch {type_name}"),
            Step::Register { path, .. } => format!("register {}", ModulePath::new(path)),
            Step::Unregister { path } => format!("unregister {}", ModulePath::new(path)),
            Step::HotUpdate { .. } => "hot_update".to_string(),
            Step::Print { getter: Some(name) } => format!("print {name}"),
            Step::Print { getter: None } => "print state".to_string(),
        }
    }
}

/// What a step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    /// Something was removed (`true`) or left alone (`false`).
    Removed(bool),
    /// A value to show: a dispatch result or a printed value.
    Value(Value),
}

pub fn load(path: &Path) -> Result<Vec<Step>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid script {}", path.display()))
}

pub async fn execute(store: &Store, step: Step) -> Result<Outcome> {
    debug!(step = %step.describe(), "executing step");

    match step {
        Step::Commit { type_name, payload } => {
            store.commit(&type_name, payload);
            Ok(Outcome::Done)
        }
        Step::Dispatch { type_name, payload } => {
            let result = store
                .dispatch(&type_name, payload)
                .await
                .with_context(|| format!("Action {type_name} failed"))?;
            Ok(Outcome::Value(result))
        }
        Step::Register {
            path,
            module,
            preserve_state,
        } => {
            let spec = ModuleSpec::from_layout(module).context("Invalid module layout")?;
            store.register_module(path, spec, RegisterOptions { preserve_state })?;
            Ok(Outcome::Done)
        }
        Step::Unregister { path } => Ok(Outcome::Removed(store.unregister_module(path))),
        Step::HotUpdate { layout } => {
            let spec = ModuleSpec::from_layout(layout).context("Invalid hot update layout")?;
            store.hot_update(spec)?;
            Ok(Outcome::Done)
        }
        Step::Print { getter: Some(name) } => Ok(Outcome::Value(
            store.getter(&name).unwrap_or(Value::Null),
        )),
        Step::Print { getter: None } => Ok(Outcome::Value(Value::clone(&store.state()))),
    }
}
