//! Handlers that layouts loaded by the CLI can refer to by name.
//!
//! | Name        | Kind     | Payload                              |
//! |-------------|----------|--------------------------------------|
//! | `assign`    | mutation | `{ "key": k, "value": v }`           |
//! | `increment` | mutation | `{ "key": k, "by": n }` (`by` = 1)   |
//! | `push`      | mutation | `{ "key": k, "value": v }`           |
//! | `reset`     | mutation | object replacing the slice, or null  |
//! | `forward`   | action   | `{ "type": t, "payload": p, "root" }`|
//! | `snapshot`  | getter   | the module's slice                   |
//! | `size`      | getter   | number of fields in the slice        |

use modstore::{Action, CommitOptions, HandlerCatalog};
use serde_json::{json, Map, Value};

pub fn builtin() -> HandlerCatalog {
    HandlerCatalog::new()
        .with_mutation("assign", assign)
        .with_mutation("increment", increment)
        .with_mutation("push", push)
        .with_mutation("reset", reset)
        .with_action("forward", Action::sync(|ctx, payload| {
            let Some(type_name) = payload["type"].as_str() else {
                anyhow::bail!("forward needs a string \"type\", got {}", payload["type"]);
            };
            let options = CommitOptions {
                root: payload["root"].as_bool().unwrap_or(false),
                ..CommitOptions::default()
            };
            ctx.commit_with(type_name, payload["payload"].clone(), options);
            Ok(Value::Null)
        }))
        .with_getter("snapshot", |state, _, _, _| state.clone())
        .with_getter("size", |state, _, _, _| {
            json!(state.as_object().map(Map::len).unwrap_or(0))
        })
}

fn key_of(payload: &Value) -> Option<&str> {
    payload["key"].as_str()
}

fn assign(state: &mut Value, payload: &Value) {
    if let (Some(key), Some(slice)) = (key_of(payload), state.as_object_mut()) {
        slice.insert(key.to_string(), payload["value"].clone());
    }
}

fn increment(state: &mut Value, payload: &Value) {
    let Some(key) = key_of(payload) else {
        return;
    };
    let by = payload["by"].as_i64().unwrap_or(1);
    let current = state[key].as_i64().unwrap_or(0);
    state[key] = json!(current + by);
}

fn push(state: &mut Value, payload: &Value) {
    let Some(key) = key_of(payload) else {
        return;
    };
    if !state[key].is_array() {
        state[key] = json!([]);
    }
    if let Some(list) = state[key].as_array_mut() {
        list.push(payload["value"].clone());
    }
}

fn reset(state: &mut Value, payload: &Value) {
    *state = match payload {
        Value::Object(_) => payload.clone(),
        _ => json!({}),
    };
}
