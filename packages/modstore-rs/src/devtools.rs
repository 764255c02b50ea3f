//! Devtools event stream.
//!
//! When enabled, the store reports its activity to a [`DevtoolsHook`]:
//!
//! | Event               | Payload                               |
//! |---------------------|---------------------------------------|
//! | `modstore:init`     | root state at construction            |
//! | `modstore:mutation` | `{ "mutation": {type, payload}, "state" }` |
//! | `modstore:action`   | `{ "action": {type, payload}, "state" }`   |
//! | `modstore:error`    | `{ "action": {type, payload}, "error" }`   |
//!
//! Time travel goes the other way, through [`Store::travel_to_state`].

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::store::Store;
use crate::subscription::{ActionSubscriber, SubscribeOptions};

pub const INIT_EVENT: &str = "modstore:init";
pub const MUTATION_EVENT: &str = "modstore:mutation";
pub const ACTION_EVENT: &str = "modstore:action";
pub const ERROR_EVENT: &str = "modstore:error";

/// Receives devtools events.
pub trait DevtoolsHook: Send + Sync {
    fn emit(&self, event: &str, payload: &Value);
}

impl<F> DevtoolsHook for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn emit(&self, event: &str, payload: &Value) {
        self(event, payload)
    }
}

/// Emit `init` and subscribe the hook ahead of every other subscriber.
pub(crate) fn attach(store: &Store, hook: Arc<dyn DevtoolsHook>) {
    hook.emit(INIT_EVENT, &store.state());

    let mutations = hook.clone();
    store.subscribe(
        move |mutation, state| {
            mutations.emit(MUTATION_EVENT, &json!({ "mutation": mutation, "state": state }));
        },
        SubscribeOptions::prepend(),
    );

    let actions = hook.clone();
    let errors = hook;
    store.subscribe_action_with(
        ActionSubscriber::new()
            .before(move |action, state| {
                actions.emit(ACTION_EVENT, &json!({ "action": action, "state": state }));
                Ok(())
            })
            .error(move |action, _state, err| {
                errors.emit(
                    ERROR_EVENT,
                    &json!({ "action": action, "error": format!("{err:#}") }),
                );
                Ok(())
            }),
        SubscribeOptions::prepend(),
    );

    debug!("devtools attached");
}
