//! Testing utilities for modstore.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! modstore = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Recording Commits
//!
//! ```ignore
//! use modstore::testing::MutationRecorder;
//!
//! let recorder = MutationRecorder::attach(&store);
//! store.dispatch("cart/checkout", json!(null)).await?;
//! assert_eq!(recorder.types(), vec!["cart/clear", "orders/add"]);
//! ```
//!
//! # Recording Action Hooks
//!
//! ```ignore
//! use modstore::testing::ActionRecorder;
//!
//! let recorder = ActionRecorder::attach(&store);
//! let _ = store.dispatch("load", json!(null)).await;
//! assert_eq!(
//!     recorder.phases_for("load"),
//!     vec![HookPhase::Before, HookPhase::Error]
//! );
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::devtools::DevtoolsHook;
use crate::store::Store;
use crate::subscription::{
    ActionSubscriber, HookPhase, MutationDescriptor, SubscribeOptions, SubscriptionHandle,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Mutation Recorder
// =============================================================================

/// Records every commit with the state right after it.
#[derive(Debug)]
pub struct MutationRecorder {
    records: Arc<Mutex<Vec<(MutationDescriptor, Value)>>>,
    handle: SubscriptionHandle,
}

impl MutationRecorder {
    pub fn attach(store: &Store) -> Self {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        let handle = store.subscribe(
            move |mutation, state| {
                lock(&sink).push((mutation.clone(), state.clone()));
            },
            SubscribeOptions::default(),
        );
        Self { records, handle }
    }

    /// Committed types, in order.
    pub fn types(&self) -> Vec<String> {
        lock(&self.records)
            .iter()
            .map(|(mutation, _)| mutation.type_name.clone())
            .collect()
    }

    pub fn mutations(&self) -> Vec<MutationDescriptor> {
        lock(&self.records)
            .iter()
            .map(|(mutation, _)| mutation.clone())
            .collect()
    }

    /// Root state observed after the most recent commit.
    pub fn last_state(&self) -> Option<Value> {
        lock(&self.records).last().map(|(_, state)| state.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.records).clear();
    }

    /// Stop recording. Already recorded commits are kept.
    pub fn detach(&self) {
        self.handle.unsubscribe();
    }
}

// =============================================================================
// Action Recorder
// =============================================================================

/// One action hook invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub phase: HookPhase,
    pub type_name: String,
    pub payload: Value,
    /// The rendered error, for the `error` phase.
    pub error: Option<String>,
}

/// Records `before`, `after` and `error` hook calls.
#[derive(Debug)]
pub struct ActionRecorder {
    records: Arc<Mutex<Vec<ActionRecord>>>,
    handle: SubscriptionHandle,
}

impl ActionRecorder {
    pub fn attach(store: &Store) -> Self {
        let records = Arc::new(Mutex::new(Vec::new()));
        let before = records.clone();
        let after = records.clone();
        let errors = records.clone();

        let handle = store.subscribe_action_with(
            ActionSubscriber::new()
                .before(move |action, _| {
                    lock(&before).push(ActionRecord {
                        phase: HookPhase::Before,
                        type_name: action.type_name.clone(),
                        payload: action.payload.clone(),
                        error: None,
                    });
                    Ok(())
                })
                .after(move |action, _| {
                    lock(&after).push(ActionRecord {
                        phase: HookPhase::After,
                        type_name: action.type_name.clone(),
                        payload: action.payload.clone(),
                        error: None,
                    });
                    Ok(())
                })
                .error(move |action, _, err| {
                    lock(&errors).push(ActionRecord {
                        phase: HookPhase::Error,
                        type_name: action.type_name.clone(),
                        payload: action.payload.clone(),
                        error: Some(format!("{err:#}")),
                    });
                    Ok(())
                }),
            SubscribeOptions::default(),
        );

        Self { records, handle }
    }

    pub fn records(&self) -> Vec<ActionRecord> {
        lock(&self.records).clone()
    }

    /// Phases seen for one action type, in order.
    pub fn phases_for(&self, type_name: &str) -> Vec<HookPhase> {
        lock(&self.records)
            .iter()
            .filter(|record| record.type_name == type_name)
            .map(|record| record.phase)
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    pub fn detach(&self) {
        self.handle.unsubscribe();
    }
}

// =============================================================================
// Recording Devtools
// =============================================================================

/// A [`DevtoolsHook`] that keeps every event.
///
/// Clones share one event log, so keep a clone and hand the other to the
/// builder:
///
/// ```ignore
/// let devtools = RecordingDevtools::new();
/// let store = Store::builder(root)
///     .devtools(true)
///     .devtools_hook(devtools.clone())
///     .build();
/// assert_eq!(devtools.event_names(), vec!["modstore:init"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingDevtools {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingDevtools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        lock(&self.events).clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Payloads of every event named `event`.
    pub fn payloads(&self, event: &str) -> Vec<Value> {
        lock(&self.events)
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl DevtoolsHook for RecordingDevtools {
    fn emit(&self, event: &str, payload: &Value) {
        lock(&self.events).push((event.to_string(), payload.clone()));
    }
}
