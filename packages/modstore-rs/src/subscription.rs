//! Mutation and action subscribers.
//!
//! Subscribers observe the store without taking part in routing:
//!
//! | Subscriber        | Runs                               | Can fail?                   |
//! |-------------------|------------------------------------|-----------------------------|
//! | mutation          | after every commit's handlers      | no                          |
//! | action `before`   | before the action handlers start   | yes, logged, never aborts   |
//! | action `after`    | after all handlers resolved        | yes, logged, never aborts   |
//! | action `error`    | after the first handler rejected   | yes, logged, never aborts   |
//!
//! Every notification iterates a snapshot of the subscriber list, so a
//! subscriber may unsubscribe itself (or anyone else) mid-iteration without
//! skipping or duplicating others.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

// =============================================================================
// Descriptors
// =============================================================================

/// What a mutation subscriber is told about a commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationDescriptor {
    #[serde(rename = "type")]
    pub type_name: String,
    pub payload: Value,
}

/// What an action subscriber is told about a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub type_name: String,
    pub payload: Value,
}

// =============================================================================
// Hooks
// =============================================================================

/// Called after a commit with the descriptor and the current root state.
pub type MutationSubscriberFn = Arc<dyn Fn(&MutationDescriptor, &Value) + Send + Sync>;

/// `before` / `after` action hook.
pub type ActionHookFn =
    Arc<dyn Fn(&ActionDescriptor, &Value) -> anyhow::Result<()> + Send + Sync>;

/// `error` action hook, receiving the rejection.
pub type ActionErrorHookFn =
    Arc<dyn Fn(&ActionDescriptor, &Value, &anyhow::Error) -> anyhow::Result<()> + Send + Sync>;

/// Which action hook is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Before,
    After,
    Error,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Before => write!(f, "before"),
            HookPhase::After => write!(f, "after"),
            HookPhase::Error => write!(f, "error"),
        }
    }
}

/// A set of action hooks. Any of them may be absent.
///
/// # Example
///
/// ```ignore
/// store.subscribe_action_with(
///     ActionSubscriber::new()
///         .before(|action, _state| { tracing::info!(action = %action.type_name, "start"); Ok(()) })
///         .error(|action, _state, err| { tracing::warn!(%err, "{} failed", action.type_name); Ok(()) }),
///     SubscribeOptions::default(),
/// );
/// ```
#[derive(Clone, Default)]
pub struct ActionSubscriber {
    pub(crate) before: Option<ActionHookFn>,
    pub(crate) after: Option<ActionHookFn>,
    pub(crate) error: Option<ActionErrorHookFn>,
}

impl ActionSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionDescriptor, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionDescriptor, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }

    pub fn error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionDescriptor, &Value, &anyhow::Error) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.error = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ActionSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSubscriber")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// Options for `subscribe` / `subscribe_action`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Run this subscriber before the ones already registered.
    pub prepend: bool,
}

impl SubscribeOptions {
    pub fn prepend() -> Self {
        Self { prepend: true }
    }
}

// =============================================================================
// Subscriber List
// =============================================================================

/// Ordered subscriber list with stable ids.
pub(crate) struct SubscriberList<T> {
    entries: Mutex<Vec<(u64, T)>>,
    next_id: AtomicU64,
}

impl<T: Clone> SubscriberList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(u64, T)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn add(&self, item: T, options: SubscribeOptions) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.lock();
        if options.prepend {
            entries.insert(0, (id, item));
        } else {
            entries.push((id, item));
        }
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Copy of the current list, taken before notifying.
    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.lock().iter().map(|(_, item)| item.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Returned by `subscribe`, `subscribe_action` and `watch`.
///
/// Dropping the handle does not unsubscribe; call [`unsubscribe`].
/// Unsubscribing twice is harmless.
///
/// [`unsubscribe`]: SubscriptionHandle::unsubscribe
pub struct SubscriptionHandle {
    remove: Box<dyn Fn() -> bool + Send + Sync>,
    active: AtomicBool,
}

impl SubscriptionHandle {
    pub(crate) fn new<F>(remove: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            remove: Box::new(remove),
            active: AtomicBool::new(true),
        }
    }

    /// Stop receiving notifications. Returns whether anything was removed.
    pub fn unsubscribe(&self) -> bool {
        if self.active.swap(false, Ordering::AcqRel) {
            (self.remove)()
        } else {
            false
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
