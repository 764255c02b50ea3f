//! Reactive projection of state and getters.
//!
//! The store does not cache getter results itself. On every rebuild it hands
//! a [`Projection`] the shared state and a flat map of wrapped getters, and
//! reads getters back through the returned [`ProjectionHandle`].
//!
//! # Contract
//!
//! 1. `bind` receives fully-qualified name → zero-argument getter.
//! 2. `read` recomputes a getter no more often than the state changes.
//! 3. `on_change` listeners fire synchronously after every state write.
//! 4. After a rebuild the store swaps in the new handle first and calls
//!    `teardown` on the old one afterwards, so reads in flight during the
//!    swap still see a consistent binding.
//!
//! [`MemoProjection`] is the default: it memoizes each getter against the
//! state version.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::state::{ChangeListener, ListenerId, SharedState};

/// A getter with its arguments already bound.
pub type WrappedGetter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Fully-qualified getter name → wrapped getter.
pub type GetterMap = IndexMap<String, WrappedGetter>;

/// Strategy that makes state and getters observable.
pub trait Projection: Send + Sync {
    fn bind(&self, state: SharedState, getters: GetterMap) -> Arc<dyn ProjectionHandle>;
}

/// A live binding produced by [`Projection::bind`].
pub trait ProjectionHandle: Send + Sync {
    /// Current value of a getter, `None` if the name is unknown.
    fn read(&self, name: &str) -> Option<Value>;

    /// Getter names in registration order.
    fn names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }

    /// Be told synchronously about every state change.
    fn on_change(&self, listener: ChangeListener) -> ListenerId;

    /// Drop cached values and listeners.
    fn teardown(&self);
}

// =============================================================================
// Memo Projection
// =============================================================================

/// Version-tagged memoization.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoProjection;

impl Projection for MemoProjection {
    fn bind(&self, state: SharedState, getters: GetterMap) -> Arc<dyn ProjectionHandle> {
        Arc::new(MemoHandle {
            state,
            getters,
            cache: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        })
    }
}

struct MemoHandle {
    state: SharedState,
    getters: GetterMap,
    cache: Mutex<HashMap<String, (u64, Value)>>,
    listeners: Mutex<Vec<ListenerId>>,
    torn_down: AtomicBool,
}

impl MemoHandle {
    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, (u64, Value)>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProjectionHandle for MemoHandle {
    fn read(&self, name: &str) -> Option<Value> {
        let getter = self.getters.get(name)?;
        let version = self.state.version();

        if let Some((cached_at, value)) = self.lock_cache().get(name) {
            if *cached_at == version {
                return Some(value.clone());
            }
        }

        // Computed without the cache lock: getters read other getters.
        let value = getter();
        trace!(getter = name, version, "getter recomputed");

        if !self.torn_down.load(Ordering::Acquire) {
            self.lock_cache()
                .insert(name.to_string(), (version, value.clone()));
        }
        Some(value)
    }

    fn names(&self) -> Vec<String> {
        self.getters.keys().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.getters.contains_key(name)
    }

    fn on_change(&self, listener: ChangeListener) -> ListenerId {
        let id = self.state.on_change(listener);
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(id);
        id
    }

    fn teardown(&self) {
        self.torn_down.store(true, Ordering::Release);
        let ids: Vec<ListenerId> = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for id in ids {
            self.state.remove_listener(id);
        }
        self.lock_cache().clear();
    }
}

impl fmt::Debug for MemoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoHandle")
            .field("getters", &self.getters.len())
            .field("torn_down", &self.torn_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
