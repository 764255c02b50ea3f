//! The live state tree.
//!
//! `SharedState` is a versioned copy-on-write cell around the root value.
//! Readers take a cheap `Arc` snapshot; writers mutate through
//! [`SharedState::write`], which bumps the version and then notifies change
//! listeners with the write lock already released, so a listener may read
//! the state or start another write.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde_json::Value;

use crate::path::ModulePath;

/// Identifies a registered change listener.
pub type ListenerId = u64;

/// Called with the new version after every write.
pub type ChangeListener = Arc<dyn Fn(u64) + Send + Sync>;

struct StateCell {
    value: RwLock<Arc<Value>>,
    version: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
    next_listener: AtomicU64,
}

/// Cloneable handle to the root state.
#[derive(Clone)]
pub struct SharedState {
    cell: Arc<StateCell>,
}

impl SharedState {
    pub fn new(initial: Value) -> Self {
        Self {
            cell: Arc::new(StateCell {
                value: RwLock::new(Arc::new(initial)),
                version: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// The current root value.
    pub fn snapshot(&self) -> Arc<Value> {
        self.cell
            .value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Incremented on every write, replace and touch.
    pub fn version(&self) -> u64 {
        self.cell.version.load(Ordering::Acquire)
    }

    /// Mutate the root in place.
    ///
    /// Outstanding snapshots are unaffected; the value is cloned first if
    /// anyone still holds one.
    pub fn write<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let result = {
            let mut guard = self
                .cell
                .value
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            f(Arc::make_mut(&mut guard))
        };
        self.bump();
        result
    }

    /// Swap the whole root.
    pub fn replace(&self, value: Value) {
        {
            let mut guard = self
                .cell
                .value
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Arc::new(value);
        }
        self.bump();
    }

    /// Bump the version without changing anything, forcing every cached
    /// derivation to recompute.
    pub fn touch(&self) {
        self.bump();
    }

    pub fn on_change(&self, listener: ChangeListener) -> ListenerId {
        let id = self.cell.next_listener.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, ChangeListener)>> {
        self.cell
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        let version = self.cell.version.fetch_add(1, Ordering::AcqRel) + 1;
        let listeners: Vec<ChangeListener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(version);
        }
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedState")
            .field("version", &self.version())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

/// Walk object keys from `root` along `path`.
pub fn resolve<'a>(root: &'a Value, path: &ModulePath) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, key| value.get(key.as_str()))
}

/// Mutable version of [`resolve`].
pub fn resolve_mut<'a>(root: &'a mut Value, path: &ModulePath) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(root, |value, key| value.get_mut(key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_write_bumps_version_and_notifies() {
        let state = SharedState::new(json!({ "count": 0 }));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        state.on_change(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        state.write(|root| root["count"] = json!(1));

        assert_eq!(state.version(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.snapshot()["count"], json!(1));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let state = SharedState::new(json!({ "count": 0 }));
        let before = state.snapshot();
        state.write(|root| root["count"] = json!(5));

        assert_eq!(before["count"], json!(0));
        assert_eq!(state.snapshot()["count"], json!(5));
    }

    #[test]
    fn test_listener_can_write_again() {
        let state = SharedState::new(json!({ "a": 0, "b": 0 }));
        let inner = state.clone();
        state.on_change(Arc::new(move |_| {
            if inner.snapshot()["b"] == json!(0) {
                inner.write(|root| root["b"] = json!(1));
            }
        }));

        state.write(|root| root["a"] = json!(1));
        assert_eq!(*state.snapshot(), json!({ "a": 1, "b": 1 }));
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn test_remove_listener() {
        let state = SharedState::new(json!({}));
        let id = state.on_change(Arc::new(|_| {}));
        assert!(state.remove_listener(id));
        assert!(!state.remove_listener(id));
        assert_eq!(state.listener_count(), 0);
    }

    #[test]
    fn test_touch_and_replace() {
        let state = SharedState::new(json!({}));
        state.touch();
        state.replace(json!({ "fresh": true }));
        assert_eq!(state.version(), 2);
        assert_eq!(state.snapshot()["fresh"], json!(true));
    }

    #[test]
    fn test_resolve_paths() {
        let mut root = json!({ "cart": { "items": [1] } });
        let items = ModulePath::from(["cart", "items"]);

        assert_eq!(resolve(&root, &items), Some(&json!([1])));
        assert_eq!(resolve(&root, &ModulePath::root()), Some(&root.clone()));
        assert!(resolve(&root, &ModulePath::from("missing")).is_none());

        if let Some(slot) = resolve_mut(&mut root, &items) {
            *slot = json!([]);
        }
        assert_eq!(root, json!({ "cart": { "items": [] } }));
    }
}
