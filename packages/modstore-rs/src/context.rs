//! Scoped views of the store handed to handlers.
//!
//! - [`LocalContext`]: a module's namespace-prefixed commit/dispatch plus
//!   lazy access to its state slice and getters.
//! - [`LocalGetters`]: the getters under one namespace, by local name.
//! - [`Getters`]: every getter, by fully-qualified name.
//! - [`ActionContext`]: what an action handler receives.
//!
//! Everything here resolves against the live store on each call. Nothing is
//! captured at construction except the namespace and path, so a context stays
//! correct across `replace_state` and hot updates.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::{self, FutureExt};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{HandlerKind, StoreError};
use crate::path::ModulePath;
use crate::state::resolve;
use crate::store::{CommitOptions, DispatchFuture, DispatchOptions, Store, StoreInner};

// =============================================================================
// Local Context
// =============================================================================

/// A module's view of the store.
pub struct LocalContext {
    store: Weak<StoreInner>,
    namespace: String,
    path: ModulePath,
}

impl LocalContext {
    pub(crate) fn new(store: Weak<StoreInner>, namespace: String, path: ModulePath) -> Self {
        Self {
            store,
            namespace,
            path,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    fn store(&self) -> Option<Store> {
        self.store.upgrade().map(Store::from_inner)
    }

    /// The module's state slice, looked up in the current root.
    pub fn state(&self) -> Value {
        let Some(inner) = self.store.upgrade() else {
            return Value::Null;
        };
        let root = inner.state.snapshot();
        resolve(&root, &self.path).cloned().unwrap_or(Value::Null)
    }

    /// Getters under this module's namespace, by local name.
    pub fn getters(&self) -> LocalGetters {
        match self.store.upgrade() {
            Some(inner) => inner.local_getters(&self.namespace),
            None => LocalGetters::empty(),
        }
    }

    pub fn commit(&self, type_name: &str, payload: Value) {
        self.commit_with(type_name, payload, CommitOptions::default());
    }

    /// Commit `type_name` under this namespace, or unprefixed with `root`.
    ///
    /// A name that does not resolve is reported and dropped.
    pub fn commit_with(&self, type_name: &str, payload: Value, options: CommitOptions) {
        let Some(store) = self.store() else {
            debug!(type_name, "commit on a dropped store ignored");
            return;
        };

        if options.root || self.namespace.is_empty() {
            store.commit_with(type_name, payload, options);
            return;
        }

        let global = format!("{}{}", self.namespace, type_name);
        if !store.inner.registry().has_mutation(&global) {
            store.inner.diagnostics.report(StoreError::UnknownLocalType {
                kind: HandlerKind::Mutation,
                local: type_name.to_string(),
                global,
            });
            return;
        }
        store.commit_with(&global, payload, options);
    }

    pub fn dispatch(&self, type_name: &str, payload: Value) -> DispatchFuture {
        self.dispatch_with(type_name, payload, DispatchOptions::default())
    }

    /// Dispatch `type_name` under this namespace, or unprefixed with `root`.
    ///
    /// A name that does not resolve is reported and resolves to `Null`.
    pub fn dispatch_with(
        &self,
        type_name: &str,
        payload: Value,
        options: DispatchOptions,
    ) -> DispatchFuture {
        let Some(store) = self.store() else {
            debug!(type_name, "dispatch on a dropped store ignored");
            return future::ready(Ok(Value::Null)).boxed();
        };

        if options.root || self.namespace.is_empty() {
            return store.dispatch(type_name, payload);
        }

        let global = format!("{}{}", self.namespace, type_name);
        if !store.inner.registry().has_action(&global) {
            store.inner.diagnostics.report(StoreError::UnknownLocalType {
                kind: HandlerKind::Action,
                local: type_name.to_string(),
                global,
            });
            return future::ready(Ok(Value::Null)).boxed();
        }
        store.dispatch(&global, payload)
    }
}

impl fmt::Debug for LocalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalContext")
            .field("namespace", &self.namespace)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Getters
// =============================================================================

/// Getters under one namespace, keyed by local name.
///
/// Values are read lazily through the store's projection.
#[derive(Clone)]
pub struct LocalGetters {
    store: Weak<StoreInner>,
    namespace: String,
    names: Arc<IndexMap<String, String>>,
}

impl LocalGetters {
    /// View of every getter whose global name starts with `namespace`.
    pub(crate) fn new<'a>(
        store: Weak<StoreInner>,
        namespace: &str,
        global_names: impl Iterator<Item = &'a String>,
    ) -> Self {
        let names = global_names
            .filter_map(|global| {
                global
                    .strip_prefix(namespace)
                    .map(|local| (local.to_string(), global.clone()))
            })
            .collect();
        Self {
            store,
            namespace: namespace.to_string(),
            names: Arc::new(names),
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            store: Weak::new(),
            namespace: String::new(),
            names: Arc::new(IndexMap::new()),
        }
    }

    /// Read a getter by local name. Unknown names are reported.
    pub fn get(&self, local: &str) -> Option<Value> {
        let inner = self.store.upgrade()?;
        match self.names.get(local) {
            Some(global) => inner.read_getter(global),
            None => {
                inner.diagnostics.report(StoreError::UnknownType {
                    kind: HandlerKind::Getter,
                    type_name: format!("{}{}", self.namespace, local),
                });
                None
            }
        }
    }

    /// Local names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }

    pub fn contains(&self, local: &str) -> bool {
        self.names.contains_key(local)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for LocalGetters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalGetters")
            .field("namespace", &self.namespace)
            .field("names", &self.names.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Every getter, keyed by fully-qualified name.
#[derive(Clone)]
pub struct Getters {
    store: Weak<StoreInner>,
}

impl Getters {
    pub(crate) fn new(store: Weak<StoreInner>) -> Self {
        Self { store }
    }

    /// Read a getter. Unknown names are reported.
    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.store.upgrade()?;
        let value = inner.read_getter(name);
        if value.is_none() {
            inner.diagnostics.report(StoreError::UnknownType {
                kind: HandlerKind::Getter,
                type_name: name.to_string(),
            });
        }
        value
    }

    pub fn names(&self) -> Vec<String> {
        self.store
            .upgrade()
            .and_then(|inner| inner.binding())
            .map(|binding| binding.names())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.store
            .upgrade()
            .map(|inner| inner.registry().has_getter(name))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Getters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Getters").finish_non_exhaustive()
    }
}

// =============================================================================
// Action Context
// =============================================================================

/// Passed to every action handler: the module's scoped operations plus the
/// root state and getters.
#[derive(Clone)]
pub struct ActionContext {
    store: Store,
    local: Arc<LocalContext>,
}

impl ActionContext {
    pub(crate) fn new(store: Store, local: Arc<LocalContext>) -> Self {
        Self { store, local }
    }

    pub fn commit(&self, type_name: &str, payload: Value) {
        self.local.commit(type_name, payload);
    }

    pub fn commit_with(&self, type_name: &str, payload: Value, options: CommitOptions) {
        self.local.commit_with(type_name, payload, options);
    }

    pub fn dispatch(&self, type_name: &str, payload: Value) -> DispatchFuture {
        self.local.dispatch(type_name, payload)
    }

    pub fn dispatch_with(
        &self,
        type_name: &str,
        payload: Value,
        options: DispatchOptions,
    ) -> DispatchFuture {
        self.local.dispatch_with(type_name, payload, options)
    }

    /// The declaring module's state slice.
    pub fn state(&self) -> Value {
        self.local.state()
    }

    pub fn getters(&self) -> LocalGetters {
        self.local.getters()
    }

    pub fn root_state(&self) -> Arc<Value> {
        self.store.state()
    }

    pub fn root_getters(&self) -> Getters {
        self.store.getters()
    }

    pub fn namespace(&self) -> &str {
        self.local.namespace()
    }

    pub fn path(&self) -> &ModulePath {
        self.local.path()
    }

    /// The store itself.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}
