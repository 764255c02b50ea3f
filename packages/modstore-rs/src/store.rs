//! The store: module tree, registry, and the commit/dispatch engine.
//!
//! # Lifecycle
//!
//! ```text
//! StoreBuilder::build()
//!     │
//!     ├─► ModuleTree::new(root spec)      resolve handlers, evaluate state
//!     ├─► install(root)                   registry + local contexts
//!     ├─► attach state slices             parent object ← child state
//!     ├─► reset_binding()                 projection.bind(state, getters)
//!     ├─► plugins                         in order
//!     └─► devtools                        when enabled
//! ```
//!
//! # Locks
//!
//! The tree, registry and binding live behind `RwLock`s, always taken in
//! that order and never held while user code runs. The registry is an
//! `Arc<Registry>` replaced wholesale on every rebuild, so a commit or
//! dispatch in flight keeps the registry it started with.
//!
//! Mutation handlers are the one exception: they run under the state write
//! lock and only ever see `&mut Value`.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::task::noop_waker_ref;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::context::{ActionContext, Getters, LocalContext, LocalGetters};
use crate::devtools::{self, DevtoolsHook};
use crate::diagnostics::{Diagnostics, DEFAULT_DIAGNOSTICS_CAPACITY};
use crate::error::{HandlerKind, StoreError};
use crate::handler::{ActionFuture, HandlerCatalog};
use crate::install::{attach_state, install_module, StateAttachment};
use crate::module::ModuleTree;
use crate::path::ModulePath;
use crate::projection::{GetterMap, MemoProjection, Projection, ProjectionHandle, WrappedGetter};
use crate::registry::{GetterEntry, RegisteredTypes, Registry};
use crate::spec::ModuleSpec;
use crate::state::{resolve, resolve_mut, SharedState};
use crate::subscription::{
    ActionDescriptor, ActionSubscriber, HookPhase, MutationDescriptor, MutationSubscriberFn,
    SubscribeOptions, SubscriberList, SubscriptionHandle,
};

/// Result of [`Store::dispatch`].
pub type DispatchFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Returned by [`Store::watch`].
pub type WatchHandle = SubscriptionHandle;

static NULL: Value = Value::Null;

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// From a local context: commit the name as-is, without the namespace.
    pub root: bool,
    /// No longer has any effect; reported as deprecated.
    pub silent: bool,
}

impl CommitOptions {
    pub fn root() -> Self {
        Self {
            root: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// From a local context: dispatch the name as-is, without the namespace.
    pub root: bool,
}

impl DispatchOptions {
    pub fn root() -> Self {
        Self { root: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Keep whatever state already sits at the module's path.
    pub preserve_state: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Call the callback once right away, with `Null` as the old value.
    pub immediate: bool,
}

// =============================================================================
// Plugins
// =============================================================================

/// Runs once against the freshly built store.
pub trait Plugin: Send + Sync {
    fn apply(&self, store: &Store);
}

impl<F> Plugin for F
where
    F: Fn(&Store) + Send + Sync,
{
    fn apply(&self, store: &Store) {
        self(store)
    }
}

// =============================================================================
// Store Inner
// =============================================================================

pub(crate) struct StoreInner {
    pub(crate) state: SharedState,
    modules: RwLock<ModuleTree>,
    registry: RwLock<Arc<Registry>>,
    binding: RwLock<Option<Arc<dyn ProjectionHandle>>>,
    local_getters: Mutex<HashMap<String, LocalGetters>>,
    mutation_subscribers: SubscriberList<MutationSubscriberFn>,
    action_subscribers: SubscriberList<ActionSubscriber>,
    committing: AtomicBool,
    strict: bool,
    projection: Arc<dyn Projection>,
    pub(crate) diagnostics: Arc<Diagnostics>,
}

/// Restores the previous `committing` value on drop, including on panic.
struct CommitGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

fn read_lock<T: ?Sized>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T: ?Sized>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StoreInner {
    /// Run `f` with the committing flag raised.
    pub(crate) fn with_commit<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = self.committing.swap(true, Ordering::SeqCst);
        let _guard = CommitGuard {
            flag: &self.committing,
            previous,
        };
        f()
    }

    pub(crate) fn is_committing(&self) -> bool {
        self.committing.load(Ordering::SeqCst)
    }

    pub(crate) fn registry(&self) -> Arc<Registry> {
        read_lock(&self.registry).clone()
    }

    pub(crate) fn binding(&self) -> Option<Arc<dyn ProjectionHandle>> {
        read_lock(&self.binding).clone()
    }

    pub(crate) fn read_getter(&self, name: &str) -> Option<Value> {
        self.binding()?.read(name)
    }

    /// The getters view for `namespace`, memoized until the next rebuild.
    pub(crate) fn local_getters(self: &Arc<Self>, namespace: &str) -> LocalGetters {
        let mut cache = self
            .local_getters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(getters) = cache.get(namespace) {
            return getters.clone();
        }

        let registry = self.registry();
        let getters = LocalGetters::new(
            Arc::downgrade(self),
            namespace,
            registry.getters().map(|(name, _)| name),
        );
        cache.insert(namespace.to_string(), getters.clone());
        getters
    }

    fn report(&self, problem: StoreError) {
        self.diagnostics.report(problem);
    }

    fn apply_attachments(&self, attachments: Vec<StateAttachment>) {
        if attachments.is_empty() {
            return;
        }
        let problems = self.with_commit(|| self.state.write(|root| attach_state(root, attachments)));
        for problem in problems {
            self.report(problem);
        }
    }

    /// Rebuild the registry from the root, then rebind getters.
    fn reset_store(self: &Arc<Self>, hot: bool) {
        let mut registry = Registry::default();
        {
            let mut tree = write_lock(&self.modules);
            install_module(self, &mut registry, &mut tree, &ModulePath::root(), true);
        }
        *write_lock(&self.registry) = Arc::new(registry);
        self.reset_binding(hot);
    }

    /// Bind a fresh projection over the current registry's getters and
    /// retire the previous binding.
    ///
    /// With `hot`, the state version is bumped so every cached getter and
    /// watcher re-evaluates even though no state changed.
    fn reset_binding(self: &Arc<Self>, hot: bool) {
        let registry = self.registry();
        let getters: GetterMap = registry
            .getters()
            .map(|(name, entry)| (name.clone(), wrap_getter(Arc::downgrade(self), entry)))
            .collect();

        self.local_getters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();

        let handle = self.projection.bind(self.state.clone(), getters);

        if self.strict {
            let store = Arc::downgrade(self);
            let own = Arc::downgrade(&handle);
            handle.on_change(Arc::new(move |_version| {
                let Some(inner) = store.upgrade() else {
                    return;
                };
                // A retired binding keeps its listener until its teardown runs.
                let current = match (inner.binding(), own.upgrade()) {
                    (Some(live), Some(own)) => Arc::ptr_eq(&live, &own),
                    _ => false,
                };
                if current && !inner.is_committing() {
                    inner.report(StoreError::StrictModeViolation);
                }
            }));
        }

        let previous = write_lock(&self.binding).replace(handle);

        if let Some(previous) = previous {
            if hot {
                self.with_commit(|| self.state.touch());
            }
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { previous.teardown() });
                }
                Err(_) => previous.teardown(),
            }
        }
    }

    /// Run one action hook, turning errors and panics into reports.
    fn run_hook<F>(&self, phase: HookPhase, type_name: &str, hook: F)
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let message = match panic::catch_unwind(AssertUnwindSafe(hook)) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic_info) => format!("panicked: {}", extract_panic_message(&panic_info)),
        };
        self.report(StoreError::HookFailure {
            phase,
            type_name: type_name.to_string(),
            message,
        });
    }
}

fn wrap_getter(store: std::sync::Weak<StoreInner>, entry: &GetterEntry) -> WrappedGetter {
    let handler = entry.handler.clone();
    let context = entry.context.clone();
    Arc::new(move || {
        let Some(inner) = store.upgrade() else {
            return Value::Null;
        };
        let root = inner.state.snapshot();
        let local = resolve(&root, context.path()).unwrap_or(&NULL);
        let local_getters = context.getters();
        let root_getters = Getters::new(store.clone());
        handler(local, &local_getters, &root, &root_getters)
    })
}

fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Await every handler; the first failure wins.
///
/// Handlers still pending when one fails are moved onto the ambient tokio
/// runtime and run to completion there.
async fn settle_all(handlers: Vec<ActionFuture>) -> anyhow::Result<Value> {
    let count = handlers.len();
    let mut pending: FuturesUnordered<BoxFuture<'static, (usize, anyhow::Result<Value>)>> = handlers
        .into_iter()
        .enumerate()
        .map(|(index, handler)| handler.map(move |result| (index, result)).boxed())
        .collect();

    let mut results: Vec<Option<Value>> = vec![None; count];
    while let Some((index, result)) = pending.next().await {
        match result {
            Ok(value) => results[index] = Some(value),
            Err(err) => {
                detach(pending);
                return Err(err);
            }
        }
    }

    Ok(Value::Array(
        results
            .into_iter()
            .map(|value| value.unwrap_or(Value::Null))
            .collect(),
    ))
}

/// Start a dispatch without waiting for the caller to poll it.
///
/// The first poll happens inline, so every handler body runs up to its first
/// pending `.await` before `dispatch` returns. What is left goes onto the
/// ambient tokio runtime and runs to completion even if the returned future
/// is dropped. Without a runtime the remainder waits for the caller.
fn drive(mut dispatch: DispatchFuture) -> DispatchFuture {
    let mut cx = Context::from_waker(noop_waker_ref());
    if let Poll::Ready(outcome) = dispatch.poll_unpin(&mut cx) {
        return future::ready(outcome).boxed();
    }

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let task = runtime.spawn(dispatch);
            async move {
                task.await
                    .unwrap_or_else(|err| Err(anyhow::anyhow!("action task failed: {err}")))
            }
            .boxed()
        }
        Err(_) => {
            debug!("no tokio runtime; dispatch continues when awaited");
            dispatch
        }
    }
}

fn detach(mut pending: FuturesUnordered<BoxFuture<'static, (usize, anyhow::Result<Value>)>>) {
    if pending.is_empty() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                while let Some((index, result)) = pending.next().await {
                    if let Err(err) = result {
                        debug!(index, error = %err, "sibling action handler also failed");
                    }
                }
            });
        }
        Err(_) => warn!(
            remaining = pending.len(),
            "no tokio runtime; remaining action handlers dropped"
        ),
    }
}

// =============================================================================
// Store
// =============================================================================

/// Handle to a store. Cloning is cheap and every clone is the same store.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Start building a store from its root module.
    pub fn builder(root: ModuleSpec) -> StoreBuilder {
        StoreBuilder::new(root)
    }

    /// A store with default settings.
    pub fn new(root: ModuleSpec) -> Self {
        Self::builder(root).build()
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    pub fn commit(&self, type_name: &str, payload: Value) {
        self.commit_with(type_name, payload, CommitOptions::default());
    }

    /// Apply every mutation handler registered for `type_name`.
    ///
    /// Handlers run in registration order, each on its own module's slice,
    /// all inside one write. Subscribers are notified afterwards. An unknown
    /// type is reported and nothing happens.
    pub fn commit_with(&self, type_name: &str, payload: Value, options: CommitOptions) {
        let inner = &self.inner;
        let registry = inner.registry();
        let Some(entries) = registry.mutations(type_name) else {
            inner.report(StoreError::UnknownType {
                kind: HandlerKind::Mutation,
                type_name: type_name.to_string(),
            });
            return;
        };

        debug!(type_name, handlers = entries.len(), "commit");

        let missing: Vec<ModulePath> = inner.with_commit(|| {
            inner.state.write(|root| {
                let mut missing = Vec::new();
                for entry in entries {
                    match resolve_mut(root, entry.context.path()) {
                        Some(local) => (entry.handler)(local, &payload),
                        None => missing.push(entry.context.path().clone()),
                    }
                }
                missing
            })
        });
        for path in missing {
            inner.report(StoreError::StateSlotUnavailable { path });
        }

        let descriptor = MutationDescriptor {
            type_name: type_name.to_string(),
            payload,
        };
        let state = inner.state.snapshot();
        for subscriber in inner.mutation_subscribers.snapshot() {
            subscriber(&descriptor, &state);
        }

        if options.silent {
            inner.report(StoreError::SilentOptionRemoved {
                type_name: descriptor.type_name,
            });
        }
    }

    /// Object-style commit: `{ "type": name, ... }`, the whole object being
    /// the payload.
    pub fn commit_object(&self, object: Value, options: CommitOptions) {
        match object.get("type").and_then(Value::as_str).map(str::to_string) {
            Some(type_name) => self.commit_with(&type_name, object, options),
            None => self.inner.report(StoreError::InvalidDescriptor {
                found: describe_type_field(&object),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Run every action handler registered for `type_name`.
    ///
    /// `before` hooks and the entry of each handler happen synchronously,
    /// before this returns. Inside a tokio runtime the rest runs as a task, so
    /// the action still completes and its `after`/`error` hooks still fire if
    /// the returned future is dropped. One handler resolves to its own result; several
    /// resolve to an array of results in registration order, or to the
    /// first failure. An unknown type is reported and resolves to `Null`.
    pub fn dispatch(&self, type_name: &str, payload: Value) -> DispatchFuture {
        let inner = &self.inner;
        let registry = inner.registry();
        let Some(entries) = registry.actions(type_name) else {
            inner.report(StoreError::UnknownType {
                kind: HandlerKind::Action,
                type_name: type_name.to_string(),
            });
            return future::ready(Ok(Value::Null)).boxed();
        };

        debug!(type_name, handlers = entries.len(), "dispatch");

        let descriptor = ActionDescriptor {
            type_name: type_name.to_string(),
            payload: payload.clone(),
        };

        let state = inner.state.snapshot();
        for subscriber in inner.action_subscribers.snapshot() {
            if let Some(before) = &subscriber.before {
                inner.run_hook(HookPhase::Before, type_name, || before(&descriptor, &state));
            }
        }

        let mut handlers: Vec<ActionFuture> = entries
            .iter()
            .map(|entry| {
                let context = ActionContext::new(self.clone(), entry.context.clone());
                (entry.handler)(context, payload.clone())
            })
            .collect();

        let store = self.clone();
        drive(
            async move {
                let outcome = match handlers.len() {
                    1 => match handlers.pop() {
                        Some(handler) => handler.await,
                        None => Ok(Value::Null),
                    },
                    _ => settle_all(handlers).await,
                };
                store.finish_dispatch(&descriptor, &outcome);
                outcome
            }
            .boxed(),
        )
    }

    /// Object-style dispatch: `{ "type": name, ... }`.
    pub fn dispatch_object(&self, object: Value) -> DispatchFuture {
        match object.get("type").and_then(Value::as_str).map(str::to_string) {
            Some(type_name) => self.dispatch(&type_name, object),
            None => {
                self.inner.report(StoreError::InvalidDescriptor {
                    found: describe_type_field(&object),
                });
                future::ready(Ok(Value::Null)).boxed()
            }
        }
    }

    fn finish_dispatch(&self, descriptor: &ActionDescriptor, outcome: &anyhow::Result<Value>) {
        let inner = &self.inner;
        let state = inner.state.snapshot();
        let type_name = descriptor.type_name.as_str();

        match outcome {
            Ok(_) => {
                for subscriber in inner.action_subscribers.snapshot() {
                    if let Some(after) = &subscriber.after {
                        inner.run_hook(HookPhase::After, type_name, || after(descriptor, &state));
                    }
                }
            }
            Err(err) => {
                debug!(type_name, error = %err, "action failed");
                for subscriber in inner.action_subscribers.snapshot() {
                    if let Some(on_error) = &subscriber.error {
                        inner.run_hook(HookPhase::Error, type_name, || {
                            on_error(descriptor, &state, err)
                        });
                    }
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Be told about every commit, after its handlers ran.
    pub fn subscribe<F>(&self, subscriber: F, options: SubscribeOptions) -> SubscriptionHandle
    where
        F: Fn(&MutationDescriptor, &Value) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .mutation_subscribers
            .add(Arc::new(subscriber), options);
        let store = Arc::downgrade(&self.inner);
        SubscriptionHandle::new(move || {
            store
                .upgrade()
                .map(|inner| inner.mutation_subscribers.remove(id))
                .unwrap_or(false)
        })
    }

    /// Be told before every dispatch.
    pub fn subscribe_action<F>(&self, subscriber: F, options: SubscribeOptions) -> SubscriptionHandle
    where
        F: Fn(&ActionDescriptor, &Value) + Send + Sync + 'static,
    {
        self.subscribe_action_with(
            ActionSubscriber::new().before(move |action, state| {
                subscriber(action, state);
                Ok(())
            }),
            options,
        )
    }

    /// Register `before`, `after` and `error` hooks together.
    pub fn subscribe_action_with(
        &self,
        subscriber: ActionSubscriber,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        let id = self.inner.action_subscribers.add(subscriber, options);
        let store = Arc::downgrade(&self.inner);
        SubscriptionHandle::new(move || {
            store
                .upgrade()
                .map(|inner| inner.action_subscribers.remove(id))
                .unwrap_or(false)
        })
    }

    /// Re-evaluate `getter` after every state change and call `callback`
    /// with `(new, old)` when the result differs.
    pub fn watch<G, C>(&self, getter: G, callback: C, options: WatchOptions) -> WatchHandle
    where
        G: Fn(&Value, &Getters) -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let store = Arc::downgrade(&self.inner);
        let initial = getter(&self.state(), &self.getters());
        if options.immediate {
            callback(&initial, &Value::Null);
        }

        let last = Mutex::new(initial);
        let listener_store = store.clone();
        let id = self.inner.state.on_change(Arc::new(move |_version| {
            let Some(inner) = listener_store.upgrade() else {
                return;
            };
            let next = getter(&inner.state.snapshot(), &Getters::new(listener_store.clone()));
            let previous = {
                let mut last = last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if *last == next {
                    return;
                }
                std::mem::replace(&mut *last, next.clone())
            };
            callback(&next, &previous);
        }));

        SubscriptionHandle::new(move || {
            store
                .upgrade()
                .map(|inner| inner.state.remove_listener(id))
                .unwrap_or(false)
        })
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    /// The current root state.
    pub fn state(&self) -> Arc<Value> {
        self.inner.state.snapshot()
    }

    pub fn getters(&self) -> Getters {
        Getters::new(Arc::downgrade(&self.inner))
    }

    /// Read one getter by fully-qualified name.
    pub fn getter(&self, name: &str) -> Option<Value> {
        self.getters().get(name)
    }

    /// Swap the whole state tree.
    pub fn replace_state(&self, state: Value) {
        self.inner.with_commit(|| self.inner.state.replace(state));
    }

    /// Write to the state tree directly, bypassing mutations.
    ///
    /// In strict mode this is reported as a violation.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        self.inner.state.write(f)
    }

    /// Restore a recorded state.
    pub fn travel_to_state(&self, state: Value) {
        debug!("travelling to recorded state");
        self.replace_state(state);
    }

    pub fn is_committing(&self) -> bool {
        self.inner.is_committing()
    }

    pub fn is_strict(&self) -> bool {
        self.inner.strict
    }

    // -------------------------------------------------------------------------
    // Dynamic modules
    // -------------------------------------------------------------------------

    /// Add a module (and its sub-modules) at `path` after construction.
    ///
    /// Errors are reported and also returned.
    pub fn register_module(
        &self,
        path: impl Into<ModulePath>,
        spec: ModuleSpec,
        options: RegisterOptions,
    ) -> Result<(), StoreError> {
        let path = path.into();
        let inner = &self.inner;

        if path.is_root() {
            let err = StoreError::InvalidModulePath {
                path,
                reason: "cannot register the root module",
            };
            inner.report(err.clone());
            return Err(err);
        }

        let attachments = {
            let mut tree = write_lock(&inner.modules);
            if let Err(err) = tree.register(&path, &spec, true) {
                inner.report(err.clone());
                return Err(err);
            }

            let mut registry = Registry::clone(&inner.registry());
            let attachments = install_module(
                inner,
                &mut registry,
                &mut tree,
                &path,
                options.preserve_state,
            );
            *write_lock(&inner.registry) = Arc::new(registry);
            attachments
        };

        inner.apply_attachments(attachments);
        inner.reset_binding(false);
        info!(path = %path, "module registered");
        Ok(())
    }

    /// Remove a module registered with [`register_module`] along with its
    /// state. Static modules are left alone. Returns whether anything was
    /// removed.
    ///
    /// [`register_module`]: Store::register_module
    pub fn unregister_module(&self, path: impl Into<ModulePath>) -> bool {
        let path = path.into();
        let inner = &self.inner;

        let removed = write_lock(&inner.modules).unregister(&path);
        if !removed {
            return false;
        }

        if let (Some(parent), Some(key)) = (path.parent(), path.key()) {
            inner.with_commit(|| {
                inner.state.write(|root| {
                    if let Some(Value::Object(slot)) = resolve_mut(root, &parent) {
                        slot.remove(key);
                    }
                })
            });
        }

        inner.reset_store(false);
        info!(path = %path, "module unregistered");
        true
    }

    pub fn has_module(&self, path: impl Into<ModulePath>) -> bool {
        read_lock(&self.inner.modules).is_registered(&path.into())
    }

    /// Replace handler logic from a new root declaration, keeping state.
    ///
    /// A declaration that adds a module is rejected and nothing changes.
    pub fn hot_update(&self, spec: ModuleSpec) -> Result<(), StoreError> {
        let inner = &self.inner;
        if let Err(err) = write_lock(&inner.modules).update(&spec) {
            inner.report(err.clone());
            return Err(err);
        }
        inner.reset_store(true);
        info!("hot update applied");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// The local context of the module registered under `namespace`.
    pub fn context_for_namespace(&self, namespace: &str) -> Option<Arc<LocalContext>> {
        let path = self.inner.registry().namespace(namespace)?.clone();
        read_lock(&self.inner.modules)
            .get(&path)
            .and_then(|module| module.context().cloned())
    }

    /// Namespace of the module at `path`.
    pub fn namespace_of(&self, path: impl Into<ModulePath>) -> String {
        read_lock(&self.inner.modules).namespace(&path.into())
    }

    pub fn registered_types(&self) -> RegisteredTypes {
        self.inner.registry().types()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("strict", &self.inner.strict)
            .field("committing", &self.is_committing())
            .field("state_version", &self.inner.state.version())
            .field("subscribers", &self.inner.mutation_subscribers.len())
            .field("action_subscribers", &self.inner.action_subscribers.len())
            .finish_non_exhaustive()
    }
}

fn describe_type_field(object: &Value) -> String {
    match object.get("type") {
        Some(value) => value.to_string(),
        None => "undefined".to_string(),
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures and builds a [`Store`].
///
/// # Example
///
/// ```ignore
/// let store = Store::builder(root)
///     .config(StoreConfig::from_env()?)
///     .plugin(|store: &Store| { store.subscribe(log_mutation, SubscribeOptions::default()); })
///     .build();
/// ```
pub struct StoreBuilder {
    root: ModuleSpec,
    strict: bool,
    devtools: bool,
    devtools_hook: Option<Arc<dyn DevtoolsHook>>,
    plugins: Vec<Arc<dyn Plugin>>,
    projection: Arc<dyn Projection>,
    catalog: HandlerCatalog,
    diagnostics_capacity: usize,
}

impl StoreBuilder {
    pub fn new(root: ModuleSpec) -> Self {
        Self {
            root,
            strict: false,
            devtools: false,
            devtools_hook: None,
            plugins: Vec::new(),
            projection: Arc::new(MemoProjection),
            catalog: HandlerCatalog::new(),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }

    /// Apply settings loaded from the environment. Calls made afterwards
    /// override them.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.strict = config.strict;
        self.devtools = config.devtools;
        self.diagnostics_capacity = config.diagnostics_capacity;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn devtools(mut self, enabled: bool) -> Self {
        self.devtools = enabled;
        self
    }

    /// Where devtools events go. Nothing is emitted unless devtools is
    /// also enabled.
    pub fn devtools_hook(mut self, hook: impl DevtoolsHook + 'static) -> Self {
        self.devtools_hook = Some(Arc::new(hook));
        self
    }

    pub fn projection(mut self, projection: impl Projection + 'static) -> Self {
        self.projection = Arc::new(projection);
        self
    }

    /// Handlers that declarations may refer to by name.
    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }

    pub fn build(self) -> Store {
        let diagnostics = Arc::new(Diagnostics::with_capacity(self.diagnostics_capacity));
        let tree = ModuleTree::new(&self.root, Arc::new(self.catalog), diagnostics.clone());
        let state = SharedState::new(tree.root().initial_state().clone());

        let inner = Arc::new(StoreInner {
            state,
            modules: RwLock::new(tree),
            registry: RwLock::new(Arc::new(Registry::default())),
            binding: RwLock::new(None),
            local_getters: Mutex::new(HashMap::new()),
            mutation_subscribers: SubscriberList::new(),
            action_subscribers: SubscriberList::new(),
            committing: AtomicBool::new(false),
            strict: self.strict,
            projection: self.projection,
            diagnostics,
        });

        let attachments = {
            let mut registry = Registry::default();
            let mut tree = write_lock(&inner.modules);
            let attachments =
                install_module(&inner, &mut registry, &mut tree, &ModulePath::root(), false);
            *write_lock(&inner.registry) = Arc::new(registry);
            attachments
        };
        inner.apply_attachments(attachments);
        inner.reset_binding(false);

        let store = Store::from_inner(inner);
        for plugin in &self.plugins {
            plugin.apply(&store);
        }

        if self.devtools {
            match self.devtools_hook {
                Some(hook) => devtools::attach(&store, hook),
                None => debug!("devtools enabled without a hook"),
            }
        }

        debug!(strict = store.is_strict(), "store built");
        store
    }
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("strict", &self.strict)
            .field("devtools", &self.devtools)
            .field("plugins", &self.plugins.len())
            .field("diagnostics_capacity", &self.diagnostics_capacity)
            .finish_non_exhaustive()
    }
}
