//! Handler shapes and the named handler catalog.
//!
//! Each handler kind has one uniform shape:
//!
//! - **mutation**: `(local_state, payload)`, synchronous, mutates in place
//! - **action**: `(context, payload) -> future`, may commit and dispatch
//! - **getter**: `(local_state, local_getters, root_state, root_getters) -> value`
//!
//! Handlers are either given inline as closures or referenced by name from a
//! [`HandlerCatalog`], which is how declarative JSON layouts get their code.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;

use crate::context::{ActionContext, Getters, LocalGetters};
use crate::error::HandlerKind;

/// Synchronous state change applied to a module's local slice.
pub type MutationFn = Arc<dyn Fn(&mut Value, &Value) + Send + Sync>;

/// Future returned by an action handler.
pub type ActionFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Asynchronous workflow bound to a module's context.
pub type ActionFn = Arc<dyn Fn(ActionContext, Value) -> ActionFuture + Send + Sync>;

/// Derived value computed from local and root state.
pub type GetterFn = Arc<dyn Fn(&Value, &LocalGetters, &Value, &Getters) -> Value + Send + Sync>;

/// Wrap a closure as a [`MutationFn`].
pub fn mutation<F>(f: F) -> MutationFn
where
    F: Fn(&mut Value, &Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`GetterFn`].
pub fn getter<F>(f: F) -> GetterFn
where
    F: Fn(&Value, &LocalGetters, &Value, &Getters) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

// =============================================================================
// Action
// =============================================================================

/// An action handler plus its placement.
///
/// A root action is registered under its bare key even inside a namespaced
/// module, so it can be dispatched from the root namespace.
#[derive(Clone)]
pub struct Action {
    handler: ActionFn,
    root: bool,
}

impl Action {
    /// Action from an async closure.
    ///
    /// The closure is called synchronously at dispatch time; whatever it does
    /// before its first `.await` happens before `dispatch` returns. The rest
    /// runs on the ambient runtime whether or not the dispatch is awaited.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx, payload| f(ctx, payload).boxed()),
            root: false,
        }
    }

    /// Action whose whole body runs synchronously at dispatch time.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&ActionContext, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(move |ctx, payload| future::ready(f(&ctx, payload)).boxed()),
            root: false,
        }
    }

    /// Wrap an existing handler.
    pub fn from_handler(handler: ActionFn) -> Self {
        Self {
            handler,
            root: false,
        }
    }

    /// Register under the bare key instead of the module's namespace.
    pub fn at_root(mut self) -> Self {
        self.root = true;
        self
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn handler(&self) -> &ActionFn {
        &self.handler
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Handler Catalog
// =============================================================================

/// Named handlers that layouts can refer to.
///
/// # Example
///
/// ```ignore
/// let catalog = HandlerCatalog::new()
///     .with_mutation("increment", |state, _| {
///         let n = state["count"].as_i64().unwrap_or(0);
///         state["count"] = json!(n + 1);
///     })
///     .with_action("noop", Action::sync(|_, _| Ok(Value::Null)));
/// ```
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    mutations: HashMap<String, MutationFn>,
    actions: HashMap<String, ActionFn>,
    getters: HashMap<String, GetterFn>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mutation<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Value, &Value) + Send + Sync + 'static,
    {
        self.add_mutation(name, mutation(f));
        self
    }

    pub fn with_action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.add_action(name, action.handler);
        self
    }

    pub fn with_getter<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &LocalGetters, &Value, &Getters) -> Value + Send + Sync + 'static,
    {
        self.add_getter(name, getter(f));
        self
    }

    pub fn add_mutation(&mut self, name: impl Into<String>, handler: MutationFn) {
        self.mutations.insert(name.into(), handler);
    }

    pub fn add_action(&mut self, name: impl Into<String>, handler: ActionFn) {
        self.actions.insert(name.into(), handler);
    }

    pub fn add_getter(&mut self, name: impl Into<String>, handler: GetterFn) {
        self.getters.insert(name.into(), handler);
    }

    pub fn mutation(&self, name: &str) -> Option<&MutationFn> {
        self.mutations.get(name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionFn> {
        self.actions.get(name)
    }

    pub fn getter(&self, name: &str) -> Option<&GetterFn> {
        self.getters.get(name)
    }

    /// Every kind `name` is registered as.
    pub fn kinds_of(&self, name: &str) -> Vec<HandlerKind> {
        let mut kinds = Vec::new();
        if self.mutations.contains_key(name) {
            kinds.push(HandlerKind::Mutation);
        }
        if self.actions.contains_key(name) {
            kinds.push(HandlerKind::Action);
        }
        if self.getters.contains_key(name) {
            kinds.push(HandlerKind::Getter);
        }
        kinds
    }

    /// Sorted handler names of one kind.
    pub fn names(&self, kind: HandlerKind) -> Vec<String> {
        let mut names: Vec<String> = match kind {
            HandlerKind::Mutation => self.mutations.keys().cloned().collect(),
            HandlerKind::Action => self.actions.keys().cloned().collect(),
            HandlerKind::Getter => self.getters.keys().cloned().collect(),
        };
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty() && self.actions.is_empty() && self.getters.is_empty()
    }

    /// Describe why `name` did not resolve, for shape errors.
    pub(crate) fn describe_miss(&self, name: &str) -> String {
        match self.kinds_of(name).first() {
            Some(other) => format!("\"{name}\" (a registered {other} handler)"),
            None => format!("\"{name}\" (not in the handler catalog)"),
        }
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerCatalog")
            .field("mutations", &self.names(HandlerKind::Mutation))
            .field("actions", &self.names(HandlerKind::Action))
            .field("getters", &self.names(HandlerKind::Getter))
            .finish()
    }
}
