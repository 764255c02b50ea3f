//! Module declarations.
//!
//! A [`ModuleSpec`] is the raw, unresolved description of a module and its
//! sub-modules. It is built either in code through the builder methods or
//! loaded from a JSON layout whose handler entries name handlers in a
//! [`HandlerCatalog`](crate::HandlerCatalog):
//!
//! ```json
//! {
//!   "state": { "count": 0 },
//!   "mutations": { "increment": "increment" },
//!   "modules": {
//!     "cart": {
//!       "namespaced": true,
//!       "state": { "items": [] },
//!       "mutations": { "add": "push" },
//!       "actions": {
//!         "add": "forward",
//!         "sync": { "handler": "forward", "root": true }
//!       },
//!       "getters": { "size": "size" }
//!     }
//!   }
//! }
//! ```
//!
//! Nothing is validated here. Unknown names and malformed entries are kept
//! as-is and reported when the module is registered.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::context::{Getters, LocalGetters};
use crate::handler::{getter, mutation, Action, ActionFn, GetterFn, MutationFn};

/// One handler entry as declared.
#[derive(Clone)]
pub enum Definition<T> {
    /// A handler given directly.
    Inline(T),
    /// A handler looked up in the catalog at registration.
    Named(String),
    /// Anything else found in a layout.
    Invalid(Value),
}

impl<T> fmt::Debug for Definition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Inline(_) => write!(f, "Inline(..)"),
            Definition::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Definition::Invalid(value) => f.debug_tuple("Invalid").field(value).finish(),
        }
    }
}

/// An action entry: the handler plus whether it is placed at the root.
#[derive(Debug, Clone)]
pub struct ActionDefinition {
    pub definition: Definition<ActionFn>,
    pub root: bool,
}

/// Initial state of a module.
#[derive(Clone)]
pub enum StateInit {
    Value(Value),
    /// Evaluated once, when the module is constructed.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl StateInit {
    pub(crate) fn evaluate(&self) -> Value {
        match self {
            StateInit::Value(value) => value.clone(),
            StateInit::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for StateInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateInit::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StateInit::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

// =============================================================================
// Module Spec
// =============================================================================

/// Raw declaration of a module tree.
///
/// Handler sections are `None` until something is declared in them. During
/// a hot update only declared sections replace the live ones.
#[derive(Debug, Clone, Default)]
pub struct ModuleSpec {
    pub(crate) namespaced: bool,
    pub(crate) state: Option<StateInit>,
    pub(crate) mutations: Option<IndexMap<String, Definition<MutationFn>>>,
    pub(crate) actions: Option<IndexMap<String, ActionDefinition>>,
    pub(crate) getters: Option<IndexMap<String, Definition<GetterFn>>>,
    pub(crate) modules: IndexMap<String, ModuleSpec>,
}

impl ModuleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(StateInit::Value(state));
        self
    }

    /// State produced by a factory, so repeated registrations of the same
    /// spec do not share one value.
    pub fn state_fn<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.state = Some(StateInit::Factory(Arc::new(factory)));
        self
    }

    pub fn mutation<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Value, &Value) + Send + Sync + 'static,
    {
        self.mutations
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), Definition::Inline(mutation(f)));
        self
    }

    pub fn mutation_named(mut self, name: impl Into<String>, handler: impl Into<String>) -> Self {
        self.mutations
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), Definition::Named(handler.into()));
        self
    }

    pub fn action(mut self, name: impl Into<String>, action: Action) -> Self {
        let root = action.is_root();
        self.actions.get_or_insert_with(IndexMap::new).insert(
            name.into(),
            ActionDefinition {
                definition: Definition::Inline(action.handler().clone()),
                root,
            },
        );
        self
    }

    pub fn action_named(self, name: impl Into<String>, handler: impl Into<String>) -> Self {
        self.push_named_action(name.into(), handler.into(), false)
    }

    pub fn root_action_named(self, name: impl Into<String>, handler: impl Into<String>) -> Self {
        self.push_named_action(name.into(), handler.into(), true)
    }

    fn push_named_action(mut self, name: String, handler: String, root: bool) -> Self {
        self.actions.get_or_insert_with(IndexMap::new).insert(
            name,
            ActionDefinition {
                definition: Definition::Named(handler),
                root,
            },
        );
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &LocalGetters, &Value, &Getters) -> Value + Send + Sync + 'static,
    {
        self.getters
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), Definition::Inline(getter(f)));
        self
    }

    pub fn getter_named(mut self, name: impl Into<String>, handler: impl Into<String>) -> Self {
        self.getters
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), Definition::Named(handler.into()));
        self
    }

    pub fn module(mut self, key: impl Into<String>, spec: ModuleSpec) -> Self {
        self.modules.insert(key.into(), spec);
        self
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }

    pub fn modules(&self) -> &IndexMap<String, ModuleSpec> {
        &self.modules
    }

    /// Parse a JSON layout.
    pub fn from_layout(layout: Value) -> Result<Self, serde_json::Error> {
        let layout: ModuleLayout = serde_json::from_value(layout)?;
        Ok(layout.into_spec())
    }

    pub fn from_layout_str(layout: &str) -> Result<Self, serde_json::Error> {
        let layout: ModuleLayout = serde_json::from_str(layout)?;
        Ok(layout.into_spec())
    }
}

// =============================================================================
// JSON Layout
// =============================================================================

#[derive(Debug, Deserialize)]
struct ModuleLayout {
    #[serde(default)]
    namespaced: bool,
    #[serde(default)]
    state: Option<Value>,
    #[serde(default)]
    mutations: Option<IndexMap<String, Value>>,
    #[serde(default)]
    actions: Option<IndexMap<String, Value>>,
    #[serde(default)]
    getters: Option<IndexMap<String, Value>>,
    #[serde(default)]
    modules: IndexMap<String, ModuleLayout>,
}

impl ModuleLayout {
    fn into_spec(self) -> ModuleSpec {
        ModuleSpec {
            namespaced: self.namespaced,
            state: self.state.map(StateInit::Value),
            mutations: self.mutations.map(|entries| {
                entries
                    .into_iter()
                    .map(|(key, value)| (key, named_definition(value)))
                    .collect()
            }),
            actions: self.actions.map(|entries| {
                entries
                    .into_iter()
                    .map(|(key, value)| (key, action_definition(value)))
                    .collect()
            }),
            getters: self.getters.map(|entries| {
                entries
                    .into_iter()
                    .map(|(key, value)| (key, named_definition(value)))
                    .collect()
            }),
            modules: self
                .modules
                .into_iter()
                .map(|(key, child)| (key, child.into_spec()))
                .collect(),
        }
    }
}

fn named_definition<T>(value: Value) -> Definition<T> {
    match value {
        Value::String(name) => Definition::Named(name),
        other => Definition::Invalid(other),
    }
}

fn action_definition(value: Value) -> ActionDefinition {
    match value {
        Value::String(name) => ActionDefinition {
            definition: Definition::Named(name),
            root: false,
        },
        Value::Object(entry) => {
            let handler = entry.get("handler").and_then(Value::as_str).map(str::to_string);
            let root = entry.get("root").and_then(Value::as_bool).unwrap_or(false);
            match handler {
                Some(name) => ActionDefinition {
                    definition: Definition::Named(name),
                    root,
                },
                None => ActionDefinition {
                    definition: Definition::Invalid(Value::Object(entry)),
                    root: false,
                },
            }
        }
        other => ActionDefinition {
            definition: Definition::Invalid(other),
            root: false,
        },
    }
}
