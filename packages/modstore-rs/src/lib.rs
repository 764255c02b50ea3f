//! # Modstore
//!
//! A hierarchical, namespaced state container. Modules own slices of one
//! state tree; mutations change state synchronously, actions run async
//! work and commit mutations, getters derive values from state.
//!
//! ## Core Concepts
//!
//! - [`ModuleSpec`] = a module declaration (state, handlers, sub-modules)
//! - [`Store::commit`] = apply every mutation handler for a type, synchronously
//! - [`Store::dispatch`] = run every action handler for a type, asynchronously
//! - [`Getters`] = memoized derived values, read by fully-qualified name
//!
//! A module marked `namespaced` prefixes its key onto the names of its
//! handlers and of every non-namespaced descendant: a mutation `add` in
//! module `cart` registers as `cart/add`.
//!
//! ## Architecture
//!
//! ```text
//! ModuleSpec (declaration)
//!     │
//!     ▼ StoreBuilder::build()
//! ModuleTree ──► install() ──► Registry  type → [handlers with local context]
//!     │                           │
//!     ▼                           ▼
//! SharedState ◄── commit() ── MutationEntry (runs on its module's slice)
//!     │
//!     ├─► subscribers         (after every commit)
//!     ├─► watchers            (when a watched value changes)
//!     └─► ProjectionHandle    (getter cache, strict-mode check)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One state tree** - A module's state is at its path in the root value
//! 2. **Mutations are synchronous** - State only changes inside a commit
//! 3. **Every handler for a type runs** - Commits in registration order,
//!    dispatches concurrently
//! 4. **Local contexts resolve names** - A namespaced module commits and
//!    dispatches its own types by their short names
//! 5. **Rebuilds keep state** - Unregistering and hot updates rebuild
//!    handlers and getters around the existing state
//!
//! ## Example
//!
//! ```ignore
//! use modstore::{Action, ModuleSpec, Store};
//! use serde_json::{json, Value};
//!
//! let cart = ModuleSpec::new()
//!     .namespaced(true)
//!     .state(json!({ "items": [] }))
//!     .mutation("add", |state, item| {
//!         if let Some(items) = state["items"].as_array_mut() {
//!             items.push(item.clone());
//!         }
//!     })
//!     .action("checkout", Action::new(|ctx, _| async move {
//!         ctx.commit("add", json!("receipt"));
//!         Ok(Value::Null)
//!     }))
//!     .getter("count", |state, _, _, _| {
//!         json!(state["items"].as_array().map(Vec::len).unwrap_or(0))
//!     });
//!
//! let store = Store::new(ModuleSpec::new().module("cart", cart));
//!
//! store.commit("cart/add", json!("apple"));
//! store.dispatch("cart/checkout", Value::Null).await?;
//! assert_eq!(store.getter("cart/count"), Some(json!(2)));
//! ```
//!
//! ## Problems
//!
//! Misuse (unknown types, malformed declarations, conflicting names) never
//! panics. Each problem is logged with `tracing` and kept in the store's
//! [`Diagnostics`]; operations that can refuse, like
//! [`Store::register_module`], also return the [`StoreError`].

// Core modules
mod install;
mod registry;

pub mod config;
pub mod context;
pub mod devtools;
pub mod diagnostics;
pub mod error;
pub mod handler;
pub mod module;
pub mod path;
pub mod projection;
pub mod spec;
pub mod state;
pub mod store;
pub mod subscription;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// End-to-end tests (test-only)
#[cfg(test)]
mod scenario_tests;

pub use crate::config::StoreConfig;
pub use crate::context::{ActionContext, Getters, LocalContext, LocalGetters};
pub use crate::devtools::DevtoolsHook;
pub use crate::diagnostics::{Diagnostic, Diagnostics};
pub use crate::error::{HandlerKind, Severity, StoreError};
pub use crate::handler::{
    getter, mutation, Action, ActionFn, ActionFuture, GetterFn, HandlerCatalog, MutationFn,
};
pub use crate::module::{Module, ModuleTree};
pub use crate::path::ModulePath;
pub use crate::projection::{MemoProjection, Projection, ProjectionHandle};
pub use crate::registry::RegisteredTypes;
pub use crate::spec::ModuleSpec;
pub use crate::state::SharedState;
pub use crate::store::{
    CommitOptions, DispatchFuture, DispatchOptions, Plugin, RegisterOptions, Store, StoreBuilder,
    WatchHandle, WatchOptions,
};
pub use crate::subscription::{
    ActionDescriptor, ActionSubscriber, HookPhase, MutationDescriptor, SubscribeOptions,
    SubscriptionHandle,
};
