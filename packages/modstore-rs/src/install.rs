//! Installing modules into a registry.
//!
//! Installation walks a subtree top-down. For each module it records the
//! namespace, builds the module's [`LocalContext`], and registers its
//! handlers under their fully-qualified names. State slices are not written
//! here: the tree lock is held during the walk, so attachments are returned
//! and applied by the store afterwards.

use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::trace;

use crate::context::LocalContext;
use crate::diagnostics::Diagnostics;
use crate::error::StoreError;
use crate::module::ModuleTree;
use crate::path::ModulePath;
use crate::registry::{ActionEntry, GetterEntry, MutationEntry, Registry};
use crate::store::StoreInner;

/// A module's initial state, to be placed under its parent's slice.
#[derive(Debug, Clone)]
pub(crate) struct StateAttachment {
    pub path: ModulePath,
    pub value: Value,
}

/// Install the module at `path` and its descendants.
///
/// With `hot` set, no state is attached; only logic is (re)registered.
pub(crate) fn install_module(
    store: &Arc<StoreInner>,
    registry: &mut Registry,
    tree: &mut ModuleTree,
    path: &ModulePath,
    hot: bool,
) -> Vec<StateAttachment> {
    let mut attachments = Vec::new();
    install(
        &Arc::downgrade(store),
        &store.diagnostics,
        registry,
        tree,
        path,
        hot,
        &mut attachments,
    );
    attachments
}

fn install(
    store: &Weak<StoreInner>,
    diagnostics: &Diagnostics,
    registry: &mut Registry,
    tree: &mut ModuleTree,
    path: &ModulePath,
    hot: bool,
    attachments: &mut Vec<StateAttachment>,
) {
    let namespace = tree.namespace(path);
    let Some(module) = tree.get_mut(path) else {
        return;
    };

    if module.is_namespaced() && registry.add_namespace(namespace.clone(), path.clone()).is_some() {
        diagnostics.report(StoreError::DuplicateNamespace {
            namespace: namespace.clone(),
            path: path.clone(),
        });
    }

    if !hot && !path.is_root() {
        attachments.push(StateAttachment {
            path: path.clone(),
            value: module.initial_state().clone(),
        });
    }

    let context = Arc::new(LocalContext::new(
        store.clone(),
        namespace.clone(),
        path.clone(),
    ));
    module.set_context(context.clone());

    module.for_each_mutation(|key, handler| {
        registry.add_mutation(
            format!("{namespace}{key}"),
            MutationEntry {
                handler: handler.clone(),
                context: context.clone(),
            },
        );
    });

    module.for_each_action(|key, action| {
        let type_name = if action.is_root() {
            key.to_string()
        } else {
            format!("{namespace}{key}")
        };
        registry.add_action(
            type_name,
            ActionEntry {
                handler: action.handler().clone(),
                context: context.clone(),
            },
        );
    });

    module.for_each_getter(|key, handler| {
        let type_name = format!("{namespace}{key}");
        let entry = GetterEntry {
            handler: handler.clone(),
            context: context.clone(),
        };
        if !registry.add_getter(type_name.clone(), entry) {
            diagnostics.report(StoreError::DuplicateGetter { type_name });
        }
    });

    trace!(path = %path, namespace = %namespace, hot, "module installed");

    for key in module.child_keys() {
        install(
            store,
            diagnostics,
            registry,
            tree,
            &path.child(key),
            hot,
            attachments,
        );
    }
}

/// Place attachments into the root value, in order.
///
/// Returns the problems found; the caller reports them once the state lock
/// is released.
pub(crate) fn attach_state(root: &mut Value, attachments: Vec<StateAttachment>) -> Vec<StoreError> {
    let mut problems = Vec::new();

    for StateAttachment { path, value } in attachments {
        let (Some(parent_path), Some(key)) = (path.parent(), path.key()) else {
            continue;
        };

        match crate::state::resolve_mut(root, &parent_path) {
            Some(Value::Object(parent)) => {
                if parent.contains_key(key) {
                    problems.push(StoreError::StateFieldOverridden {
                        field: key.to_string(),
                        path: path.clone(),
                    });
                }
                parent.insert(key.to_string(), value);
            }
            _ => problems.push(StoreError::StateSlotUnavailable { path: path.clone() }),
        }
    }

    problems
}
