//! The flat, fully-qualified handler registry.
//!
//! One registry value is built per install pass and then published
//! wholesale; it is never edited while readers can see it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::context::LocalContext;
use crate::handler::{ActionFn, GetterFn, MutationFn};
use crate::path::ModulePath;

/// A mutation handler bound to the module that declared it.
#[derive(Clone)]
pub(crate) struct MutationEntry {
    pub handler: MutationFn,
    pub context: Arc<LocalContext>,
}

#[derive(Clone)]
pub(crate) struct ActionEntry {
    pub handler: ActionFn,
    pub context: Arc<LocalContext>,
}

#[derive(Clone)]
pub(crate) struct GetterEntry {
    pub handler: GetterFn,
    pub context: Arc<LocalContext>,
}

/// Most types have exactly one handler.
type Entries<T> = SmallVec<[T; 1]>;

#[derive(Clone, Default)]
pub(crate) struct Registry {
    mutations: HashMap<String, Entries<MutationEntry>>,
    actions: HashMap<String, Entries<ActionEntry>>,
    getters: IndexMap<String, GetterEntry>,
    namespaces: HashMap<String, ModulePath>,
}

impl Registry {
    pub fn add_mutation(&mut self, type_name: String, entry: MutationEntry) {
        self.mutations.entry(type_name).or_default().push(entry);
    }

    pub fn add_action(&mut self, type_name: String, entry: ActionEntry) {
        self.actions.entry(type_name).or_default().push(entry);
    }

    /// Returns false, leaving the first registration in place, on a duplicate.
    pub fn add_getter(&mut self, type_name: String, entry: GetterEntry) -> bool {
        if self.getters.contains_key(&type_name) {
            return false;
        }
        self.getters.insert(type_name, entry);
        true
    }

    /// Returns the path previously registered under `namespace`, if any.
    pub fn add_namespace(&mut self, namespace: String, path: ModulePath) -> Option<ModulePath> {
        self.namespaces.insert(namespace, path)
    }

    pub fn mutations(&self, type_name: &str) -> Option<&[MutationEntry]> {
        self.mutations.get(type_name).map(|entries| entries.as_slice())
    }

    pub fn actions(&self, type_name: &str) -> Option<&[ActionEntry]> {
        self.actions.get(type_name).map(|entries| entries.as_slice())
    }

    pub fn has_mutation(&self, type_name: &str) -> bool {
        self.mutations.contains_key(type_name)
    }

    pub fn has_action(&self, type_name: &str) -> bool {
        self.actions.contains_key(type_name)
    }

    pub fn has_getter(&self, type_name: &str) -> bool {
        self.getters.contains_key(type_name)
    }

    pub fn getters(&self) -> impl Iterator<Item = (&String, &GetterEntry)> {
        self.getters.iter()
    }

    pub fn namespace(&self, namespace: &str) -> Option<&ModulePath> {
        self.namespaces.get(namespace)
    }

    pub fn types(&self) -> RegisteredTypes {
        RegisteredTypes {
            mutations: sorted(self.mutations.keys()),
            actions: sorted(self.actions.keys()),
            getters: sorted(self.getters.keys()),
            namespaces: sorted(self.namespaces.keys()),
        }
    }
}

/// Everything currently routable, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegisteredTypes {
    pub mutations: Vec<String>,
    pub actions: Vec<String>,
    pub getters: Vec<String>,
    pub namespaces: Vec<String>,
}

fn sorted<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut names: Vec<String> = names.cloned().collect();
    names.sort();
    names
}
