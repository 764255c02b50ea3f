//! Module nodes and the module tree.
//!
//! A [`Module`] is a resolved [`ModuleSpec`]: its handlers have been looked
//! up in the catalog and its initial state evaluated. Children are owned by
//! their parent; nothing points back up the tree, so a module's namespace is
//! always recomputed top-down from its path.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::LocalContext;
use crate::diagnostics::Diagnostics;
use crate::error::{HandlerKind, StoreError};
use crate::handler::{Action, GetterFn, HandlerCatalog, MutationFn};
use crate::path::ModulePath;
use crate::spec::{ActionDefinition, Definition, ModuleSpec};

// =============================================================================
// Module
// =============================================================================

/// One node of the module tree.
pub struct Module {
    namespaced: bool,
    runtime: bool,
    state: Value,
    mutations: IndexMap<String, MutationFn>,
    actions: IndexMap<String, Action>,
    getters: IndexMap<String, GetterFn>,
    children: IndexMap<String, Module>,
    context: Option<Arc<LocalContext>>,
}

impl Module {
    /// Resolve `spec` (without its sub-modules). Unusable handler entries
    /// are reported and skipped.
    pub(crate) fn new(
        path: &ModulePath,
        spec: &ModuleSpec,
        runtime: bool,
        catalog: &HandlerCatalog,
        diagnostics: &Diagnostics,
    ) -> Self {
        let state = match &spec.state {
            Some(init) => init.evaluate(),
            None => json!({}),
        };

        let mut module = Self {
            namespaced: spec.namespaced,
            runtime,
            state,
            mutations: IndexMap::new(),
            actions: IndexMap::new(),
            getters: IndexMap::new(),
            children: IndexMap::new(),
            context: None,
        };
        module.apply_handlers(path, spec, catalog, diagnostics);
        module
    }

    /// Build `spec` and every declared sub-module.
    pub(crate) fn build(
        path: &ModulePath,
        spec: &ModuleSpec,
        runtime: bool,
        catalog: &HandlerCatalog,
        diagnostics: &Diagnostics,
    ) -> Self {
        let mut module = Self::new(path, spec, runtime, catalog, diagnostics);
        for (key, child_spec) in &spec.modules {
            let child = Self::build(&path.child(key), child_spec, runtime, catalog, diagnostics);
            module.add_child(key.clone(), child);
        }
        module
    }

    /// Replace logic from a new declaration.
    ///
    /// `namespaced` is always taken from `spec`; each handler map is replaced
    /// only if `spec` declares that section. Children and state are kept.
    pub(crate) fn update(
        &mut self,
        path: &ModulePath,
        spec: &ModuleSpec,
        catalog: &HandlerCatalog,
        diagnostics: &Diagnostics,
    ) {
        self.namespaced = spec.namespaced;
        self.apply_handlers(path, spec, catalog, diagnostics);
    }

    fn apply_handlers(
        &mut self,
        path: &ModulePath,
        spec: &ModuleSpec,
        catalog: &HandlerCatalog,
        diagnostics: &Diagnostics,
    ) {
        if let Some(definitions) = &spec.mutations {
            self.mutations = definitions
                .iter()
                .filter_map(|(key, definition)| {
                    resolve(path, HandlerKind::Mutation, key, definition, catalog, diagnostics, |name| {
                        catalog.mutation(name).cloned()
                    })
                    .map(|handler| (key.clone(), handler))
                })
                .collect();
        }

        if let Some(definitions) = &spec.actions {
            self.actions = definitions
                .iter()
                .filter_map(|(key, entry)| {
                    resolve_action(path, key, entry, catalog, diagnostics)
                        .map(|action| (key.clone(), action))
                })
                .collect();
        }

        if let Some(definitions) = &spec.getters {
            self.getters = definitions
                .iter()
                .filter_map(|(key, definition)| {
                    resolve(path, HandlerKind::Getter, key, definition, catalog, diagnostics, |name| {
                        catalog.getter(name).cloned()
                    })
                    .map(|handler| (key.clone(), handler))
                })
                .collect();
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }

    /// Registered after the store was built; only these can be unregistered.
    pub fn is_runtime(&self) -> bool {
        self.runtime
    }

    /// State evaluated when the module was constructed.
    pub fn initial_state(&self) -> &Value {
        &self.state
    }

    pub fn add_child(&mut self, key: impl Into<String>, module: Module) {
        self.children.insert(key.into(), module);
    }

    pub fn remove_child(&mut self, key: &str) -> Option<Module> {
        self.children.shift_remove(key)
    }

    pub fn child(&self, key: &str) -> Option<&Module> {
        self.children.get(key)
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut Module> {
        self.children.get_mut(key)
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.children.contains_key(key)
    }

    pub fn child_keys(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    pub fn for_each_child<F: FnMut(&str, &Module)>(&self, mut f: F) {
        for (key, child) in &self.children {
            f(key, child);
        }
    }

    pub fn for_each_mutation<F: FnMut(&str, &MutationFn)>(&self, mut f: F) {
        for (key, handler) in &self.mutations {
            f(key, handler);
        }
    }

    pub fn for_each_action<F: FnMut(&str, &Action)>(&self, mut f: F) {
        for (key, action) in &self.actions {
            f(key, action);
        }
    }

    pub fn for_each_getter<F: FnMut(&str, &GetterFn)>(&self, mut f: F) {
        for (key, handler) in &self.getters {
            f(key, handler);
        }
    }

    /// The local context built by the last install.
    pub fn context(&self) -> Option<&Arc<LocalContext>> {
        self.context.as_ref()
    }

    pub(crate) fn set_context(&mut self, context: Arc<LocalContext>) {
        self.context = Some(context);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("namespaced", &self.namespaced)
            .field("runtime", &self.runtime)
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

fn resolve<T: Clone>(
    path: &ModulePath,
    kind: HandlerKind,
    key: &str,
    definition: &Definition<T>,
    catalog: &HandlerCatalog,
    diagnostics: &Diagnostics,
    lookup: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let found = match definition {
        Definition::Inline(handler) => return Some(handler.clone()),
        Definition::Named(name) => match lookup(name) {
            Some(handler) => return Some(handler),
            None => catalog.describe_miss(name),
        },
        Definition::Invalid(value) => value.to_string(),
    };

    diagnostics.report(StoreError::Shape {
        path: path.clone(),
        kind,
        key: key.to_string(),
        found,
    });
    None
}

fn resolve_action(
    path: &ModulePath,
    key: &str,
    entry: &ActionDefinition,
    catalog: &HandlerCatalog,
    diagnostics: &Diagnostics,
) -> Option<Action> {
    let handler = match &entry.definition {
        Definition::Inline(handler) => Some(handler.clone()),
        Definition::Named(name) => catalog.action(name).cloned(),
        Definition::Invalid(_) => None,
    };

    match handler {
        Some(handler) => {
            let action = Action::from_handler(handler);
            Some(if entry.root { action.at_root() } else { action })
        }
        None => {
            let found = match &entry.definition {
                Definition::Named(name) => catalog.describe_miss(name),
                Definition::Invalid(value) => value.to_string(),
                Definition::Inline(_) => String::new(),
            };
            diagnostics.report(StoreError::Shape {
                path: path.clone(),
                kind: HandlerKind::Action,
                key: key.to_string(),
                found,
            });
            None
        }
    }
}

// =============================================================================
// Module Tree
// =============================================================================

/// Owns the root module and every descendant.
pub struct ModuleTree {
    root: Module,
    catalog: Arc<HandlerCatalog>,
    diagnostics: Arc<Diagnostics>,
}

impl ModuleTree {
    /// Build the tree from the root declaration. Nothing in it is runtime.
    pub fn new(
        root: &ModuleSpec,
        catalog: Arc<HandlerCatalog>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let root = Module::build(&ModulePath::root(), root, false, &catalog, &diagnostics);
        Self {
            root,
            catalog,
            diagnostics,
        }
    }

    pub fn root(&self) -> &Module {
        &self.root
    }

    pub fn get(&self, path: &ModulePath) -> Option<&Module> {
        path.iter()
            .try_fold(&self.root, |module, key| module.child(key))
    }

    pub fn get_mut(&mut self, path: &ModulePath) -> Option<&mut Module> {
        path.iter()
            .try_fold(&mut self.root, |module, key| module.child_mut(key))
    }

    /// Build `spec` and attach it at `path`, replacing whatever was there.
    pub fn register(
        &mut self,
        path: &ModulePath,
        spec: &ModuleSpec,
        runtime: bool,
    ) -> Result<(), StoreError> {
        let module = Module::build(path, spec, runtime, &self.catalog, &self.diagnostics);

        let (parent_path, key) = match (path.parent(), path.key()) {
            (Some(parent), Some(key)) => (parent, key.to_string()),
            _ => {
                self.root = module;
                return Ok(());
            }
        };

        match self.get_mut(&parent_path) {
            Some(parent) => {
                parent.add_child(key, module);
                debug!(path = %path, runtime, "module registered");
                Ok(())
            }
            None => Err(StoreError::UnregisteredModulePath { path: parent_path }),
        }
    }

    /// Remove a runtime module. Returns whether anything was removed.
    ///
    /// A missing target is reported; a static module is silently kept.
    pub fn unregister(&mut self, path: &ModulePath) -> bool {
        let (Some(parent_path), Some(key)) = (path.parent(), path.key()) else {
            return false;
        };

        let target = self
            .get(&parent_path)
            .and_then(|parent| parent.child(key))
            .map(Module::is_runtime);

        match target {
            None => {
                self.diagnostics.report(StoreError::UnregisteredModulePath {
                    path: path.clone(),
                });
                false
            }
            Some(false) => false,
            Some(true) => {
                let removed = self
                    .get_mut(&parent_path)
                    .and_then(|parent| parent.remove_child(key))
                    .is_some();
                debug!(path = %path, removed, "module unregistered");
                removed
            }
        }
    }

    /// Whether a module exists at `path`. A missing parent is reported.
    pub fn is_registered(&self, path: &ModulePath) -> bool {
        let (Some(parent_path), Some(key)) = (path.parent(), path.key()) else {
            return true;
        };

        match self.get(&parent_path) {
            Some(parent) => parent.has_child(key),
            None => {
                self.diagnostics.report(StoreError::UnregisteredModulePath {
                    path: parent_path,
                });
                false
            }
        }
    }

    /// `key/` for every namespaced module along `path`.
    pub fn namespace(&self, path: &ModulePath) -> String {
        let mut namespace = String::new();
        let mut module = &self.root;
        for key in path {
            match module.child(key) {
                Some(child) => module = child,
                None => break,
            }
            if module.is_namespaced() {
                namespace.push_str(key);
                namespace.push('/');
            }
        }
        namespace
    }

    /// Hot-swap logic from a new root declaration.
    ///
    /// Rejected as a whole, with nothing modified, if the declaration
    /// contains a module that is not already in the tree.
    pub fn update(&mut self, spec: &ModuleSpec) -> Result<(), StoreError> {
        if let Some((path, key)) = find_new_module(&self.root, spec, &ModulePath::root()) {
            return Err(StoreError::HotUpdateAddsModule { path, key });
        }

        apply_update(
            &mut self.root,
            spec,
            &ModulePath::root(),
            &self.catalog,
            &self.diagnostics,
        );
        Ok(())
    }

    /// Visit every module in pre-order.
    pub fn walk<F: FnMut(&ModulePath, &Module)>(&self, mut f: F) {
        fn visit<F: FnMut(&ModulePath, &Module)>(path: &ModulePath, module: &Module, f: &mut F) {
            f(path, module);
            module.for_each_child(|key, child| visit(&path.child(key), child, &mut *f));
        }
        visit(&ModulePath::root(), &self.root, &mut f);
    }

    pub fn catalog(&self) -> &Arc<HandlerCatalog> {
        &self.catalog
    }
}

impl fmt::Debug for ModuleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleTree")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn find_new_module(
    live: &Module,
    spec: &ModuleSpec,
    path: &ModulePath,
) -> Option<(ModulePath, String)> {
    spec.modules.iter().find_map(|(key, child_spec)| match live.child(key) {
        Some(child) => find_new_module(child, child_spec, &path.child(key)),
        None => Some((path.clone(), key.clone())),
    })
}

fn apply_update(
    live: &mut Module,
    spec: &ModuleSpec,
    path: &ModulePath,
    catalog: &HandlerCatalog,
    diagnostics: &Diagnostics,
) {
    live.update(path, spec, catalog, diagnostics);
    for (key, child_spec) in &spec.modules {
        if let Some(child) = live.child_mut(key) {
            apply_update(child, child_spec, &path.child(key), catalog, diagnostics);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Action;
    use proptest::prelude::*;

    fn tree(root: ModuleSpec) -> ModuleTree {
        ModuleTree::new(
            &root,
            Arc::new(HandlerCatalog::new().with_mutation("bump", |_, _| {})),
            Arc::new(Diagnostics::new()),
        )
    }

    fn cart_items() -> ModuleSpec {
        ModuleSpec::new().module(
            "cart",
            ModuleSpec::new()
                .namespaced(true)
                .module(
                    "items",
                    ModuleSpec::new().module("detail", ModuleSpec::new().namespaced(true)),
                ),
        )
    }

    #[test]
    fn test_register_then_lookup() {
        let mut tree = tree(ModuleSpec::new());
        let path = ModulePath::from("user");
        tree.register(&path, &ModuleSpec::new().namespaced(true), true)
            .unwrap();

        assert!(tree.is_registered(&path));
        let module = tree.get(&path).unwrap();
        assert!(module.is_namespaced());
        assert!(module.is_runtime());
    }

    #[test]
    fn test_register_under_missing_parent_fails() {
        let mut tree = tree(ModuleSpec::new());
        let err = tree
            .register(&ModulePath::from(["ghost", "child"]), &ModuleSpec::new(), true)
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::UnregisteredModulePath {
                path: ModulePath::from("ghost")
            }
        );
    }

    #[test]
    fn test_namespace_skips_unnamespaced_modules() {
        let tree = tree(cart_items());
        assert_eq!(tree.namespace(&ModulePath::root()), "");
        assert_eq!(tree.namespace(&ModulePath::from("cart")), "cart/");
        assert_eq!(tree.namespace(&ModulePath::from(["cart", "items"])), "cart/");
        assert_eq!(
            tree.namespace(&ModulePath::from(["cart", "items", "detail"])),
            "cart/detail/"
        );
    }

    #[test]
    fn test_unregister_static_module_is_noop() {
        let mut tree = tree(cart_items());
        assert!(!tree.unregister(&ModulePath::from("cart")));
        assert!(tree.is_registered(&ModulePath::from("cart")));
    }

    #[test]
    fn test_unregister_missing_module_is_reported() {
        let diagnostics = Arc::new(Diagnostics::new());
        let mut tree = ModuleTree::new(
            &ModuleSpec::new(),
            Arc::new(HandlerCatalog::new()),
            diagnostics.clone(),
        );

        assert!(!tree.unregister(&ModulePath::from("nope")));
        assert!(diagnostics.any(|e| matches!(e, StoreError::UnregisteredModulePath { .. })));
    }

    #[test]
    fn test_unregister_runtime_module() {
        let mut tree = tree(ModuleSpec::new());
        let path = ModulePath::from("dynamic");
        tree.register(&path, &ModuleSpec::new(), true).unwrap();

        assert!(tree.unregister(&path));
        assert!(!tree.is_registered(&path));
    }

    #[test]
    fn test_is_registered_with_missing_parent_reports() {
        let diagnostics = Arc::new(Diagnostics::new());
        let tree = ModuleTree::new(
            &ModuleSpec::new(),
            Arc::new(HandlerCatalog::new()),
            diagnostics.clone(),
        );

        assert!(!tree.is_registered(&ModulePath::from(["a", "b"])));
        assert!(tree.is_registered(&ModulePath::root()));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_shape_errors_skip_entry() {
        let diagnostics = Arc::new(Diagnostics::new());
        let spec = ModuleSpec::from_layout(serde_json::json!({
            "mutations": { "ok": "bump", "missing": "nope", "bad": 1 },
            "actions": { "wrong_kind": "bump" }
        }))
        .unwrap();
        let tree = ModuleTree::new(
            &spec,
            Arc::new(HandlerCatalog::new().with_mutation("bump", |_, _| {})),
            diagnostics.clone(),
        );

        let mut names = Vec::new();
        tree.root().for_each_mutation(|key, _| names.push(key.to_string()));
        assert_eq!(names, vec!["ok"]);

        let shapes = diagnostics.matching(|e| matches!(e, StoreError::Shape { .. }));
        assert_eq!(shapes.len(), 3);
        assert!(shapes[2]
            .to_string()
            .contains("\"bump\" (a registered mutation handler)"));
    }

    #[test]
    fn test_update_rejects_new_module_and_changes_nothing() {
        let mut tree = tree(ModuleSpec::new().module("a", ModuleSpec::new()));
        let update = ModuleSpec::new()
            .mutation("root_change", |_, _| {})
            .module("a", ModuleSpec::new().namespaced(true))
            .module("b", ModuleSpec::new());

        let err = tree.update(&update).unwrap_err();
        assert_eq!(
            err,
            StoreError::HotUpdateAddsModule {
                path: ModulePath::root(),
                key: "b".into()
            }
        );
        assert!(!tree.get(&ModulePath::from("a")).unwrap().is_namespaced());

        let mut count = 0;
        tree.root().for_each_mutation(|_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_update_replaces_only_declared_sections() {
        let mut tree = tree(
            ModuleSpec::new()
                .mutation("keep", |_, _| {})
                .action("go", Action::sync(|_, _| Ok(Value::Null))),
        );
        tree.update(&ModuleSpec::new().action("other", Action::sync(|_, _| Ok(Value::Null))))
            .unwrap();

        let mut mutations = Vec::new();
        tree.root().for_each_mutation(|key, _| mutations.push(key.to_string()));
        let mut actions = Vec::new();
        tree.root().for_each_action(|key, _| actions.push(key.to_string()));

        assert_eq!(mutations, vec!["keep"]);
        assert_eq!(actions, vec!["other"]);
    }

    #[test]
    fn test_walk_is_pre_order() {
        let tree = tree(cart_items());
        let mut seen = Vec::new();
        tree.walk(|path, _| seen.push(path.to_string()));
        assert_eq!(seen, vec!["", "cart", "cart.items", "cart.items.detail"]);
    }

    proptest! {
        #[test]
        fn prop_namespace_extends_parent_namespace(
            flags in proptest::collection::vec(any::<bool>(), 1..6)
        ) {
            let mut spec = ModuleSpec::new();
            for (depth, namespaced) in flags.iter().enumerate().rev() {
                spec = ModuleSpec::new()
                    .namespaced(*namespaced)
                    .module(format!("m{}", depth + 1), spec);
            }
            let root = ModuleSpec::new().module("m0", spec);
            let tree = tree(root);

            let mut path = ModulePath::root();
            let mut expected = String::new();
            for depth in 0..flags.len() {
                let parent_namespace = tree.namespace(&path);
                path = path.child(format!("m{depth}"));
                let namespace = tree.namespace(&path);

                prop_assert!(namespace.starts_with(&parent_namespace));
                if flags[depth] {
                    expected.push_str(&format!("m{depth}/"));
                }
                prop_assert_eq!(&namespace, &expected);
            }
        }
    }
}
