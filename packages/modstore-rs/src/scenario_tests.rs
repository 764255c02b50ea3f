//! End-to-end behaviour of the store across modules.
//!
//! Unit tests for each component live next to it; these exercise the
//! pieces together through the public `Store` surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::context::ActionContext;
use crate::error::{HandlerKind, StoreError};
use crate::handler::{Action, HandlerCatalog};
use crate::path::ModulePath;
use crate::spec::ModuleSpec;
use crate::store::{CommitOptions, DispatchOptions, RegisterOptions, Store, WatchOptions};
use crate::subscription::{ActionSubscriber, HookPhase, SubscribeOptions, SubscriptionHandle};
use crate::testing::{ActionRecorder, MutationRecorder};

// =============================================================================
// Fixtures
// =============================================================================

fn push_item(state: &mut Value, payload: &Value) {
    if let Some(items) = state["items"].as_array_mut() {
        items.push(payload.clone());
    }
}

fn add_age(state: &mut Value, payload: &Value) {
    let by = payload.as_i64().unwrap_or(1);
    state["age"] = json!(state["age"].as_i64().unwrap_or(0) + by);
}

fn push_stock(state: &mut Value, payload: &Value) {
    if let Some(stock) = state["stock"].as_array_mut() {
        stock.push(payload.clone());
    }
}

/// root(unnamespaced) → cart(namespaced) → shelf(unnamespaced)
fn shop() -> ModuleSpec {
    ModuleSpec::new()
        .state(json!({ "items": [], "age": 0 }))
        .mutation("add", push_item)
        .mutation("ageAdd", add_age)
        .module(
            "cart",
            ModuleSpec::new()
                .namespaced(true)
                .state(json!({ "items": [] }))
                .mutation("add", push_item)
                .getter("count", |state, _, _, _| {
                    json!(state["items"].as_array().map(Vec::len).unwrap_or(0))
                })
                .module(
                    "shelf",
                    ModuleSpec::new()
                        .state(json!({ "stock": [] }))
                        .mutation("restock", push_stock),
                ),
        )
        .module(
            "user",
            ModuleSpec::new()
                .namespaced(true)
                .state(json!({ "age": 30 }))
                .mutation("ageAdd", add_age)
                .action(
                    "setAge",
                    Action::sync(|ctx, payload| {
                        ctx.commit_with("ageAdd", payload, CommitOptions::root());
                        Ok(Value::Null)
                    }),
                ),
        )
}

fn has_error(store: &Store, predicate: impl Fn(&StoreError) -> bool) -> bool {
    store.diagnostics().any(predicate)
}

// =============================================================================
// Tree & namespaces
// =============================================================================

#[test]
fn test_registered_module_is_found_with_its_flag() {
    let store = Store::new(shop());
    store
        .register_module(
            ["cart", "coupons"],
            ModuleSpec::new().namespaced(true),
            RegisterOptions::default(),
        )
        .unwrap();

    assert!(store.has_module(["cart", "coupons"]));
    assert_eq!(store.namespace_of(["cart", "coupons"]), "cart/coupons/");
    assert!(store.has_module(["cart", "shelf"]));
}

#[test]
fn test_unnamespaced_child_shares_parent_namespace() {
    let store = Store::new(shop());
    assert_eq!(store.namespace_of(ModulePath::root()), "");
    assert_eq!(store.namespace_of(["cart"]), "cart/");
    assert_eq!(store.namespace_of(["cart", "shelf"]), "cart/");
    assert!(store.registered_types().mutations.contains(&"cart/restock".to_string()));
}

// =============================================================================
// Commit routing
// =============================================================================

#[test]
fn test_namespaced_commit_touches_only_its_slice() {
    let store = Store::new(shop());
    store.commit("cart/add", json!("apple"));

    let state = store.state();
    assert_eq!(state["cart"]["items"], json!(["apple"]));
    assert_eq!(state["items"], json!([]));
    assert_eq!(state["cart"]["shelf"]["stock"], json!([]));
    assert_eq!(store.getter("cart/count"), Some(json!(1)));
}

#[test]
fn test_unnamespaced_child_mutation_gets_its_own_slice() {
    let store = Store::new(shop());
    store.commit("cart/restock", json!("pear"));

    let state = store.state();
    assert_eq!(state["cart"]["shelf"]["stock"], json!(["pear"]));
    assert_eq!(state["cart"]["items"], json!([]));
}

#[tokio::test]
async fn test_root_commit_from_namespaced_action() {
    let store = Store::new(shop());
    store.dispatch("user/setAge", json!(5)).await.unwrap();

    let state = store.state();
    assert_eq!(state["age"], json!(5));
    assert_eq!(state["user"]["age"], json!(30));
}

#[tokio::test]
async fn test_unknown_local_types_are_reported() {
    let store = Store::new(shop().module(
        "orders",
        ModuleSpec::new().namespaced(true).action(
            "broken",
            Action::new(|ctx: ActionContext, _| async move {
                ctx.commit("missing", Value::Null);
                let nested = ctx.dispatch("ghost", Value::Null).await?;
                anyhow::Ok(nested)
            }),
        ),
    ));

    let result = store.dispatch("orders/broken", Value::Null).await.unwrap();
    assert_eq!(result, Value::Null);
    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::UnknownLocalType { kind: HandlerKind::Mutation, global, .. } if global == "orders/missing"
    )));
    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::UnknownLocalType { kind: HandlerKind::Action, global, .. } if global == "orders/ghost"
    )));
}

#[test]
fn test_subscriber_may_unsubscribe_itself() {
    let store = Store::new(shop());
    let calls = Arc::new(AtomicUsize::new(0));

    let handle: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
    let own = handle.clone();
    let once = calls.clone();
    let subscription = store.subscribe(
        move |_, _| {
            once.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = own.lock().unwrap().as_ref() {
                handle.unsubscribe();
            }
        },
        SubscribeOptions::default(),
    );
    *handle.lock().unwrap() = Some(subscription);

    let recorder = MutationRecorder::attach(&store);
    store.commit("add", json!(1));
    store.commit("add", json!(2));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.len(), 2);
}

#[test]
fn test_prepended_subscriber_runs_first() {
    let store = Store::new(shop());
    let order = Arc::new(Mutex::new(Vec::new()));

    let late = order.clone();
    store.subscribe(move |_, _| late.lock().unwrap().push("late"), SubscribeOptions::default());
    let early = order.clone();
    store.subscribe(move |_, _| early.lock().unwrap().push("early"), SubscribeOptions::prepend());

    store.commit("add", json!(1));
    assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
}

#[test]
fn test_subscribers_see_state_after_all_handlers() {
    let store = Store::new(
        ModuleSpec::new()
            .module("a", ModuleSpec::new().state(json!({ "n": 0 })).mutation("tick", |s, _| s["n"] = json!(1)))
            .module("b", ModuleSpec::new().state(json!({ "n": 0 })).mutation("tick", |s, _| s["n"] = json!(2))),
    );
    let recorder = MutationRecorder::attach(&store);

    store.commit("tick", Value::Null);

    assert_eq!(
        recorder.last_state(),
        Some(json!({ "a": { "n": 1 }, "b": { "n": 2 } }))
    );
}

// =============================================================================
// Dispatch fan-out
// =============================================================================

/// A namespaced module answering the root-level `sync` action. A failing
/// one yields once first, so a succeeding sibling always settles ahead of it.
fn syncing_module(label: &'static str, fail: bool) -> ModuleSpec {
    ModuleSpec::new()
        .namespaced(true)
        .state(json!({ "synced": false }))
        .mutation("markSynced", |state, _| state["synced"] = json!(true))
        .action(
            "sync",
            Action::new(move |ctx: ActionContext, _| async move {
                if fail {
                    tokio::task::yield_now().await;
                    anyhow::bail!("{label} failed");
                }
                ctx.commit("markSynced", Value::Null);
                anyhow::Ok(json!(label))
            })
            .at_root(),
        )
}

#[tokio::test]
async fn test_fan_out_resolves_all_results_in_registration_order() {
    let store = Store::new(
        ModuleSpec::new()
            .module("a", syncing_module("a", false))
            .module("b", syncing_module("b", false)),
    );

    let result = store.dispatch("sync", Value::Null).await.unwrap();

    assert_eq!(result, json!(["a", "b"]));
    assert_eq!(store.state()["a"]["synced"], json!(true));
    assert_eq!(store.state()["b"]["synced"], json!(true));
}

#[tokio::test]
async fn test_fan_out_rejects_and_keeps_sibling_effects() {
    let store = Store::new(
        ModuleSpec::new()
            .module("a", syncing_module("a", false))
            .module("b", syncing_module("b", true)),
    );
    let recorder = ActionRecorder::attach(&store);

    let err = store.dispatch("sync", Value::Null).await.unwrap_err();

    assert_eq!(err.to_string(), "b failed");
    assert_eq!(store.state()["a"]["synced"], json!(true));
    assert_eq!(store.state()["b"]["synced"], json!(false));
    assert_eq!(recorder.phases_for("sync"), vec![HookPhase::Before, HookPhase::Error]);
}

#[tokio::test]
async fn test_pending_sibling_runs_to_completion_after_rejection() {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let gate = Arc::new(tokio::sync::Notify::new());

    let waiter_gate = gate.clone();
    let slow = ModuleSpec::new()
        .state(json!({ "finished": false }))
        .mutation("finish", |state, _| state["finished"] = json!(true))
        .action(
            "sync",
            Action::new(move |ctx: ActionContext, _| {
                let gate = waiter_gate.clone();
                let done = done_tx.clone();
                async move {
                    gate.notified().await;
                    ctx.commit("finish", Value::Null);
                    let _ = done.send(());
                    anyhow::Ok(Value::Null)
                }
            }),
        );
    let fast = ModuleSpec::new().action(
        "sync",
        Action::sync(|_, _| Err(anyhow::anyhow!("fast failure"))),
    );

    let store = Store::new(ModuleSpec::new().module("slow", slow).module("fast", fast));

    assert!(store.dispatch("sync", Value::Null).await.is_err());
    assert_eq!(store.state()["slow"]["finished"], json!(false));

    gate.notify_one();
    done_rx.recv().await.unwrap();
    assert_eq!(store.state()["slow"]["finished"], json!(true));
}

#[tokio::test]
async fn test_action_sees_local_and_root_views() {
    let store = Store::new(
        shop().module(
            "report",
            ModuleSpec::new()
                .namespaced(true)
                .state(json!({ "title": "weekly" }))
                .getter("title", |state, _, _, _| state["title"].clone())
                .action(
                    "summary",
                    Action::sync(|ctx, _| {
                        Ok(json!({
                            "namespace": ctx.namespace(),
                            "title": ctx.getters().get("title"),
                            "local": ctx.state()["title"],
                            "root_age": ctx.root_state()["age"],
                            "cart_count": ctx.root_getters().get("cart/count"),
                        }))
                    }),
                ),
        ),
    );

    let summary = store.dispatch("report/summary", Value::Null).await.unwrap();
    assert_eq!(
        summary,
        json!({
            "namespace": "report/",
            "title": "weekly",
            "local": "weekly",
            "root_age": 0,
            "cart_count": 0,
        })
    );
}

#[tokio::test]
async fn test_root_action_in_namespaced_module() {
    let store = Store::new(shop().module(
        "admin",
        ModuleSpec::new()
            .namespaced(true)
            .state(json!({ "pings": 0 }))
            .mutation("ping", |state, _| {
                state["pings"] = json!(state["pings"].as_i64().unwrap_or(0) + 1)
            })
            .action(
                "globalPing",
                Action::sync(|ctx, _| {
                    ctx.commit("ping", Value::Null);
                    Ok(Value::Null)
                })
                .at_root(),
            ),
    ));

    store.dispatch("globalPing", Value::Null).await.unwrap();
    assert_eq!(store.state()["admin"]["pings"], json!(1));
    assert!(!store
        .registered_types()
        .actions
        .contains(&"admin/globalPing".to_string()));
}

#[tokio::test]
async fn test_nested_dispatch_with_root_option() {
    let store = Store::new(
        shop()
            .action(
                "audit",
                Action::sync(|ctx, payload| {
                    ctx.commit("add", payload.clone());
                    Ok(payload)
                }),
            )
            .module(
                "checkout",
                ModuleSpec::new().namespaced(true).action(
                    "run",
                    Action::new(|ctx: ActionContext, payload| async move {
                        let audited = ctx
                            .dispatch_with("audit", payload, DispatchOptions::root())
                            .await?;
                        anyhow::Ok(json!({ "audited": audited }))
                    }),
                ),
            ),
    );

    let result = store.dispatch("checkout/run", json!("receipt")).await.unwrap();
    assert_eq!(result, json!({ "audited": "receipt" }));
    assert_eq!(store.state()["items"], json!(["receipt"]));
}

// =============================================================================
// Action hooks
// =============================================================================

#[tokio::test]
async fn test_hook_failures_do_not_stop_other_hooks_or_the_action() {
    let store = Store::new(shop());
    let seen = Arc::new(AtomicUsize::new(0));

    store.subscribe_action_with(
        ActionSubscriber::new().before(|_, _| Err(anyhow::anyhow!("before broke"))),
        SubscribeOptions::default(),
    );
    store.subscribe_action_with(
        ActionSubscriber::new().before(|_, _| panic!("before panicked")),
        SubscribeOptions::default(),
    );
    let counter = seen.clone();
    store.subscribe_action(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        SubscribeOptions::default(),
    );
    store.subscribe_action_with(
        ActionSubscriber::new().after(|_, _| Err(anyhow::anyhow!("after broke"))),
        SubscribeOptions::default(),
    );

    store.dispatch("user/setAge", json!(2)).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(store.state()["age"], json!(2));

    let failures = store
        .diagnostics()
        .matching(|e| matches!(e, StoreError::HookFailure { .. }));
    assert_eq!(failures.len(), 3);
    assert!(matches!(
        &failures[1],
        StoreError::HookFailure { phase: HookPhase::Before, message, .. } if message.contains("before panicked")
    ));
    assert!(matches!(
        &failures[2],
        StoreError::HookFailure { phase: HookPhase::After, .. }
    ));
}

#[tokio::test]
async fn test_error_hook_receives_the_rejection() {
    let store = Store::new(shop().action(
        "explode",
        Action::sync(|_, _| Err(anyhow::anyhow!("kaboom"))),
    ));
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    store.subscribe_action_with(
        ActionSubscriber::new().error(move |action, _, err| {
            sink.lock()
                .unwrap()
                .push(format!("{}: {}", action.type_name, err));
            Ok(())
        }),
        SubscribeOptions::default(),
    );

    let err = store.dispatch("explode", Value::Null).await.unwrap_err();

    assert_eq!(err.to_string(), "kaboom");
    assert_eq!(*messages.lock().unwrap(), vec!["explode: kaboom"]);
}

#[tokio::test]
async fn test_dropped_dispatch_fires_after_hook() {
    let store = Store::new(shop().action(
        "slowAge",
        Action::new(|ctx: ActionContext, payload: Value| async move {
            tokio::task::yield_now().await;
            ctx.commit("ageAdd", payload);
            anyhow::Ok(Value::Null)
        }),
    ));
    let recorder = ActionRecorder::attach(&store);

    drop(store.dispatch("slowAge", json!(5)));
    assert_eq!(recorder.phases_for("slowAge"), vec![HookPhase::Before]);

    for _ in 0..50 {
        if recorder.phases_for("slowAge").len() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    assert_eq!(store.state()["age"], json!(5));
    assert_eq!(
        recorder.phases_for("slowAge"),
        vec![HookPhase::Before, HookPhase::After]
    );
}

#[tokio::test]
async fn test_dropped_dispatch_commits_without_await() {
    let store = Store::new(shop().action(
        "bump",
        Action::new(|ctx: ActionContext, payload: Value| async move {
            ctx.commit("ageAdd", payload);
            anyhow::Ok(Value::Null)
        }),
    ));

    drop(store.dispatch("bump", json!(5)));
    assert_eq!(store.state()["age"], json!(5));
}

// =============================================================================
// Dynamic registration
// =============================================================================

#[test]
fn test_unregister_static_module_is_noop() {
    let store = Store::new(shop());

    assert!(!store.unregister_module("cart"));
    assert!(store.has_module("cart"));
    assert!(store.state().get("cart").is_some());
    store.commit("cart/add", json!("still routable"));
    assert_eq!(store.state()["cart"]["items"], json!(["still routable"]));
}

#[test]
fn test_unregister_runtime_module_removes_node_state_and_handlers() {
    let store = Store::new(shop());
    store
        .register_module(
            "wishlist",
            ModuleSpec::new()
                .namespaced(true)
                .state(json!({ "items": [] }))
                .mutation("add", push_item)
                .getter("size", |state, _, _, _| {
                    json!(state["items"].as_array().map(Vec::len).unwrap_or(0))
                }),
            RegisterOptions::default(),
        )
        .unwrap();

    store.commit("wishlist/add", json!("lamp"));
    assert_eq!(store.getter("wishlist/size"), Some(json!(1)));

    assert!(store.unregister_module("wishlist"));
    assert!(!store.has_module("wishlist"));
    assert!(store.state().get("wishlist").is_none());
    assert!(store.getter("wishlist/size").is_none());
    assert!(!store
        .registered_types()
        .mutations
        .contains(&"wishlist/add".to_string()));

    store.commit("cart/add", json!("untouched"));
    assert_eq!(store.state()["cart"]["items"], json!(["untouched"]));
}

#[test]
fn test_register_under_missing_parent_is_an_error() {
    let store = Store::new(shop());
    let err = store
        .register_module(["ghost", "child"], ModuleSpec::new(), RegisterOptions::default())
        .unwrap_err();

    assert!(matches!(err, StoreError::UnregisteredModulePath { .. }));
    assert!(has_error(&store, |e| *e == err));
}

#[test]
fn test_has_module_with_missing_parent_reports() {
    let store = Store::new(shop());
    assert!(!store.has_module(["nowhere", "deep"]));
    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::UnregisteredModulePath { path } if *path == ModulePath::from("nowhere")
    )));
}

#[test]
fn test_preserve_state_keeps_existing_slice() {
    let store = Store::new(shop());
    store.replace_state(json!({
        "items": [], "age": 0,
        "cart": { "items": [] },
        "user": { "age": 30 },
        "session": { "token": "from-server" }
    }));

    store
        .register_module(
            "session",
            ModuleSpec::new()
                .namespaced(true)
                .state(json!({ "token": null }))
                .getter("token", |state, _, _, _| state["token"].clone()),
            RegisterOptions {
                preserve_state: true,
            },
        )
        .unwrap();

    assert_eq!(store.state()["session"], json!({ "token": "from-server" }));
    assert_eq!(store.getter("session/token"), Some(json!("from-server")));
    assert!(!has_error(&store, |e| matches!(e, StoreError::StateFieldOverridden { .. })));
}

#[test]
fn test_module_state_overriding_parent_field_is_reported() {
    let store = Store::new(
        ModuleSpec::new()
            .state(json!({ "profile": "plain field" }))
            .module("profile", ModuleSpec::new().state(json!({ "name": "ada" }))),
    );

    assert_eq!(store.state()["profile"], json!({ "name": "ada" }));
    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::StateFieldOverridden { field, .. } if field == "profile"
    )));
}

#[test]
fn test_state_factory_gives_each_registration_fresh_state() {
    let store = Store::new(ModuleSpec::new());
    let reusable = ModuleSpec::new()
        .state_fn(|| json!({ "items": [] }))
        .mutation("add", push_item)
        .namespaced(true);

    store
        .register_module("first", reusable.clone(), RegisterOptions::default())
        .unwrap();
    store
        .register_module("second", reusable, RegisterOptions::default())
        .unwrap();
    store.commit("first/add", json!(1));

    assert_eq!(store.state()["first"]["items"], json!([1]));
    assert_eq!(store.state()["second"]["items"], json!([]));
}

// =============================================================================
// Hot update
// =============================================================================

#[test]
fn test_hot_update_rejects_new_top_level_module() {
    let store = Store::new(shop());
    let before = store.state();

    let err = store
        .hot_update(
            ModuleSpec::new()
                .mutation("add", |_, _| {})
                .module("brand_new", ModuleSpec::new()),
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::HotUpdateAddsModule { ref key, .. } if key == "brand_new"));
    assert!(!store.has_module("brand_new"));
    assert_eq!(store.state(), before);

    store.commit("add", json!("original handler"));
    assert_eq!(store.state()["items"], json!(["original handler"]));
}

#[test]
fn test_hot_update_swaps_handler_and_leaves_siblings() {
    let store = Store::new(shop());

    store
        .hot_update(ModuleSpec::new().module(
            "cart",
            ModuleSpec::new().namespaced(true).mutation("add", |state, payload| {
                if let Some(items) = state["items"].as_array_mut() {
                    items.push(json!(format!("hot:{}", payload.as_str().unwrap_or(""))));
                }
            }),
        ))
        .unwrap();

    store.commit("cart/add", json!("x"));
    store.commit("user/ageAdd", json!(1));
    store.commit("cart/restock", json!("y"));

    let state = store.state();
    assert_eq!(state["cart"]["shelf"]["stock"], json!(["y"]));
    assert_eq!(state["user"]["age"], json!(31));
    assert_eq!(store.getter("cart/count"), Some(json!(1)));
}

#[test]
fn test_hot_update_forces_getter_recompute_and_keeps_state() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let spec = shop().getter("ageLabel", move |state, _, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        json!(format!("age {}", state["age"]))
    });
    let store = Store::new(spec.clone());
    store.commit("ageAdd", json!(3));
    let before = store.state();

    assert_eq!(store.getter("ageLabel"), Some(json!("age 3")));
    assert_eq!(store.getter("ageLabel"), Some(json!("age 3")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    store.hot_update(spec).unwrap();

    assert_eq!(store.getter("ageLabel"), Some(json!("age 3")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.state(), before);
}

#[test]
fn test_hot_update_re_evaluates_watchers() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    let store = Store::new(shop());
    store.watch(
        move |state, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            state["age"].clone()
        },
        |_, _| {},
        WatchOptions::default(),
    );
    let after_setup = evaluations.load(Ordering::SeqCst);

    store.hot_update(shop()).unwrap();

    assert!(evaluations.load(Ordering::SeqCst) > after_setup);
}

// =============================================================================
// Strict mode
// =============================================================================

#[test]
fn test_strict_mode_reports_unguarded_writes_only() {
    let store = Store::builder(shop()).strict(true).build();

    store.commit("add", json!(1));
    assert!(!has_error(&store, |e| matches!(e, StoreError::StrictModeViolation)));

    store.with_state_mut(|root| root["age"] = json!(99));
    assert!(has_error(&store, |e| matches!(e, StoreError::StrictModeViolation)));
    assert_eq!(store.state()["age"], json!(99));
}

#[test]
fn test_non_strict_store_ignores_unguarded_writes() {
    let store = Store::new(shop());
    store.with_state_mut(|root| root["age"] = json!(1));
    assert!(!has_error(&store, |e| matches!(e, StoreError::StrictModeViolation)));
}

fn strict_violations(store: &Store) -> usize {
    store
        .diagnostics()
        .matching(|e| matches!(e, StoreError::StrictModeViolation))
        .len()
}

#[tokio::test]
async fn test_strict_violation_reported_once_after_register() {
    let store = Store::builder(shop()).strict(true).build();
    store
        .register_module("extra", ModuleSpec::new(), RegisterOptions::default())
        .unwrap();

    store.with_state_mut(|root| root["age"] = json!(7));
    assert_eq!(strict_violations(&store), 1);

    tokio::task::yield_now().await;
    store.with_state_mut(|root| root["age"] = json!(8));
    assert_eq!(strict_violations(&store), 2);
}

#[tokio::test]
async fn test_strict_violation_reported_once_after_rebinding() {
    let store = Store::builder(shop()).strict(true).build();
    store
        .register_module("extra", ModuleSpec::new(), RegisterOptions::default())
        .unwrap();
    assert!(store.unregister_module("extra"));
    store
        .hot_update(ModuleSpec::new().mutation("add", |_, _| {}))
        .unwrap();
    assert_eq!(strict_violations(&store), 0);

    store.with_state_mut(|root| root["age"] = json!(7));
    assert_eq!(strict_violations(&store), 1);
}

#[test]
fn test_reentrant_commit_keeps_flag_for_outer_commit() {
    let store = Store::builder(shop()).strict(true).build();
    let inner_store = store.clone();
    let flags = Arc::new(Mutex::new(Vec::new()));
    let seen = flags.clone();

    store.watch(
        |state, _| state["items"].clone(),
        move |items, _| {
            seen.lock().unwrap().push(inner_store.is_committing());
            if items.as_array().map(Vec::len) == Some(1) {
                inner_store.commit("ageAdd", json!(1));
                seen.lock().unwrap().push(inner_store.is_committing());
            }
        },
        WatchOptions::default(),
    );

    store.commit("add", json!("first"));

    assert_eq!(*flags.lock().unwrap(), vec![true, true]);
    assert!(!store.is_committing());
    assert_eq!(store.state()["age"], json!(1));
    assert!(!has_error(&store, |e| matches!(e, StoreError::StrictModeViolation)));
}

// =============================================================================
// Registry conflicts
// =============================================================================

#[tokio::test]
async fn test_duplicate_namespace_is_reported_and_both_stay_routable() {
    let shared = |label: &'static str| {
        ModuleSpec::new()
            .namespaced(true)
            .state(json!({ "hits": 0 }))
            .mutation("hit", |state, _| {
                state["hits"] = json!(state["hits"].as_i64().unwrap_or(0) + 1)
            })
            .action("whoami", Action::sync(move |_, _| Ok(json!(label))))
    };
    let store = Store::new(
        ModuleSpec::new()
            .module("a", ModuleSpec::new().module("shared", shared("a")))
            .module("b", ModuleSpec::new().module("shared", shared("b"))),
    );

    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::DuplicateNamespace { namespace, path } if namespace == "shared/" && *path == ModulePath::from(["b", "shared"])
    )));

    let context = store.context_for_namespace("shared/").unwrap();
    assert_eq!(context.path(), &ModulePath::from(["b", "shared"]));

    store.commit("shared/hit", Value::Null);
    assert_eq!(store.state()["a"]["shared"]["hits"], json!(1));
    assert_eq!(store.state()["b"]["shared"]["hits"], json!(1));

    let who = store.dispatch("shared/whoami", Value::Null).await.unwrap();
    assert_eq!(who, json!(["a", "b"]));
}

#[test]
fn test_duplicate_getter_first_registration_wins() {
    let store = Store::new(
        ModuleSpec::new()
            .module("first", ModuleSpec::new().getter("total", |_, _, _, _| json!(1)))
            .module("second", ModuleSpec::new().getter("total", |_, _, _, _| json!(2))),
    );

    assert_eq!(store.getter("total"), Some(json!(1)));
    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::DuplicateGetter { type_name } if type_name == "total"
    )));
}

#[test]
fn test_getters_compose_local_and_root() {
    let store = Store::new(
        shop().getter("ageDoubled", |state, _, _, _| {
            json!(state["age"].as_i64().unwrap_or(0) * 2)
        })
        .module(
            "stats",
            ModuleSpec::new()
                .namespaced(true)
                .state(json!({ "factor": 10 }))
                .getter("factor", |state, _, _, _| state["factor"].clone())
                .getter("scaled", |_, local, _, root| {
                    let factor = local.get("factor").and_then(|v| v.as_i64()).unwrap_or(0);
                    let doubled = root.get("ageDoubled").and_then(|v| v.as_i64()).unwrap_or(0);
                    json!(factor * doubled)
                }),
        ),
    );

    store.commit("ageAdd", json!(2));
    assert_eq!(store.getter("stats/scaled"), Some(json!(40)));

    store.commit("ageAdd", json!(1));
    assert_eq!(store.getter("stats/scaled"), Some(json!(60)));
}

#[test]
fn test_unknown_getter_read_is_reported() {
    let store = Store::new(shop());
    assert_eq!(store.getter("cart/nothing"), None);
    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::UnknownType { kind: HandlerKind::Getter, .. }
    )));
}

// =============================================================================
// Layouts
// =============================================================================

#[tokio::test]
async fn test_layout_with_catalog_handlers() {
    let catalog = HandlerCatalog::new()
        .with_mutation("push", push_item)
        .with_action(
            "relay",
            Action::sync(|ctx, payload| {
                ctx.commit("add", payload);
                Ok(Value::Null)
            }),
        )
        .with_getter("size", |state, _, _, _| {
            json!(state["items"].as_array().map(Vec::len).unwrap_or(0))
        });

    let layout = ModuleSpec::from_layout(json!({
        "modules": {
            "cart": {
                "namespaced": true,
                "state": { "items": [] },
                "mutations": { "add": "push", "broken": "missing" },
                "actions": {
                    "add": "relay",
                    "addFromRoot": { "handler": "relay", "root": true }
                },
                "getters": { "size": "size" }
            }
        }
    }))
    .unwrap();

    let store = Store::builder(layout).catalog(catalog).build();

    store.dispatch("cart/add", json!("a")).await.unwrap();
    store.dispatch("addFromRoot", json!("b")).await.unwrap();

    assert_eq!(store.getter("cart/size"), Some(json!(2)));
    assert!(has_error(&store, |e| matches!(
        e,
        StoreError::Shape { key, .. } if key == "broken"
    )));
}
