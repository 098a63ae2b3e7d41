//! Transition engine behavior through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::json;
use tokio::sync::Notify;

use waypoint::resolve::BoxError;
use waypoint::transition::{NotFoundDecision, PlaceRef, Redirect, TransitionObserver};
use waypoint::{
    Invocable, PlaceDefinition, Reload, Router, RouterEvent, TransitionError, TransitionOptions,
    ViewDeclaration,
};

mod common;
use common::{counting, failing, gated, params, router_with_history, Recorder};

fn options() -> TransitionOptions {
    TransitionOptions::default()
}

/// app (resolves `user`, counted) with two children.
fn app_router(user_runs: &Arc<AtomicUsize>) -> Arc<Router> {
    let router = Router::new().unwrap();
    router
        .register(
            PlaceDefinition::new("app")
                .url("/app/{org}")
                .resolve("user", counting(user_runs, json!({ "name": "ann" }))),
        )
        .unwrap();
    router
        .register(PlaceDefinition::new("app.inbox").url("/inbox"))
        .unwrap();
    router
        .register(
            PlaceDefinition::new("app.settings")
                .url("/settings")
                .resolve(
                    "greeting",
                    Invocable::function(&["user"], |deps| async move {
                        let name = deps.require("user")?["name"].clone();
                        Ok::<_, BoxError>(json!(format!("hello {}", name.as_str().unwrap_or(""))))
                    }),
                ),
        )
        .unwrap();
    router
}

#[tokio::test]
async fn test_keep_point_preserves_parent_locals() {
    let user_runs = Arc::new(AtomicUsize::new(0));
    let router = app_router(&user_runs);

    router
        .go_to("app.inbox", params(&[("org", json!("acme"))]), options())
        .await
        .unwrap();
    let app = router.registry().get("app").unwrap();
    let before = app.locals().unwrap();

    let active = router.go(".settings", Default::default()).await;
    // `go` is relative to the active place, so `.settings` is a child of app.inbox.
    assert!(matches!(active, Err(TransitionError::NotFound { .. })));

    let active = router.go("^.settings", Default::default()).await.unwrap();
    assert_eq!(active.name(), "app.settings");
    assert_eq!(active.params.get("org"), Some(&json!("acme")));

    let after = app.locals().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(before.resolution.ptr_eq(&after.resolution));
    assert_eq!(user_runs.load(Ordering::SeqCst), 1);

    let settings = active.locals().unwrap();
    assert_eq!(settings.values.get("greeting"), Some(&json!("hello ann")));
    assert!(router.registry().get("app.inbox").unwrap().locals().is_none());
}

#[tokio::test]
async fn test_changed_parent_param_reenters_parent() {
    let user_runs = Arc::new(AtomicUsize::new(0));
    let router = app_router(&user_runs);

    router
        .go_to("app.inbox", params(&[("org", json!("acme"))]), options())
        .await
        .unwrap();
    router
        .go_to("app.inbox", params(&[("org", json!("globex"))]), options())
        .await
        .unwrap();

    assert_eq!(user_runs.load(Ordering::SeqCst), 2);
    assert_eq!(router.params().get("org"), Some(&json!("globex")));
}

#[tokio::test]
async fn test_reload_boundaries() {
    let user_runs = Arc::new(AtomicUsize::new(0));
    let router = app_router(&user_runs);
    let org = params(&[("org", json!("acme"))]);

    router.go_to("app.inbox", org.clone(), options()).await.unwrap();

    router
        .go_to("app.inbox", org.clone(), options().reload(Reload::From("app.inbox".into())))
        .await
        .unwrap();
    assert_eq!(user_runs.load(Ordering::SeqCst), 1);

    router
        .go_to("app.inbox", org.clone(), options().reload(Reload::All))
        .await
        .unwrap();
    assert_eq!(user_runs.load(Ordering::SeqCst), 2);

    router
        .go_to("app.inbox", org, options().reload(Reload::From("app".into())))
        .await
        .unwrap();
    assert_eq!(user_runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_superseded_transition_never_commits() {
    let (router, location) = router_with_history();
    let gate = Arc::new(Notify::new());
    let slow_entered = Arc::new(AtomicUsize::new(0));
    let entered = slow_entered.clone();

    router
        .register(
            PlaceDefinition::new("slow")
                .url("/slow")
                .resolve("data", gated(&gate, json!("late")))
                .on_enter(move |_| {
                    entered.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();
    router
        .register(PlaceDefinition::new("fast").url("/fast"))
        .unwrap();

    let slow = router.go_to("slow", Default::default(), options());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(router.is_transitioning());

    let fast = router.go_to("fast", Default::default(), options()).await.unwrap();
    assert_eq!(fast.name(), "fast");

    gate.notify_one();
    assert!(matches!(slow.await, Err(TransitionError::Superseded)));

    assert_eq!(router.current().name(), "fast");
    assert_eq!(slow_entered.load(Ordering::SeqCst), 0);
    assert_eq!(location.history(), vec!["/fast"]);
}

#[tokio::test]
async fn test_invalid_params_have_no_side_effects() {
    let router = Router::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    router.add_observer(recorder.clone());
    let mut events = router.subscribe();

    router
        .register(PlaceDefinition::new("item").url("/items/{id:int}"))
        .unwrap();

    let err = router
        .go_to("item", params(&[("id", json!("seven"))]), options())
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::InvalidParams { ref place } if place == "item"));
    assert!(router.current().place.is_root());
    assert!(recorder.events().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_resolution_keeps_active_place() {
    let router = Router::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    router.add_observer(recorder.clone());
    let mut events = router.subscribe();

    router
        .register(PlaceDefinition::new("home").url("/home"))
        .unwrap();
    router
        .register(
            PlaceDefinition::new("broken")
                .url("/broken")
                .resolve("data", failing("backend down")),
        )
        .unwrap();

    router.go_to("home", Default::default(), options()).await.unwrap();
    let err = router
        .go_to("broken", Default::default(), options())
        .await
        .unwrap_err();

    match err {
        TransitionError::Resolve(cause) => {
            assert_eq!(cause.name(), "data");
            assert!(cause.to_string().contains("backend down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(router.current().name(), "home");
    assert!(!router.is_transitioning());
    assert_eq!(recorder.events().last().map(|e| e.starts_with("error:broken")), Some(true));

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let RouterEvent::Error { info, .. } = event {
            assert_eq!(info.to, "broken");
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_observer_can_prevent_start() {
    let router = Router::new().unwrap();
    let recorder = Arc::new(Recorder::preventing("private"));
    router.add_observer(recorder.clone());

    router
        .register(PlaceDefinition::new("private").url("/private"))
        .unwrap();

    let err = router
        .go_to("private", Default::default(), options())
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::Prevented));
    assert_eq!(recorder.events(), vec!["start:private", "cancel:private"]);
    assert!(router.current().place.is_root());
}

#[tokio::test]
async fn test_notify_false_skips_observers() {
    let router = Router::new().unwrap();
    let recorder = Arc::new(Recorder::preventing("quiet"));
    router.add_observer(recorder.clone());
    router
        .register(PlaceDefinition::new("quiet").url("/quiet"))
        .unwrap();

    let active = router
        .go_to("quiet", Default::default(), options().notify(false))
        .await
        .unwrap();
    assert_eq!(active.name(), "quiet");
    assert!(recorder.events().is_empty());
}

struct Rewrite;

impl TransitionObserver for Rewrite {
    fn on_not_found(&self, redirect: &mut Redirect, _from: &PlaceRef) -> NotFoundDecision {
        if redirect.to == "old.home" {
            redirect.to = "home".into();
        }
        if redirect.to == "forbidden" {
            return NotFoundDecision::Prevent;
        }
        NotFoundDecision::Continue
    }
}

#[tokio::test]
async fn test_not_found_rewrite_and_prevent() {
    let router = Router::new().unwrap();
    router.add_observer(Arc::new(Rewrite));
    router
        .register(PlaceDefinition::new("home").url("/home"))
        .unwrap();

    let active = router
        .go_to("old.home", Default::default(), options())
        .await
        .unwrap();
    assert_eq!(active.name(), "home");

    let err = router
        .go_to("forbidden", Default::default(), options())
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::Aborted));

    let err = router
        .go_to("missing", Default::default(), options())
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::NotFound { ref name, .. } if name == "missing"));
}

/// Registers `lazy` on demand, the way code-split places are loaded.
struct LazyLoader {
    router: Mutex<Option<Arc<Router>>>,
    attempts: AtomicUsize,
}

impl TransitionObserver for LazyLoader {
    fn on_not_found(&self, redirect: &mut Redirect, _from: &PlaceRef) -> NotFoundDecision {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let Some(router) = self.router.lock().unwrap().clone() else {
            return NotFoundDecision::Continue;
        };
        if redirect.to != "lazy" {
            return NotFoundDecision::Continue;
        }
        NotFoundDecision::Retry(
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                router.register(PlaceDefinition::new("lazy").url("/lazy"))?;
                Ok::<(), BoxError>(())
            }
            .boxed(),
        )
    }
}

#[tokio::test]
async fn test_deferred_retry_after_lazy_registration() {
    let router = Router::new().unwrap();
    let loader = Arc::new(LazyLoader {
        router: Mutex::new(Some(router.clone())),
        attempts: AtomicUsize::new(0),
    });
    router.add_observer(loader.clone());

    let active = router
        .go_to("lazy", Default::default(), options())
        .await
        .unwrap();
    assert_eq!(active.name(), "lazy");
    assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);

    // Break the observer's reference cycle.
    loader.router.lock().unwrap().take();
}

#[tokio::test]
async fn test_hooks_run_leaf_to_root_then_root_to_leaf() {
    let router = Router::new().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["a", "a.b", "c", "c.d"] {
        let enter_log = log.clone();
        let exit_log = log.clone();
        router
            .register(
                PlaceDefinition::new(name)
                    .on_enter(move |ctx| {
                        enter_log.lock().unwrap().push(format!("enter:{}", ctx.place.name()))
                    })
                    .on_exit(move |ctx| {
                        exit_log.lock().unwrap().push(format!("exit:{}", ctx.place.name()))
                    }),
            )
            .unwrap();
    }

    router.go_to("a.b", Default::default(), options()).await.unwrap();
    router.go_to("c.d", Default::default(), options()).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["enter:a", "enter:a.b", "exit:a.b", "exit:a", "enter:c", "enter:c.d"]
    );
}

#[tokio::test]
async fn test_transition_started_by_hook_exits_what_was_entered() {
    let router = Router::new().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let follow_up = Arc::new(Mutex::new(None));

    for name in ["a", "c"] {
        let enter_log = log.clone();
        let exit_log = log.clone();
        router
            .register(
                PlaceDefinition::new(name)
                    .on_enter(move |ctx| {
                        enter_log.lock().unwrap().push(format!("enter:{}", ctx.place.name()))
                    })
                    .on_exit(move |ctx| {
                        exit_log.lock().unwrap().push(format!("exit:{}", ctx.place.name()))
                    }),
            )
            .unwrap();
    }

    // Entering `b` immediately navigates on to `c`, while `a` is still active.
    let weak = Arc::downgrade(&router);
    let (enter_log, exit_log, slot) = (log.clone(), log.clone(), follow_up.clone());
    router
        .register(
            PlaceDefinition::new("b")
                .on_enter(move |ctx| {
                    enter_log.lock().unwrap().push(format!("enter:{}", ctx.place.name()));
                    if let Some(router) = weak.upgrade() {
                        let handle = router.go_to("c", Default::default(), TransitionOptions::default());
                        *slot.lock().unwrap() = Some(handle);
                    }
                })
                .on_exit(move |ctx| {
                    exit_log.lock().unwrap().push(format!("exit:{}", ctx.place.name()))
                }),
        )
        .unwrap();

    router.go_to("a", Default::default(), options()).await.unwrap();
    let err = router.go_to("b", Default::default(), options()).await.unwrap_err();
    assert!(matches!(err, TransitionError::Superseded));

    let handle = follow_up.lock().unwrap().take().unwrap();
    let active = handle.await.unwrap();
    assert_eq!(active.name(), "c");

    assert_eq!(
        *log.lock().unwrap(),
        vec!["enter:a", "exit:a", "enter:b", "exit:b", "enter:c"]
    );
    assert!(router.registry().get("a").unwrap().locals().is_none());
    assert!(router.registry().get("b").unwrap().locals().is_none());
    assert!(router.registry().get("c").unwrap().locals().is_some());
}

#[tokio::test]
async fn test_child_producer_runs_while_parent_sibling_pending() {
    let gate = Arc::new(Notify::new());
    let ran = Arc::new(AtomicUsize::new(0));
    let router = Router::new().unwrap();
    router
        .register(
            PlaceDefinition::new("shop")
                .url("/shop")
                .resolve("catalog", gated(&gate, json!(["hat"])))
                .resolve("currency", Invocable::value(json!("EUR"))),
        )
        .unwrap();
    let counter = ran.clone();
    router
        .register(PlaceDefinition::new("shop.cart").url("/cart").resolve(
            "label",
            Invocable::function(&["currency"], move |deps| {
                counter.fetch_add(1, Ordering::SeqCst);
                let currency = deps
                    .get("currency")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                async move { Ok::<_, BoxError>(json!(format!("total in {currency}"))) }
            }),
        ))
        .unwrap();

    let handle = router.go_to("shop.cart", Default::default(), options());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(router.is_transitioning());

    gate.notify_one();
    let active = handle.await.unwrap();
    let locals = active.locals().unwrap();
    assert_eq!(locals.values.get("label"), Some(&json!("total in EUR")));
    assert_eq!(locals.values.get("catalog"), Some(&json!(["hat"])));
}

#[tokio::test]
async fn test_view_templates_resolved_into_locals() {
    let router = Router::new().unwrap();
    router
        .register(
            PlaceDefinition::new("page")
                .url("/page/{slug}")
                .view("main", ViewDeclaration::new().template("<article/>"))
                .view(
                    "side",
                    ViewDeclaration::new()
                        .template("<aside/>")
                        .resolve("links", Invocable::value(json!(["a", "b"]))),
                ),
        )
        .unwrap();

    let active = router
        .go_to("page", params(&[("slug", json!("intro"))]), options())
        .await
        .unwrap();
    let locals = active.locals().unwrap();

    let main = &locals.views["main@"];
    assert_eq!(main.template.as_deref(), Some("<article/>"));
    let side = &locals.views["side@"];
    assert_eq!(side.template.as_deref(), Some("<aside/>"));
    assert_eq!(side.values.get("links"), Some(&json!(["a", "b"])));
    assert_eq!(
        locals.values.get("$params"),
        Some(&json!({ "slug": "intro" }))
    );
}

#[tokio::test]
async fn test_param_only_change_still_syncs_location() {
    let (router, location) = router_with_history();
    let runs = Arc::new(AtomicUsize::new(0));
    router
        .register(
            PlaceDefinition::new("list")
                .url("/list?sort")
                .reload_on_search(false)
                .resolve("rows", counting(&runs, json!([]))),
        )
        .unwrap();

    router
        .go_to("list", params(&[("sort", json!("name"))]), options())
        .await
        .unwrap();
    router
        .go_to("list", params(&[("sort", json!("date"))]), options())
        .await
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(location.history(), vec!["/list?sort=name", "/list?sort=date"]);
}

#[tokio::test]
async fn test_events_broadcast_in_order() {
    let router = Router::new().unwrap();
    let mut events = router.subscribe();
    router
        .register(PlaceDefinition::new("home").url("/home"))
        .unwrap();

    router.go_to("home", Default::default(), options()).await.unwrap();

    assert!(matches!(events.recv().await.unwrap(), RouterEvent::Start(info) if info.to == "home"));
    assert!(matches!(events.recv().await.unwrap(), RouterEvent::Success(info) if info.from.is_empty()));
}
