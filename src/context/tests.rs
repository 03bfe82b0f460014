use super::*;
use crate::config::ConfigService;
use crate::di::{Args, AutowireDeclaration, Resolved, Wired};
use crate::inspector::{InspectorFilter, MatchingInspector, NamePattern};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Holder {
    deps: Vec<Resolved>,
}

impl Holder {
    fn class() -> Class {
        Class::builder(|args: Args| {
            Ok(Holder {
                deps: args.into_values(),
            })
        })
        .build()
    }

    fn dep<T: Any + Send + Sync>(&self, index: usize) -> Arc<T> {
        self.deps[index].object().unwrap()
    }

    fn text(&self, index: usize) -> String {
        self.deps[index].value().unwrap()
    }
}

#[derive(Default)]
struct Node {
    peer: Wired<Node>,
    other: Wired<Node>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

fn node_class() -> Class {
    Class::builder(|_| Ok(Node::default()))
        .wire("peer", |n| &n.peer)
        .wire("other", |n| &n.other)
        .method("start", |n: Arc<Node>| async move {
            n.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .method("stop", |n: Arc<Node>| async move {
            n.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .method("explode", |_n: Arc<Node>| async move {
            Err(anyhow::anyhow!("boom"))
        })
        .method("nap", |n: Arc<Node>| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            n.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .start_method("start")
        .stop_method("stop")
        .build()
}

fn define_lazy(context: &Context, name: &str, class: Class) -> Arc<SingletonDefinition> {
    let definition = Arc::new(SingletonDefinition::new(name, class));
    context
        .register_definition(definition.clone(), false)
        .unwrap();
    definition
}

/// Registers an eager definition
fn define(context: &Context, name: &str, class: Class) -> Arc<SingletonDefinition> {
    let definition = Arc::new(SingletonDefinition::new(name, class));
    definition.with_lazy_loading(false).unwrap();
    context
        .register_definition(definition.clone(), false)
        .unwrap();
    definition
}

#[tokio::test]
async fn test_value_argument_end_to_end() {
    let context = Context::new("test");
    define(&context, "A", Holder::class())
        .constructor_param_by_value("hello")
        .unwrap();

    context.lc_start().await.unwrap();
    let a = context.get::<Holder>("A").await.unwrap();
    assert_eq!(a.text(0), "hello");
}

#[tokio::test]
async fn test_singleton_identity() {
    let context = Context::new("test");
    define(&context, "A", Holder::class());

    let first = context.get::<Holder>("A").await.unwrap();
    for _ in 0..3 {
        let again = context.get::<Holder>("A").await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
}

#[tokio::test]
async fn test_reference_resolves_to_same_object() {
    let context = Context::new("test");
    define(&context, "A", Holder::class())
        .constructor_param_by_ref("B")
        .unwrap();
    define(&context, "B", Holder::class());

    context.lc_start().await.unwrap();
    let a = context.get::<Holder>("A").await.unwrap();
    let b = context.get::<Holder>("B").await.unwrap();
    assert!(Arc::ptr_eq(&a.dep::<Holder>(0), &b));
}

#[tokio::test]
async fn test_constructor_cycle_is_detected() {
    let context = Context::new("test");
    define(&context, "A", Holder::class())
        .constructor_param_by_ref("B")
        .unwrap();
    define(&context, "B", Holder::class())
        .constructor_param_by_ref("A")
        .unwrap();

    let err = context.get_object_by_name("A").await.unwrap_err();
    match err {
        IocError::CircularDependency { name, trace } => {
            assert_eq!(name, "A");
            assert_eq!(trace, "A -> B -> A");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = context.lc_start().await.unwrap_err();
    assert!(matches!(err, IocError::CircularDependency { .. }));
    for name in ["A", "B"] {
        let definition = context.get_definition_by_name(name).unwrap();
        assert!(definition.status() < LifecycleState::Instantiated);
        assert!(definition.instance().is_none());
    }
}

#[tokio::test]
async fn test_property_cycle_is_wired() {
    let context = Context::new("test");
    for (name, peer) in [("a", "b"), ("b", "a")] {
        define(&context, name, node_class())
            .set_property_by_ref("peer", peer)
            .unwrap()
            .start_function("start")
            .unwrap();
    }

    let a = context.get::<Node>("a").await.unwrap();
    let b = context.get::<Node>("b").await.unwrap();
    assert!(Arc::ptr_eq(&a.peer.get().unwrap(), &b));
    assert!(Arc::ptr_eq(&b.peer.get().unwrap(), &a));

    // both were completed by the deferred sweep of the first request
    assert_eq!(a.starts.load(Ordering::SeqCst), 1);
    assert_eq!(b.starts.load(Ordering::SeqCst), 1);
    let b_definition = context.get_definition_by_name("b").unwrap();
    assert_eq!(b_definition.status(), LifecycleState::Started);
}

#[tokio::test]
async fn test_property_cycle_during_bulk_start() {
    let context = Context::new("test");
    define(&context, "a", node_class())
        .set_property_by_ref("peer", "b")
        .unwrap();
    define(&context, "b", node_class())
        .set_property_by_ref("peer", "a")
        .unwrap();

    context.lc_start().await.unwrap();
    let a = context.get::<Node>("a").await.unwrap();
    let b = context.get::<Node>("b").await.unwrap();
    assert!(Arc::ptr_eq(&a.peer.get().unwrap(), &b));
    assert!(Arc::ptr_eq(&b.peer.get().unwrap(), &a));
}

#[tokio::test]
async fn test_diamond_shares_dependency() {
    let context = Context::new("test");
    let last = define(&context, "final", node_class());
    last.set_property_by_ref("peer", "a1").unwrap();
    last.set_property_by_ref("other", "a2").unwrap();
    define(&context, "a1", node_class())
        .set_property_by_ref("peer", "b")
        .unwrap();
    define(&context, "a2", node_class())
        .set_property_by_ref("peer", "b")
        .unwrap();
    define(&context, "b", node_class());

    context.lc_start().await.unwrap();
    let last = context.get::<Node>("final").await.unwrap();
    let via_a1 = last.peer.get().unwrap().peer.get().unwrap();
    let via_a2 = last.other.get().unwrap().peer.get().unwrap();
    assert!(Arc::ptr_eq(&via_a1, &via_a2));
    assert_eq!(via_a1.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parent_shadowing_rules() {
    let parent = Context::new("parent");
    define(&parent, "shared", Holder::class());
    let child = Context::builder("child").parent(Arc::clone(&parent)).build();

    let duplicate = Arc::new(SingletonDefinition::new("shared", Holder::class()));
    let err = child.register_definition(duplicate, true).unwrap_err();
    assert!(matches!(err, IocError::AlreadyRegistered { context, .. } if context == "parent"));

    let from_child = child.get::<Holder>("shared").await.unwrap();
    let from_parent = parent.get::<Holder>("shared").await.unwrap();
    assert!(Arc::ptr_eq(&from_child, &from_parent));
}

#[tokio::test]
async fn test_child_lifecycle_drives_parent() {
    let parent = Context::new("parent");
    let child = Context::builder("child").parent(Arc::clone(&parent)).build();

    child.lc_start().await.unwrap();
    assert_eq!(parent.status(), LifecycleState::Started);

    child.lc_stop().await.unwrap();
    assert_eq!(child.status(), LifecycleState::Stopped);
    assert_eq!(parent.status(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_lazy_definitions_wait_for_lookup() {
    let context = Context::new("test");
    let lazy = define(&context, "lazy", node_class());
    lazy.with_lazy_loading(true).unwrap();
    let eager = define(&context, "eager", node_class());

    context.lc_start().await.unwrap();
    assert_eq!(eager.status(), LifecycleState::Started);
    assert_eq!(lazy.status(), LifecycleState::NotStarted);
    assert!(lazy.instance().is_none());

    let node = context.get::<Node>("lazy").await.unwrap();
    assert_eq!(node.starts.load(Ordering::SeqCst), 1);
    assert_eq!(lazy.status(), LifecycleState::Started);
}

#[tokio::test]
async fn test_lazy_marker_is_applied_on_start() {
    let context = Context::new("test");
    let marked = || Class::builder(|_| Ok(Node::default())).lazy(false).build();
    let implicit = define_lazy(&context, "implicit", marked());
    let explicit = define_lazy(&context, "explicit", marked());
    explicit.with_lazy_loading(true).unwrap();

    context.lc_start().await.unwrap();
    assert!(!implicit.is_lazy());
    assert_eq!(implicit.status(), LifecycleState::Started);
    assert!(explicit.is_lazy());
    assert_eq!(explicit.status(), LifecycleState::NotStarted);
}

#[tokio::test]
async fn test_failed_deferred_start_leaves_siblings_usable() {
    let context = Context::new("test");
    let top = define_lazy(&context, "top", node_class());
    top.set_property_by_ref("peer", "slow")
        .unwrap()
        .set_property_by_ref("other", "bad")
        .unwrap();
    define_lazy(&context, "slow", node_class())
        .start_function("nap")
        .unwrap();
    define_lazy(&context, "bad", node_class())
        .start_function("explode")
        .unwrap();
    context.lc_start().await.unwrap();

    let err = context.get_object_by_name("top").await.unwrap_err();
    assert!(err.to_string().contains("trace: top -> bad"), "{err}");

    let slow = tokio::time::timeout(Duration::from_secs(2), context.get::<Node>("slow"))
        .await
        .expect("slow never finished starting")
        .unwrap();
    assert_eq!(slow.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_lookup_fails_later_requests() {
    let context = Context::new("test");
    let slow = define_lazy(&context, "slow", node_class());
    slow.start_function("nap").unwrap();
    context.lc_start().await.unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(10), context.get_object_by_name("slow")).await;
    assert!(cancelled.is_err());
    assert_eq!(slow.status(), LifecycleState::Starting);

    let err = tokio::time::timeout(Duration::from_secs(1), context.get_object_by_name("slow"))
        .await
        .expect("lookup after cancellation hung")
        .unwrap_err();
    assert!(err.to_string().contains("cancelled"), "{err}");
}

#[tokio::test]
async fn test_type_lookup_ambiguity() {
    let context = Context::new("test");
    define(&context, "h1", Holder::class());
    define(&context, "h2", Holder::class());

    let err = context.get_definition_by_type("Holder").unwrap_err();
    assert!(matches!(err, IocError::AmbiguousType { ref candidates, .. } if candidates.len() == 2));
    assert_eq!(context.get_definitions_by_type("Holder", true).unwrap().len(), 2);
    assert!(matches!(
        context.get_definitions_by_type("Missing", true),
        Err(IocError::TypeNotFound { .. })
    ));
    assert!(context.get_definitions_by_type("Missing", false).unwrap().is_empty());
}

#[tokio::test]
async fn test_autowire_candidates_only() {
    let context = Context::new("test");
    define(&context, "h1", Holder::class());
    define(&context, "h2", Holder::class())
        .set_autowire_candidate(false)
        .unwrap();

    let definition = context.get_definition_by_type("Holder").unwrap();
    assert_eq!(definition.name(), "h1");
}

#[tokio::test]
async fn test_config_argument_read_at_instantiation() {
    let config = ConfigService::from_value(json!({ "app": { "name": "demo" } }));
    let context = Context::builder("test").config(config.clone()).build();
    define(&context, "A", Holder::class())
        .constructor_param_by_config("app.name")
        .unwrap();

    config.set("app.name", "changed");
    context.lc_start().await.unwrap();

    let a = context.get::<Holder>("A").await.unwrap();
    assert_eq!(a.text(0), "changed");
    assert_eq!(context.get_config_as::<String>("app.name").unwrap(), "changed");
    assert_eq!(context.get_config_or("app.port", 80), json!(80));
    assert!(!context.has_config("app.port"));
}

#[tokio::test]
async fn test_missing_config_names_owner() {
    let context = Context::new("test");
    define(&context, "A", Holder::class())
        .constructor_param_by_config("app.missing")
        .unwrap();

    let err = context.lc_start().await.unwrap_err();
    match err {
        IocError::Dependency { owner, source, .. } => {
            assert_eq!(owner, "A");
            assert!(matches!(*source, IocError::ConfigNotFound { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_child_inherits_parent_config() {
    let parent = Context::builder("parent")
        .config(ConfigService::from_value(json!({ "region": "eu" })))
        .build();
    let child = Context::builder("child").parent(parent).build();
    assert_eq!(child.get_config("region").unwrap(), json!("eu"));
}

#[tokio::test]
async fn test_registration_closed_after_start() {
    let context = Context::new("test");
    context.lc_start().await.unwrap();

    let late = Arc::new(SingletonDefinition::new("late", Holder::class()));
    assert!(matches!(
        context.register_definition(late, false),
        Err(IocError::IllegalState { .. })
    ));
    assert!(context.add_to_group("g", "late").is_err());
    assert!(context.lc_start().await.is_err());
}

#[tokio::test]
async fn test_duplicate_names() {
    let context = Context::new("test");
    define(&context, "A", Holder::class());

    let again = Arc::new(SingletonDefinition::new("A", Holder::class()));
    assert!(context.register_definition(again.clone(), false).is_err());
    context.register_definition(again.clone(), true).unwrap();

    let current = context.get_definition_by_name("A").unwrap();
    assert!(Arc::ptr_eq(
        &current,
        &(again as Arc<dyn ObjectDefinition>)
    ));
}

#[tokio::test]
async fn test_failed_start_stops_started_objects() {
    let context = Context::new("test");
    let ok = define(&context, "ok", node_class());
    define(&context, "bad", node_class())
        .start_function("explode")
        .unwrap();

    let err = context.lc_start().await.unwrap_err();
    match err {
        IocError::Phase { name, phase, .. } => {
            assert_eq!(name, "bad");
            assert_eq!(phase, crate::error::Phase::Start);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(context.status(), LifecycleState::Stopped);
    assert_eq!(ok.status(), LifecycleState::Stopped);
    let ok = downcast::<Node>(ok.instance().unwrap()).unwrap();
    assert_eq!(ok.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_is_best_effort() {
    let context = Context::new("test");
    define(&context, "a", node_class());
    define(&context, "b", node_class())
        .stop_function("explode")
        .unwrap();

    context.lc_start().await.unwrap();
    let a = context.get::<Node>("a").await.unwrap();
    let mut names = context.started_object_names();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    context.lc_stop().await.unwrap();
    assert_eq!(a.stops.load(Ordering::SeqCst), 1);
    assert!(matches!(
        context.get_object_by_name("a").await,
        Err(IocError::Stopping { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_grace_delays_stop() {
    let context = Context::builder("test")
        .shutdown_grace(Duration::from_secs(5))
        .build();
    define(&context, "a", node_class());
    context.lc_start().await.unwrap();
    let a = context.get::<Node>("a").await.unwrap();

    let began = tokio::time::Instant::now();
    context.lc_stop().await.unwrap();
    assert!(began.elapsed() >= Duration::from_secs(5));
    assert_eq!(a.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_groups() {
    let context = Context::new("test");
    context
        .register_singletons_in_group(
            "handlers",
            vec![
                SingletonDefinition::new("h1", Holder::class()),
                SingletonDefinition::new("h2", Holder::class()),
            ],
        )
        .unwrap();
    define(&context, "router", Holder::class())
        .constructor_param_by_group("handlers")
        .unwrap();

    context.lc_start().await.unwrap();
    let handlers = context.get_objects_by_group("handlers").await.unwrap();
    assert_eq!(handlers.len(), 2);

    let router = context.get::<Holder>("router").await.unwrap();
    let wired = router.deps[0].objects::<Holder>().unwrap();
    let h1 = context.get::<Holder>("h1").await.unwrap();
    assert!(Arc::ptr_eq(&wired[0], &h1));
    assert!(context.get_objects_by_group("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_group_marker_on_class() {
    let context = Context::new("test");
    let class = Class::builder(|_| Ok(Node::default())).group("workers").build();
    context.register_singletons([class]).unwrap();

    let members = context.get_definitions_by_group("workers").unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name(), "Node");
}

struct Ranked {
    rank: i64,
}

fn ranked_class() -> Class {
    Class::builder(|args: Args| Ok(Ranked { rank: args.value(0)? }))
        .order_by(|r| r.rank)
        .build()
}

#[tokio::test]
async fn test_objects_by_type_are_ordered() {
    let context = Context::new("test");
    for (name, rank) in [("r3", 3i64), ("r1", 1), ("r2", 2)] {
        define(&context, name, ranked_class())
            .constructor_param_by_value(rank)
            .unwrap();
    }

    let ranked = context.get_all_by_type::<Ranked>().await.unwrap();
    let ranks: Vec<_> = ranked.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_type_array_argument() {
    let context = Context::new("test");
    define(&context, "r1", ranked_class())
        .constructor_param_by_value(1)
        .unwrap();
    define(&context, "all", Holder::class())
        .constructor_param_by_type_array("Ranked")
        .unwrap()
        .constructor_param_by_type_array("Nothing")
        .unwrap();

    let all = context.get::<Holder>("all").await.unwrap();
    assert_eq!(all.deps[0].objects::<Ranked>().unwrap().len(), 1);
    assert!(all.deps[1].objects::<Ranked>().unwrap().is_empty());
}

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct English;

impl Greeter for English {
    fn greet(&self) -> String {
        "hello".into()
    }
}

#[tokio::test]
async fn test_trait_alias_lookup() {
    let context = Context::new("test");
    let english = Class::builder(|_| Ok(English))
        .implements("Greeter", |e| e as Arc<dyn Greeter>)
        .build();
    define(&context, "english", english);
    define(&context, "user", Holder::class())
        .constructor_param_by_type("Greeter")
        .unwrap();

    let greeter = context.get_dyn::<dyn Greeter>("Greeter").await.unwrap();
    assert_eq!(greeter.greet(), "hello");

    let user = context.get::<Holder>("user").await.unwrap();
    assert_eq!(user.deps[0].object_dyn::<dyn Greeter>().unwrap().greet(), "hello");
    assert!(context.get_by_type::<English>().await.is_ok());
}

#[tokio::test]
async fn test_context_is_injectable() {
    let context = Context::new("test");
    define(&context, "needs", Holder::class())
        .constructor_param_by_ref(CONTEXT_DEFINITION_NAME)
        .unwrap();

    context.lc_start().await.unwrap();
    let needs = context.get::<Holder>("needs").await.unwrap();
    assert!(Arc::ptr_eq(&needs.dep::<Context>(0), &context));
    assert!(!context.started_object_names().contains(&CONTEXT_DEFINITION_NAME.to_string()));
}

#[tokio::test]
async fn test_clone_context() {
    let context = Context::new("test");
    define(&context, "A", Holder::class())
        .constructor_param_by_value("x")
        .unwrap();
    context.add_to_group("letters", "A").unwrap();

    let copy = context.clone_context("copy").unwrap();
    assert_eq!(copy.name(), "copy");
    copy.lc_start().await.unwrap();

    let original = context.get::<Holder>("A").await.unwrap();
    let copied = copy.get::<Holder>("A").await.unwrap();
    assert!(!Arc::ptr_eq(&original, &copied));
    assert_eq!(copied.text(0), "x");
    assert_eq!(copy.get_definitions_by_group("letters").unwrap().len(), 1);

    context.lc_start().await.unwrap();
    assert!(context.clone_context("late").is_err());
}

#[tokio::test]
async fn test_import_context() {
    let context = Context::new("test");
    define(&context, "A", Holder::class());
    let other = Context::new("other");
    define(&other, "A", Holder::class())
        .constructor_param_by_value("imported")
        .unwrap();
    define(&other, "B", Holder::class());

    assert!(context.import_context(&other, false).is_err());
    context.import_context(&other, true).unwrap();

    let a = context.get::<Holder>("A").await.unwrap();
    assert_eq!(a.text(0), "imported");
    assert!(context.find_definition("B").is_some());

    other.lc_start().await.unwrap();
    let fresh = Context::new("fresh");
    assert!(fresh.import_context(&other, false).is_err());
}

struct Replace {
    filter: InspectorFilter,
}

impl MatchingInspector for Replace {
    fn filter(&self) -> &InspectorFilter {
        &self.filter
    }

    fn do_inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>> {
        let replacement = SingletonDefinition::new(definition.name(), Holder::class());
        replacement.constructor_param_by_value("replaced")?;
        Ok(Some(Arc::new(replacement)))
    }
}

#[tokio::test]
async fn test_inspector_can_replace_definitions() {
    let context = Context::new("test");
    define(&context, "greeting", Holder::class())
        .constructor_param_by_value("original")
        .unwrap();
    define(&context, "farewell", Holder::class())
        .constructor_param_by_value("original")
        .unwrap();
    context
        .add_object_definition_inspector(Arc::new(Replace {
            filter: InspectorFilter::new().name(NamePattern::regex("^greet").unwrap()),
        }))
        .unwrap();

    context.lc_start().await.unwrap();
    assert_eq!(context.get::<Holder>("greeting").await.unwrap().text(0), "replaced");
    assert_eq!(context.get::<Holder>("farewell").await.unwrap().text(0), "original");
}

#[tokio::test]
async fn test_autowire_declaration() {
    let config = ConfigService::from_value(json!({ "app": { "name": "demo" } }));
    let context = Context::builder("test").config(config).build();
    let class = Class::builder(|args: Args| {
        Ok(Holder {
            deps: args.into_values(),
        })
    })
    .named("Service")
    .autowire(
        AutowireDeclaration::new()
            .constructor("leaf")
            .constructor("#app.name")
            .constructor("*Ranked"),
    )
    .build();
    define(&context, "service", class);
    define(&context, "leaf", Holder::class());

    context.lc_start().await.unwrap();
    let service = context.get::<Holder>("service").await.unwrap();
    let leaf = context.get::<Holder>("leaf").await.unwrap();
    assert!(Arc::ptr_eq(&service.dep::<Holder>(0), &leaf));
    assert_eq!(service.text(1), "demo");
    assert!(service.deps[2].objects::<Ranked>().unwrap().is_empty());
}

#[tokio::test]
async fn test_without_default_inspectors_ignores_markers() {
    let context = Context::builder("test").without_default_inspectors().build();
    define(&context, "node", node_class());

    context.lc_start().await.unwrap();
    let node = context.get::<Node>("node").await.unwrap();
    assert_eq!(node.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lifecycle_events() {
    let context = Context::new("test");
    let definition = define(&context, "a", node_class());
    let mut events = definition.state_machine().subscribe();

    context.lc_start().await.unwrap();
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.state);
    }
    assert_eq!(
        seen,
        vec![
            LifecycleState::Instantiating,
            LifecycleState::Instantiated,
            LifecycleState::SettingProperties,
            LifecycleState::PropertiesSet,
            LifecycleState::Starting,
            LifecycleState::Started,
        ]
    );
}
