//! Интеграционные тесты фабрики сервисов: разрешение зависимостей,
//! дедупликация конкурентных созданий, жизненный цикл и health.

use async_trait::async_trait;
use serde_json::json;
use services::{
    Service, ServiceCore, ServiceError, ServiceFactory, ServiceRegistration, ServiceRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Тестовый сервис, пишущий события жизненного цикла в общий журнал
struct Probe {
    core: ServiceCore,
    init_delay: Duration,
    fail_init: bool,
    fail_cleanup: bool,
    fail_health: bool,
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Service for Probe {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    async fn on_initialize(&self) -> anyhow::Result<()> {
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        if self.fail_init {
            anyhow::bail!("init failed");
        }
        self.events
            .lock()
            .unwrap()
            .push(format!("init:{}", self.core.name()));
        Ok(())
    }

    async fn on_cleanup(&self) -> anyhow::Result<()> {
        if self.fail_cleanup {
            anyhow::bail!("cleanup failed");
        }
        self.events
            .lock()
            .unwrap()
            .push(format!("cleanup:{}", self.core.name()));
        Ok(())
    }

    async fn on_health_check(&self) -> anyhow::Result<serde_json::Value> {
        if self.fail_health {
            anyhow::bail!("probe down");
        }
        Ok(json!({"ok": true}))
    }
}

#[derive(Default, Clone)]
struct ProbeOptions {
    init_delay_ms: u64,
    fail_init: bool,
    fail_init_once: bool,
    fail_cleanup: bool,
    fail_health: bool,
}

struct Harness {
    registry: Arc<ServiceRegistry>,
    factory: ServiceFactory,
    events: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let factory = ServiceFactory::new(registry.clone());
        Self {
            registry,
            factory,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Зарегистрировать Probe-сервис; возвращает счётчик вызовов фабрики
    fn register(&self, name: &str, deps: Vec<&str>, options: ProbeOptions) -> Arc<AtomicUsize> {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        let events = self.events.clone();
        let service_name = name.to_string();

        let registration = ServiceRegistration::new(name, move |_deps, _config| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            let probe = Probe {
                core: ServiceCore::new(service_name.clone(), "1.0.0"),
                init_delay: Duration::from_millis(options.init_delay_ms),
                fail_init: options.fail_init || (options.fail_init_once && attempt == 0),
                fail_cleanup: options.fail_cleanup,
                fail_health: options.fail_health,
                events: events.clone(),
            };
            async move { Ok(Arc::new(probe) as Arc<dyn Service>) }
        })
        .with_dependencies(deps);

        self.registry.register(registration);
        invocations
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_initialization_order_puts_dependencies_first() {
    let harness = Harness::new();
    harness.register("api", vec!["db"], ProbeOptions::default());
    harness.register("db", vec![], ProbeOptions::default());

    let order = harness.factory.initialization_order().unwrap();
    let db_pos = order.iter().position(|n| n == "db").unwrap();
    let api_pos = order.iter().position(|n| n == "api").unwrap();
    assert!(db_pos < api_pos);

    harness.factory.initialize_all().await.unwrap();
    assert_eq!(harness.events(), vec!["init:db", "init:api"]);
}

#[tokio::test]
async fn test_cycle_is_reported_with_full_path() {
    let harness = Harness::new();
    harness.register("a", vec!["b"], ProbeOptions::default());
    harness.register("b", vec!["c"], ProbeOptions::default());
    harness.register("c", vec!["a"], ProbeOptions::default());

    let err = harness.registry.validate_dependencies("a").unwrap_err();
    match &err {
        ServiceError::CircularDependency { cycle } => {
            assert_eq!(cycle, "a -> b -> c -> a");
        }
        other => panic!("Expected cycle error, got {other:?}"),
    }

    // Глобальная сортировка находит тот же цикл
    let err = harness.factory.initialization_order().unwrap_err();
    assert_eq!(err.category(), "validation");
}

#[tokio::test]
async fn test_diamond_dependency_is_not_a_cycle() {
    let harness = Harness::new();
    harness.register("a", vec!["b", "c"], ProbeOptions::default());
    harness.register("b", vec!["d"], ProbeOptions::default());
    harness.register("c", vec!["d"], ProbeOptions::default());
    harness.register("d", vec![], ProbeOptions::default());

    assert!(harness.registry.validate_dependencies("a").is_ok());

    let order = harness.factory.initialization_order().unwrap();
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(pos("d") < pos("b"));
    assert!(pos("d") < pos("c"));
    assert!(pos("b") < pos("a"));
    assert!(pos("c") < pos("a"));
}

#[tokio::test]
async fn test_concurrent_create_builds_exactly_once() {
    let harness = Harness::new();
    let invocations = harness.register(
        "slow",
        vec![],
        ProbeOptions {
            init_delay_ms: 50,
            ..Default::default()
        },
    );

    let (first, second) = tokio::join!(
        harness.factory.create("slow"),
        harness.factory.create("slow")
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.events().iter().filter(|e| *e == "init:slow").count(),
        1
    );
}

#[tokio::test]
async fn test_shared_dependency_is_built_once() {
    let harness = Harness::new();
    harness.register("api", vec!["db"], ProbeOptions::default());
    harness.register("worker", vec!["db"], ProbeOptions::default());
    let db_invocations = harness.register("db", vec![], ProbeOptions::default());

    harness.factory.create("api").await.unwrap();
    harness.factory.create("worker").await.unwrap();

    assert_eq!(db_invocations.load(Ordering::SeqCst), 1);
    assert!(harness.factory.has("db"));
}

#[tokio::test]
async fn test_create_unregistered_fails_without_dangling_state() {
    let harness = Harness::new();

    let err = harness.factory.create("ghost").await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::NotRegistered {
            name: "ghost".to_string()
        }
    );

    let stats = harness.factory.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.live_instances, 0);
}

#[tokio::test]
async fn test_create_retries_after_failure() {
    let harness = Harness::new();
    let invocations = harness.register(
        "flaky",
        vec![],
        ProbeOptions {
            fail_init_once: true,
            ..Default::default()
        },
    );

    let err = harness.factory.create("flaky").await.unwrap_err();
    assert_eq!(err.category(), "initialization");
    assert!(!harness.factory.has("flaky"));

    // In-flight запись очищена, повторный create строит заново
    harness.factory.create("flaky").await.unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert!(harness.factory.has("flaky"));
}

#[tokio::test]
async fn test_initialize_all_aborts_on_first_error() {
    let harness = Harness::new();
    harness.register("ok", vec![], ProbeOptions::default());
    harness.register(
        "broken",
        vec!["ok"],
        ProbeOptions {
            fail_init: true,
            ..Default::default()
        },
    );

    let err = harness.factory.initialize_all().await.unwrap_err();
    assert_eq!(err.category(), "initialization");
    assert!(!harness.factory.has("broken"));
}

#[tokio::test]
async fn test_get_and_has_never_create() {
    let harness = Harness::new();
    let invocations = harness.register("db", vec![], ProbeOptions::default());

    assert!(harness.factory.get("db").is_none());
    assert!(!harness.factory.has("db"));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_destroy_all_survives_failing_cleanup() {
    let harness = Harness::new();
    harness.register(
        "fragile",
        vec![],
        ProbeOptions {
            fail_cleanup: true,
            ..Default::default()
        },
    );
    harness.register("solid", vec![], ProbeOptions::default());

    harness.factory.create("fragile").await.unwrap();
    harness.factory.create("solid").await.unwrap();

    harness.factory.destroy_all().await;

    assert!(!harness.factory.has("fragile"));
    assert!(!harness.factory.has("solid"));
    assert!(harness.events().contains(&"cleanup:solid".to_string()));
}

#[tokio::test]
async fn test_destroy_removes_instance_even_if_cleanup_fails() {
    let harness = Harness::new();
    harness.register(
        "fragile",
        vec![],
        ProbeOptions {
            fail_cleanup: true,
            ..Default::default()
        },
    );

    harness.factory.create("fragile").await.unwrap();
    harness.factory.destroy("fragile").await;

    assert!(!harness.factory.has("fragile"));
    assert_eq!(harness.factory.stats().destroyed, 1);
}

#[tokio::test]
async fn test_health_aggregation() {
    let harness = Harness::new();
    harness.register("healthy", vec![], ProbeOptions::default());
    harness.register(
        "sick",
        vec![],
        ProbeOptions {
            fail_health: true,
            ..Default::default()
        },
    );

    harness.factory.create("healthy").await.unwrap();
    harness.factory.create("sick").await.unwrap();

    let reports = harness.factory.all_services_health().await;
    assert_eq!(reports.len(), 2);
    assert!(reports["healthy"].is_healthy());
    assert!(!reports["sick"].is_healthy());
    assert!(reports["sick"].metadata["error"]
        .as_str()
        .unwrap()
        .contains("probe down"));

    let single = harness.factory.service_health("healthy").await.unwrap();
    assert!(single.is_healthy());
    assert!(harness.factory.service_health("missing").await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stats_under_concurrent_churn() {
    let harness = Harness::new();
    for i in 0..4 {
        harness.register(
            &format!("svc{i}"),
            vec![],
            ProbeOptions {
                init_delay_ms: 1,
                ..Default::default()
            },
        );
    }

    // Циклы create/destroy вперемешку с опросом stats на нескольких
    // потоках: stats не должен удерживать instances при захвате in_flight
    let mut tasks = Vec::new();
    for i in 0..4 {
        let factory = harness.factory.clone();
        let name = format!("svc{i}");
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                factory.create(&name).await.unwrap();
                factory.destroy(&name).await;
            }
        }));

        let factory = harness.factory.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..200 {
                let stats = factory.stats();
                assert_eq!(stats.failed, 0);
                tokio::task::yield_now().await;
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let stats = harness.factory.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.created, 100);
    assert_eq!(stats.destroyed, 100);
}

#[tokio::test]
async fn test_config_is_passed_to_factory() {
    let registry = Arc::new(ServiceRegistry::new());
    let factory = ServiceFactory::new(registry.clone());
    let seen_config = Arc::new(Mutex::new(None));

    let sink = seen_config.clone();
    registry.register(
        ServiceRegistration::new("configured", move |_deps, config| {
            *sink.lock().unwrap() = Some(config);
            async move {
                Ok(Arc::new(NullService {
                    core: ServiceCore::new("configured", "1.0.0"),
                }) as Arc<dyn Service>)
            }
        })
        .with_config(json!({"dsn": "postgres://studio"})),
    );

    factory.create("configured").await.unwrap();

    let config = seen_config.lock().unwrap().clone().unwrap();
    assert_eq!(config["dsn"], "postgres://studio");
}

#[tokio::test]
async fn test_dependencies_are_passed_in_declared_order() {
    let registry = Arc::new(ServiceRegistry::new());
    let factory = ServiceFactory::new(registry.clone());
    let seen_deps = Arc::new(Mutex::new(Vec::new()));

    for name in ["alpha", "beta"] {
        registry.register(ServiceRegistration::new(name, move |_deps, _config| {
            async move {
                Ok(Arc::new(NullService {
                    core: ServiceCore::new(name, "1.0.0"),
                }) as Arc<dyn Service>)
            }
        }));
    }

    let sink = seen_deps.clone();
    registry.register(
        ServiceRegistration::new("top", move |deps, _config| {
            let names: Vec<String> = deps.iter().map(|d| d.name().to_string()).collect();
            sink.lock().unwrap().extend(names);
            async move {
                Ok(Arc::new(NullService {
                    core: ServiceCore::new("top", "1.0.0"),
                }) as Arc<dyn Service>)
            }
        })
        .with_dependencies(vec!["beta", "alpha"]),
    );

    factory.create("top").await.unwrap();

    assert_eq!(*seen_deps.lock().unwrap(), vec!["beta", "alpha"]);
}

struct NullService {
    core: ServiceCore,
}

#[async_trait]
impl Service for NullService {
    fn core(&self) -> &ServiceCore {
        &self.core
    }
}
