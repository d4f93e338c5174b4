//! Фабрика сервисов
//!
//! Превращает регистрации в живые, разрешённые по зависимостям
//! singleton-экземпляры, корректно под конкурентной нагрузкой.
//! Конкурентные `create` одного имени дедуплицируются через общий
//! мемоизированный future (single-flight): handle регистрируется в
//! in-flight карте до начала любой асинхронной работы, закрывая гонку
//! между проверкой и стартом построения.

use crate::errors::{Result, ServiceError};
use crate::health::HealthReport;
use crate::registry::ServiceRegistry;
use crate::service::Service;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Общий handle на выполняющееся создание сервиса
type SharedCreation = Shared<BoxFuture<'static, Result<Arc<dyn Service>>>>;

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    failed: u64,
    destroyed: u64,
}

/// Снимок счётчиков фабрики
#[derive(Debug, Clone, Serialize)]
pub struct FactoryStats {
    pub created: u64,
    pub failed: u64,
    pub destroyed: u64,
    pub live_instances: usize,
    pub in_flight: usize,
}

struct FactoryInner {
    registry: Arc<ServiceRegistry>,
    /// Завершённые экземпляры; владеет только фабрика
    instances: RwLock<HashMap<String, Arc<dyn Service>>>,
    /// Выполняющиеся создания; запись удаляется при любом исходе
    in_flight: Mutex<HashMap<String, SharedCreation>>,
    counters: RwLock<Counters>,
}

/// Фабрика singleton-экземпляров сервисов
///
/// Клонирование дёшево: все клоны разделяют одно состояние.
#[derive(Clone)]
pub struct ServiceFactory {
    inner: Arc<FactoryInner>,
}

impl ServiceFactory {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                registry,
                instances: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                counters: RwLock::new(Counters::default()),
            }),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    /// Создать сервис или вернуть уже существующий экземпляр
    ///
    /// Конкурентные вызовы для одного имени получают один и тот же
    /// экземпляр; фабрика и `initialize` выполняются не более одного
    /// раза. После неудачи in-flight запись очищается и следующий
    /// вызов попробует построить сервис заново. Таймаутов на этом
    /// уровне нет: зависший setup-хук блокирует всех зависимых.
    pub async fn create(&self, name: &str) -> Result<Arc<dyn Service>> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }

        let handle = {
            let mut in_flight = self.inner.in_flight.lock();

            // Повторная проверка под замком: создание могло завершиться
            // между быстрой проверкой и захватом in-flight карты
            if let Some(existing) = self.inner.instances.read().get(name) {
                return Ok(existing.clone());
            }

            match in_flight.get(name) {
                Some(handle) => {
                    debug!(service = %name, "⏳ Присоединяемся к выполняющемуся созданию");
                    handle.clone()
                }
                None => {
                    let factory = self.clone();
                    let service_name = name.to_string();
                    let handle = async move { factory.build(service_name).await }
                        .boxed()
                        .shared();
                    in_flight.insert(name.to_string(), handle.clone());
                    handle
                }
            }
        };

        handle.await
    }

    /// Построение с обязательной очисткой in-flight записи
    async fn build(self, name: String) -> Result<Arc<dyn Service>> {
        let result = self.build_inner(&name).await;

        self.inner.in_flight.lock().remove(&name);

        match &result {
            Ok(_) => self.inner.counters.write().created += 1,
            Err(e) => {
                self.inner.counters.write().failed += 1;
                error!(
                    service = %name,
                    category = e.category(),
                    "❌ Создание сервиса не удалось: {e}"
                );
            }
        }

        result
    }

    fn build_inner<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Arc<dyn Service>>> {
        async move {
        // Валидация всего поддерева до каких-либо побочных эффектов
        self.inner.registry.validate_dependencies(name)?;

        let registration =
            self.inner
                .registry
                .get_registration(name)
                .ok_or_else(|| ServiceError::NotRegistered {
                    name: name.to_string(),
                })?;

        debug!(
            service = %name,
            dependencies = ?registration.dependencies,
            "🏗️ Создание сервиса"
        );

        // Зависимости в объявленном порядке; общие зависимости соседних
        // веток дедуплицируются теми же instances/in-flight картами
        let mut resolved = Vec::with_capacity(registration.dependencies.len());
        for dependency in &registration.dependencies {
            resolved.push(self.create(dependency).await?);
        }

        let instance = (registration.factory)(resolved, registration.config.clone())
            .await
            .map_err(|e| ServiceError::Factory {
                service: name.to_string(),
                message: format!("{e:#}"),
            })?;

        instance.initialize().await?;

        self.inner
            .instances
            .write()
            .insert(name.to_string(), instance.clone());

        info!(service = %name, "✅ Сервис создан и готов");
        Ok(instance)
        }
        .boxed()
    }

    /// Завершённый экземпляр, если он есть; создание не запускается
    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.inner.instances.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.instances.read().contains_key(name)
    }

    /// Уничтожить сервис: cleanup best-effort, экземпляр удаляется из
    /// кэша независимо от исхода очистки
    pub async fn destroy(&self, name: &str) {
        let instance = self.inner.instances.write().remove(name);

        let Some(instance) = instance else {
            debug!(service = %name, "Нечего уничтожать: экземпляр не создан");
            return;
        };

        if let Err(e) = instance.cleanup().await {
            warn!(
                service = %name,
                category = e.category(),
                "⚠️ Очистка сервиса не удалась, продолжаем: {e}"
            );
        }

        self.inner.counters.write().destroyed += 1;
        info!(service = %name, "🗑️ Сервис уничтожен");
    }

    /// Уничтожить все сервисы конкурентно
    ///
    /// Каждый `destroy` гасит свои ошибки сам, поэтому один сломанный
    /// teardown не прерывает остальных.
    pub async fn destroy_all(&self) {
        let names: Vec<String> = self.inner.instances.read().keys().cloned().collect();
        if names.is_empty() {
            return;
        }

        info!(count = names.len(), "🛑 Уничтожаем все сервисы...");
        join_all(names.iter().map(|name| self.destroy(name))).await;
    }

    /// Health-отчёт одного созданного сервиса
    pub async fn service_health(&self, name: &str) -> Option<HealthReport> {
        let instance = self.get(name)?;
        Some(self.checked_health(name, instance).await)
    }

    /// Health-отчёты всех созданных сервисов, параллельный сбор
    pub async fn all_services_health(&self) -> HashMap<String, HealthReport> {
        let snapshot: Vec<(String, Arc<dyn Service>)> = self
            .inner
            .instances
            .read()
            .iter()
            .map(|(name, instance)| (name.clone(), instance.clone()))
            .collect();

        let reports = snapshot.into_iter().map(|(name, instance)| async move {
            let report = self.checked_health(&name, instance).await;
            (name, report)
        });

        join_all(reports).await.into_iter().collect()
    }

    /// `health_check` по контракту не падает, но фабрика защищается и
    /// от паникующей реализации, подставляя Unhealthy-отчёт
    async fn checked_health(&self, name: &str, instance: Arc<dyn Service>) -> HealthReport {
        let version = instance.version().to_string();
        let initialized = instance.core().is_initialized();

        match tokio::spawn(async move { instance.health_check().await }).await {
            Ok(report) => report,
            Err(e) => {
                warn!(service = %name, "⚠️ Health-проверка паниковала: {e}");
                HealthReport::unhealthy(version, format!("health check panicked: {e}"), initialized)
            }
        }
    }

    /// Глобальный топологический порядок инициализации
    ///
    /// Обходит каждое зарегистрированное имя (не одно поддерево) DFS-ом
    /// с маркером "в обработке" и падает на первом найденном цикле с
    /// полным путём.
    pub fn initialization_order(&self) -> Result<Vec<String>> {
        let names = self.inner.registry.list();
        let mut order = Vec::with_capacity(names.len());
        let mut visited = HashSet::new();
        let mut visiting = Vec::new();

        for name in &names {
            self.visit(name, &mut visited, &mut visiting, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        visiting: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }

        if let Some(position) = visiting.iter().position(|n| n == name) {
            let mut cycle: Vec<&str> = visiting[position..].iter().map(String::as_str).collect();
            cycle.push(name);
            return Err(ServiceError::CircularDependency {
                cycle: cycle.join(" -> "),
            });
        }

        if !self.inner.registry.has(name) {
            return Err(ServiceError::NotRegistered {
                name: name.to_string(),
            });
        }

        visiting.push(name.to_string());
        for dependency in self.inner.registry.get_dependencies(name) {
            self.visit(&dependency, visited, visiting, order)?;
        }
        visiting.pop();

        visited.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Создать все зарегистрированные сервисы в топологическом порядке
    ///
    /// Прерывается на первой ошибке, частичная инициализация не
    /// маскируется.
    pub async fn initialize_all(&self) -> Result<()> {
        let order = self.initialization_order()?;
        info!(order = ?order, "🚀 Инициализация всех сервисов...");

        for name in &order {
            self.create(name).await?;
        }

        info!(count = order.len(), "✅ Все сервисы инициализированы");
        Ok(())
    }

    /// Снимок счётчиков фабрики
    ///
    /// Замки берутся строго по одному: `create` захватывает `in_flight`
    /// раньше `instances`, и перекрывающиеся захваты в обратном порядке
    /// здесь образовали бы цикл ожидания.
    pub fn stats(&self) -> FactoryStats {
        let (created, failed, destroyed) = {
            let counters = self.inner.counters.read();
            (counters.created, counters.failed, counters.destroyed)
        };
        let live_instances = self.inner.instances.read().len();
        let in_flight = self.inner.in_flight.lock().len();

        FactoryStats {
            created,
            failed,
            destroyed,
            live_instances,
            in_flight,
        }
    }
}
