//! Реестр сервисов
//!
//! Источник истины о том, какие сервисы существуют и как они связаны.
//! Хранит по имени фабрику, список зависимостей, singleton-флаг и
//! конфигурацию; валидирует граф зависимостей. Реестр только читается
//! фабрикой, никогда ею не мутируется.

use crate::errors::{Result, ServiceError};
use crate::service::Service;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Фабричная функция сервиса
///
/// Вызывается с уже разрешёнными экземплярами зависимостей (в порядке
/// объявления) и конфигурацией регистрации.
pub type ServiceFactoryFn = Arc<
    dyn Fn(Vec<Arc<dyn Service>>, Value) -> BoxFuture<'static, anyhow::Result<Arc<dyn Service>>>
        + Send
        + Sync,
>;

/// Описание одного зарегистрированного сервиса
#[derive(Clone)]
pub struct ServiceRegistration {
    pub name: String,
    pub factory: ServiceFactoryFn,
    /// Имена сервисов, которые должны быть созданы раньше этого
    pub dependencies: Vec<String>,
    /// Только singleton-политика реализована; флаг сохранён на будущее
    pub singleton: bool,
    /// Непрозрачная конфигурация, передаётся фабрике как есть
    pub config: Value,
}

impl ServiceRegistration {
    pub fn new<F, Fut>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Vec<Arc<dyn Service>>, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Arc<dyn Service>>> + Send + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move |deps, config| Box::pin(factory(deps, config))),
            dependencies: Vec::new(),
            singleton: true,
            config: Value::Null,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<impl Into<String>>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("singleton", &self.singleton)
            .finish_non_exhaustive()
    }
}

/// Реестр зарегистрированных сервисов
pub struct ServiceRegistry {
    registrations: RwLock<HashMap<String, ServiceRegistration>>,
    /// Порядок регистрации для стабильного list()
    order: RwLock<Vec<String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Зарегистрировать сервис, перезаписав прежнюю регистрацию
    ///
    /// Имена зависимостей здесь не проверяются: зависимость может быть
    /// зарегистрирована позже.
    pub fn register(&self, registration: ServiceRegistration) {
        let name = registration.name.clone();
        let dependencies = registration.dependencies.clone();

        let replaced = {
            let mut registrations = self.registrations.write();
            registrations.insert(name.clone(), registration).is_some()
        };

        if replaced {
            warn!(service = %name, "Сервис уже зарегистрирован, перезаписываем");
        } else {
            self.order.write().push(name.clone());
        }

        info!(
            service = %name,
            dependencies = ?dependencies,
            "📋 Сервис зарегистрирован"
        );
    }

    pub fn has(&self, name: &str) -> bool {
        self.registrations.read().contains_key(name)
    }

    pub fn get_registration(&self, name: &str) -> Option<ServiceRegistration> {
        self.registrations.read().get(name).cloned()
    }

    /// Объявленные зависимости; пусто для незарегистрированного имени
    pub fn get_dependencies(&self, name: &str) -> Vec<String> {
        self.registrations
            .read()
            .get(name)
            .map(|r| r.dependencies.clone())
            .unwrap_or_default()
    }

    /// Кто зависит от данного сервиса (обратный обход графа)
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.registrations
            .read()
            .values()
            .filter(|r| r.dependencies.iter().any(|d| d == name))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Все зарегистрированные имена в порядке регистрации
    pub fn list(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// Удалить все регистрации (административное/тестовое применение)
    pub fn clear(&self) {
        self.registrations.write().clear();
        self.order.write().clear();
        debug!("🧹 Реестр очищен");
    }

    /// Валидация графа зависимостей от корня `name`
    ///
    /// DFS по объявленным зависимостям. Цикл — ошибка с полным путём.
    /// Каждая ветка получает свежую копию пути: общий изменяемый набор
    /// ложно пометил бы ромбовидные зависимости как циклы.
    pub fn validate_dependencies(&self, name: &str) -> Result<()> {
        self.validate_recursive(name, &[])
    }

    fn validate_recursive(&self, name: &str, path: &[String]) -> Result<()> {
        if path.iter().any(|visited| visited == name) {
            let mut cycle: Vec<&str> = path.iter().map(String::as_str).collect();
            cycle.push(name);
            return Err(ServiceError::CircularDependency {
                cycle: cycle.join(" -> "),
            });
        }

        let dependencies = {
            let registrations = self.registrations.read();
            match registrations.get(name) {
                Some(registration) => registration.dependencies.clone(),
                None => {
                    return Err(ServiceError::NotRegistered {
                        name: name.to_string(),
                    })
                }
            }
        };

        let mut branch_path = path.to_vec();
        branch_path.push(name.to_string());

        for dependency in &dependencies {
            // validate_recursive клонирует branch_path для своей ветки,
            // соседние ветки друг друга не видят
            self.validate_recursive(dependency, &branch_path)?;
        }

        Ok(())
    }

    /// Человекочитаемый отчёт о графе зависимостей
    pub fn dependency_report(&self) -> String {
        let registrations = self.registrations.read();
        let order = self.order.read();

        let total_dependencies: usize = registrations
            .values()
            .map(|r| r.dependencies.len())
            .sum();

        let mut report = format!(
            "=== Service Dependency Report ===\nServices: {}\nDependencies: {}\n",
            registrations.len(),
            total_dependencies
        );

        for name in order.iter() {
            if let Some(registration) = registrations.get(name) {
                if registration.dependencies.is_empty() {
                    report.push_str(&format!("  {} (no dependencies)\n", name));
                } else {
                    report.push_str(&format!(
                        "  {} -> {}\n",
                        name,
                        registration.dependencies.join(", ")
                    ));
                }
            }
        }

        report.push_str("=================================");
        report
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
