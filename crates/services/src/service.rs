//! Базовый контракт сервиса
//!
//! Единый жизненный цикл, логирование, обработка ошибок и метрики для
//! каждого сервиса независимо от его доменной логики. Конкретный сервис
//! встраивает `ServiceCore` и переопределяет нужные хуки
//! (`on_initialize`, `on_cleanup`, `on_health_check`); всё остальное
//! даёт trait по умолчанию.

use crate::errors::{Result, ServiceError};
use crate::health::{merge_metadata, HealthReport};
use crate::metrics::ServiceMetrics;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Состояние жизненного цикла сервиса
///
/// Переходы: Uninitialized -> Initializing -> Ready и отдельно
/// Ready -> Destroyed. Сервис не обслуживает операции до Ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Destroyed => "destroyed",
        }
    }
}

/// Состояние и метрики, общие для всех сервисов
///
/// Владеет машиной состояний и метриками; фабрика и реестр их напрямую
/// не мутируют, только читают через публичные методы.
pub struct ServiceCore {
    name: String,
    version: String,
    state: RwLock<LifecycleState>,
    metrics: RwLock<ServiceMetrics>,
}

impl ServiceCore {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            state: RwLock::new(LifecycleState::Uninitialized),
            metrics: RwLock::new(ServiceMetrics::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Снимок метрик сервиса
    pub fn metrics(&self) -> ServiceMetrics {
        self.metrics.read().clone()
    }

    /// Записать произвольную числовую метрику
    pub fn record_metric(&self, name: &str, value: f64) {
        self.metrics.write().record_custom(name, value);
        debug!(service = %self.name, metric = name, value, "Метрика записана");
    }

    /// Атомарно перевести Uninitialized/Destroyed -> Initializing
    ///
    /// Возвращает false, если сервис уже Ready (повторная инициализация)
    /// или уже инициализируется конкурентно.
    pub(crate) fn try_begin_initialize(&self) -> bool {
        let mut state = self.state.write();
        match *state {
            LifecycleState::Uninitialized | LifecycleState::Destroyed => {
                *state = LifecycleState::Initializing;
                true
            }
            LifecycleState::Initializing | LifecycleState::Ready => false,
        }
    }

    pub(crate) fn set_state(&self, new_state: LifecycleState) {
        *self.state.write() = new_state;
    }

    /// Обёртка для доменных операций сервиса
    ///
    /// Считает операцию, меряет длительность, обновляет скользящее
    /// среднее и пробрасывает ошибку вызывающему без изменений —
    /// обёртка только наблюдает, ретраев здесь нет.
    pub async fn execute_operation<T, Fut>(
        &self,
        operation: &str,
        fut: Fut,
    ) -> anyhow::Result<T>
    where
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        if !self.is_initialized() {
            return Err(anyhow::Error::new(ServiceError::InvalidState {
                service: self.name.clone(),
                expected: LifecycleState::Ready.as_str().to_string(),
                actual: self.state().as_str().to_string(),
            }));
        }

        let n = self.metrics.write().begin_operation();
        let started = Instant::now();
        debug!(service = %self.name, operation, "▶️ Операция начата");

        match fut.await {
            Ok(value) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.metrics.write().record_success(n, duration_ms);
                debug!(
                    service = %self.name,
                    operation,
                    duration_ms,
                    "✅ Операция завершена"
                );
                Ok(value)
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                let kind = common::classify(&e, operation);
                self.metrics.write().record_failure();
                error!(
                    service = %self.name,
                    operation,
                    duration_ms,
                    kind = kind.as_str(),
                    "❌ Операция завершилась ошибкой: {e:#}"
                );
                Err(e)
            }
        }
    }
}

/// Контракт, который реализует каждый сервис рантайма
///
/// Trait объектно-безопасен: фабрика держит экземпляры как
/// `Arc<dyn Service>`. Доменные методы сервиса оборачиваются через
/// `ServiceCore::execute_operation` (generic, поэтому живёт вне trait).
#[async_trait]
pub trait Service: Send + Sync {
    /// Доступ к общему состоянию; единственный обязательный метод
    fn core(&self) -> &ServiceCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn version(&self) -> &str {
        self.core().version()
    }

    /// Снимок метрик
    fn metrics(&self) -> ServiceMetrics {
        self.core().metrics()
    }

    /// Пользовательский setup; по умолчанию no-op
    async fn on_initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Пользовательский teardown; по умолчанию no-op
    async fn on_cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Доменные метаданные для health-отчёта; по умолчанию пусто
    async fn on_health_check(&self) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    /// Инициализация: идемпотентна, повторный вызов на Ready — no-op
    async fn initialize(&self) -> Result<()> {
        let core = self.core();

        if !core.try_begin_initialize() {
            warn!(
                service = %core.name(),
                "⚠️ Сервис уже инициализирован, повторный вызов игнорируется"
            );
            return Ok(());
        }

        let started = Instant::now();
        info!(service = %core.name(), "🚀 Инициализация сервиса...");

        match self.on_initialize().await {
            Ok(()) => {
                core.set_state(LifecycleState::Ready);
                info!(
                    service = %core.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "✅ Сервис инициализирован"
                );
                Ok(())
            }
            Err(e) => {
                core.set_state(LifecycleState::Uninitialized);
                let err = ServiceError::initialization(core.name(), &e);
                error!(
                    service = %core.name(),
                    kind = err.category(),
                    "❌ Ошибка инициализации: {e:#}"
                );
                Err(err)
            }
        }
    }

    /// Очистка: снимает инициализацию независимо от исходного состояния
    ///
    /// Ошибка teardown-хука логируется и пробрасывается напрямую
    /// вызывающему; batch-уровень (`ServiceFactory::destroy_all`) её
    /// гасит сам.
    async fn cleanup(&self) -> Result<()> {
        let core = self.core();
        core.set_state(LifecycleState::Destroyed);

        match self.on_cleanup().await {
            Ok(()) => {
                info!(service = %core.name(), "🧹 Сервис очищен");
                Ok(())
            }
            Err(e) => {
                let err = ServiceError::cleanup(core.name(), &e);
                error!(
                    service = %core.name(),
                    kind = err.category(),
                    "❌ Ошибка очистки: {e:#}"
                );
                Err(err)
            }
        }
    }

    /// Health-проверка; по контракту никогда не падает
    async fn health_check(&self) -> HealthReport {
        let core = self.core();
        let initialized = core.is_initialized();

        match self.on_health_check().await {
            Ok(custom) => {
                let base = json!({
                    "initialized": initialized,
                    "metrics": core.metrics(),
                });
                HealthReport::healthy(core.version(), merge_metadata(base, custom))
            }
            Err(e) => {
                warn!(
                    service = %core.name(),
                    "⚠️ Health-хук вернул ошибку: {e:#}"
                );
                HealthReport::unhealthy(core.version(), format!("{e:#}"), initialized)
            }
        }
    }
}

impl std::fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}
