//! Рантайм жизненного цикла сервисов и dependency injection
//!
//! Приложение регистрирует именованные сервисы с их зависимостями в
//! `ServiceRegistry`, а `ServiceFactory` по требованию создаёт
//! singleton-экземпляры: валидирует граф, рекурсивно разрешает
//! зависимости, дедуплицирует конкурентные создания и управляет
//! initialize/cleanup жизненным циклом. Всё состояние живёт в памяти
//! одного процесса; распределённого discovery и RPC здесь нет.
//!
//! Контейнер и реестр создаются явно и передаются по ссылке —
//! глобального ambient-состояния нет, каждый тест строит свои
//! экземпляры.

pub mod errors;
pub mod factory;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod service;

pub use errors::{Result, ServiceError};
pub use factory::{FactoryStats, ServiceFactory};
pub use health::{HealthReport, HealthStatus};
pub use metrics::ServiceMetrics;
pub use registry::{ServiceFactoryFn, ServiceRegistration, ServiceRegistry};
pub use service::{LifecycleState, Service, ServiceCore};
