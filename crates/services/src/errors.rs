//! Типизированные ошибки сервисного рантайма
//!
//! `ServiceError` намеренно Clone: результат создания сервиса
//! расшаривается между конкурентными вызовами `create` через общий
//! future, и ошибка должна доставаться каждому ожидающему.

use common::ErrorKind;
use thiserror::Error;

/// Ошибки регистрации, разрешения и жизненного цикла сервисов
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// Попытка создать или валидировать незарегистрированный сервис
    #[error("Service '{name}' is not registered")]
    NotRegistered { name: String },

    /// Цикл в графе зависимостей; `cycle` содержит полный путь
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// Ошибка setup-хука сервиса
    #[error("Initialization of '{service}' failed: {message}")]
    Initialization {
        service: String,
        kind: ErrorKind,
        message: String,
    },

    /// Ошибка teardown-хука сервиса
    #[error("Cleanup of '{service}' failed: {message}")]
    Cleanup {
        service: String,
        kind: ErrorKind,
        message: String,
    },

    /// Зарегистрированная фабрика вернула ошибку
    #[error("Factory for '{service}' failed: {message}")]
    Factory { service: String, message: String },

    /// Операция вызвана в недопустимом состоянии жизненного цикла
    #[error("Service '{service}' is in invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        service: String,
        expected: String,
        actual: String,
    },
}

impl ServiceError {
    /// Ошибка инициализации из произвольной ошибки хука
    pub fn initialization(service: impl Into<String>, error: &anyhow::Error) -> Self {
        let service = service.into();
        let kind = common::classify(error, "initialize");
        ServiceError::Initialization {
            service,
            kind,
            message: format!("{error:#}"),
        }
    }

    /// Ошибка очистки из произвольной ошибки хука
    pub fn cleanup(service: impl Into<String>, error: &anyhow::Error) -> Self {
        let service = service.into();
        let kind = common::classify(error, "cleanup");
        ServiceError::Cleanup {
            service,
            kind,
            message: format!("{error:#}"),
        }
    }

    /// Категория ошибки для мониторинга и алёртинга
    pub fn category(&self) -> &'static str {
        match self {
            ServiceError::NotRegistered { .. } => "registration",
            ServiceError::CircularDependency { .. } => "validation",
            ServiceError::Initialization { .. } => "initialization",
            ServiceError::Cleanup { .. } => "cleanup",
            ServiceError::Factory { .. } => "factory",
            ServiceError::InvalidState { .. } => "state",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
