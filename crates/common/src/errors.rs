//! Классификация ошибок перед логированием
//!
//! Рантайм не оборачивает ошибки в свои типы на пути к вызывающему коду:
//! классификатор лишь нормализует ошибку в небольшой набор категорий
//! для структурированных логов и метрик, а оригинальная ошибка
//! пробрасывается дальше без изменений.

use thiserror::Error;
use tracing::debug;

/// Категория ошибки для логов и мониторинга
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("timeout")]
    Timeout,

    #[error("io")]
    Io,

    #[error("validation")]
    Validation,

    #[error("configuration")]
    Configuration,

    #[error("not_found")]
    NotFound,

    #[error("internal")]
    Internal,
}

impl ErrorKind {
    /// Строковое имя категории для структурированных полей лога
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Io => "io",
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }

    /// Имеет ли смысл повторять операцию при этой категории
    pub fn is_recoverable(&self) -> bool {
        match self {
            ErrorKind::Timeout => true,
            ErrorKind::Io => true,
            ErrorKind::Validation => false,
            ErrorKind::Configuration => false,
            ErrorKind::NotFound => false,
            ErrorKind::Internal => false,
        }
    }
}

/// Классифицировать ошибку по цепочке причин и тексту
///
/// `context` — имя операции, в которой ошибка возникла; попадает только
/// в debug-лог, не в результат.
pub fn classify(error: &anyhow::Error, context: &str) -> ErrorKind {
    let kind = classify_inner(error);
    debug!(
        context = context,
        kind = kind.as_str(),
        "Ошибка классифицирована: {error:#}"
    );
    kind
}

fn classify_inner(error: &anyhow::Error) -> ErrorKind {
    // Сначала точные типы из цепочки причин
    for cause in error.chain() {
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorKind::Io;
        }
    }

    // Затем эвристика по тексту
    let message = format!("{error:#}").to_lowercase();
    if message.contains("timeout") || message.contains("timed out") {
        ErrorKind::Timeout
    } else if message.contains("not found") || message.contains("not registered") {
        ErrorKind::NotFound
    } else if message.contains("config") {
        ErrorKind::Configuration
    } else if message.contains("invalid") || message.contains("validation") {
        ErrorKind::Validation
    } else {
        ErrorKind::Internal
    }
}
