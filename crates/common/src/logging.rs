//! Структурированное логирование на базе tracing
//!
//! Единая точка инициализации для всего рантайма: env-filter через
//! переменную `RUST_LOG` с fallback на уровень из конфигурации,
//! обычный или JSON формат вывода.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Формат вывода логов
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Человекочитаемый формат для разработки
    Plain,
    /// JSON-строки для production агрегации
    Json,
}

/// Конфигурация логирования
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Уровень по умолчанию, если RUST_LOG не задан
    pub level: String,
    /// Формат вывода
    pub format: LogFormat,
    /// Включить target (модуль) в каждую запись
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            with_target: true,
        }
    }
}

impl LogConfig {
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            with_target: true,
        }
    }

    pub fn minimal() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Plain,
            with_target: false,
        }
    }
}

/// Инициализировать глобальный subscriber
///
/// Повторный вызов возвращает ошибку от tracing — в тестах используйте
/// `try_init_logging`, который её молча проглатывает.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Не удалось установить subscriber: {e}"))?,
        LogFormat::Plain => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Не удалось установить subscriber: {e}"))?,
    }

    Ok(())
}

/// Вариант для тестов: игнорирует повторную инициализацию
pub fn try_init_logging(config: &LogConfig) {
    let _ = init_logging(config);
}
