//! Health-отчёты сервисов
//!
//! `health_check` по контракту никогда не возвращает ошибку: сбой
//! пользовательского хука конвертируется в отчёт со статусом Unhealthy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Статус здоровья сервиса
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Отчёт о здоровье одного сервиса
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// initialized, metrics и произвольные поля хука
    pub metadata: Value,
}

impl HealthReport {
    pub fn healthy(version: impl Into<String>, metadata: Value) -> Self {
        Self {
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            version: version.into(),
            metadata,
        }
    }

    pub fn unhealthy(version: impl Into<String>, error: impl AsRef<str>, initialized: bool) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            timestamp: Utc::now(),
            version: version.into(),
            metadata: json!({
                "error": error.as_ref(),
                "initialized": initialized,
            }),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Слить произвольные поля хука в metadata отчёта
///
/// Не-объектные значения хука кладутся под ключ "details", чтобы не
/// потерять их и не затирать стандартные поля.
pub(crate) fn merge_metadata(base: Value, custom: Value) -> Value {
    match (base, custom) {
        (Value::Object(mut base_map), Value::Object(custom_map)) => {
            for (key, value) in custom_map {
                base_map.entry(key).or_insert(value);
            }
            Value::Object(base_map)
        }
        (Value::Object(base_map), Value::Null) => Value::Object(base_map),
        (Value::Object(mut base_map), other) => {
            base_map.insert("details".to_string(), other);
            Value::Object(base_map)
        }
        (base, _) => base,
    }
}
