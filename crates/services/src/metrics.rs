//! Метрики выполнения операций сервиса
//!
//! Каждый сервис владеет собственным экземпляром и мутирует его только
//! через свои методы; фабрика лишь читает снимки для агрегации.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Снимок метрик одного сервиса
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceMetrics {
    /// Общее количество начатых операций
    pub operation_count: u64,
    /// Количество операций, завершившихся ошибкой
    pub error_count: u64,
    /// Скользящее среднее времени ответа, миллисекунды
    pub average_response_time_ms: f64,
    /// Момент завершения последней успешной операции
    pub last_operation_time: Option<DateTime<Utc>>,
    /// Произвольные числовые метрики сервиса
    pub custom: HashMap<String, f64>,
}

impl ServiceMetrics {
    /// Зафиксировать начало операции, вернуть её порядковый номер
    pub fn begin_operation(&mut self) -> u64 {
        self.operation_count += 1;
        self.operation_count
    }

    /// Успешное завершение операции с номером `n` за `duration_ms`
    ///
    /// Инкрементальное среднее: avg' = (avg * (n - 1) + d) / n.
    pub fn record_success(&mut self, n: u64, duration_ms: f64) {
        debug_assert!(n > 0);
        self.average_response_time_ms =
            (self.average_response_time_ms * (n - 1) as f64 + duration_ms) / n as f64;
        self.last_operation_time = Some(Utc::now());
    }

    /// Операция завершилась ошибкой
    pub fn record_failure(&mut self) {
        self.error_count += 1;
    }

    /// Записать произвольную метрику
    pub fn record_custom(&mut self, name: impl Into<String>, value: f64) {
        self.custom.insert(name.into(), value);
    }

    /// Доля ошибок среди начатых операций
    pub fn error_rate(&self) -> f64 {
        if self.operation_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.operation_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_average() {
        let mut metrics = ServiceMetrics::default();

        for duration in [10.0, 20.0, 30.0] {
            let n = metrics.begin_operation();
            metrics.record_success(n, duration);
        }

        assert_eq!(metrics.operation_count, 3);
        assert!((metrics.average_response_time_ms - 20.0).abs() < f64::EPSILON);
        assert!(metrics.last_operation_time.is_some());
    }

    #[test]
    fn test_failure_counting() {
        let mut metrics = ServiceMetrics::default();

        let n = metrics.begin_operation();
        metrics.record_success(n, 5.0);
        metrics.begin_operation();
        metrics.record_failure();

        assert_eq!(metrics.operation_count, 2);
        assert_eq!(metrics.error_count, 1);
        assert!((metrics.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_custom_metrics() {
        let mut metrics = ServiceMetrics::default();
        metrics.record_custom("queue_depth", 7.0);
        assert_eq!(metrics.custom.get("queue_depth"), Some(&7.0));
    }
}
