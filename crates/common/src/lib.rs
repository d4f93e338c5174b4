//! Общие утилиты для сервисного рантайма
//!
//! Содержит ambient-инфраструктуру, которую используют все сервисы:
//! структурированное логирование, классификацию ошибок и мемоизирующий
//! кэш для асинхронных вычислений.

pub mod cache;
pub mod errors;
pub mod logging;

pub use cache::{AsyncCache, CacheConfig, CacheStatsReport};
pub use errors::{classify, ErrorKind};
pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};
