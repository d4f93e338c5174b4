//! Мемоизирующий кэш для асинхронных вычислений
//!
//! Обёртка, которой авторы сервисов декорируют дорогие async-функции:
//! результат запоминается по ключу с опциональным TTL и ограничением на
//! количество записей. Состояние живёт только в памяти процесса.

use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

/// Конфигурация кэша
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Максимальное количество записей
    pub max_entries: usize,
    /// TTL записи; None — без истечения
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: u64,
    misses: u64,
    inserts: u64,
    evictions: u64,
}

/// Снимок статистики кэша
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsReport {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStatsReport {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Потокобезопасный мемоизирующий кэш
pub struct AsyncCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    stats: RwLock<CacheStats>,
    config: CacheConfig,
}

impl<K, V> AsyncCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            config,
        }
    }

    /// Получить значение, если оно есть и не протухло
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if !self.is_expired(entry) => {
                self.stats.write().hits += 1;
                Some(entry.value.clone())
            }
            _ => {
                self.stats.write().misses += 1;
                None
            }
        }
    }

    /// Положить значение, при переполнении вытеснив самые старые записи
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write();

        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            self.evict_oldest(&mut entries);
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.stats.write().inserts += 1;
    }

    /// Вернуть закэшированное значение или вычислить и запомнить его
    ///
    /// Конкурентные вызовы с одним ключом могут вычислить значение
    /// несколько раз — дедупликация параллельных построений это задача
    /// фабрики сервисов, а не этого кэша.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Удалить запись
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Очистить кэш целиком
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        debug!("Кэш очищен, удалено {} записей", removed);
    }

    /// Снимок статистики
    pub fn stats(&self) -> CacheStatsReport {
        let stats = self.stats.read();
        CacheStatsReport {
            hits: stats.hits,
            misses: stats.misses,
            inserts: stats.inserts,
            evictions: stats.evictions,
            entries: self.entries.read().len(),
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        match self.config.ttl {
            Some(ttl) => entry.inserted_at.elapsed() > ttl,
            None => false,
        }
    }

    fn evict_oldest(&self, entries: &mut HashMap<K, CacheEntry<V>>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            entries.remove(&key);
            self.stats.write().evictions += 1;
        }
    }
}

impl<K, V> Default for AsyncCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
