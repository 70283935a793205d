use std::fmt;

use dashmap::DashMap;

/// Default lifetime of a cache entry.
pub const TRAINING_CACHE_TTL_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrainingKey {
    pub telegram_id: i64,
    pub model_name: String,
}

impl TrainingKey {
    pub fn new(telegram_id: i64, model_name: impl Into<String>) -> Self {
        Self {
            telegram_id,
            model_name: model_name.into(),
        }
    }
}

impl fmt::Display for TrainingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.telegram_id, self.model_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Starting,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingCacheEntry {
    pub timestamp_ms: i64,
    pub status: CacheStatus,
    pub external_job_id: Option<String>,
}

impl TrainingCacheEntry {
    pub fn is_expired(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.timestamp_ms >= ttl_ms
    }

    /// Only a fresh `running` entry blocks a submission.
    pub fn blocks(&self, now_ms: i64, ttl_ms: i64) -> bool {
        self.status == CacheStatus::Running && !self.is_expired(now_ms, ttl_ms)
    }
}

/// Storage behind the duplicate guard. Production uses the in-memory map; a
/// shared cache can be plugged in for multi-process deployments.
pub trait TrainingCache: Send + Sync {
    fn get(&self, key: &TrainingKey) -> Option<TrainingCacheEntry>;

    fn set(&self, key: TrainingKey, entry: TrainingCacheEntry);

    fn delete(&self, key: &TrainingKey) -> Option<TrainingCacheEntry>;

    /// Drops every entry older than `ttl_ms`; returns how many were dropped.
    fn sweep(&self, now_ms: i64, ttl_ms: i64) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryTrainingCache {
    entries: DashMap<TrainingKey, TrainingCacheEntry>,
}

impl InMemoryTrainingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TrainingCache for InMemoryTrainingCache {
    fn get(&self, key: &TrainingKey) -> Option<TrainingCacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: TrainingKey, entry: TrainingCacheEntry) {
        self.entries.insert(key, entry);
    }

    fn delete(&self, key: &TrainingKey) -> Option<TrainingCacheEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    fn sweep(&self, now_ms: i64, ttl_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now_ms, ttl_ms));
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp_ms: i64, status: CacheStatus) -> TrainingCacheEntry {
        TrainingCacheEntry {
            timestamp_ms,
            status,
            external_job_id: None,
        }
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let cache = InMemoryTrainingCache::new();
        cache.set(TrainingKey::new(1, "old"), entry(0, CacheStatus::Running));
        cache.set(TrainingKey::new(1, "new"), entry(9_000, CacheStatus::Starting));

        let dropped = cache.sweep(10_000, 5_000);

        assert_eq!(dropped, 1);
        assert!(cache.get(&TrainingKey::new(1, "old")).is_none());
        assert!(cache.get(&TrainingKey::new(1, "new")).is_some());
    }

    #[test]
    fn starting_entries_never_block() {
        assert!(!entry(0, CacheStatus::Starting).blocks(1, TRAINING_CACHE_TTL_MS));
        assert!(entry(0, CacheStatus::Running).blocks(1, TRAINING_CACHE_TTL_MS));
        assert!(!entry(0, CacheStatus::Running).blocks(TRAINING_CACHE_TTL_MS, TRAINING_CACHE_TTL_MS));
    }

    #[test]
    fn key_displays_as_pair() {
        assert_eq!(TrainingKey::new(144022504, "lora").to_string(), "144022504:lora");
    }
}
