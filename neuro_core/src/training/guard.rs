use std::sync::Arc;

use crate::clock::Clock;
use crate::training::cache::{CacheStatus, TrainingCache, TrainingCacheEntry, TrainingKey};
use crate::training::reconcile::{EffectiveStatus, reconcile};
use crate::training::store::TrainingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSource {
    Database,
    Cache,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveDetail {
    pub record_id: Option<String>,
    pub external_job_id: Option<String>,
    /// Set when the registry could not be read and only the cache was consulted.
    pub registry_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCheck {
    pub active: bool,
    pub source: ActiveSource,
    pub detail: ActiveDetail,
}

/// Keeps two trainings of the same model by the same user from running at once.
///
/// The registry decides; the cache only answers the hot "already running"
/// path without a round trip and covers the window before a record exists.
#[derive(Clone)]
pub struct DuplicateGuard {
    cache: Arc<dyn TrainingCache>,
    store: Arc<dyn TrainingStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
}

impl DuplicateGuard {
    pub fn new(
        cache: Arc<dyn TrainingCache>,
        store: Arc<dyn TrainingStore>,
        clock: Arc<dyn Clock>,
        ttl_ms: i64,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    pub async fn check_active(&self, telegram_id: i64, model_name: &str) -> ActiveCheck {
        let key = TrainingKey::new(telegram_id, model_name);

        let (record, registry_error) = match self.store.find_active(telegram_id, model_name).await {
            Ok(record) => (record, None),
            Err(e) => {
                log::error!(
                    "Failed to query active trainings for {}, falling back to cache: {}",
                    key,
                    e
                );
                (None, Some(e.to_string()))
            }
        };

        let now_ms = self.clock.now_ms();
        let entry = self.cache.get(&key);

        match reconcile(record.as_ref(), entry.as_ref(), now_ms, self.ttl_ms) {
            EffectiveStatus::ActiveInRegistry {
                record_id,
                external_job_id,
            } => {
                log::info!(
                    "Active training {} found in registry for {} (job {:?})",
                    record_id,
                    key,
                    external_job_id
                );
                if let Some(job_id) = &external_job_id {
                    self.cache.set(
                        key,
                        TrainingCacheEntry {
                            timestamp_ms: now_ms,
                            status: CacheStatus::Running,
                            external_job_id: Some(job_id.clone()),
                        },
                    );
                }
                ActiveCheck {
                    active: true,
                    source: ActiveSource::Database,
                    detail: ActiveDetail {
                        record_id: Some(record_id),
                        external_job_id,
                        registry_error: None,
                    },
                }
            }
            EffectiveStatus::ActiveInCache { external_job_id } => {
                log::info!("Active training found in cache for {} (job {:?})", key, external_job_id);
                ActiveCheck {
                    active: true,
                    source: ActiveSource::Cache,
                    detail: ActiveDetail {
                        record_id: None,
                        external_job_id,
                        registry_error,
                    },
                }
            }
            EffectiveStatus::Clear => ActiveCheck {
                active: false,
                source: ActiveSource::None,
                detail: ActiveDetail {
                    registry_error,
                    ..ActiveDetail::default()
                },
            },
        }
    }

    /// Takes the in-process lock for the pair. Call only after `check_active`
    /// came back clear; a `false` means another submission got there first.
    pub fn acquire(&self, telegram_id: i64, model_name: &str) -> bool {
        let now_ms = self.clock.now_ms();
        let evicted = self.cache.sweep(now_ms, self.ttl_ms);
        if evicted > 0 {
            log::debug!("Evicted {} expired training cache entries", evicted);
        }

        let key = TrainingKey::new(telegram_id, model_name);
        if let Some(current) = self.cache.get(&key) {
            if current.blocks(now_ms, self.ttl_ms) {
                log::warn!(
                    "Training cache already holds a running job for {} since {}ms",
                    key,
                    current.timestamp_ms
                );
                return false;
            }
        }

        log::info!("Training cache entry set to starting for {}", key);
        self.cache.set(
            key,
            TrainingCacheEntry {
                timestamp_ms: now_ms,
                status: CacheStatus::Starting,
                external_job_id: None,
            },
        );
        true
    }

    pub fn transition(
        &self,
        telegram_id: i64,
        model_name: &str,
        status: CacheStatus,
        external_job_id: Option<String>,
    ) {
        let key = TrainingKey::new(telegram_id, model_name);
        match self.cache.get(&key) {
            Some(mut entry) => {
                log::info!(
                    "Training cache status for {}: {:?} -> {:?}",
                    key,
                    entry.status,
                    status
                );
                entry.status = status;
                if external_job_id.is_some() {
                    entry.external_job_id = external_job_id;
                }
                self.cache.set(key, entry);
            }
            None => {
                log::warn!("No training cache entry to move to {:?} for {}", status, key);
            }
        }
    }

    pub fn release(&self, telegram_id: i64, model_name: &str) {
        let key = TrainingKey::new(telegram_id, model_name);
        if self.cache.delete(&key).is_some() {
            log::info!("Training cache entry released for {}", key);
        }
    }
}
