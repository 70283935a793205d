use crate::training::cache::TrainingCacheEntry;
use crate::training::dto::TrainingRecord;

/// What the two tiers of state say about a (user, model) pair, taken together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveStatus {
    /// The registry holds an open record. Authoritative regardless of the cache.
    ActiveInRegistry {
        record_id: String,
        external_job_id: Option<String>,
    },
    /// Registry is clear but this process saw a job start within the TTL.
    ActiveInCache { external_job_id: Option<String> },
    Clear,
}

impl EffectiveStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, EffectiveStatus::Clear)
    }
}

pub fn reconcile(
    record: Option<&TrainingRecord>,
    entry: Option<&TrainingCacheEntry>,
    now_ms: i64,
    ttl_ms: i64,
) -> EffectiveStatus {
    if let Some(record) = record.filter(|r| r.status.is_open()) {
        return EffectiveStatus::ActiveInRegistry {
            record_id: record.id.clone(),
            external_job_id: record.external_job_id.clone(),
        };
    }
    match entry {
        Some(entry) if entry.blocks(now_ms, ttl_ms) => EffectiveStatus::ActiveInCache {
            external_job_id: entry.external_job_id.clone(),
        },
        _ => EffectiveStatus::Clear,
    }
}
