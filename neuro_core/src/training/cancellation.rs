use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::error::ProviderError;

pub type CancelFuture = BoxFuture<'static, Result<(), ProviderError>>;

/// Cancels one outstanding external job. Consumed when invoked.
pub struct CancelHandle {
    pub job_id: String,
    pub model_name: String,
    cancel: Box<dyn FnOnce() -> CancelFuture + Send + Sync>,
}

impl CancelHandle {
    pub fn new<F>(job_id: impl Into<String>, model_name: impl Into<String>, cancel: F) -> Self
    where
        F: FnOnce() -> CancelFuture + Send + Sync + 'static,
    {
        Self {
            job_id: job_id.into(),
            model_name: model_name.into(),
            cancel: Box::new(cancel),
        }
    }

    pub async fn invoke(self) -> Result<(), ProviderError> {
        (self.cancel)().await
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("job_id", &self.job_id)
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

/// Jobs started by this process that can still be canceled, one per user.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    handles: DashMap<i64, CancelHandle>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the handle, replacing and returning any previous one for the user.
    pub fn register(&self, telegram_id: i64, handle: CancelHandle) -> Option<CancelHandle> {
        log::info!(
            "Registered cancel handle for user {} (job {}, model {})",
            telegram_id,
            handle.job_id,
            handle.model_name
        );
        self.handles.insert(telegram_id, handle)
    }

    /// Invokes and drops the user's handle. Provider errors are logged, not
    /// returned: the job may already have finished. Returns the job id the
    /// cancel was issued for, or `None` when nothing was registered.
    pub async fn cancel(&self, telegram_id: i64) -> Option<String> {
        let (_, handle) = self.handles.remove(&telegram_id)?;
        let job_id = handle.job_id.clone();
        log::info!("Canceling job {} for user {}", job_id, telegram_id);
        if let Err(e) = handle.invoke().await {
            log::warn!(
                "Provider cancel for job {} (user {}) failed: {}",
                job_id,
                telegram_id,
                e
            );
        }
        Some(job_id)
    }

    pub fn remove(&self, telegram_id: i64) -> Option<CancelHandle> {
        self.handles.remove(&telegram_id).map(|(_, handle)| handle)
    }

    /// Drops the user's handle only if it still points at `job_id`, so a
    /// late completion cannot remove the handle of a newer job.
    pub fn remove_job(&self, telegram_id: i64, job_id: &str) -> bool {
        self.handles
            .remove_if(&telegram_id, |_, handle| handle.job_id == job_id)
            .is_some()
    }

    pub fn contains(&self, telegram_id: i64) -> bool {
        self.handles.contains_key(&telegram_id)
    }

    pub fn job_for(&self, telegram_id: i64) -> Option<String> {
        self.handles.get(&telegram_id).map(|handle| handle.job_id.clone())
    }

    pub fn model_for(&self, telegram_id: i64) -> Option<String> {
        self.handles
            .get(&telegram_id)
            .map(|handle| handle.model_name.clone())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use super::*;
    use crate::error::ProviderErrorKind;

    fn counting_handle(job_id: &str, calls: Arc<AtomicUsize>, fail: bool) -> CancelHandle {
        CancelHandle::new(job_id, "lora", move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(ProviderError::new(ProviderErrorKind::Api, "already finished"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn cancel_invokes_once_and_removes() {
        let registry = CancellationRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(7, counting_handle("job-1", calls.clone(), false));

        assert_eq!(registry.cancel(7).await.as_deref(), Some("job-1"));
        assert_eq!(registry.cancel(7).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(7));
    }

    #[tokio::test]
    async fn provider_error_is_swallowed_and_handle_still_removed() {
        let registry = CancellationRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(7, counting_handle("job-1", calls.clone(), true));

        assert_eq!(registry.cancel(7).await.as_deref(), Some("job-1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_replaces_previous_handle() {
        let registry = CancellationRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(7, counting_handle("old", calls.clone(), false));
        let replaced = registry.register(7, counting_handle("new", calls.clone(), false));

        assert_eq!(replaced.map(|h| h.job_id).as_deref(), Some("old"));
        assert_eq!(registry.job_for(7).as_deref(), Some("new"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_job_ignores_newer_handle() {
        let registry = CancellationRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(7, counting_handle("new", calls, false));

        assert!(!registry.remove_job(7, "old"));
        assert!(registry.contains(7));
        assert!(registry.remove_job(7, "new"));
        assert!(!registry.contains(7));
    }
}
