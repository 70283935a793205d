pub mod cache;
pub mod cancellation;
pub mod dto;
pub mod guard;
pub mod orchestrator;
pub mod reconcile;
pub mod store;
pub mod validate;


pub use cache::{CacheStatus, InMemoryTrainingCache, TrainingCache, TrainingCacheEntry, TrainingKey};
pub use cancellation::{CancelHandle, CancellationRegistry};
pub use dto::*;
pub use guard::{ActiveCheck, ActiveDetail, ActiveSource, DuplicateGuard};
pub use orchestrator::{CompletionHandler, OrchestratorConfig, OrchestratorDeps, TrainingOrchestrator};
pub use store::TrainingStore;
