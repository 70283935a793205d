pub mod handler;
pub mod helpers;
pub mod queue;
pub mod storage;

pub use queue::TrainingQueue;
pub use storage::SledTrainingStore;
